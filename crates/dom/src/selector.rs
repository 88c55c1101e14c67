//! Minimal selector matching for `query_selector`.
//!
//! Supports compound selectors (`div.card#main[data-layer]`,
//! `[name=value]`) joined by the descendant combinator.

use crate::element::ElementData;

#[derive(Debug, Default, PartialEq)]
pub(crate) struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    pub(crate) fn matches(&self, elem: &ElementData) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && elem.tag_name.as_str() != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if elem.id() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| elem.has_class(c)) {
            return false;
        }
        self.attributes.iter().all(|(name, value)| match value {
            None => elem.has_attribute(name),
            Some(v) => elem.get_attribute(name) == Some(v.as_str()),
        })
    }
}

/// Parsed selector: compounds from outermost to innermost.
#[derive(Debug, PartialEq)]
pub(crate) struct Selector {
    pub(crate) compounds: Vec<Compound>,
}

impl Selector {
    pub(crate) fn parse(input: &str) -> Option<Self> {
        let compounds = input
            .split_whitespace()
            .map(parse_compound)
            .collect::<Option<Vec<_>>>()?;
        if compounds.is_empty() {
            return None;
        }
        Some(Self { compounds })
    }
}

fn parse_compound(input: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut rest = input;

    let tag_end = rest.find(['#', '.', '[']).unwrap_or(rest.len());
    if tag_end > 0 {
        compound.tag = Some(rest[..tag_end].to_ascii_lowercase());
    }
    rest = &rest[tag_end..];

    while let Some(first) = rest.chars().next() {
        match first {
            '#' | '.' => {
                let body = &rest[1..];
                let end = body.find(['#', '.', '[']).unwrap_or(body.len());
                let name = &body[..end];
                if name.is_empty() {
                    return None;
                }
                if first == '#' {
                    compound.id = Some(name.to_string());
                } else {
                    compound.classes.push(name.to_string());
                }
                rest = &body[end..];
            }
            '[' => {
                let close = rest.find(']')?;
                let inner = &rest[1..close];
                let attribute = match inner.split_once('=') {
                    Some((name, value)) => (
                        name.trim().to_ascii_lowercase(),
                        Some(value.trim().trim_matches(|c| c == '"' || c == '\'').to_string()),
                    ),
                    None => (inner.trim().to_ascii_lowercase(), None),
                };
                if attribute.0.is_empty() {
                    return None;
                }
                compound.attributes.push(attribute);
                rest = &rest[close + 1..];
            }
            _ => return None,
        }
    }

    Some(compound)
}
