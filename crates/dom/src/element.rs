//! DOM Element implementation.

use crate::attributes::{AttributeMap, DataAttributes};
use bitflags::bitflags;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Interned, lowercase tag name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TagName(Arc<str>);

impl TagName {
    pub fn new(name: &str) -> Self {
        static INTERNED: Lazy<RwLock<HashMap<String, Arc<str>>>> =
            Lazy::new(|| RwLock::new(HashMap::new()));

        let lower = name.to_ascii_lowercase();

        {
            let cache = INTERNED.read();
            if let Some(s) = cache.get(&lower) {
                return TagName(s.clone());
            }
        }

        let mut cache = INTERNED.write();
        let s = cache
            .entry(lower.clone())
            .or_insert_with(|| Arc::from(lower.as_str()))
            .clone();
        TagName(s)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn div() -> Self {
        Self::new("div")
    }
    pub fn span() -> Self {
        Self::new("span")
    }
    pub fn img() -> Self {
        Self::new("img")
    }
    pub fn video() -> Self {
        Self::new("video")
    }
}

impl std::fmt::Display for TagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq<&str> for TagName {
    fn eq(&self, other: &&str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

bitflags! {
    /// Element flags for quick property checks.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ElementFlags: u32 {
        const VOID = 1 << 0;
        /// Content comes from an external resource (`img`, `video`, `canvas`).
        const REPLACED = 1 << 1;
        const HIDDEN = 1 << 2;
    }
}

/// Element-specific data.
#[derive(Clone, Debug)]
pub struct ElementData {
    /// Tag name (lowercase).
    pub tag_name: TagName,
    /// Attributes, including `class` and `id`.
    pub attributes: AttributeMap,
    /// Class list, kept in sync with the `class` attribute.
    pub class_list: SmallVec<[Arc<str>; 4]>,
    /// Element flags.
    pub flags: ElementFlags,
}

impl ElementData {
    pub fn new(tag_name: TagName) -> Self {
        let flags = Self::default_flags(&tag_name);
        Self {
            tag_name,
            attributes: AttributeMap::new(),
            class_list: SmallVec::new(),
            flags,
        }
    }

    fn default_flags(tag_name: &TagName) -> ElementFlags {
        let mut flags = ElementFlags::empty();
        let name = tag_name.as_str();

        if matches!(name, "br" | "hr" | "img" | "input" | "link" | "meta" | "source" | "wbr") {
            flags |= ElementFlags::VOID;
        }
        if matches!(name, "img" | "video" | "canvas" | "iframe") {
            flags |= ElementFlags::REPLACED;
        }

        flags
    }

    /// Set an attribute, updating cached values. Returns the previous value.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> Option<String> {
        let name_lower = name.to_ascii_lowercase();

        match name_lower.as_str() {
            "class" => {
                self.class_list = value.split_whitespace().map(Arc::from).collect();
            }
            "hidden" => self.flags.insert(ElementFlags::HIDDEN),
            _ => {}
        }

        self.attributes.set(&name_lower, value)
    }

    /// Remove an attribute. Returns the previous value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let name_lower = name.to_ascii_lowercase();

        match name_lower.as_str() {
            "class" => self.class_list.clear(),
            "hidden" => self.flags.remove(ElementFlags::HIDDEN),
            _ => {}
        }

        self.attributes.remove(&name_lower)
    }

    #[inline]
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(&name.to_ascii_lowercase())
    }

    #[inline]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(&name.to_ascii_lowercase())
    }

    /// View over `data-*` attributes.
    pub fn data(&self) -> DataAttributes<'_> {
        DataAttributes::new(&self.attributes)
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes.get("id")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_list.iter().any(|c| c.as_ref() == class)
    }

    /// Current `class` attribute value.
    pub fn class_name(&self) -> String {
        self.class_list
            .iter()
            .map(|c| c.as_ref())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Add a class. Returns the previous class string if the list changed.
    pub fn add_class(&mut self, class: &str) -> Option<String> {
        if class.is_empty() || self.has_class(class) {
            return None;
        }
        let old = self.class_name();
        self.class_list.push(Arc::from(class));
        self.sync_class_attribute();
        Some(old)
    }

    /// Remove a class. Returns the previous class string if the list changed.
    pub fn remove_class(&mut self, class: &str) -> Option<String> {
        let pos = self.class_list.iter().position(|c| c.as_ref() == class)?;
        let old = self.class_name();
        self.class_list.remove(pos);
        self.sync_class_attribute();
        Some(old)
    }

    fn sync_class_attribute(&mut self) {
        let class_str = self.class_name();
        self.attributes.set("class", &class_str);
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        self.flags.contains(ElementFlags::VOID)
    }

    #[inline]
    pub fn is_replaced(&self) -> bool {
        self.flags.contains(ElementFlags::REPLACED)
    }

    #[inline]
    pub fn is_hidden(&self) -> bool {
        self.flags.contains(ElementFlags::HIDDEN)
    }

    #[inline]
    pub fn is_video(&self) -> bool {
        self.tag_name == "video"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_name() {
        let div = TagName::new("DIV");
        assert_eq!(div.as_str(), "div");
        assert!(div == "div");
        assert_eq!(div, TagName::div());
    }

    #[test]
    fn test_class_list_sync() {
        let mut elem = ElementData::new(TagName::div());
        elem.set_attribute("class", "foo  bar");
        assert!(elem.has_class("foo"));
        assert!(elem.has_class("bar"));

        assert_eq!(elem.add_class("baz"), Some("foo bar".to_string()));
        assert_eq!(elem.add_class("baz"), None);
        assert_eq!(elem.get_attribute("class"), Some("foo bar baz"));

        assert_eq!(elem.remove_class("foo"), Some("foo bar baz".to_string()));
        assert_eq!(elem.remove_class("foo"), None);
        assert_eq!(elem.class_name(), "bar baz");
    }

    #[test]
    fn test_flags() {
        let mut img = ElementData::new(TagName::img());
        assert!(img.is_void());
        assert!(img.is_replaced());
        assert!(!img.is_hidden());

        img.set_attribute("hidden", "");
        assert!(img.is_hidden());
        img.remove_attribute("hidden");
        assert!(!img.is_hidden());

        assert!(ElementData::new(TagName::video()).is_video());
    }
}
