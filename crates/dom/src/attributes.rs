//! DOM attribute handling.

use indexmap::IndexMap;
use std::sync::Arc;

/// Map of element attributes preserving insertion order.
#[derive(Clone, Debug, Default)]
pub struct AttributeMap {
    attrs: IndexMap<Arc<str>, String>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self {
            attrs: IndexMap::new(),
        }
    }

    /// Set an attribute value, returning the previous value.
    pub fn set(&mut self, name: &str, value: &str) -> Option<String> {
        self.attrs.insert(Arc::from(name), value.to_string())
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(|s| s.as_str())
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.attrs.shift_remove(name)
    }

    /// Check if attribute exists.
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Iterate over attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }
}

/// View over the `data-*` attributes of an element.
pub struct DataAttributes<'a> {
    attrs: &'a AttributeMap,
}

impl<'a> DataAttributes<'a> {
    pub fn new(attrs: &'a AttributeMap) -> Self {
        Self { attrs }
    }

    /// Get a data attribute value by its suffix (`layer-states` for
    /// `data-layer-states`).
    pub fn get(&self, name: &str) -> Option<&'a str> {
        let key = format!("data-{}", name.to_ascii_lowercase());
        self.attrs.get(&key)
    }

    /// Parse a data attribute, returning `None` when absent or malformed.
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|value| value.trim().parse().ok())
    }

    /// Iterate over data attributes with the `data-` prefix stripped.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.attrs
            .iter()
            .filter_map(|(k, v)| k.strip_prefix("data-").map(|name| (name, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_map() {
        let mut map = AttributeMap::new();
        assert_eq!(map.set("id", "test"), None);
        assert_eq!(map.set("id", "other"), Some("test".to_string()));
        map.set("class", "foo bar");

        assert_eq!(map.get("id"), Some("other"));
        assert!(map.contains("class"));
        assert!(!map.contains("style"));
        assert_eq!(map.remove("id"), Some("other".to_string()));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_data_attributes() {
        let mut map = AttributeMap::new();
        map.set("data-layer", "7");
        map.set("data-layer-pixel-ratio", " 2.5 ");
        map.set("data-layer-hover-depth", "deep");
        map.set("class", "panel");

        let data = DataAttributes::new(&map);
        assert_eq!(data.parse::<u64>("layer"), Some(7));
        assert_eq!(data.parse::<f32>("layer-pixel-ratio"), Some(2.5));
        assert_eq!(data.parse::<u32>("layer-hover-depth"), None);
        assert_eq!(data.iter().count(), 3);
    }
}
