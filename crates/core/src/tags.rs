//! Feature attributes and the per-layer key/value tables.
//!
//! MVT stores attribute keys and values once per layer; a feature only holds
//! pairs of indexes into those tables. [`LayerProps`] does the interning and a
//! [`TagConverter`] decides which attributes a feature gets from the user data
//! attached to its source geometry.

use std::collections::HashMap;

use crate::vector_tile::tile::{Feature, Value};

/// A property value that can be encoded in MVT.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    /// Zigzag-encoded on the wire
    SInt(i64),
    Bool(bool),
}

impl PropertyValue {
    /// Convert to MVT Value type.
    pub fn to_mvt_value(&self) -> Value {
        match self {
            PropertyValue::String(s) => Value {
                string_value: Some(s.clone()),
                ..Default::default()
            },
            PropertyValue::Float(f) => Value {
                float_value: Some(*f),
                ..Default::default()
            },
            PropertyValue::Double(d) => Value {
                double_value: Some(*d),
                ..Default::default()
            },
            PropertyValue::Int(i) => Value {
                int_value: Some(*i),
                ..Default::default()
            },
            PropertyValue::UInt(u) => Value {
                uint_value: Some(*u),
                ..Default::default()
            },
            PropertyValue::SInt(i) => Value {
                sint_value: Some(*i),
                ..Default::default()
            },
            PropertyValue::Bool(b) => Value {
                bool_value: Some(*b),
                ..Default::default()
            },
        }
    }

    /// Read back the first populated field of an MVT value.
    pub fn from_mvt_value(value: &Value) -> Option<Self> {
        if let Some(s) = &value.string_value {
            Some(PropertyValue::String(s.clone()))
        } else if let Some(f) = value.float_value {
            Some(PropertyValue::Float(f))
        } else if let Some(d) = value.double_value {
            Some(PropertyValue::Double(d))
        } else if let Some(i) = value.int_value {
            Some(PropertyValue::Int(i))
        } else if let Some(u) = value.uint_value {
            Some(PropertyValue::UInt(u))
        } else if let Some(i) = value.sint_value {
            Some(PropertyValue::SInt(i))
        } else {
            value.bool_value.map(PropertyValue::Bool)
        }
    }

    fn key(&self) -> ValueKey {
        match self {
            PropertyValue::String(s) => ValueKey::String(s.clone()),
            PropertyValue::Float(f) => ValueKey::Float(f.to_bits()),
            PropertyValue::Double(d) => ValueKey::Double(d.to_bits()),
            PropertyValue::Int(i) => ValueKey::Int(*i),
            PropertyValue::UInt(u) => ValueKey::UInt(*u),
            PropertyValue::SInt(i) => ValueKey::SInt(*i),
            PropertyValue::Bool(b) => ValueKey::Bool(*b),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::UInt(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

/// Hashable identity of a value; floats compare by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    String(String),
    Float(u32),
    Double(u64),
    Int(i64),
    UInt(u64),
    SInt(i64),
    Bool(bool),
}

/// Key and value tables shared by every feature of a layer.
#[derive(Debug, Clone, Default)]
pub struct LayerProps {
    keys: Vec<String>,
    key_index: HashMap<String, u32>,
    values: Vec<Value>,
    value_index: HashMap<ValueKey, u32>,
}

impl LayerProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or insert a key, returning its index.
    pub fn key_index(&mut self, key: &str) -> u32 {
        if let Some(&idx) = self.key_index.get(key) {
            idx
        } else {
            let idx = self.keys.len() as u32;
            self.keys.push(key.to_string());
            self.key_index.insert(key.to_string(), idx);
            idx
        }
    }

    /// Get or insert a value, returning its index.
    pub fn value_index(&mut self, value: &PropertyValue) -> u32 {
        let value_key = value.key();

        if let Some(&idx) = self.value_index.get(&value_key) {
            idx
        } else {
            let idx = self.values.len() as u32;
            self.values.push(value.to_mvt_value());
            self.value_index.insert(value_key, idx);
            idx
        }
    }

    /// Intern `key` and `value` and append the index pair to the feature.
    pub fn add_tag(&mut self, feature: &mut Feature, key: &str, value: &PropertyValue) {
        let key_idx = self.key_index(key);
        let value_idx = self.value_index(value);
        feature.tags.push(key_idx);
        feature.tags.push(value_idx);
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.values.is_empty()
    }

    /// Consume the tables, ready to be moved into a `Layer`.
    pub fn into_parts(self) -> (Vec<String>, Vec<Value>) {
        (self.keys, self.values)
    }
}

/// Attaches attributes to an encoded feature.
///
/// Called once per emitted feature with the user data of the geometry it
/// came from.
pub trait TagConverter<D: ?Sized> {
    fn add_tags(&self, user_data: Option<&D>, layer_props: &mut LayerProps, feature: &mut Feature);
}

/// Emits features without attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreTags;

impl<D: ?Sized> TagConverter<D> for IgnoreTags {
    fn add_tags(&self, _user_data: Option<&D>, _layer_props: &mut LayerProps, _feature: &mut Feature) {
    }
}

/// Ordered attribute list, as read from a GeoJSON feature.
pub type Properties = Vec<(String, PropertyValue)>;

/// Copies every `(key, value)` pair of a [`Properties`] list onto the feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyValueTags;

impl TagConverter<Properties> for KeyValueTags {
    fn add_tags(
        &self,
        user_data: Option<&Properties>,
        layer_props: &mut LayerProps,
        feature: &mut Feature,
    ) {
        let Some(properties) = user_data else {
            return;
        };
        feature.tags.reserve(properties.len() * 2);
        for (key, value) in properties {
            layer_props.add_tag(feature, key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_deduplication() {
        let mut props = LayerProps::new();
        assert_eq!(props.key_index("name"), 0);
        assert_eq!(props.key_index("kind"), 1);
        assert_eq!(props.key_index("name"), 0);
        assert_eq!(props.keys(), ["name", "kind"]);
    }

    #[test]
    fn test_value_deduplication() {
        let mut props = LayerProps::new();
        let building = PropertyValue::from("building");

        assert_eq!(props.value_index(&building), 0);
        assert_eq!(props.value_index(&PropertyValue::Int(3)), 1);
        assert_eq!(props.value_index(&building), 0);
        assert_eq!(props.values().len(), 2);
    }

    #[test]
    fn test_same_number_different_types_not_merged() {
        let mut props = LayerProps::new();
        let a = props.value_index(&PropertyValue::Int(1));
        let b = props.value_index(&PropertyValue::UInt(1));
        let c = props.value_index(&PropertyValue::SInt(1));
        let d = props.value_index(&PropertyValue::Double(1.0));
        assert_eq!(vec![a, b, c, d], vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_sint_sets_sint_field() {
        let value = PropertyValue::SInt(-4).to_mvt_value();
        assert_eq!(value.sint_value, Some(-4));
        assert_eq!(value.int_value, None);
    }

    #[test]
    fn test_mvt_value_roundtrip() {
        let original = PropertyValue::Float(2.5);
        assert_eq!(
            PropertyValue::from_mvt_value(&original.to_mvt_value()),
            Some(original)
        );
        assert_eq!(PropertyValue::from_mvt_value(&Value::default()), None);
    }

    #[test]
    fn test_key_value_tags() {
        let properties: Properties = vec![
            ("name".to_string(), PropertyValue::from("Main St")),
            ("lanes".to_string(), PropertyValue::Int(2)),
        ];
        let mut props = LayerProps::new();
        let mut first = Feature::default();
        let mut second = Feature::default();

        KeyValueTags.add_tags(Some(&properties), &mut props, &mut first);
        KeyValueTags.add_tags(Some(&properties), &mut props, &mut second);

        assert_eq!(first.tags, vec![0, 0, 1, 1]);
        assert_eq!(second.tags, first.tags);

        let (keys, values) = props.into_parts();
        assert_eq!(keys, vec!["name".to_string(), "lanes".to_string()]);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_ignore_tags_leaves_feature_untouched() {
        let mut props = LayerProps::new();
        let mut feature = Feature::default();
        TagConverter::<str>::add_tags(&IgnoreTags, Some("anything"), &mut props, &mut feature);

        assert!(feature.tags.is_empty());
        assert!(props.is_empty());
    }
}
