//! Dynamically typed property values.
//!
//! BlueZ exposes object properties as string-keyed variant maps. [`Value`] is
//! the engine-side rendering of one such variant, and [`PropertyBag`] the map
//! for one object/interface pair. The typed accessors never fail: a missing
//! property or a shape mismatch produces the zero value for the requested
//! type, which is how discovery degrades to "nothing found" instead of
//! propagating decode errors.

use std::collections::HashMap;

/// A single dynamically typed value received from the bus.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No payload. Also stands in for reply bodies the engine has no use for.
    #[default]
    Unit,
    /// A boolean.
    Bool(bool),
    /// A single byte.
    Byte(u8),
    /// A string or object path.
    Str(String),
    /// An array of bytes.
    Bytes(Vec<u8>),
    /// An array of strings.
    Strings(Vec<String>),
    /// A string-keyed map of nested values.
    Dict(HashMap<String, Value>),
    /// A nested variant.
    Variant(Box<Value>),
}

impl Value {
    /// Borrows the value inside any number of variant wrappers.
    pub fn peeled(&self) -> &Value {
        let mut value = self;
        while let Value::Variant(inner) = value {
            value = inner;
        }
        value
    }

    /// Unwraps any number of variant wrappers, consuming the value.
    pub fn unwrap_variant(self) -> Value {
        let mut value = self;
        while let Value::Variant(inner) = value {
            value = *inner;
        }
        value
    }

    /// The contained string, or `""` for any other shape.
    pub fn as_str(&self) -> &str {
        match self.peeled() {
            Value::Str(s) => s,
            _ => "",
        }
    }

    /// The contained boolean, or `false` for any other shape.
    pub fn as_bool(&self) -> bool {
        match self.peeled() {
            Value::Bool(b) => *b,
            _ => false,
        }
    }

    /// The contained byte, or `0` for any other shape.
    pub fn as_byte(&self) -> u8 {
        match self.peeled() {
            Value::Byte(b) => *b,
            _ => 0,
        }
    }

    /// The contained byte array, or an empty slice for any other shape.
    pub fn as_bytes(&self) -> &[u8] {
        match self.peeled() {
            Value::Bytes(b) => b,
            _ => &[],
        }
    }

    /// The contained string array, or an empty slice for any other shape.
    pub fn as_strings(&self) -> &[String] {
        match self.peeled() {
            Value::Strings(s) => s,
            _ => &[],
        }
    }

    /// The contained byte array by value, or an empty vector.
    pub fn into_bytes(self) -> Vec<u8> {
        match self.unwrap_variant() {
            Value::Bytes(b) => b,
            _ => Vec::new(),
        }
    }
}

/// A named set of typed attributes for one object/interface pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyBag(HashMap<String, Value>);

impl PropertyBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        PropertyBag(HashMap::new())
    }

    /// Inserts or replaces a property.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Looks up a property by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The named string property, or `""` if absent or mis-shaped.
    pub fn get_str(&self, name: &str) -> String {
        self.get(name).map(|v| v.as_str().to_owned()).unwrap_or_default()
    }

    /// The named boolean property, or `false` if absent or mis-shaped.
    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).map(Value::as_bool).unwrap_or_default()
    }

    /// The named byte-array property, or empty if absent or mis-shaped.
    pub fn get_bytes(&self, name: &str) -> Vec<u8> {
        self.get(name).map(|v| v.as_bytes().to_vec()).unwrap_or_default()
    }

    /// The named string-array property, or empty if absent or mis-shaped.
    pub fn get_strings(&self, name: &str) -> Vec<String> {
        self.get(name).map(|v| v.as_strings().to_vec()).unwrap_or_default()
    }

    /// Number of properties in the bag.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the bag holds no properties.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, Value>> for PropertyBag {
    fn from(map: HashMap<String, Value>) -> Self {
        PropertyBag(map)
    }
}

impl FromIterator<(String, Value)> for PropertyBag {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        PropertyBag(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_fail_soft() {
        let v = Value::Str("hci0".into());
        assert_eq!(v.as_str(), "hci0");
        assert!(!v.as_bool());
        assert_eq!(v.as_byte(), 0);
        assert!(v.as_bytes().is_empty());
        assert!(v.as_strings().is_empty());
        assert!(Value::Unit.as_str().is_empty());
    }

    #[test]
    fn accessors_see_through_variants() {
        let v = Value::Variant(Box::new(Value::Variant(Box::new(Value::Bool(true)))));
        assert!(v.as_bool());

        let v = Value::Variant(Box::new(Value::Bytes(vec![1, 2, 3])));
        assert_eq!(v.into_bytes(), vec![1, 2, 3]);
    }

    #[test]
    fn bag_lookups_default_on_absence() {
        let mut bag = PropertyBag::new();
        bag.insert("Name", Value::Str("thermometer".into()));
        bag.insert("Connected", Value::Bool(true));
        assert_eq!(bag.get_str("Name"), "thermometer");
        assert!(bag.get_bool("Connected"));
        assert_eq!(bag.get_str("Address"), "");
        assert!(!bag.get_bool("Paired"));
        assert!(bag.get_strings("UUIDs").is_empty());
    }
}
