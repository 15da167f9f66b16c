//! Decoding of managed-object replies.
//!
//! A single `GetManagedObjects` round trip describes every object the remote
//! service exports: a map from object path to the interfaces the object
//! implements, each with its property bag. [`ObjectTree`] is the decoded,
//! in-memory form of one such reply. Trees are transient; discovery rebuilds
//! one per query and never mutates it in place.

use std::collections::HashMap;

use crate::value::{PropertyBag, Value};

/// One consistent snapshot of the remote service's object hierarchy.
#[derive(Debug, Clone, Default)]
pub struct ObjectTree {
    objects: HashMap<String, HashMap<String, PropertyBag>>,
}

impl ObjectTree {
    /// Decodes a managed-objects reply.
    ///
    /// Decoding is total: a reply whose outer container is not the expected
    /// path map yields an empty tree, and malformed entries inside an
    /// otherwise well-shaped reply are skipped. Property bags are retained
    /// opaquely; values are only interpreted by the typed [`Value`]
    /// accessors downstream.
    pub fn decode(reply: Value) -> Self {
        let mut objects = HashMap::new();
        let Value::Dict(entries) = reply.unwrap_variant() else {
            return ObjectTree::default();
        };
        for (path, interfaces) in entries {
            let Value::Dict(interface_map) = interfaces.unwrap_variant() else {
                continue;
            };
            let mut decoded = HashMap::new();
            for (interface, bag) in interface_map {
                let Value::Dict(properties) = bag.unwrap_variant() else {
                    continue;
                };
                decoded.insert(interface, PropertyBag::from(properties));
            }
            objects.insert(path, decoded);
        }
        ObjectTree { objects }
    }

    /// Iterates over `(path, interface map)` entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HashMap<String, PropertyBag>)> {
        self.objects.iter().map(|(path, interfaces)| (path.as_str(), interfaces))
    }

    /// The interface map for `path`, if the object exists.
    pub fn interfaces(&self, path: &str) -> Option<&HashMap<String, PropertyBag>> {
        self.objects.get(path)
    }

    /// The property bag for one object/interface pair, if present.
    pub fn properties(&self, path: &str, interface: &str) -> Option<&PropertyBag> {
        self.objects.get(path).and_then(|interfaces| interfaces.get(interface))
    }

    /// Paths of all objects implementing `interface`.
    pub fn paths_with_interface<'a>(&'a self, interface: &'a str) -> impl Iterator<Item = &'a str> {
        self.objects
            .iter()
            .filter(move |(_, interfaces)| interfaces.contains_key(interface))
            .map(|(path, _)| path.as_str())
    }

    /// Number of objects in the tree.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the tree holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(entries: &[(&str, Value)]) -> Value {
        Value::Dict(
            entries
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    #[test]
    fn wrong_outer_shape_yields_empty_tree() {
        assert!(ObjectTree::decode(Value::Unit).is_empty());
        assert!(ObjectTree::decode(Value::Str("not a tree".into())).is_empty());
        assert!(ObjectTree::decode(Value::Bytes(vec![1, 2, 3])).is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let reply = Value::Dict(
            [
                ("/org/bluez/hci0".to_string(), Value::Str("bogus".into())),
                (
                    "/org/bluez/hci1".to_string(),
                    Value::Dict(
                        [("org.bluez.Adapter1".to_string(), bag(&[]))]
                            .into_iter()
                            .collect(),
                    ),
                ),
            ]
            .into_iter()
            .collect(),
        );
        let tree = ObjectTree::decode(reply);
        assert_eq!(tree.len(), 1);
        assert!(tree.interfaces("/org/bluez/hci1").is_some());
    }

    #[test]
    fn decodes_through_variant_wrappers() {
        let inner = Value::Dict(
            [(
                "/org/bluez/hci0".to_string(),
                Value::Variant(Box::new(Value::Dict(
                    [(
                        "org.bluez.Adapter1".to_string(),
                        bag(&[("Powered", Value::Bool(true))]),
                    )]
                    .into_iter()
                    .collect(),
                ))),
            )]
            .into_iter()
            .collect(),
        );
        let tree = ObjectTree::decode(Value::Variant(Box::new(inner)));
        let properties = tree.properties("/org/bluez/hci0", "org.bluez.Adapter1").unwrap();
        assert!(properties.get_bool("Powered"));
        assert_eq!(
            tree.paths_with_interface("org.bluez.Adapter1").collect::<Vec<_>>(),
            vec!["/org/bluez/hci0"]
        );
    }
}
