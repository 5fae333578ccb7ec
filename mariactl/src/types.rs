//! Common identifiers shared by the models, stores and controllers.
//!
//! - [`ObjectKey`]: namespaced name of a declared object or managed sub-resource
//! - [`ClusterReference`]: pointer from a database, user or backup to its cluster
//! - [`SecretKeySelector`]: one key inside a named secret

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespaced name, rendered as `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl ClusterReference {
    /// Key of the referenced cluster. An empty namespace means "same as the referencing object".
    pub fn resolve(&self, owner_namespace: &str) -> ObjectKey {
        let namespace = if self.namespace.is_empty() {
            owner_namespace
        } else {
            &self.namespace
        };
        ObjectKey::new(namespace, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_reference_inherits_namespace() {
        let reference = ClusterReference {
            name: "main".to_string(),
            namespace: String::new(),
        };
        assert_eq!(reference.resolve("apps"), ObjectKey::new("apps", "main"));

        let reference = ClusterReference {
            name: "main".to_string(),
            namespace: "db".to_string(),
        };
        assert_eq!(reference.resolve("apps"), ObjectKey::new("db", "main"));
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("db", "main").to_string(), "db/main");
    }
}
