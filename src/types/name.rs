// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::ResourceExt;
use std::fmt;

/// Identifies a resource within one cluster or the host store.
/// Cluster-scoped resources carry an empty namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub namespace: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }

    pub fn of<K: ResourceExt>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }

    /// Namespace as an option, `None` for cluster-scoped resources
    pub fn namespace(&self) -> Option<&str> {
        if self.namespace.is_empty() {
            None
        } else {
            Some(&self.namespace)
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace() {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::{DynamicObject, ObjectMeta};

    #[test]
    fn test_display_namespaced() {
        assert_eq!(QualifiedName::new("apps", "web").to_string(), "apps/web");
    }

    #[test]
    fn test_display_cluster_scoped() {
        let name = QualifiedName::cluster_scoped("team-a");
        assert_eq!(name.to_string(), "team-a");
        assert_eq!(name.namespace(), None);
    }

    #[test]
    fn test_of_object() {
        let obj = DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            data: serde_json::json!({}),
        };
        assert_eq!(QualifiedName::of(&obj), QualifiedName::new("apps", "web"));
    }
}
