use std::collections::BTreeMap;

use serde_json::Value;

/// Filter applied by [`ObjectStore::list`](crate::ObjectStore::list).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    /// Restrict to a namespace; `None` lists across namespaces.
    pub namespace: Option<String>,
    /// Every label must be present with the given value.
    pub labels: BTreeMap<String, String>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Checks a stored object against this filter.
    pub fn matches(&self, object: &Value) -> bool {
        let metadata = &object["metadata"];
        if let Some(ns) = &self.namespace
            && metadata["namespace"].as_str() != Some(ns.as_str())
        {
            return false;
        }
        self.labels
            .iter()
            .all(|(k, v)| metadata["labels"][k].as_str() == Some(v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_params_matching() {
        let realm = json!({
            "metadata": {
                "name": "team",
                "namespace": "ns",
                "labels": {"targetRealm": "team"}
            }
        });

        assert!(ListParams::new().matches(&realm));
        assert!(ListParams::new().in_namespace("ns").matches(&realm));
        assert!(!ListParams::new().in_namespace("other").matches(&realm));
        assert!(
            ListParams::new()
                .with_label("targetRealm", "team")
                .matches(&realm)
        );
        assert!(
            !ListParams::new()
                .with_label("targetRealm", "main")
                .matches(&realm)
        );
    }
}
