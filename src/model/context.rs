use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::PublishError;
use crate::model::Instance;

/// Run-wide key/value data shared by every plugin of one publish run.
/// Doubles as a memo for expensive cross-instance lookups.
#[derive(Debug, Clone, Default)]
pub struct ContextData {
    values: Map<String, Value>,
}

impl ContextData {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &str) -> Result<&str, PublishError> {
        self.get_str(key).ok_or_else(|| PublishError::MissingData {
            owner: "context".to_string(),
            key: key.to_string(),
        })
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.to_string(), value.into())
    }

    /// Read a typed value previously stored with [`ContextData::store`].
    pub fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn store<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), PublishError> {
        let value = serde_json::to_value(value)
            .map_err(|e| PublishError::Fatal(format!("Failed to cache '{}': {}", key, e)))?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// All instances of one publish run plus the shared run data.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub instances: Vec<Instance>,
    pub data: ContextData,
}

impl Context {
    pub fn new(project_name: &str) -> Self {
        let mut data = ContextData::default();
        data.insert("projectName", project_name);
        Self {
            instances: Vec::new(),
            data,
        }
    }

    pub fn project_name(&self) -> Result<&str, PublishError> {
        self.data.require_str("projectName")
    }

    pub fn add_instance(&mut self, instance: Instance) {
        self.instances.push(instance);
    }

    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    pub fn instance_mut(&mut self, name: &str) -> Option<&mut Instance> {
        self.instances.iter_mut().find(|i| i.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.instances.iter()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl<'a> IntoIterator for &'a Context {
    type Item = &'a Instance;
    type IntoIter = std::slice::Iter<'a, Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetDoc, AssetIndex};

    #[test]
    fn test_typed_cache_roundtrip() {
        let mut data = ContextData::default();
        let index: AssetIndex = vec![AssetDoc::new("id_shotA", "shotA")].into_iter().collect();
        data.store("__cache_project_asset_ids_str", &index).unwrap();

        let cached: AssetIndex = data.cached("__cache_project_asset_ids_str").unwrap();
        assert_eq!(cached.name_of("id_shotA"), Some("shotA"));
        assert!(data.cached::<AssetIndex>("missing").is_none());
    }

    #[test]
    fn test_instances_keep_order() {
        let mut context = Context::new("demo");
        context.add_instance(Instance::new("b"));
        context.add_instance(Instance::new("a"));
        let names: Vec<&str> = context.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(context.project_name().unwrap(), "demo");
    }

    #[test]
    fn test_mutation_visible_through_context() {
        let mut context = Context::new("demo");
        context.add_instance(Instance::new("modelMain"));
        context
            .instance_mut("modelMain")
            .unwrap()
            .insert("files", serde_json::json!(["a.abc"]));
        assert!(context.instance("modelMain").unwrap().get("files").is_some());
    }
}
