use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::PublishError;
use crate::model::{Id, NodeRef};

/// Lifecycle of an instance within one publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Collected,
    Validating,
    Passed,
    Failed,
    Repairing,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InstanceState::Collected => write!(f, "collected"),
            InstanceState::Validating => write!(f, "validating"),
            InstanceState::Passed => write!(f, "passed"),
            InstanceState::Failed => write!(f, "failed"),
            InstanceState::Repairing => write!(f, "repairing"),
        }
    }
}

/// Output artifact produced for an instance by extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representation {
    pub name: String,
    pub ext: String,
    pub files: Vec<String>,
    pub staging_dir: PathBuf,
}

impl Representation {
    pub fn new(name: &str, ext: &str, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            ext: ext.to_string(),
            files: Vec::new(),
            staging_dir: staging_dir.into(),
        }
    }

    pub fn with_file(mut self, file: &str) -> Self {
        self.files.push(file.to_string());
        self
    }

    /// Full paths of the files inside the staging directory.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| self.staging_dir.join(f)).collect()
    }
}

/// One publishable unit: an ordered metadata mapping plus the member nodes
/// resolved at collection time.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub data: Map<String, Value>,
    pub members: Vec<NodeRef>,
    pub representations: Vec<Representation>,
    pub state: InstanceState,
}

impl Instance {
    pub fn new(name: &str) -> Self {
        let mut data = Map::new();
        data.insert("name".to_string(), Value::String(name.to_string()));
        Self {
            name: name.to_string(),
            data,
            members: Vec::new(),
            representations: Vec::new(),
            state: InstanceState::Collected,
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn with_members(mut self, members: Vec<NodeRef>) -> Self {
        self.members = members;
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key.to_string(), value.into())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &str) -> Result<&str, PublishError> {
        self.get_str(key).ok_or_else(|| PublishError::MissingData {
            owner: self.name.clone(),
            key: key.to_string(),
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeRef> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn family(&self) -> Option<&str> {
        self.get_str("family")
    }

    /// Primary family followed by any additional `families`.
    pub fn families(&self) -> Vec<String> {
        let mut families: Vec<String> = self.family().map(str::to_string).into_iter().collect();
        if let Some(Value::Array(extra)) = self.data.get("families") {
            for family in extra.iter().filter_map(Value::as_str) {
                if !families.iter().any(|f| f == family) {
                    families.push(family.to_string());
                }
            }
        }
        families
    }

    pub fn asset(&self) -> Option<&str> {
        self.get_str("asset")
    }

    pub fn subset(&self) -> Option<&str> {
        self.get_str("subset")
    }

    /// Database id of the asset this instance publishes against, set by
    /// asset-entity collection.
    pub fn asset_entity_id(&self) -> Result<Id, PublishError> {
        self.data
            .get("assetEntity")
            .and_then(|entity| entity.get("_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PublishError::MissingData {
                owner: self.name.clone(),
                key: "assetEntity._id".to_string(),
            })
    }

    /// Whether an optional plugin has been switched off for this instance
    /// through `publish_attributes.<label>.active`.
    pub fn is_plugin_active(&self, label: &str) -> bool {
        self.data
            .get("publish_attributes")
            .and_then(|attrs| attrs.get(label))
            .and_then(|attrs| attrs.get("active"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn is_active(&self) -> bool {
        self.data.get("active").and_then(Value::as_bool).unwrap_or(true)
    }

    pub fn add_representation(&mut self, representation: Representation) {
        self.representations.push(representation);
    }

    pub fn begin_validation(&mut self) {
        self.state = InstanceState::Validating;
    }

    pub fn finish_validation(&mut self, passed: bool) {
        self.state = if passed {
            InstanceState::Passed
        } else {
            InstanceState::Failed
        };
    }

    /// Only failed instances can be repaired.
    pub fn begin_repair(&mut self) -> Result<(), PublishError> {
        if self.state != InstanceState::Failed {
            return Err(PublishError::Fatal(format!(
                "Instance '{}' cannot be repaired while {}",
                self.name, self.state
            )));
        }
        self.state = InstanceState::Repairing;
        Ok(())
    }

    /// After a repair the instance waits for an explicit re-validation.
    pub fn finish_repair(&mut self) {
        self.state = InstanceState::Validating;
    }

    /// A repair that errored leaves the instance failed, repairable again.
    pub fn abandon_repair(&mut self) {
        self.state = InstanceState::Failed;
    }
}

impl<'a> IntoIterator for &'a Instance {
    type Item = &'a NodeRef;
    type IntoIter = std::slice::Iter<'a, NodeRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}
