use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::Id;

/// Asset (shot/asset entity) document as returned by the production database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDoc {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
}

impl AssetDoc {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// Every asset id of a project mapped to its name. Built once per publish run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetIndex {
    names_by_id: BTreeMap<Id, String>,
}

impl AssetIndex {
    pub fn contains(&self, asset_id: &str) -> bool {
        self.names_by_id.contains_key(asset_id)
    }

    pub fn name_of(&self, asset_id: &str) -> Option<&str> {
        self.names_by_id.get(asset_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names_by_id.is_empty()
    }
}

impl FromIterator<AssetDoc> for AssetIndex {
    fn from_iter<T: IntoIterator<Item = AssetDoc>>(iter: T) -> Self {
        Self {
            names_by_id: iter.into_iter().map(|doc| (doc.id, doc.name)).collect(),
        }
    }
}

/// Node identities recorded for one published version of a subset, keyed by
/// node path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishedIds {
    pub asset_id: Id,
    pub subset: String,
    pub version: i32,
    pub ids_by_path: BTreeMap<String, String>,
    #[serde(default)]
    pub representations: Vec<String>,
}
