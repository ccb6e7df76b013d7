//! Catalog and user data types persisted by the offline engine

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A product as cached for offline browsing
///
/// Only the fields the engine reads are typed; everything else the
/// catalog sends is carried through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Product {
    /// Case-insensitive match of an already lowercased needle against
    /// name, description and category
    pub fn matches(&self, needle: &str) -> bool {
        let hit = |s: &str| s.to_lowercase().contains(needle);
        hit(&self.name)
            || self.description.as_deref().is_some_and(hit)
            || self.category.as_deref().is_some_and(hit)
    }
}

/// A product category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub product_count: u32,
}

/// User preferences stored on the device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_commands_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_mode_preferred: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub favorites: BTreeSet<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
