//! Stored k6 scripts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ScriptId;

pub const DEFAULT_SCRIPT_TYPE: &str = "k6";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub id: ScriptId,
    pub name: String,
    pub description: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub script_type: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Script {
    /// The part of a script an agent needs to run it
    pub fn projection(&self) -> ScriptProjection {
        ScriptProjection {
            id: self.id,
            name: self.name.clone(),
            content: self.content.clone(),
            script_type: self.script_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScript {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub content: String,
    #[serde(default, rename = "type")]
    pub script_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptProjection {
    pub id: ScriptId,
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub script_type: String,
}
