use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Multi-account alias groups: one surface name (the name OCR actually reads
/// off the screen) maps to an ordered list of player identities, strongest
/// account first. Edited between runs only, never during one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasBook {
    groups: HashMap<String, Vec<String>>,
    /// Lowercased surface name or member name -> group key.
    #[serde(skip)]
    index: HashMap<String, String>,
}

impl AliasBook {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("No alias file at {}. Alias handling disabled.", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read alias file {}", path.display()))?;
        let groups: HashMap<String, Vec<String>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse alias file {}", path.display()))?;
        tracing::info!("Loaded {} alias group(s) from {}", groups.len(), path.display());
        Ok(Self::from_groups(groups))
    }

    pub fn from_groups(groups: HashMap<String, Vec<String>>) -> Self {
        let mut index = HashMap::new();
        for (key, members) in &groups {
            index.insert(key.to_lowercase(), key.clone());
            for member in members {
                index.insert(member.to_lowercase(), key.clone());
            }
        }
        Self { groups, index }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group key for a surface name or member name, if it belongs to a
    /// tracked family.
    pub fn family_of(&self, name: &str) -> Option<&str> {
        self.index.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Members of a group, strongest first.
    pub fn members(&self, key: &str) -> Option<&[String]> {
        self.groups.get(key).map(Vec::as_slice)
    }
}
