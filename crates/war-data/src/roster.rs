use anyhow::{Context, Result};
use std::path::Path;

/// Known teammate names, one per line in the roster file.
/// File order doubles as the default strength ranking.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    names: Vec<String>,
}

impl Roster {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read roster file {}", path.display()))?;
        let names: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        tracing::info!("Loaded {} roster names from {}", names.len(), path.display());
        Ok(Self { names })
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Exact lookup, case-insensitive.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}
