//! Label lookup and sign kinds.
//!
//! Label ids follow the road-sign catalogue convention `<code>.<number><suffix>`
//! (for example `P.102`, `W.207a`, `DP.135`). The prefix code selects a closed
//! `SignKind`, which renderers map to a colour.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

// -------------------- Sign kinds --------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignKind {
    Prohibitory,
    Warning,
    Mandatory,
    Indication,
    Auxiliary,
    EndOfRestriction,
    Other,
}

/// Prefix code to kind, with the RGB colour used when drawing that kind.
const KIND_TABLE: &[(&str, SignKind, [u8; 3])] = &[
    ("P", SignKind::Prohibitory, [220, 40, 40]),
    ("W", SignKind::Warning, [240, 190, 20]),
    ("R", SignKind::Mandatory, [40, 90, 220]),
    ("I", SignKind::Indication, [40, 170, 90]),
    ("S", SignKind::Auxiliary, [200, 200, 200]),
    ("DP", SignKind::EndOfRestriction, [120, 120, 120]),
];

const OTHER_COLOR: [u8; 3] = [255, 255, 255];

fn label_re() -> &'static regex::Regex {
    static LABEL_RE: OnceLock<regex::Regex> = OnceLock::new();
    LABEL_RE.get_or_init(|| {
        regex::Regex::new(r"^(?P<code>[A-Z]{1,2})[.\-_]?\d").expect("label pattern compiles")
    })
}

impl SignKind {
    pub fn from_label(label: &str) -> Self {
        label_re()
            .captures(label)
            .and_then(|caps| caps.name("code"))
            .and_then(|code| {
                KIND_TABLE
                    .iter()
                    .find(|(prefix, _, _)| *prefix == code.as_str())
            })
            .map(|(_, kind, _)| *kind)
            .unwrap_or(SignKind::Other)
    }

    pub fn code(&self) -> &'static str {
        KIND_TABLE
            .iter()
            .find(|(_, kind, _)| kind == self)
            .map(|(prefix, _, _)| *prefix)
            .unwrap_or("")
    }

    pub fn color(&self) -> [u8; 3] {
        KIND_TABLE
            .iter()
            .find(|(_, kind, _)| kind == self)
            .map(|(_, _, rgb)| *rgb)
            .unwrap_or(OTHER_COLOR)
    }
}

/// Reject label ids that could not have come from a detector's class table.
pub fn validate_label_id(label: &str) -> Result<()> {
    if label.is_empty() || label.len() > 64 {
        return Err(anyhow!("label id must be 1..=64 characters"));
    }
    if label.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(anyhow!("label id '{}' contains whitespace or control characters", label));
    }
    Ok(())
}

// -------------------- Catalog --------------------

#[derive(Debug, Deserialize, Default)]
struct CatalogFile {
    #[serde(default)]
    labels: HashMap<String, String>,
}

/// Static label id to caption table.
#[derive(Clone, Debug, Default)]
pub struct LabelCatalog {
    names: HashMap<String, String>,
}

impl LabelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TOML catalog with a `[labels]` table.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label catalog {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid label catalog {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(raw)?;
        let mut catalog = Self::new();
        for (label, caption) in file.labels {
            catalog.insert(&label, &caption)?;
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, label: &str, caption: &str) -> Result<()> {
        validate_label_id(label)?;
        self.names.insert(label.to_string(), caption.to_string());
        Ok(())
    }

    /// Caption for `label`, falling back to the raw id.
    pub fn caption(&self, label: &str) -> String {
        self.names
            .get(label)
            .cloned()
            .unwrap_or_else(|| label.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
