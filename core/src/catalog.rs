//! Read-only inspection of the STAC catalog the hazard options image writes
//! into its output directory.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CATALOG_FILE: &str = "catalog.json";

const OPTION_GROUPS: [&str; 4] = [
    "climateModelOptions",
    "scenarioOptions",
    "indicatorOptions",
    "hazardTypes",
];

#[derive(Debug, Deserialize)]
struct StacCatalog {
    stac_version: String,
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    links: Vec<StacLink>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StacLink {
    rel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub id: String,
    pub stac_version: String,
    pub description: Option<String>,
    pub option_counts: BTreeMap<String, usize>,
    pub hazard_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} is a STAC {kind}, not a Catalog", path.display())]
    NotACatalog { path: PathBuf, kind: String },
    #[error("{} is a symlink; only regular files are read", .0.display())]
    Symlink(PathBuf),
}

/// Summarizes `dir/catalog.json`. Returns `Ok(None)` when the directory has no catalog.
pub fn inspect_catalog(dir: &Path) -> Result<Option<CatalogSummary>, CatalogError> {
    let path = dir.join(CATALOG_FILE);
    let Ok(metadata) = fs::symlink_metadata(&path) else {
        return Ok(None);
    };
    if metadata.file_type().is_symlink() {
        return Err(CatalogError::Symlink(path));
    }
    if !metadata.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
        path: path.clone(),
        source,
    })?;
    let catalog: StacCatalog =
        serde_json::from_str(&content).map_err(|source| CatalogError::Decode {
            path: path.clone(),
            source,
        })?;
    if catalog.kind != "Catalog" {
        return Err(CatalogError::NotACatalog {
            path,
            kind: catalog.kind,
        });
    }

    let mut warnings = Vec::new();
    for rel in ["self", "root"] {
        if !catalog.links.iter().any(|link| link.rel == rel) {
            warnings.push(format!("catalog has no '{rel}' link"));
        }
    }

    let mut option_counts = BTreeMap::new();
    let mut hazard_types = Vec::new();
    match &catalog.data {
        Some(Value::Object(data)) => {
            for group in OPTION_GROUPS {
                match data.get(group) {
                    Some(Value::Array(items)) => {
                        option_counts.insert(group.to_string(), items.len());
                    }
                    Some(_) => warnings.push(format!("'{group}' is not a list")),
                    None => warnings.push(format!("catalog data has no '{group}'")),
                }
            }
            if let Some(Value::Array(items)) = data.get("hazardTypes") {
                hazard_types = items
                    .iter()
                    .filter_map(|item| item.get("value").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect();
            }
        }
        Some(_) => warnings.push("catalog 'data' is not an object".to_string()),
        None => warnings.push("catalog carries no hazard option data".to_string()),
    }

    Ok(Some(CatalogSummary {
        id: catalog.id,
        stac_version: catalog.stac_version,
        description: catalog.description,
        option_counts,
        hazard_types,
        warnings,
    }))
}

impl fmt::Display for CatalogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Catalog: {} (STAC {})", self.id, self.stac_version)?;
        if let Some(description) = &self.description {
            writeln!(f, "  {description}")?;
        }
        for (group, count) in &self.option_counts {
            writeln!(f, "  - {group}: {count}")?;
        }
        if !self.hazard_types.is_empty() {
            writeln!(f, "  hazard types: {}", self.hazard_types.join(", "))?;
        }
        for warning in &self.warnings {
            writeln!(f, "  [warn] {warning}")?;
        }
        Ok(())
    }
}
