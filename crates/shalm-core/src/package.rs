//! Chart package loading
//!
//! A chart package is a directory holding:
//! - `Chart.yaml` (optional): version and description
//! - `values.yaml` (optional): default values
//! - `templates/` (optional): manifest templates
//!
//! The chart name is derived from the directory name. A `:` in the
//! directory name separates the name from a qualifier (`mariadb:10.4`
//! becomes `mariadb`).

use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::values::Values;

/// Static chart metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart name
    pub name: String,

    /// Chart version (SemVer)
    pub version: Version,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Application version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

impl ChartMetadata {
    /// Metadata with version `0.0.0`, used when a package carries no Chart.yaml
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Version::new(0, 0, 0),
            description: None,
            app_version: None,
        }
    }
}

/// On-disk layout of Chart.yaml; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartYaml {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    app_version: Option<String>,
}

/// A chart package loaded from disk
#[derive(Debug, Clone)]
pub struct ChartSource {
    /// Chart metadata
    pub metadata: ChartMetadata,

    /// Default values from values.yaml
    pub values: Values,

    /// Template sources keyed by path relative to `templates/`, sorted by name
    pub templates: IndexMap<String, String>,

    /// Root directory of the package
    pub dir: PathBuf,
}

impl ChartSource {
    /// Load a chart package from a directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let dir = path.as_ref().to_path_buf();

        if !dir.is_dir() {
            return Err(CoreError::ChartNotFound {
                path: dir.display().to_string(),
            });
        }

        let name = chart_name_from_dir(&dir)?;
        let metadata = load_chart_yaml(&dir.join("Chart.yaml"), name)?;

        let values_path = dir.join("values.yaml");
        let values = if values_path.is_file() {
            Values::from_file(&values_path)?
        } else {
            Values::new()
        };

        let templates = load_templates(&dir.join("templates"))?;

        Ok(Self {
            metadata,
            values,
            templates,
            dir,
        })
    }

    /// Build a package in memory (no backing directory)
    pub fn in_memory(metadata: ChartMetadata) -> Self {
        Self {
            metadata,
            values: Values::new(),
            templates: IndexMap::new(),
            dir: PathBuf::new(),
        }
    }
}

/// Derive the chart name from the package directory
fn chart_name_from_dir(dir: &Path) -> Result<String> {
    let abs = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(dir)
    };

    let base = abs
        .components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .next_back()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .ok_or_else(|| CoreError::InvalidChart {
            message: format!("cannot derive chart name from {}", dir.display()),
        })?;

    let name = base.split(':').next().unwrap_or_default().to_string();
    if name.is_empty() {
        return Err(CoreError::InvalidChart {
            message: format!("cannot derive chart name from {}", dir.display()),
        });
    }
    Ok(name)
}

fn load_chart_yaml(path: &Path, name: String) -> Result<ChartMetadata> {
    if !path.is_file() {
        return Ok(ChartMetadata::unversioned(name));
    }

    let content = std::fs::read_to_string(path)?;
    let chart: ChartYaml = if content.trim().is_empty() {
        ChartYaml::default()
    } else {
        serde_yaml::from_str(&content)?
    };

    let version = match chart.version {
        Some(v) => Version::parse(v.trim_start_matches('v'))?,
        None => Version::new(0, 0, 0),
    };

    Ok(ChartMetadata {
        name,
        version,
        description: chart.description,
        app_version: chart.app_version,
    })
}

/// Read every file below `templates/`, keyed by its relative path
fn load_templates(templates_dir: &Path) -> Result<IndexMap<String, String>> {
    let mut templates = IndexMap::new();

    if !templates_dir.is_dir() {
        return Ok(templates);
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(templates_dir) {
        let entry = entry.map_err(|e| CoreError::InvalidChart {
            message: format!("failed to read {}: {}", templates_dir.display(), e),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();

    for file in files {
        let rel = file.strip_prefix(templates_dir).unwrap_or(&file);
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read_to_string(&file)?;
        templates.insert(name, content);
    }

    Ok(templates)
}
