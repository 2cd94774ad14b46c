//! Adapter configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::SchemaGeneration;
use crate::types::{RdfError, Result};

/// Default planner estimate used as the base for cost division.
///
/// Matches the estimate SQLite assigns to a virtual table scan before `xBestIndex` runs.
pub const DEFAULT_BASE_COST: f64 = 5e98;

/// Options controlling how the triples adapter is registered and which host tables it reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    /// Name the virtual-table module is registered under.
    pub module_name: String,
    /// Name of the virtual table created in the `temp` schema.
    pub table_name: String,
    /// Physical layout of the graph tables.
    pub generation: SchemaGeneration,
    /// Table mapping resource ids to URIs; columns `ID`, `Uri`.
    pub resource_table: String,
    /// Graph registry table; columns `ID`, `Name`.
    pub graph_table: String,
    /// Ontology table holding class descriptors.
    pub class_table: String,
    /// Ontology table holding property descriptors.
    pub property_table: String,
    /// Estimated cost of an unconstrained scan.
    pub base_cost: f64,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            module_name: "rdf_triples".to_owned(),
            table_name: "triples".to_owned(),
            generation: SchemaGeneration::PerProperty,
            resource_table: "Resource".to_owned(),
            graph_table: "Graph".to_owned(),
            class_table: "rdf_class".to_owned(),
            property_table: "rdf_property".to_owned(),
            base_cost: DEFAULT_BASE_COST,
        }
    }
}

impl AdapterOptions {
    /// Parses options from TOML; missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let opts: AdapterOptions =
            toml::from_str(contents).map_err(|err| RdfError::Config(err.to_string()))?;
        opts.validate()?;
        Ok(opts)
    }

    /// Reads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            RdfError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Serializes the options back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| RdfError::Config(err.to_string()))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.module_name.is_empty() || self.table_name.is_empty() {
            return Err(RdfError::Config(
                "module_name and table_name must not be empty".into(),
            ));
        }
        // The module name is spliced unquoted into `CREATE VIRTUAL TABLE ... USING`.
        let plain = self
            .module_name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !plain || self.module_name.starts_with(|ch: char| ch.is_ascii_digit()) {
            return Err(RdfError::Config(format!(
                "module_name {:?} must be a plain identifier",
                self.module_name
            )));
        }
        if !(self.base_cost.is_finite() && self.base_cost > 0.0) {
            return Err(RdfError::Config("base_cost must be positive".into()));
        }
        Ok(())
    }
}

/// Location of the per-user configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("rdftab").join("config.toml"))
}
