use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Column names shared by the join, density and aggregation stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Columns {
    /// Unit identifier column in the vector layer (also the mastergrid pixel value).
    pub shp_id: String,
    /// Unit identifier column in the population table.
    pub csv_id: String,
    /// Population count column in the population table.
    pub pop_col: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            shp_id: "adm_id".to_string(),
            csv_id: "GID".to_string(),
            pop_col: "P_2020".to_string(),
        }
    }
}

impl Columns {
    /// Same defaults, with a different population column.
    pub fn with_pop_col(pop_col: impl Into<String>) -> Self {
        Self { pop_col: pop_col.into(), ..Self::default() }
    }
}

/// Settings for an `AggregateUnits` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub columns: Columns,
    /// Keep the per-unit admin shapefile (`<mastergrid stem>.shp`) next to the mastergrid.
    pub save_admin_shape: bool,
}

impl AggregateConfig {
    /// Read a JSON config file; missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_worldpop_tables() {
        let columns = Columns::default();
        assert_eq!(columns.shp_id, "adm_id");
        assert_eq!(columns.csv_id, "GID");
        assert_eq!(columns.pop_col, "P_2020");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AggregateConfig = serde_json::from_str(
            r#"{ "columns": { "pop_col": "P_2019" } }"#
        ).unwrap();

        assert_eq!(config.columns, Columns::with_pop_col("P_2019"));
        assert!(!config.save_admin_shape);
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aggreunit.json");
        std::fs::write(&path, r#"{ "save_admin_shape": true, "columns": { "csv_id": "ID" } }"#).unwrap();

        let config = AggregateConfig::from_json_file(&path).unwrap();
        assert!(config.save_admin_shape);
        assert_eq!(config.columns.csv_id, "ID");
        assert_eq!(config.columns.shp_id, "adm_id");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AggregateConfig::from_json_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to open config file"));
    }
}
