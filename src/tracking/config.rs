//! Tracker configuration and YAML loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::system::PollingConfig;
use crate::taxa::TaxonConfig;

use super::fusion::FusionConfig;
use super::projector::ProjectorConfig;

/// All tracker tuning in one place.
///
/// Every field has a default, so a YAML file only needs the values it
/// changes:
///
/// ```yaml
/// taxon:
///   max_sample_count: 20
/// fusion:
///   ignored_classes: [person]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub taxon: TaxonConfig,
    pub projector: ProjectorConfig,
    pub fusion: FusionConfig,
    pub polling: PollingConfig,
}

impl TrackerConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse tracker configuration")
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse tracker configuration {}", path.display()))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize tracker configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = TrackerConfig::from_yaml_str(
            "taxon:\n  max_sample_count: 20\nfusion:\n  ignored_classes: [person]\n",
        )
        .unwrap();
        assert_eq!(config.taxon.max_sample_count, 20);
        assert_eq!(config.taxon.min_point_count, 4);
        assert_eq!(config.taxon.ransac.subset_size, 5);
        assert_eq!(config.fusion.ignored_classes, vec!["person".to_string()]);
        assert!(config.fusion.merge_overlapping_detections);
        assert_eq!(config.polling.min_request_interval_ms, 100);
        assert_eq!(config.projector.area_threshold, 0.12);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = TrackerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = TrackerConfig::default();
        config.fusion.rng_seed = Some(42);
        let text = config.to_yaml_string().unwrap();
        assert_eq!(TrackerConfig::from_yaml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = TrackerConfig::from_yaml_file("/nonexistent/tracker.yaml").unwrap_err();
        assert!(format!("{err}").contains("/nonexistent/tracker.yaml"));
    }

    #[test]
    fn test_malformed_yaml_is_error() {
        assert!(TrackerConfig::from_yaml_str("taxon: [1, 2").is_err());
    }
}
