use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Hard per-request image limit of the training service.
pub const MAX_BATCH_SIZE: usize = 64;

/// Variables honoured for compatibility with existing `.env` files.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("AZURE_CV_ENDPOINT", "service.endpoint"),
    ("AZURE_CV_TRAINING_KEY", "service.training_key"),
    ("AZURE_CV_PROJECT_NAME", "service.project_name"),
    ("AZURE_CV_PROJECT_ID", "service.project_id"),
    ("AZURE_CV_PREDICTION_RESOURCE_ID", "service.prediction_resource_id"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub dataset: DatasetConfig,
    pub upload: UploadConfig,
    pub training: TrainingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub training_key: Option<String>,
    pub project_name: String,
    pub project_id: Option<String>,
    pub prediction_resource_id: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            training_key: None,
            project_name: "PublicArtStyleClassifier".to_string(),
            project_id: None,
            prediction_resource_id: None,
        }
    }
}

impl ServiceConfig {
    /// Endpoint and training key, or the list of what is missing.
    pub fn require_credentials(&self) -> Result<(&str, &str), PipelineError> {
        let endpoint = self.endpoint.as_deref().filter(|s| !s.is_empty());
        let key = self.training_key.as_deref().filter(|s| !s.is_empty());
        match (endpoint, key) {
            (Some(e), Some(k)) => Ok((e, k)),
            (e, k) => {
                let mut missing = Vec::new();
                if e.is_none() {
                    missing.push("AZURE_CV_ENDPOINT");
                }
                if k.is_none() {
                    missing.push("AZURE_CV_TRAINING_KEY");
                }
                Err(PipelineError::MissingCredentials(missing.join(" and ")))
            }
        }
    }

    pub fn prediction_resource(&self) -> Option<&str> {
        self.prediction_resource_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub root: String,
    pub extensions: Vec<String>,
    pub summary_path: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: "data/raw".to_string(),
            extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            summary_path: "data/dataset_summary.json".to_string(),
        }
    }
}

impl DatasetConfig {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(&self.root)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub batch_size: usize,
    pub retry_delay_secs: u64,
    pub skip_corrupt: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            retry_delay_secs: 2,
            skip_corrupt: true,
        }
    }
}

impl UploadConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub poll_interval_secs: u64,
    pub min_tags: usize,
    pub min_images_per_tag: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            min_tags: 2,
            min_images_per_tag: 5,
        }
    }
}

impl TrainingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "outputs".to_string(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.upload.batch_size == 0 || self.upload.batch_size > MAX_BATCH_SIZE {
            return Err(PipelineError::InvalidBatchSize(self.upload.batch_size));
        }
        Ok(())
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("TRAINER")
            .separator("__")
            .try_parsing(true),
    );
    for (var, key) in ENV_OVERRIDES {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                settings = settings.set_override(*key, value)?;
            }
        }
    }
    let cfg: AppConfig = settings.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_service_limits() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.upload.batch_size, 50);
        assert_eq!(cfg.upload.retry_delay(), Duration::from_secs(2));
        assert_eq!(cfg.training.poll_interval(), Duration::from_secs(10));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn batch_size_above_service_maximum_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.upload.batch_size = 65;
        assert!(matches!(
            cfg.validate(),
            Err(PipelineError::InvalidBatchSize(65))
        ));
        cfg.upload.batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trainer.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[upload]\nbatch_size = 20\n\n[dataset]\nroot = \"images\"").unwrap();

        let cfg = load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.upload.batch_size, 20);
        assert_eq!(cfg.upload.retry_delay_secs, 2);
        assert_eq!(cfg.dataset.root, "images");
        assert_eq!(cfg.dataset.extensions, vec!["jpg", "jpeg", "png"]);
    }

    #[test]
    fn missing_credentials_are_named() {
        let svc = ServiceConfig {
            endpoint: Some("https://example".into()),
            ..ServiceConfig::default()
        };
        let err = svc.require_credentials().unwrap_err();
        assert_eq!(
            err.to_string(),
            "service credentials not configured: set AZURE_CV_TRAINING_KEY"
        );
    }

    #[test]
    fn blank_prediction_resource_counts_as_unset() {
        let svc = ServiceConfig {
            prediction_resource_id: Some("  ".into()),
            ..ServiceConfig::default()
        };
        assert_eq!(svc.prediction_resource(), None);
    }
}
