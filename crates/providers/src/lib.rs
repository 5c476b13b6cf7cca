//! Vision training service abstraction, HTTP client and in-memory stand-in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod customvision;
pub mod memory;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Throttling is the only failure that waiting can fix.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ServiceError::RateLimited(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub domain_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub name: String,
    pub contents: Vec<u8>,
    pub tag_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageBatch {
    pub images: Vec<ImageEntry>,
}

impl ImageBatch {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageUploadStatus {
    Ok,
    Duplicate,
    Rejected(String),
}

#[derive(Debug, Clone, Default)]
pub struct BatchReceipt {
    pub statuses: Vec<ImageUploadStatus>,
}

impl BatchReceipt {
    pub fn accepted(&self) -> usize {
        self.count(|s| matches!(s, ImageUploadStatus::Ok))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|s| matches!(s, ImageUploadStatus::Duplicate))
    }

    pub fn rejected(&self) -> usize {
        self.count(|s| matches!(s, ImageUploadStatus::Rejected(_)))
    }

    fn count(&self, pred: impl Fn(&ImageUploadStatus) -> bool) -> usize {
        self.statuses.iter().filter(|s| pred(s)).count()
    }
}

/// Remote iteration status. Unknown states are kept verbatim so status
/// changes can still be observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IterationStatus {
    Submitted,
    Training,
    Completed,
    Failed,
    Other(String),
}

impl IterationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IterationStatus::Completed | IterationStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            IterationStatus::Submitted => "Submitted",
            IterationStatus::Training => "Training",
            IterationStatus::Completed => "Completed",
            IterationStatus::Failed => "Failed",
            IterationStatus::Other(s) => s,
        }
    }
}

impl From<&str> for IterationStatus {
    fn from(s: &str) -> Self {
        match s {
            "Submitted" | "Queued" => IterationStatus::Submitted,
            "Training" | "Running" | "InProgress" => IterationStatus::Training,
            "Completed" => IterationStatus::Completed,
            "Failed" => IterationStatus::Failed,
            other => IterationStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for IterationStatus {
    fn from(s: String) -> Self {
        IterationStatus::from(s.as_str())
    }
}

impl From<IterationStatus> for String {
    fn from(status: IterationStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub id: String,
    pub name: String,
    pub status: IterationStatus,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPerformance {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub average_precision: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationPerformance {
    pub precision: f64,
    pub recall: f64,
    pub average_precision: f64,
    pub per_tag: Vec<TagPerformance>,
}

/// Operations the pipeline needs from a remote vision training service.
#[async_trait::async_trait]
pub trait VisionTrainingService: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>, ServiceError>;

    async fn list_tags(&self, project_id: &str) -> Result<Vec<Tag>, ServiceError>;

    async fn create_tag(&self, project_id: &str, name: &str) -> Result<Tag, ServiceError>;

    /// Number of tagged images, restricted to `tag_ids` when non-empty.
    async fn count_tagged_images(
        &self,
        project_id: &str,
        tag_ids: &[String],
    ) -> Result<u64, ServiceError>;

    async fn upload_batch(
        &self,
        project_id: &str,
        batch: &ImageBatch,
    ) -> Result<BatchReceipt, ServiceError>;

    async fn start_training(&self, project_id: &str) -> Result<Iteration, ServiceError>;

    async fn get_iteration(
        &self,
        project_id: &str,
        iteration_id: &str,
    ) -> Result<Iteration, ServiceError>;

    async fn get_performance(
        &self,
        project_id: &str,
        iteration_id: &str,
    ) -> Result<IterationPerformance, ServiceError>;

    async fn publish_iteration(
        &self,
        project_id: &str,
        iteration_id: &str,
        publish_name: &str,
        prediction_resource_id: &str,
    ) -> Result<(), ServiceError>;
}
