//! Azure Custom Vision training API (v3.3) over HTTP.

use crate::{
    BatchReceipt, ImageBatch, ImageUploadStatus, Iteration, IterationPerformance, Project,
    ServiceError, Tag, TagPerformance, VisionTrainingService,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const API_PATH: &str = "customvision/v3.3/training";
const RATE_LIMIT_CODE: &str = "TooManyRequests";

#[derive(Clone)]
pub struct CustomVisionConfig {
    pub endpoint: String,
    pub training_key: String,
}

#[derive(Clone)]
pub struct CustomVisionClient {
    client: Client,
    cfg: Arc<CustomVisionConfig>,
}

impl CustomVisionClient {
    pub fn new(cfg: CustomVisionConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.cfg.endpoint.trim_end_matches('/'),
            API_PATH,
            path
        )
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .header("Training-key", self.cfg.training_key.as_str())
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .header("Training-key", self.cfg.training_key.as_str())
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        operation: &str,
    ) -> Result<Response, ServiceError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| ServiceError::RequestFailed(format!("{operation}: {e}")))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
        Err(map_http_error(status, &body, operation))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        operation: &str,
    ) -> Result<T, ServiceError> {
        let resp = self.send(builder, operation).await?;
        resp.json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("{operation}: {e}")))
    }
}

#[derive(Deserialize)]
struct ApiError {
    code: Option<String>,
    message: Option<String>,
}

/// Maps a non-success response onto the service error taxonomy. Throttling is
/// recognised by status 429 or by the service's structured error code.
pub(crate) fn map_http_error(status: StatusCode, body: &[u8], operation: &str) -> ServiceError {
    let parsed: Option<ApiError> = serde_json::from_slice(body).ok();
    let text = parsed
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    let code = parsed.and_then(|e| e.code);

    if status == StatusCode::TOO_MANY_REQUESTS || code.as_deref() == Some(RATE_LIMIT_CODE) {
        return ServiceError::RateLimited(format!("{operation}: {text}"));
    }
    match status.as_u16() {
        401 | 403 => ServiceError::Unauthorized(format!("{operation}: {text}")),
        404 => ServiceError::NotFound(format!("{operation}: {text}")),
        other => ServiceError::Status {
            status: other,
            body: format!("{operation}: {text}"),
        },
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectDto {
    id: String,
    name: String,
    settings: Option<ProjectSettingsDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectSettingsDto {
    domain_id: Option<String>,
}

#[derive(Deserialize)]
struct TagDto {
    id: String,
    name: String,
}

impl From<TagDto> for Tag {
    fn from(t: TagDto) -> Self {
        Tag {
            id: t.id,
            name: t.name,
        }
    }
}

#[derive(Deserialize)]
struct IterationDto {
    id: String,
    name: String,
    status: String,
    created: DateTime<Utc>,
}

impl From<IterationDto> for Iteration {
    fn from(it: IterationDto) -> Self {
        Iteration {
            id: it.id,
            name: it.name,
            status: it.status.into(),
            created: it.created,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagPerformanceDto {
    name: String,
    precision: f64,
    recall: f64,
    average_precision: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerformanceDto {
    precision: f64,
    recall: f64,
    average_precision: f64,
    #[serde(default)]
    per_tag_performance: Vec<TagPerformanceDto>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageFileEntryDto<'a> {
    name: &'a str,
    contents: String,
    tag_ids: &'a [String],
}

#[derive(Serialize)]
struct ImageFileBatchDto<'a> {
    images: Vec<ImageFileEntryDto<'a>>,
}

#[derive(Deserialize)]
struct ImageCreateResultDto {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageCreateSummaryDto {
    #[serde(default)]
    images: Vec<ImageCreateResultDto>,
}

pub(crate) fn upload_status(raw: &str) -> ImageUploadStatus {
    match raw {
        "OK" => ImageUploadStatus::Ok,
        "OKDuplicate" => ImageUploadStatus::Duplicate,
        other => ImageUploadStatus::Rejected(other.to_string()),
    }
}

#[async_trait::async_trait]
impl VisionTrainingService for CustomVisionClient {
    async fn list_projects(&self) -> Result<Vec<Project>, ServiceError> {
        let projects: Vec<ProjectDto> = self
            .send_json(self.get("projects"), "list projects")
            .await?;
        Ok(projects
            .into_iter()
            .map(|p| Project {
                id: p.id,
                name: p.name,
                domain_id: p.settings.and_then(|s| s.domain_id),
            })
            .collect())
    }

    async fn list_tags(&self, project_id: &str) -> Result<Vec<Tag>, ServiceError> {
        let tags: Vec<TagDto> = self
            .send_json(self.get(&format!("projects/{project_id}/tags")), "list tags")
            .await?;
        Ok(tags.into_iter().map(Tag::from).collect())
    }

    async fn create_tag(&self, project_id: &str, name: &str) -> Result<Tag, ServiceError> {
        let builder = self
            .post(&format!("projects/{project_id}/tags"))
            .query(&[("name", name)]);
        let tag: TagDto = self.send_json(builder, "create tag").await?;
        Ok(tag.into())
    }

    async fn count_tagged_images(
        &self,
        project_id: &str,
        tag_ids: &[String],
    ) -> Result<u64, ServiceError> {
        let mut builder = self.get(&format!("projects/{project_id}/images/tagged/count"));
        if !tag_ids.is_empty() {
            builder = builder.query(&[("tagIds", tag_ids.join(","))]);
        }
        self.send_json(builder, "count tagged images").await
    }

    async fn upload_batch(
        &self,
        project_id: &str,
        batch: &ImageBatch,
    ) -> Result<BatchReceipt, ServiceError> {
        let body = ImageFileBatchDto {
            images: batch
                .images
                .iter()
                .map(|img| ImageFileEntryDto {
                    name: &img.name,
                    contents: BASE64.encode(&img.contents),
                    tag_ids: &img.tag_ids,
                })
                .collect(),
        };
        debug!(images = batch.len(), "posting image batch");
        let builder = self
            .post(&format!("projects/{project_id}/images/files"))
            .json(&body);
        let summary: ImageCreateSummaryDto = self.send_json(builder, "upload batch").await?;
        Ok(BatchReceipt {
            statuses: summary
                .images
                .iter()
                .map(|r| upload_status(&r.status))
                .collect(),
        })
    }

    async fn start_training(&self, project_id: &str) -> Result<Iteration, ServiceError> {
        let it: IterationDto = self
            .send_json(self.post(&format!("projects/{project_id}/train")), "start training")
            .await?;
        Ok(it.into())
    }

    async fn get_iteration(
        &self,
        project_id: &str,
        iteration_id: &str,
    ) -> Result<Iteration, ServiceError> {
        let it: IterationDto = self
            .send_json(
                self.get(&format!("projects/{project_id}/iterations/{iteration_id}")),
                "get iteration",
            )
            .await?;
        Ok(it.into())
    }

    async fn get_performance(
        &self,
        project_id: &str,
        iteration_id: &str,
    ) -> Result<IterationPerformance, ServiceError> {
        let perf: PerformanceDto = self
            .send_json(
                self.get(&format!(
                    "projects/{project_id}/iterations/{iteration_id}/performance"
                )),
                "get iteration performance",
            )
            .await?;
        Ok(IterationPerformance {
            precision: perf.precision,
            recall: perf.recall,
            average_precision: perf.average_precision,
            per_tag: perf
                .per_tag_performance
                .into_iter()
                .map(|t| TagPerformance {
                    name: t.name,
                    precision: t.precision,
                    recall: t.recall,
                    average_precision: t.average_precision,
                })
                .collect(),
        })
    }

    async fn publish_iteration(
        &self,
        project_id: &str,
        iteration_id: &str,
        publish_name: &str,
        prediction_resource_id: &str,
    ) -> Result<(), ServiceError> {
        let builder = self
            .post(&format!(
                "projects/{project_id}/iterations/{iteration_id}/publish"
            ))
            .query(&[
                ("publishName", publish_name),
                ("predictionId", prediction_resource_id),
            ]);
        let published: bool = self.send_json(builder, "publish iteration").await?;
        if published {
            Ok(())
        } else {
            Err(ServiceError::InvalidResponse(
                "publish iteration: service declined to publish".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited() {
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, b"", "upload batch");
        assert!(err.is_rate_limited());
    }

    #[test]
    fn throttling_code_is_rate_limited_regardless_of_status() {
        let body = br#"{"code":"TooManyRequests","message":"slow down"}"#;
        let err = map_http_error(StatusCode::SERVICE_UNAVAILABLE, body, "upload batch");
        assert_eq!(err, ServiceError::RateLimited("upload batch: slow down".into()));
    }

    #[test]
    fn message_text_alone_does_not_signal_throttling() {
        let body = br#"{"code":"BadRequest","message":"Too Many Requests"}"#;
        let err = map_http_error(StatusCode::BAD_REQUEST, body, "upload batch");
        assert!(!err.is_rate_limited());
        assert!(matches!(err, ServiceError::Status { status: 400, .. }));
    }

    #[test]
    fn auth_failures_map_to_unauthorized() {
        let err = map_http_error(StatusCode::UNAUTHORIZED, b"denied", "list tags");
        assert_eq!(err, ServiceError::Unauthorized("list tags: denied".into()));
    }

    #[test]
    fn upload_statuses_are_classified() {
        assert_eq!(upload_status("OK"), ImageUploadStatus::Ok);
        assert_eq!(upload_status("OKDuplicate"), ImageUploadStatus::Duplicate);
        assert_eq!(
            upload_status("ErrorImageSize"),
            ImageUploadStatus::Rejected("ErrorImageSize".into())
        );
    }

    #[test]
    fn url_joins_endpoint_without_double_slash() {
        let client = CustomVisionClient::new(CustomVisionConfig {
            endpoint: "https://example.cognitiveservices.azure.com/".into(),
            training_key: "k".into(),
        });
        assert_eq!(
            client.url("projects"),
            "https://example.cognitiveservices.azure.com/customvision/v3.3/training/projects"
        );
    }
}
