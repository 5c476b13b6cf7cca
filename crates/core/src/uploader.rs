//! Sequential, batched image upload with rate-limit retry.

use crate::clock::Clock;
use crate::models::{ClassPartition, Dataset, ImageFile};
use crate::retry::RetryPolicy;
use crate::tags::TagMap;
use anyhow::Context;
use providers::{ImageBatch, ImageEntry, ImageUploadStatus, VisionTrainingService};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassUpload {
    pub class: String,
    pub tag_id: String,
    pub images: usize,
    pub batches: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub classes: Vec<ClassUpload>,
    pub retries: u32,
}

impl UploadSummary {
    pub fn images(&self) -> usize {
        self.classes.iter().map(|c| c.images).sum()
    }

    pub fn batches(&self) -> usize {
        self.classes.iter().map(|c| c.batches).sum()
    }
}

/// Splits `items` into consecutive batches of at most `batch_size`.
pub fn plan_batches<T>(items: &[T], batch_size: usize) -> Vec<&[T]> {
    items.chunks(batch_size.max(1)).collect()
}

pub struct Uploader {
    service: Arc<dyn VisionTrainingService>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    batch_size: usize,
    skip_corrupt: bool,
}

impl Uploader {
    pub fn new(
        service: Arc<dyn VisionTrainingService>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        batch_size: usize,
    ) -> Self {
        Self {
            service,
            clock,
            policy,
            batch_size,
            skip_corrupt: true,
        }
    }

    pub fn skip_corrupt(mut self, skip: bool) -> Self {
        self.skip_corrupt = skip;
        self
    }

    /// Uploads every class that has a tag, in dataset order. The first
    /// non-retryable failure aborts the remaining uploads.
    pub async fn upload_dataset(
        &self,
        project_id: &str,
        dataset: &Dataset,
        tags: &TagMap,
    ) -> anyhow::Result<UploadSummary> {
        let mut summary = UploadSummary::default();
        for partition in &dataset.classes {
            let Some(tag_id) = tags.get(&partition.name) else {
                warn!("No tag for class '{}', skipping upload", partition.name);
                continue;
            };
            let (class, retries) = self.upload_class(project_id, partition, tag_id).await?;
            summary.retries += retries;
            summary.classes.push(class);
        }
        info!(
            "All images uploaded: {} images in {} batches",
            summary.images(),
            summary.batches()
        );
        Ok(summary)
    }

    pub async fn upload_class(
        &self,
        project_id: &str,
        partition: &ClassPartition,
        tag_id: &str,
    ) -> anyhow::Result<(ClassUpload, u32)> {
        let files = partition.uploadable(self.skip_corrupt);
        info!("Uploading {}: {} images", partition.name, files.len());

        let mut result = ClassUpload {
            class: partition.name.clone(),
            tag_id: tag_id.to_string(),
            ..ClassUpload::default()
        };
        let mut retries = 0;
        let batches = plan_batches(&files, self.batch_size);
        let total = batches.len();
        for (index, chunk) in batches.into_iter().enumerate() {
            let batch = build_batch(chunk, tag_id).await?;
            let service = self.service.as_ref();
            let pending = &batch;
            let receipt = self
                .policy
                .execute(self.clock.as_ref(), move || {
                    service.upload_batch(project_id, pending)
                })
                .await
                .with_context(|| {
                    format!(
                        "upload batch {} of {} for class '{}'",
                        index + 1,
                        total,
                        partition.name
                    )
                })?;
            retries += receipt.retries;

            for status in &receipt.value.statuses {
                if let ImageUploadStatus::Rejected(reason) = status {
                    warn!("Image rejected in class '{}': {}", partition.name, reason);
                }
            }
            result.images += batch.len();
            result.batches += 1;
            result.duplicates += receipt.value.duplicates();
            result.rejected += receipt.value.rejected();
            info!(
                "{}: batch {}/{} uploaded ({} images)",
                partition.name,
                index + 1,
                total,
                batch.len()
            );
        }
        Ok((result, retries))
    }
}

async fn build_batch(files: &[&ImageFile], tag_id: &str) -> anyhow::Result<ImageBatch> {
    let mut images = Vec::with_capacity(files.len());
    for file in files {
        let contents = tokio::fs::read(&file.path)
            .await
            .with_context(|| format!("read image {:?}", file.path))?;
        images.push(ImageEntry {
            name: file.file_name(),
            contents,
            tag_ids: vec![tag_id.to_string()],
        });
    }
    Ok(ImageBatch { images })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use providers::memory::InMemoryService;
    use providers::ServiceError;
    use std::collections::HashSet;
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn batches_cover_every_item_once() {
        for n in 0..=23usize {
            for b in 1..=7usize {
                let items: Vec<usize> = (0..n).collect();
                let batches = plan_batches(&items, b);

                assert_eq!(batches.len(), n.div_ceil(b));
                if let Some((last, full)) = batches.split_last() {
                    assert!(full.iter().all(|batch| batch.len() == b));
                    let expected_last = if n % b == 0 { b } else { n % b };
                    assert_eq!(last.len(), expected_last);
                }
                let flat: Vec<usize> = batches.concat();
                assert_eq!(flat, items);
            }
        }
    }

    fn partition(dir: &Path, name: &str, count: usize) -> ClassPartition {
        let files = (0..count)
            .map(|i| {
                let path = dir.join(format!("{name}-{i}.png"));
                std::fs::write(&path, [i as u8; 8]).unwrap();
                ImageFile {
                    path,
                    size: 8,
                    extension: "png".into(),
                    corrupt: false,
                }
            })
            .collect();
        ClassPartition {
            name: name.to_string(),
            files,
        }
    }

    fn uploader(svc: Arc<InMemoryService>, clock: Arc<ManualClock>, batch: usize) -> Uploader {
        Uploader::new(svc, clock, RetryPolicy::fixed(Duration::from_secs(2)), batch)
    }

    #[tokio::test]
    async fn rate_limited_batch_is_retried_until_accepted() {
        let temp = tempfile::tempdir().unwrap();
        let svc = Arc::new(InMemoryService::with_project("p", "Art").fail_uploads([
            ServiceError::RateLimited("429".into()),
            ServiceError::RateLimited("429".into()),
        ]));
        let clock = Arc::new(ManualClock::new());
        let part = partition(temp.path(), "Cubism", 3);

        let (result, retries) = uploader(svc.clone(), clock.clone(), 50)
            .upload_class("p", &part, "t1")
            .await
            .unwrap();

        assert_eq!(retries, 2);
        assert_eq!(result.images, 3);
        assert_eq!(svc.upload_attempts(), 3);
        assert_eq!(svc.images().len(), 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn non_rate_limit_failure_aborts_remaining_classes() {
        let temp = tempfile::tempdir().unwrap();
        let svc = Arc::new(
            InMemoryService::with_project("p", "Art")
                .fail_uploads([ServiceError::Unauthorized("expired key".into())]),
        );
        let clock = Arc::new(ManualClock::new());
        let dataset = Dataset {
            root: temp.path().to_path_buf(),
            classes: vec![
                partition(temp.path(), "A", 2),
                partition(temp.path(), "B", 2),
            ],
        };
        let tags = crate::tags::reconcile(svc.as_ref(), "p", &dataset.class_names())
            .await
            .unwrap();

        let err = uploader(svc.clone(), clock.clone(), 50)
            .upload_dataset("p", &dataset, &tags)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ServiceError>(),
            Some(ServiceError::Unauthorized(_))
        ));
        assert_eq!(svc.upload_attempts(), 1);
        assert!(svc.images().is_empty());
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn failure_on_a_later_batch_keeps_earlier_batches() {
        let temp = tempfile::tempdir().unwrap();
        let svc = Arc::new(InMemoryService::with_project("p", "Art").fail_uploads_after(
            2,
            [ServiceError::Unauthorized("expired key".into())],
        ));
        let clock = Arc::new(ManualClock::new());
        let part = partition(temp.path(), "Baroque", 12);

        let err = uploader(svc.clone(), clock.clone(), 3)
            .upload_class("p", &part, "t-bar")
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ServiceError>(),
            Some(ServiceError::Unauthorized(_))
        ));
        assert!(err.to_string().contains("batch 3 of 4"), "{err}");
        assert_eq!(svc.batch_sizes(), vec![3, 3]);
        assert_eq!(svc.upload_attempts(), 3);
        assert_eq!(svc.images().len(), 6);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn corrupt_files_are_left_out_and_batches_carry_one_tag() {
        let temp = tempfile::tempdir().unwrap();
        let svc = Arc::new(InMemoryService::with_project("p", "Art"));
        let clock = Arc::new(ManualClock::new());
        let mut part = partition(temp.path(), "Baroque", 7);
        part.files[3].corrupt = true;

        let (result, _) = uploader(svc.clone(), clock, 3)
            .upload_class("p", &part, "t-bar")
            .await
            .unwrap();

        assert_eq!(result.images, 6);
        assert_eq!(svc.batch_sizes(), vec![3, 3]);
        let names: HashSet<String> = svc.images().into_iter().map(|i| i.name).collect();
        assert!(!names.contains("Baroque-3.png"));
        assert!(svc.images().iter().all(|i| i.tag_ids == vec!["t-bar".to_string()]));
    }
}
