//! In-process implementation of [`VisionTrainingService`].
//!
//! Holds projects, tags and uploaded images in memory and plays back scripted
//! failures and iteration statuses, so callers can drive the whole pipeline
//! without a network.

use crate::{
    BatchReceipt, ImageBatch, ImageUploadStatus, Iteration, IterationPerformance, IterationStatus,
    Project, ServiceError, Tag, TagPerformance, VisionTrainingService,
};
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct StoredImage {
    pub name: String,
    pub tag_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PublishRecord {
    pub iteration_id: String,
    pub publish_name: String,
    pub prediction_resource_id: String,
}

#[derive(Debug, Default)]
struct State {
    projects: Vec<Project>,
    tags: Vec<Tag>,
    images: Vec<StoredImage>,
    batch_sizes: Vec<usize>,
    upload_attempts: usize,
    upload_script: VecDeque<Option<ServiceError>>,
    create_tag_calls: usize,
    next_id: u64,
    statuses: VecDeque<IterationStatus>,
    training_failure: Option<ServiceError>,
    iteration: Option<Iteration>,
    iterations_started: usize,
    status_polls: usize,
    performance: Option<IterationPerformance>,
    publish_failure: Option<ServiceError>,
    published: Vec<PublishRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryService {
    state: Mutex<State>,
}

impl InMemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service that already knows one project.
    pub fn with_project(id: &str, name: &str) -> Self {
        let svc = Self::new();
        svc.lock().projects.push(Project {
            id: id.to_string(),
            name: name.to_string(),
            domain_id: Some("general".to_string()),
        });
        svc
    }

    pub fn with_tag(self, id: &str, name: &str) -> Self {
        self.lock().tags.push(Tag {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Statuses returned by `start_training` (first) and then by each
    /// `get_iteration` call. The last status repeats once the script runs out.
    pub fn with_statuses<I, S>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<IterationStatus>,
    {
        self.lock().statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_performance(self, performance: IterationPerformance) -> Self {
        self.lock().performance = Some(performance);
        self
    }

    /// Queues errors returned by the next upload calls, in order.
    pub fn fail_uploads<I>(self, errors: I) -> Self
    where
        I: IntoIterator<Item = ServiceError>,
    {
        self.lock().upload_script.extend(errors.into_iter().map(Some));
        self
    }

    /// Lets `successes` upload calls through before the queued errors.
    pub fn fail_uploads_after<I>(self, successes: usize, errors: I) -> Self
    where
        I: IntoIterator<Item = ServiceError>,
    {
        {
            let mut state = self.lock();
            state.upload_script.extend(std::iter::repeat(None).take(successes));
            state.upload_script.extend(errors.into_iter().map(Some));
        }
        self
    }

    pub fn fail_training(self, error: ServiceError) -> Self {
        self.lock().training_failure = Some(error);
        self
    }

    pub fn fail_publish(self, error: ServiceError) -> Self {
        self.lock().publish_failure = Some(error);
        self
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.lock().tags.clone()
    }

    pub fn images(&self) -> Vec<StoredImage> {
        self.lock().images.clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    pub fn upload_attempts(&self) -> usize {
        self.lock().upload_attempts
    }

    pub fn create_tag_calls(&self) -> usize {
        self.lock().create_tag_calls
    }

    pub fn iterations_started(&self) -> usize {
        self.lock().iterations_started
    }

    pub fn status_polls(&self) -> usize {
        self.lock().status_polls
    }

    pub fn published(&self) -> Vec<PublishRecord> {
        self.lock().published.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked mid-call.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn ensure_project(state: &State, project_id: &str) -> Result<(), ServiceError> {
        if state.projects.iter().any(|p| p.id == project_id) {
            Ok(())
        } else {
            Err(ServiceError::NotFound(format!("project {project_id}")))
        }
    }
}

fn next_status(state: &mut State) -> IterationStatus {
    match state.statuses.len() {
        0 => IterationStatus::Completed,
        1 => state.statuses[0].clone(),
        _ => state
            .statuses
            .pop_front()
            .unwrap_or(IterationStatus::Completed),
    }
}

fn default_performance(tags: &[Tag]) -> IterationPerformance {
    IterationPerformance {
        precision: 0.9,
        recall: 0.85,
        average_precision: 0.88,
        per_tag: tags
            .iter()
            .map(|t| TagPerformance {
                name: t.name.clone(),
                precision: 0.9,
                recall: 0.85,
                average_precision: 0.88,
            })
            .collect(),
    }
}

#[async_trait::async_trait]
impl VisionTrainingService for InMemoryService {
    async fn list_projects(&self) -> Result<Vec<Project>, ServiceError> {
        Ok(self.lock().projects.clone())
    }

    async fn list_tags(&self, project_id: &str) -> Result<Vec<Tag>, ServiceError> {
        let state = self.lock();
        Self::ensure_project(&state, project_id)?;
        Ok(state.tags.clone())
    }

    async fn create_tag(&self, project_id: &str, name: &str) -> Result<Tag, ServiceError> {
        let mut state = self.lock();
        Self::ensure_project(&state, project_id)?;
        state.create_tag_calls += 1;
        if state.tags.iter().any(|t| t.name == name) {
            return Err(ServiceError::Status {
                status: 400,
                body: format!("tag {name} already exists"),
            });
        }
        state.next_id += 1;
        let tag = Tag {
            id: format!("tag-{}", state.next_id),
            name: name.to_string(),
        };
        state.tags.push(tag.clone());
        Ok(tag)
    }

    async fn count_tagged_images(
        &self,
        project_id: &str,
        tag_ids: &[String],
    ) -> Result<u64, ServiceError> {
        let state = self.lock();
        Self::ensure_project(&state, project_id)?;
        let wanted: HashSet<&String> = tag_ids.iter().collect();
        let count = state
            .images
            .iter()
            .filter(|img| !img.tag_ids.is_empty())
            .filter(|img| wanted.is_empty() || img.tag_ids.iter().any(|t| wanted.contains(t)))
            .count();
        Ok(count as u64)
    }

    async fn upload_batch(
        &self,
        project_id: &str,
        batch: &ImageBatch,
    ) -> Result<BatchReceipt, ServiceError> {
        let mut state = self.lock();
        Self::ensure_project(&state, project_id)?;
        state.upload_attempts += 1;
        if let Some(Some(err)) = state.upload_script.pop_front() {
            return Err(err);
        }
        if batch.len() > 64 {
            return Err(ServiceError::Status {
                status: 400,
                body: format!("batch of {} exceeds 64 images", batch.len()),
            });
        }
        state.batch_sizes.push(batch.len());
        let mut statuses = Vec::with_capacity(batch.len());
        for entry in &batch.images {
            let duplicate = state
                .images
                .iter()
                .any(|img| img.name == entry.name && img.tag_ids == entry.tag_ids);
            if duplicate {
                statuses.push(ImageUploadStatus::Duplicate);
                continue;
            }
            state.images.push(StoredImage {
                name: entry.name.clone(),
                tag_ids: entry.tag_ids.clone(),
            });
            statuses.push(ImageUploadStatus::Ok);
        }
        Ok(BatchReceipt { statuses })
    }

    async fn start_training(&self, project_id: &str) -> Result<Iteration, ServiceError> {
        let mut state = self.lock();
        Self::ensure_project(&state, project_id)?;
        if let Some(err) = state.training_failure.clone() {
            return Err(err);
        }
        state.iterations_started += 1;
        let iteration = Iteration {
            id: format!("iteration-{}", state.iterations_started),
            name: format!("Iteration {}", state.iterations_started),
            status: next_status(&mut state),
            created: Utc::now(),
        };
        state.iteration = Some(iteration.clone());
        Ok(iteration)
    }

    async fn get_iteration(
        &self,
        project_id: &str,
        iteration_id: &str,
    ) -> Result<Iteration, ServiceError> {
        let mut state = self.lock();
        Self::ensure_project(&state, project_id)?;
        state.status_polls += 1;
        let status = next_status(&mut state);
        match state.iteration.as_mut() {
            Some(it) if it.id == iteration_id => {
                it.status = status;
                Ok(it.clone())
            }
            _ => Err(ServiceError::NotFound(format!("iteration {iteration_id}"))),
        }
    }

    async fn get_performance(
        &self,
        project_id: &str,
        iteration_id: &str,
    ) -> Result<IterationPerformance, ServiceError> {
        let state = self.lock();
        Self::ensure_project(&state, project_id)?;
        match state.iteration.as_ref() {
            Some(it) if it.id == iteration_id && it.status == IterationStatus::Completed => Ok(state
                .performance
                .clone()
                .unwrap_or_else(|| default_performance(&state.tags))),
            Some(it) if it.id == iteration_id => Err(ServiceError::Status {
                status: 400,
                body: format!("iteration {iteration_id} is {}", it.status),
            }),
            _ => Err(ServiceError::NotFound(format!("iteration {iteration_id}"))),
        }
    }

    async fn publish_iteration(
        &self,
        project_id: &str,
        iteration_id: &str,
        publish_name: &str,
        prediction_resource_id: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock();
        Self::ensure_project(&state, project_id)?;
        if let Some(err) = state.publish_failure.clone() {
            return Err(err);
        }
        state.published.push(PublishRecord {
            iteration_id: iteration_id.to_string(),
            publish_name: publish_name.to_string(),
            prediction_resource_id: prediction_resource_id.to_string(),
        });
        Ok(())
    }
}
