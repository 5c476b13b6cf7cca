use crate::clock::{Clock, TokioClock};
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::models::{Dataset, DatasetSummary};
use crate::report::{self, ReportPaths, RunSummary};
use crate::retry::RetryPolicy;
use crate::stats::{self, ProjectStats, Readiness};
use crate::tags::{self, TagMap};
use crate::training::{TrainingOrchestrator, TrainingOutcome};
use crate::uploader::{UploadSummary, Uploader};
use crate::{evaluation, publisher, scanner};
use anyhow::Context;
use chrono::Utc;
use providers::customvision::{CustomVisionClient, CustomVisionConfig};
use providers::VisionTrainingService;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Scan the dataset for corrupt files.
    Check,
    /// Scan, reconcile tags and upload.
    Upload,
    /// Train, evaluate, publish and write reports.
    Train,
    All,
}

impl PipelineMode {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineMode::Check => "check",
            PipelineMode::Upload => "upload",
            PipelineMode::Train => "train",
            PipelineMode::All => "run",
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct PipelineSummary {
    pub dataset: Option<DatasetSummary>,
    pub tags: Option<TagMap>,
    pub upload: Option<UploadSummary>,
    pub stats: Option<ProjectStats>,
    pub readiness: Option<Readiness>,
    pub training_cancelled: bool,
    pub run: Option<RunSummary>,
    pub reports: Option<ReportPaths>,
}

type Confirm = Box<dyn Fn(&ProjectStats) -> bool + Send + Sync>;

pub struct Pipeline {
    config: AppConfig,
    service: Arc<dyn VisionTrainingService>,
    clock: Arc<dyn Clock>,
    confirm: Confirm,
}

impl Pipeline {
    pub fn new(config: AppConfig, service: Arc<dyn VisionTrainingService>) -> Self {
        Self {
            config,
            service,
            clock: Arc::new(TokioClock::new()),
            confirm: Box::new(|_: &ProjectStats| true),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Asked once before a training job is submitted; `false` ends the run.
    pub fn with_confirmation<F>(mut self, confirm: F) -> Self
    where
        F: Fn(&ProjectStats) -> bool + Send + Sync + 'static,
    {
        self.confirm = Box::new(confirm);
        self
    }

    pub async fn run(&self, mode: PipelineMode) -> anyhow::Result<PipelineSummary> {
        self.config.validate()?;
        let mut summary = PipelineSummary::default();

        let dataset = if matches!(
            mode,
            PipelineMode::Check | PipelineMode::Upload | PipelineMode::All
        ) {
            info!("Starting scan phase...");
            let (dataset, dataset_summary) = check_dataset(&self.config).await?;
            summary.dataset = Some(dataset_summary);
            Some(dataset)
        } else {
            None
        };
        if mode == PipelineMode::Check {
            return Ok(summary);
        }

        let service = self.service.as_ref();
        let project = stats::resolve_project(service, &self.config.service).await?;

        if let Some(dataset) = &dataset {
            info!("Starting upload phase...");
            let tag_map = tags::reconcile(service, &project.id, &dataset.class_names())
                .await
                .context("reconcile tags")?;
            let uploader = Uploader::new(
                self.service.clone(),
                self.clock.clone(),
                RetryPolicy::fixed(self.config.upload.retry_delay()),
                self.config.upload.batch_size,
            )
            .skip_corrupt(self.config.upload.skip_corrupt);
            summary.upload = Some(uploader.upload_dataset(&project.id, dataset, &tag_map).await?);
            summary.tags = Some(tag_map);
        }
        if mode == PipelineMode::Upload {
            return Ok(summary);
        }

        let project_stats = stats::collect(service, &project.id)
            .await
            .context("collect project statistics")?;
        let readiness = stats::check_readiness(&project_stats, &self.config.training);
        summary.stats = Some(project_stats.clone());
        summary.readiness = Some(readiness.clone());
        if !readiness.ready {
            error!("Project not ready for training");
            return Err(PipelineError::NotReady(readiness.blockers.join("; ")).into());
        }
        if !(self.confirm)(&project_stats) {
            info!("Training cancelled");
            summary.training_cancelled = true;
            return Ok(summary);
        }

        let orchestrator = TrainingOrchestrator::new(
            self.service.clone(),
            self.clock.clone(),
            self.config.training.poll_interval(),
        );
        let training = match orchestrator
            .run(&project.id)
            .await
            .context("poll training status")?
        {
            TrainingOutcome::Completed(run) => run,
            TrainingOutcome::Failed(run) => {
                return Err(PipelineError::TrainingFailed {
                    iteration: run.iteration.id,
                    status: run.iteration.status.to_string(),
                }
                .into())
            }
            TrainingOutcome::SubmitFailed(err) => {
                return Err(PipelineError::TrainingSubmit(err).into())
            }
        };

        let performance = evaluation::evaluate(service, &project.id, &training.iteration)
            .await
            .context("fetch iteration performance")?;
        let publish = publisher::publish(
            service,
            &project.id,
            &project.name,
            &training.iteration,
            self.config.service.prediction_resource(),
        )
        .await;

        let run = RunSummary {
            project,
            endpoint: self.config.service.endpoint.clone(),
            stats: project_stats,
            iteration: training.iteration,
            transitions: training.transitions,
            training_secs: training.elapsed_secs,
            performance,
            publish,
            emitted_at: Utc::now(),
        };
        summary.reports = Some(report::emit(Path::new(&self.config.output.dir), &run)?);
        summary.run = Some(run);
        Ok(summary)
    }
}

/// Scans the configured dataset root and writes its summary. Needs no
/// service access.
pub async fn check_dataset(config: &AppConfig) -> anyhow::Result<(Dataset, DatasetSummary)> {
    let root = config.dataset.root_path();
    let extensions = config.dataset.extensions.clone();
    let dataset = tokio::task::spawn_blocking(move || scanner::scan(&root, &extensions)).await??;
    let summary = dataset.summary();
    report::write_dataset_summary(Path::new(&config.dataset.summary_path), &summary)?;
    Ok((dataset, summary))
}

pub fn build_service(config: &AppConfig) -> anyhow::Result<Arc<dyn VisionTrainingService>> {
    let (endpoint, training_key) = config.service.require_credentials()?;
    info!("Connecting to {}", endpoint);
    Ok(Arc::new(CustomVisionClient::new(CustomVisionConfig {
        endpoint: endpoint.to_string(),
        training_key: training_key.to_string(),
    })))
}

pub async fn run_with_mode_summary(
    config: AppConfig,
    mode: PipelineMode,
) -> anyhow::Result<PipelineSummary> {
    if mode == PipelineMode::Check {
        let (_, dataset) = check_dataset(&config).await?;
        return Ok(PipelineSummary {
            dataset: Some(dataset),
            ..PipelineSummary::default()
        });
    }
    let service = build_service(&config)?;
    Pipeline::new(config, service).run(mode).await
}
