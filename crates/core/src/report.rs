//! Run summary and the artifacts rendered from it.

use crate::evaluation::{Metrics, PerformanceReport, TagMetrics};
use crate::models::DatasetSummary;
use crate::publisher::PublishOutcome;
use crate::stats::ProjectStats;
use crate::training::StatusTransition;
use chrono::{DateTime, Utc};
use providers::{Iteration, Project};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_FILE: &str = "azure_config.json";
pub const METRICS_FILE: &str = "azure_metrics.json";
pub const REPORT_FILE: &str = "training_report.txt";
pub const SUMMARY_FILE: &str = "run_summary.json";

const RULE: &str = "============================================================";

/// Everything a completed run produced. Written once, last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub project: Project,
    pub endpoint: Option<String>,
    pub stats: ProjectStats,
    pub iteration: Iteration,
    pub transitions: Vec<StatusTransition>,
    pub training_secs: u64,
    pub performance: PerformanceReport,
    pub publish: PublishOutcome,
    pub emitted_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn published_name(&self) -> Option<&str> {
        self.publish.result().map(|r| r.name.as_str())
    }

    pub fn training_date(&self) -> String {
        self.emitted_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct RunConfigRecord<'a> {
    pub project_id: &'a str,
    pub project_name: &'a str,
    pub iteration_id: &'a str,
    pub iteration_name: &'a str,
    pub published_name: Option<&'a str>,
    pub endpoint: Option<&'a str>,
    pub training_date: String,
    pub stats: &'a ProjectStats,
    pub domain: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct MetricsRecord<'a> {
    pub iteration_id: &'a str,
    pub iteration_name: &'a str,
    pub created: String,
    pub overall: &'a Metrics,
    pub per_tag_performance: &'a [TagMetrics],
}

impl<'a> From<&'a RunSummary> for RunConfigRecord<'a> {
    fn from(s: &'a RunSummary) -> Self {
        RunConfigRecord {
            project_id: &s.project.id,
            project_name: &s.project.name,
            iteration_id: &s.iteration.id,
            iteration_name: &s.iteration.name,
            published_name: s.published_name(),
            endpoint: s.endpoint.as_deref(),
            training_date: s.training_date(),
            stats: &s.stats,
            domain: s.project.domain_id.as_deref(),
        }
    }
}

impl<'a> From<&'a RunSummary> for MetricsRecord<'a> {
    fn from(s: &'a RunSummary) -> Self {
        MetricsRecord {
            iteration_id: &s.iteration.id,
            iteration_name: &s.iteration.name,
            created: s.iteration.created.to_rfc3339(),
            overall: &s.performance.overall,
            per_tag_performance: &s.performance.per_tag_performance,
        }
    }
}

fn pct(v: f64) -> String {
    format!("{:.1}%", v * 100.0)
}

pub fn render_text_report(s: &RunSummary) -> String {
    let overall = &s.performance.overall;
    format!(
        "{RULE}\n\
         Azure Custom Vision Training Report\n\
         {RULE}\n\n\
         Project: {project}\n\
         Iteration: {iteration}\n\
         Date: {date}\n\n\
         Dataset:\n\
         \x20 • {tags} art styles\n\
         \x20 • {images} total images\n\n\
         Overall Performance:\n\
         \x20 • Precision: {precision}\n\
         \x20 • Recall: {recall}\n\
         \x20 • Average Precision: {ap}\n\n\
         Training status: {status}\n\
         Publish: {publish}\n",
        project = s.project.name,
        iteration = s.iteration.name,
        date = s.training_date(),
        tags = s.stats.tag_count,
        images = s.stats.total_images,
        precision = pct(overall.precision),
        recall = pct(overall.recall),
        ap = pct(overall.average_precision),
        status = s.iteration.status,
        publish = s.publish.describe(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPaths {
    pub config: PathBuf,
    pub metrics: PathBuf,
    pub report: PathBuf,
    pub summary: PathBuf,
}

/// Writes the run configuration, metrics, text report and the summary under
/// `dir`. Each file is replaced atomically.
pub fn emit(dir: &Path, summary: &RunSummary) -> anyhow::Result<ReportPaths> {
    let paths = ReportPaths {
        config: dir.join(CONFIG_FILE),
        metrics: dir.join(METRICS_FILE),
        report: dir.join(REPORT_FILE),
        summary: dir.join(SUMMARY_FILE),
    };

    storage::write_json(&paths.config, &RunConfigRecord::from(summary))?;
    info!("Saved config → {}", paths.config.display());
    storage::write_json(&paths.metrics, &MetricsRecord::from(summary))?;
    info!("Saved metrics → {}", paths.metrics.display());
    storage::write_text(&paths.report, &render_text_report(summary))?;
    info!("Saved report → {}", paths.report.display());
    storage::write_json(&paths.summary, summary)?;
    info!("Saved run summary → {}", paths.summary.display());

    Ok(paths)
}

pub fn write_dataset_summary(path: &Path, summary: &DatasetSummary) -> anyhow::Result<()> {
    storage::write_json(path, summary)?;
    info!("Summary saved to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::PublishResult;
    use chrono::TimeZone;
    use providers::IterationStatus;

    fn summary(publish: PublishOutcome) -> RunSummary {
        RunSummary {
            project: Project {
                id: "p-1".into(),
                name: "ArtStyles".into(),
                domain_id: Some("d-general".into()),
            },
            endpoint: Some("https://cv.example".into()),
            stats: ProjectStats {
                tag_count: 2,
                total_images: 18,
                tags: vec![],
            },
            iteration: Iteration {
                id: "it-1".into(),
                name: "Iteration 1".into(),
                status: IterationStatus::Completed,
                created: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            },
            transitions: vec![],
            training_secs: 125,
            performance: PerformanceReport {
                overall: Metrics {
                    precision: 0.9123,
                    recall: 0.8,
                    average_precision: 0.95,
                },
                per_tag_performance: vec![TagMetrics {
                    tag: "Cubism".into(),
                    precision: 0.9,
                    recall: 0.8,
                    average_precision: 0.95,
                }],
            },
            publish,
            emitted_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap(),
        }
    }

    #[test]
    fn text_report_lists_outcome() {
        let text = render_text_report(&summary(PublishOutcome::Skipped {
            reason: "not configured".into(),
        }));
        assert!(text.starts_with(&format!(
            "{RULE}\nAzure Custom Vision Training Report\n{RULE}\n\nProject: ArtStyles\n"
        )));
        assert!(text.ends_with("Publish: skipped, not configured\n"));
        assert!(text.contains("Date: 2024-05-01 12:30:05"));
        assert!(text.contains("  • Precision: 91.2%"));
        assert!(text.contains("Training status: Completed"));
        assert!(text.contains("Publish: skipped, not configured"));
    }

    #[test]
    fn emits_all_artifacts() {
        let temp = tempfile::tempdir().unwrap();
        let s = summary(PublishOutcome::Published(PublishResult {
            name: "ArtStyles_v1".into(),
            prediction_resource_id: "/subs/x".into(),
        }));

        let paths = emit(&temp.path().join("outputs"), &s).unwrap();

        let config: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.config).unwrap()).unwrap();
        assert_eq!(config["published_name"], "ArtStyles_v1");
        assert_eq!(config["domain"], "d-general");
        assert_eq!(config["training_date"], "2024-05-01 12:30:05");
        assert_eq!(config["stats"]["total_images"], 18);

        let metrics: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.metrics).unwrap()).unwrap();
        assert_eq!(metrics["overall"]["precision"], 0.9123);
        assert_eq!(metrics["per_tag_performance"][0]["tag"], "Cubism");
        assert_eq!(metrics["created"], "2024-05-01T12:00:00+00:00");

        assert!(paths.report.exists());
        let run: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.summary).unwrap()).unwrap();
        assert_eq!(run["publish"]["status"], "published");
    }
}
