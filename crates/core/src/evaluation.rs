use providers::{
    Iteration, IterationPerformance, ServiceError, TagPerformance, VisionTrainingService,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub average_precision: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMetrics {
    pub tag: String,
    pub precision: f64,
    pub recall: f64,
    pub average_precision: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub overall: Metrics,
    /// Highest average precision first; ties keep service order.
    pub per_tag_performance: Vec<TagMetrics>,
}

/// Rounds to four decimal places (basis points of a ratio).
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

impl PerformanceReport {
    pub fn from_performance(perf: &IterationPerformance) -> Self {
        // Order on the raw values; rounding is for presentation only.
        let mut ranked: Vec<&TagPerformance> = perf.per_tag.iter().collect();
        ranked.sort_by(|a, b| b.average_precision.total_cmp(&a.average_precision));
        let per_tag = ranked
            .into_iter()
            .map(|t| TagMetrics {
                tag: t.name.clone(),
                precision: round4(t.precision),
                recall: round4(t.recall),
                average_precision: round4(t.average_precision),
            })
            .collect();

        PerformanceReport {
            overall: Metrics {
                precision: round4(perf.precision),
                recall: round4(perf.recall),
                average_precision: round4(perf.average_precision),
            },
            per_tag_performance: per_tag,
        }
    }
}

pub async fn evaluate(
    service: &dyn VisionTrainingService,
    project_id: &str,
    iteration: &Iteration,
) -> Result<PerformanceReport, ServiceError> {
    info!("Evaluating {}", iteration.name);
    let perf = service.get_performance(project_id, &iteration.id).await?;
    let report = PerformanceReport::from_performance(&perf);

    info!(
        "Overall: precision {:.1}%, recall {:.1}%, average precision {:.1}%",
        report.overall.precision * 100.0,
        report.overall.recall * 100.0,
        report.overall.average_precision * 100.0
    );
    for row in &report.per_tag_performance {
        info!(
            "  {:<25} precision {:>6.1}%  recall {:>6.1}%  AP {:>6.1}%",
            row.tag,
            row.precision * 100.0,
            row.recall * 100.0,
            row.average_precision * 100.0
        );
    }
    Ok(report)
}
