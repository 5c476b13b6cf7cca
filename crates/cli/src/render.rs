use serde_json::{json, Value};
use trainer_core::pipeline::{PipelineMode, PipelineSummary};

pub fn summary_json(mode: PipelineMode, summary: &PipelineSummary) -> anyhow::Result<Value> {
    let mut out = json!({
        "status": "ok",
        "mode": mode.label(),
    });
    if let Value::Object(map) = &mut out {
        if let Value::Object(fields) = serde_json::to_value(summary)? {
            map.extend(fields.into_iter().filter(|(_, v)| !v.is_null()));
        }
    }
    Ok(out)
}

pub fn summary_lines(mode: PipelineMode, summary: &PipelineSummary) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(ds) = &summary.dataset {
        lines.push(format!(
            "{}: {} images in {} classes, {} corrupt",
            mode.label(),
            ds.total_images,
            ds.classes.len(),
            ds.corrupt_images.len()
        ));
        for path in &ds.corrupt_images {
            lines.push(format!("  corrupt: {path}"));
        }
    }
    if let Some(tags) = &summary.tags {
        lines.push(format!(
            "tags: {} created, {} reused",
            tags.created(),
            tags.reused()
        ));
    }
    if let Some(upload) = &summary.upload {
        lines.push(format!(
            "upload: {} images in {} batches ({} rate-limit retries)",
            upload.images(),
            upload.batches(),
            upload.retries
        ));
    }
    if summary.training_cancelled {
        lines.push("training cancelled".to_string());
    }
    if let Some(run) = &summary.run {
        lines.push(format!(
            "training: {} {} in {}s",
            run.iteration.name, run.iteration.status, run.training_secs
        ));
        lines.push(format!(
            "performance: precision {:.1}%, recall {:.1}%, AP {:.1}%",
            run.performance.overall.precision * 100.0,
            run.performance.overall.recall * 100.0,
            run.performance.overall.average_precision * 100.0
        ));
        lines.push(format!("publish: {}", run.publish.describe()));
    }
    if let Some(paths) = &summary.reports {
        lines.push(format!("reports: {}", paths.report.display()));
    }
    lines
}
