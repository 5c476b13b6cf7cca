use providers::{Iteration, VisionTrainingService};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Stripped from iteration names when deriving a publish name.
pub const ITERATION_PREFIX: &str = "Iteration ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub name: String,
    pub prediction_resource_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published(PublishResult),
    Skipped { reason: String },
    Failed { reason: String },
}

impl PublishOutcome {
    pub fn result(&self) -> Option<&PublishResult> {
        match self {
            PublishOutcome::Published(r) => Some(r),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            PublishOutcome::Published(r) => format!("Published as {}", r.name),
            PublishOutcome::Skipped { reason } => format!("skipped, {reason}"),
            PublishOutcome::Failed { reason } => format!("failed: {reason}"),
        }
    }
}

/// `<project>_v<n>` for an iteration named `Iteration <n>`.
pub fn publish_name(project_name: &str, iteration_name: &str) -> String {
    let version = iteration_name
        .strip_prefix(ITERATION_PREFIX)
        .unwrap_or(iteration_name);
    format!("{project_name}_v{version}")
}

/// Publishes `iteration` when a prediction resource is configured. Never
/// fails the run: skips and errors are returned as outcomes.
pub async fn publish(
    service: &dyn VisionTrainingService,
    project_id: &str,
    project_name: &str,
    iteration: &Iteration,
    prediction_resource_id: Option<&str>,
) -> PublishOutcome {
    let Some(resource) = prediction_resource_id else {
        info!("Prediction resource id not set, skipping publish (publish manually later)");
        return PublishOutcome::Skipped {
            reason: "not configured".to_string(),
        };
    };

    let name = publish_name(project_name, &iteration.name);
    info!("Publishing as '{}'", name);
    match service
        .publish_iteration(project_id, &iteration.id, &name, resource)
        .await
    {
        Ok(()) => {
            info!("Model published and ready for predictions");
            PublishOutcome::Published(PublishResult {
                name,
                prediction_resource_id: resource.to_string(),
            })
        }
        Err(err) => {
            warn!("Publish failed: {}", err);
            PublishOutcome::Failed {
                reason: err.to_string(),
            }
        }
    }
}
