//! Training job lifecycle: submit, poll until terminal.
//!
//! The loop is an explicit state machine driven by an injected [`Clock`] and
//! the service's status fetch, so tests can run it without real waiting.

use crate::clock::Clock;
use providers::{Iteration, IterationStatus, ServiceError, VisionTrainingService};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Submitted(Iteration),
    Polling(Iteration),
    Completed(Iteration),
    Failed(Iteration),
}

impl JobState {
    /// State implied by the latest known iteration.
    pub fn from_iteration(iteration: Iteration) -> Self {
        match iteration.status {
            IterationStatus::Completed => JobState::Completed(iteration),
            IterationStatus::Failed => JobState::Failed(iteration),
            _ => JobState::Polling(iteration),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed(_) | JobState::Failed(_))
    }

    pub fn iteration(&self) -> &Iteration {
        match self {
            JobState::Submitted(it)
            | JobState::Polling(it)
            | JobState::Completed(it)
            | JobState::Failed(it) => it,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub from: IterationStatus,
    pub to: IterationStatus,
    pub elapsed_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingRun {
    pub iteration: Iteration,
    pub transitions: Vec<StatusTransition>,
    pub polls: u32,
    pub elapsed_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingOutcome {
    Completed(TrainingRun),
    Failed(TrainingRun),
    SubmitFailed(ServiceError),
}

pub struct TrainingOrchestrator {
    service: Arc<dyn VisionTrainingService>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl TrainingOrchestrator {
    pub fn new(
        service: Arc<dyn VisionTrainingService>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            service,
            clock,
            poll_interval,
        }
    }

    /// Submits a training job and polls it to a terminal state. Submission
    /// failures are reported in the outcome; status fetch errors propagate.
    pub async fn run(&self, project_id: &str) -> Result<TrainingOutcome, ServiceError> {
        info!("Starting training");
        let started = self.clock.now();
        let iteration = match self.service.start_training(project_id).await {
            Ok(it) => it,
            Err(err) => {
                error!("Training failed to start: {}", err);
                return Ok(TrainingOutcome::SubmitFailed(err));
            }
        };
        info!("Training initiated: iteration {}", iteration.id);

        let mut state = JobState::Submitted(iteration);
        let mut transitions = Vec::new();
        let mut polls = 0u32;
        loop {
            state = match state {
                JobState::Submitted(it) => JobState::from_iteration(it),
                JobState::Polling(previous) => {
                    self.clock.sleep(self.poll_interval).await;
                    let current = self.service.get_iteration(project_id, &previous.id).await?;
                    polls += 1;
                    if current.status != previous.status {
                        let elapsed_secs = self.elapsed_secs(started);
                        info!("[{}s] Status: {}", elapsed_secs, current.status);
                        transitions.push(StatusTransition {
                            from: previous.status.clone(),
                            to: current.status.clone(),
                            elapsed_secs,
                        });
                    }
                    JobState::from_iteration(current)
                }
                terminal => {
                    let elapsed_secs = self.elapsed_secs(started);
                    let completed = matches!(terminal, JobState::Completed(_));
                    let run = TrainingRun {
                        iteration: terminal.iteration().clone(),
                        transitions,
                        polls,
                        elapsed_secs,
                    };
                    return Ok(if completed {
                        info!(
                            "Training completed in {}s ({}m {}s)",
                            elapsed_secs,
                            elapsed_secs / 60,
                            elapsed_secs % 60
                        );
                        TrainingOutcome::Completed(run)
                    } else {
                        error!("Training failed: {}", run.iteration.status);
                        TrainingOutcome::Failed(run)
                    });
                }
            };
        }
    }

    fn elapsed_secs(&self, started: Duration) -> u64 {
        self.clock.now().saturating_sub(started).as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use providers::memory::InMemoryService;

    fn orchestrator(svc: Arc<InMemoryService>, clock: Arc<ManualClock>) -> TrainingOrchestrator {
        TrainingOrchestrator::new(svc, clock, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn status_changes_are_edge_triggered() {
        let svc = Arc::new(InMemoryService::with_project("p", "Art").with_statuses([
            "Submitted",
            "Submitted",
            "Training",
            "Training",
            "Completed",
        ]));
        let clock = Arc::new(ManualClock::new());

        let outcome = orchestrator(svc.clone(), clock.clone())
            .run("p")
            .await
            .unwrap();

        let run = match outcome {
            TrainingOutcome::Completed(run) => run,
            other => panic!("expected completion, got {other:?}"),
        };
        assert_eq!(
            run.transitions,
            vec![
                StatusTransition {
                    from: IterationStatus::Submitted,
                    to: IterationStatus::Training,
                    elapsed_secs: 20,
                },
                StatusTransition {
                    from: IterationStatus::Training,
                    to: IterationStatus::Completed,
                    elapsed_secs: 40,
                },
            ]
        );
        assert_eq!(run.polls, 4);
        assert_eq!(run.elapsed_secs, 40);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10); 4]);
    }

    #[tokio::test]
    async fn failed_iteration_ends_polling() {
        let svc = Arc::new(
            InMemoryService::with_project("p", "Art").with_statuses(["Training", "Failed"]),
        );
        let clock = Arc::new(ManualClock::new());

        let outcome = orchestrator(svc.clone(), clock).run("p").await.unwrap();

        match outcome {
            TrainingOutcome::Failed(run) => {
                assert_eq!(run.iteration.status, IterationStatus::Failed);
                assert_eq!(run.polls, 1);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(svc.status_polls(), 1);
    }

    #[tokio::test]
    async fn submission_failure_skips_polling() {
        let svc = Arc::new(
            InMemoryService::with_project("p", "Art")
                .fail_training(ServiceError::Status {
                    status: 400,
                    body: "not enough images".into(),
                }),
        );
        let clock = Arc::new(ManualClock::new());

        let outcome = orchestrator(svc.clone(), clock.clone())
            .run("p")
            .await
            .unwrap();

        assert!(matches!(outcome, TrainingOutcome::SubmitFailed(_)));
        assert_eq!(svc.status_polls(), 0);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn already_terminal_submission_needs_no_poll() {
        let svc =
            Arc::new(InMemoryService::with_project("p", "Art").with_statuses(["Completed"]));
        let clock = Arc::new(ManualClock::new());

        let outcome = orchestrator(svc.clone(), clock).run("p").await.unwrap();

        assert!(matches!(
            outcome,
            TrainingOutcome::Completed(ref run) if run.transitions.is_empty()
        ));
        assert_eq!(svc.status_polls(), 0);
    }

    #[test]
    fn unknown_statuses_keep_polling() {
        let it = Iteration {
            id: "i".into(),
            name: "Iteration 1".into(),
            status: IterationStatus::Other("Exporting".into()),
            created: chrono::Utc::now(),
        };
        let state = JobState::from_iteration(it);
        assert!(matches!(state, JobState::Polling(_)));
        assert!(!state.is_terminal());
    }
}
