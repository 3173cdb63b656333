//! Batch assessment runs.

use std::sync::Arc;

use bedside_core::config::DialogueConfig;
use bedside_core::participant::{DoctorPayload, HttpParticipant, Participant};
use bedside_core::types::TaskId;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::error::Result;
use crate::orchestrator::RoundOrchestrator;
use crate::request::{AssessmentRequest, ValidatedRequest};
use crate::store::AssessmentTaskStore;
use crate::task::AssessmentResult;

/// Produces the doctor participant for an endpoint.
pub trait DoctorConnector: Send + Sync {
    fn connect(&self, endpoint: &str) -> Arc<dyn Participant<DoctorPayload>>;
}

/// Connects to doctors over the JSON HTTP binding.
#[derive(Debug, Clone, Default)]
pub struct HttpDoctorConnector {
    client: reqwest::Client,
}

impl DoctorConnector for HttpDoctorConnector {
    fn connect(&self, endpoint: &str) -> Arc<dyn Participant<DoctorPayload>> {
        Arc::new(HttpParticipant::with_client("doctor", endpoint, self.client.clone()))
    }
}

/// Runs assessment requests: one session per persona, concurrently, all
/// against the same doctor endpoint.
#[derive(Clone)]
pub struct AssessmentRunner {
    store: Arc<AssessmentTaskStore>,
    orchestrator: Arc<RoundOrchestrator>,
    doctors: Arc<dyn DoctorConnector>,
    limits: DialogueConfig,
}

impl AssessmentRunner {
    pub fn new(
        store: Arc<AssessmentTaskStore>,
        orchestrator: Arc<RoundOrchestrator>,
        doctors: Arc<dyn DoctorConnector>,
        limits: DialogueConfig,
    ) -> Self {
        Self {
            store,
            orchestrator,
            doctors,
            limits,
        }
    }

    pub fn store(&self) -> &Arc<AssessmentTaskStore> {
        &self.store
    }

    /// Validate, run every session, and return the batch result.
    ///
    /// An invalid request is rejected before any task is created.
    pub async fn run(&self, request: AssessmentRequest) -> Result<AssessmentResult> {
        let validated = request.validate(&self.limits)?;
        let task_id = self.create_task(&validated).await;
        self.execute(task_id, validated).await
    }

    /// Validate and start a run in the background, returning its task id.
    pub async fn submit(&self, request: AssessmentRequest) -> Result<TaskId> {
        let validated = request.validate(&self.limits)?;
        let task_id = self.create_task(&validated).await;

        let runner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.execute(task_id, validated).await {
                error!(task_id = %task_id, error = %e, "background assessment failed");
            }
        });
        Ok(task_id)
    }

    async fn create_task(&self, request: &ValidatedRequest) -> TaskId {
        self.store
            .create(
                request.doctor_endpoint.clone(),
                request.personas.clone(),
                request.max_rounds,
            )
            .await
    }

    #[instrument(name = "assessment.run", skip_all, fields(task_id = %task_id))]
    async fn execute(&self, task_id: TaskId, request: ValidatedRequest) -> Result<AssessmentResult> {
        self.store.mark_working(task_id).await?;
        let cancel = self.store.cancellation_token(task_id).await?;
        let doctor = self.doctors.connect(&request.doctor_endpoint);
        let permits = Arc::new(Semaphore::new(self.limits.max_concurrent_sessions.max(1)));
        let endpoint: Arc<str> = Arc::from(request.doctor_endpoint.as_str());

        info!(
            personas = request.personas.len(),
            max_rounds = request.max_rounds,
            endpoint = %endpoint,
            "assessment started"
        );

        let mut sessions = JoinSet::new();
        for persona_id in request.personas {
            let orchestrator = self.orchestrator.clone();
            let store = self.store.clone();
            let doctor = doctor.clone();
            let permits = permits.clone();
            let cancel = cancel.clone();
            let endpoint = endpoint.clone();
            let max_rounds = request.max_rounds;

            sessions.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let result = orchestrator
                    .run_session(&persona_id, doctor.as_ref(), &endpoint, max_rounds, &cancel)
                    .await;
                if let Err(e) = store.append_session_result(task_id, result).await {
                    warn!(error = %e, "dropping session result");
                }
            });
        }

        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "session task panicked");
            }
        }

        let status = self.store.finish(task_id).await?;
        let task = self.store.get_status(task_id).await?;
        info!(status = status.as_str(), sessions = task.results.len(), "assessment finished");
        Ok(AssessmentResult::from(&task))
    }
}
