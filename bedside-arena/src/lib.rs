//! Assessment arena: drives doctor/patient dialogues and tracks batch runs.
//!
//! - [`orchestrator`]: the per-persona round loop
//! - [`store`]: assessment tasks and their lifecycle
//! - [`runner`]: validates requests and runs sessions concurrently
//! - [`observe`]: tracing subscriber setup
//!
//! ```text
//! AssessmentRunner ──create──▶ AssessmentTaskStore
//!        │                            ▲
//!        │ one session per persona    │ append result
//!        ▼                            │
//! RoundOrchestrator ── rounds ── RoundEvaluator / StopConditionDetector
//!        │
//!        └── sealed session ──▶ ReportGenerator
//! ```

pub mod error;
pub mod observe;
pub mod orchestrator;
pub mod request;
pub mod runner;
pub mod store;
pub mod task;

pub use error::{ArenaError, RequestError, Result, TaskError};
pub use observe::init_tracing;
pub use orchestrator::RoundOrchestrator;
pub use request::{AssessmentRequest, ValidatedRequest};
pub use runner::{AssessmentRunner, DoctorConnector, HttpDoctorConnector};
pub use store::AssessmentTaskStore;
pub use task::{AssessmentResult, AssessmentTask, SessionResult, TaskStatus, TaskSummary};
