//! Service layer: task building, sandbox execution, dispatch and reconciliation.

pub mod context;
pub mod dispatcher;
pub mod driver;
pub mod failure_log;
pub mod offline_worker;
pub mod reconciler;
pub mod sandbox_client;
pub mod status_ledger;
pub mod store_retry;
pub mod task_builder;
pub mod task_file;

pub use context::VerificationContext;
pub use dispatcher::{DispatchEvent, DispatchOptions, Dispatcher};
pub use failure_log::{FailureLog, FailureRecord};
pub use offline_worker::{OfflineWorker, WorkerJob};
pub use reconciler::{ReconcileOutcome, ResultReconciler};
pub use sandbox_client::{ExecutionSettings, SandboxClient};
pub use status_ledger::{BatchFailure, BatchUpdateReport, BulkUpdate, StatusLedger};
pub use store_retry::StoreRetryPolicy;
pub use task_builder::{Selection, TaskBuilder, TaskStream};
pub use task_file::{read_id_list, JsonlReader, JsonlWriter, TaskFileError};
