//! Verification context: the repositories, sandbox client and settings a
//! command works with, built once and shared.

use std::sync::Arc;

use super::dispatcher::{DispatchOptions, Dispatcher};
use super::offline_worker::OfflineWorker;
use super::reconciler::ResultReconciler;
use super::sandbox_client::{ExecutionSettings, SandboxClient};
use super::status_ledger::StatusLedger;
use super::task_builder::{Selection, TaskBuilder};
use crate::domain::errors::DomainResult;
use crate::domain::models::Config;
use crate::domain::ports::{ResponseRepository, Sandbox};

#[derive(Clone)]
pub struct VerificationContext {
    responses: Arc<dyn ResponseRepository>,
    client: Arc<SandboxClient>,
    config: Config,
}

impl VerificationContext {
    pub fn new(responses: Arc<dyn ResponseRepository>, sandbox: Arc<dyn Sandbox>, config: Config) -> DomainResult<Self> {
        let client = SandboxClient::new(sandbox, ExecutionSettings::from(&config.sandbox))?;
        Ok(Self {
            responses,
            client: Arc::new(client),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn responses(&self) -> Arc<dyn ResponseRepository> {
        Arc::clone(&self.responses)
    }

    pub fn client(&self) -> Arc<SandboxClient> {
        Arc::clone(&self.client)
    }

    /// Selection for `retry_statuses` with the configured retry ceiling.
    pub fn selection(&self, retry_statuses: Option<&str>) -> DomainResult<Selection> {
        Ok(Selection::parse(retry_statuses)?.with_max_retries(self.config.verification.max_retries))
    }

    pub fn dispatch_options(&self, concurrency: Option<usize>) -> DispatchOptions {
        DispatchOptions::new(concurrency.unwrap_or(self.config.verification.concurrency))
    }

    pub fn dispatcher(&self, dryrun: bool) -> Dispatcher {
        let builder = TaskBuilder::new(self.responses(), self.config.verification.page_size)
            .with_preamble(self.config.sandbox.preamble.clone());
        let reconciler = ResultReconciler::new(self.responses()).with_dryrun(dryrun);
        Dispatcher::new(builder, self.client(), Arc::new(reconciler))
    }

    pub fn ledger(&self) -> StatusLedger {
        StatusLedger::new(self.responses())
    }

    /// Worker judging outputs with the configured `worker_match` mode.
    pub fn offline_worker(&self) -> OfflineWorker {
        OfflineWorker::new(Arc::new(
            self.client.with_match_mode(self.config.verification.worker_match),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sandbox::MockSandbox;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteResponseRepository};
    use crate::domain::models::{MatchMode, VerificationStatus};

    #[tokio::test]
    async fn test_selection_carries_retry_ceiling() {
        let pool = create_migrated_test_pool().await.unwrap();
        let mut config = Config::default();
        config.verification.max_retries = Some(3);
        let ctx = VerificationContext::new(
            Arc::new(SqliteResponseRepository::new(pool)),
            Arc::new(MockSandbox::new()),
            config,
        )
        .unwrap();

        let selection = ctx.selection(Some("failed")).unwrap();
        assert_eq!(selection.max_retries, Some(3));
        assert_eq!(selection.retry_statuses, vec![VerificationStatus::Failed]);
        assert_eq!(ctx.dispatch_options(None).concurrency, 8);
        assert_eq!(ctx.dispatch_options(Some(2)).concurrency, 2);
    }

    #[tokio::test]
    async fn test_online_client_is_exact_and_worker_follows_config() {
        let pool = create_migrated_test_pool().await.unwrap();
        let ctx = VerificationContext::new(
            Arc::new(SqliteResponseRepository::new(pool)),
            Arc::new(MockSandbox::new()),
            Config::default(),
        )
        .unwrap();

        assert_eq!(ctx.client().match_mode(), MatchMode::Exact);
        assert_eq!(ctx.offline_worker().match_mode(), MatchMode::Fuzzy);
    }

    #[tokio::test]
    async fn test_rejects_invalid_rate() {
        let pool = create_migrated_test_pool().await.unwrap();
        let mut config = Config::default();
        config.sandbox.requests_per_second = Some(0.0);
        let ctx = VerificationContext::new(
            Arc::new(SqliteResponseRepository::new(pool)),
            Arc::new(MockSandbox::new()),
            config,
        );
        assert!(ctx.is_err());
    }
}
