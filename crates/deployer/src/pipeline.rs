use crate::report::Reporter;
use crate::{CdnInvalidator, ObjectStorage};
use chrono::Utc;
use sitepush_core::{DeploymentConfig, DeploymentResult, Error, Invalidation};
use std::time::Instant;
use tracing::{debug, info};

/// Where a run currently stands.
///
/// `Pending -> Synced -> Invalidated`, or `Failed` from either of the first
/// two. A failure after `Synced` keeps `remote_mutated` set: the bucket has
/// the new files even though the cache was not invalidated.
#[derive(Debug)]
pub enum DeployState {
    Pending,
    Synced,
    Invalidated(Invalidation),
    Failed { error: Error, remote_mutated: bool },
}

impl DeployState {
    fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Invalidated(_) | DeployState::Failed { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            DeployState::Pending => "pending",
            DeployState::Synced => "synced",
            DeployState::Invalidated(_) => "invalidated",
            DeployState::Failed { .. } => "failed",
        }
    }
}

/// Runs sync then invalidation, strictly in order, once.
pub struct Orchestrator<'a> {
    storage: &'a dyn ObjectStorage,
    cdn: &'a dyn CdnInvalidator,
}

impl<'a> Orchestrator<'a> {
    pub fn new(storage: &'a dyn ObjectStorage, cdn: &'a dyn CdnInvalidator) -> Self {
        Self { storage, cdn }
    }

    /// Drive one deployment to a terminal state.
    pub async fn deploy(
        &self,
        config: DeploymentConfig,
        reporter: &dyn Reporter,
    ) -> DeploymentResult {
        let started = Instant::now();
        let mut state = DeployState::Pending;

        while !state.is_terminal() {
            debug!(state = state.name(), "deploy step");
            state = match state {
                DeployState::Pending => self.sync(&config, reporter).await,
                DeployState::Synced => self.invalidate(&config, reporter).await,
                terminal => terminal,
            };
        }

        let took_ms = started.elapsed().as_millis() as u64;
        match state {
            DeployState::Invalidated(invalidation) => {
                info!(invalidation_id = %invalidation.id, took_ms, "deployment finished");
                DeploymentResult::Succeeded { invalidation }
            }
            DeployState::Failed {
                error,
                remote_mutated,
            } => {
                info!(%error, remote_mutated, took_ms, "deployment failed");
                DeploymentResult::Failed {
                    error,
                    remote_mutated,
                }
            }
            DeployState::Pending | DeployState::Synced => {
                unreachable!("deploy loop exits only on a terminal state")
            }
        }
    }

    async fn sync(&self, config: &DeploymentConfig, reporter: &dyn Reporter) -> DeployState {
        if let Err(error) = check_preconditions(config) {
            return DeployState::Failed {
                error,
                remote_mutated: false,
            };
        }

        reporter.info("Uploading files to S3...");
        match self.storage.sync(&config.sync_request()).await {
            Ok(()) => {
                reporter.success("Files uploaded to S3");
                DeployState::Synced
            }
            Err(error) => DeployState::Failed {
                error,
                remote_mutated: false,
            },
        }
    }

    async fn invalidate(&self, config: &DeploymentConfig, reporter: &dyn Reporter) -> DeployState {
        reporter.info("Invalidating CloudFront cache...");
        let caller_reference = format!("sitepush-{}", Utc::now().timestamp_millis());
        let request = config.invalidation_request(caller_reference);

        match self.cdn.invalidate(&request).await {
            Ok(invalidation) => {
                reporter.success(&format!(
                    "CloudFront cache invalidation created: {}",
                    invalidation.id
                ));
                DeployState::Invalidated(invalidation)
            }
            Err(error) => {
                reporter.warning(&format!(
                    "Files in s3://{} are already updated; re-running the deploy retries the invalidation",
                    config.bucket()
                ));
                DeployState::Failed {
                    error,
                    remote_mutated: true,
                }
            }
        }
    }
}

/// Checked before any remote call
fn check_preconditions(config: &DeploymentConfig) -> Result<(), Error> {
    let dir = config.artifact_dir();
    if !dir.is_dir() {
        return Err(Error::MissingArtifact(dir.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Silent;
    use async_trait::async_trait;
    use sitepush_core::{InvalidationRequest, SyncRequest};
    use std::cell::RefCell;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeStorage {
        calls: AtomicUsize,
        requests: Mutex<Vec<SyncRequest>>,
        failure: Option<String>,
    }

    impl FakeStorage {
        fn failing(message: &str) -> Self {
            Self {
                failure: Some(message.to_string()),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObjectStorage for FakeStorage {
        async fn sync(&self, request: &SyncRequest) -> sitepush_core::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            match &self.failure {
                Some(message) => Err(Error::sync(&request.bucket, message.clone())),
                None => Ok(()),
            }
        }
    }

    /// Answers every request with the same raw CLI output
    struct FakeCdn {
        calls: AtomicUsize,
        requests: Mutex<Vec<InvalidationRequest>>,
        response: String,
    }

    impl FakeCdn {
        fn answering(response: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                response: response.to_string(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CdnInvalidator for FakeCdn {
        async fn invalidate(
            &self,
            request: &InvalidationRequest,
        ) -> sitepush_core::Result<Invalidation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            Invalidation::from_cli_output(&self.response, &request.distribution_id)
        }
    }

    #[derive(Default)]
    struct Recorder {
        lines: RefCell<Vec<(&'static str, String)>>,
    }

    impl Recorder {
        fn levels(&self) -> Vec<&'static str> {
            self.lines.borrow().iter().map(|(level, _)| *level).collect()
        }

        fn contains(&self, needle: &str) -> bool {
            self.lines.borrow().iter().any(|(_, line)| line.contains(needle))
        }
    }

    impl Reporter for Recorder {
        fn info(&self, message: &str) {
            self.lines.borrow_mut().push(("info", message.to_string()));
        }
        fn success(&self, message: &str) {
            self.lines.borrow_mut().push(("success", message.to_string()));
        }
        fn warning(&self, message: &str) {
            self.lines.borrow_mut().push(("warning", message.to_string()));
        }
        fn error(&self, message: &str) {
            self.lines.borrow_mut().push(("error", message.to_string()));
        }
    }

    fn config_in(dir: &std::path::Path) -> DeploymentConfig {
        DeploymentConfig::new("site-bucket", "E123ABC")
            .unwrap()
            .with_artifact_dir(dir)
    }

    #[tokio::test]
    async fn test_successful_deploy_echoes_invalidation_id() {
        let dist = tempfile::tempdir().unwrap();
        let storage = FakeStorage::default();
        let cdn = FakeCdn::answering(r#"{"Invalidation":{"Id":"INV99"}}"#);
        let reporter = Recorder::default();

        let result = Orchestrator::new(&storage, &cdn)
            .deploy(config_in(dist.path()), &reporter)
            .await;

        assert!(result.is_success());
        assert_eq!(result.invalidation_id(), Some("INV99"));
        assert!(result.error().is_none());
        assert_eq!(result.exit_code(), 0);
        assert_eq!(storage.calls(), 1);
        assert_eq!(cdn.calls(), 1);
        assert_eq!(reporter.levels(), vec!["info", "success", "info", "success"]);
        assert!(reporter.contains("INV99"));
    }

    #[tokio::test]
    async fn test_requests_carry_config_values() {
        let dist = tempfile::tempdir().unwrap();
        let storage = FakeStorage::default();
        let cdn = FakeCdn::answering(r#"{"Invalidation":{"Id":"I1"}}"#);

        Orchestrator::new(&storage, &cdn)
            .deploy(config_in(dist.path()), &Silent)
            .await;

        let sync = storage.requests.lock().unwrap()[0].clone();
        assert_eq!(sync.bucket, "site-bucket");
        assert_eq!(sync.source, dist.path());
        assert!(sync.delete_stale);
        assert_eq!(sync.cache_control, "public,max-age=31536000,immutable");

        let invalidation = cdn.requests.lock().unwrap()[0].clone();
        assert_eq!(invalidation.distribution_id, "E123ABC");
        assert_eq!(invalidation.paths, vec!["/*".to_string()]);
        assert!(invalidation.caller_reference.starts_with("sitepush-"));
    }

    #[tokio::test]
    async fn test_missing_artifact_makes_no_remote_calls() {
        let root = tempfile::tempdir().unwrap();
        let storage = FakeStorage::default();
        let cdn = FakeCdn::answering(r#"{"Invalidation":{"Id":"I1"}}"#);

        let result = Orchestrator::new(&storage, &cdn)
            .deploy(config_in(&root.path().join("dist")), &Silent)
            .await;

        assert!(matches!(result.error(), Some(Error::MissingArtifact(_))));
        assert_eq!(storage.calls(), 0);
        assert_eq!(cdn.calls(), 0);
    }

    #[tokio::test]
    async fn test_artifact_path_that_is_a_file_is_missing() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("dist");
        std::fs::write(&file, "not a directory").unwrap();
        let storage = FakeStorage::default();
        let cdn = FakeCdn::answering(r#"{"Invalidation":{"Id":"I1"}}"#);

        let result = Orchestrator::new(&storage, &cdn)
            .deploy(config_in(&file), &Silent)
            .await;

        assert!(matches!(result.error(), Some(Error::MissingArtifact(_))));
        assert_eq!(storage.calls(), 0);
    }

    #[tokio::test]
    async fn test_sync_failure_skips_invalidation() {
        let dist = tempfile::tempdir().unwrap();
        let storage = FakeStorage::failing("AccessDenied");
        let cdn = FakeCdn::answering(r#"{"Invalidation":{"Id":"I1"}}"#);
        let reporter = Recorder::default();

        let result = Orchestrator::new(&storage, &cdn)
            .deploy(config_in(dist.path()), &reporter)
            .await;

        assert!(!result.is_success());
        assert!(result.invalidation_id().is_none());
        assert!(matches!(result.error(), Some(Error::Sync { .. })));
        assert!(matches!(
            result,
            sitepush_core::DeploymentResult::Failed {
                remote_mutated: false,
                ..
            }
        ));
        assert_eq!(storage.calls(), 1);
        assert_eq!(cdn.calls(), 0);
        assert_eq!(reporter.levels(), vec!["info"]);
    }

    #[tokio::test]
    async fn test_missing_invalidation_id_is_failure() {
        let dist = tempfile::tempdir().unwrap();
        let storage = FakeStorage::default();
        let cdn = FakeCdn::answering(r#"{"Invalidation":{"Status":"InProgress"}}"#);
        let reporter = Recorder::default();

        let result = Orchestrator::new(&storage, &cdn)
            .deploy(config_in(dist.path()), &reporter)
            .await;

        assert!(result.invalidation_id().is_none());
        assert!(matches!(result.error(), Some(Error::Invalidation { .. })));
        assert!(matches!(
            result,
            sitepush_core::DeploymentResult::Failed {
                remote_mutated: true,
                ..
            }
        ));
        assert_eq!(result.exit_code(), 21);
        assert!(reporter.contains("already updated"));
    }

    #[tokio::test]
    async fn test_unparsable_invalidation_response_is_failure() {
        let dist = tempfile::tempdir().unwrap();
        let storage = FakeStorage::default();
        let cdn = FakeCdn::answering("<html>502</html>");

        let result = Orchestrator::new(&storage, &cdn)
            .deploy(config_in(dist.path()), &Silent)
            .await;

        assert!(matches!(result.error(), Some(Error::Invalidation { .. })));
        assert_eq!(storage.calls(), 1);
        assert_eq!(cdn.calls(), 1);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DeployState::Pending.is_terminal());
        assert!(!DeployState::Synced.is_terminal());
        assert!(
            DeployState::Invalidated(Invalidation {
                id: "I1".to_string(),
                status: None,
                create_time: None,
            })
            .is_terminal()
        );
        assert!(
            DeployState::Failed {
                error: Error::sync("b", "x"),
                remote_mutated: false
            }
            .is_terminal()
        );
    }
}
