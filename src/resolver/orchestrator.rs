// Tiered orchestrator - walks the strategy ladder for one request
//
// Per run:
// 1. Resolve credential candidates (invalid user cookies reject the request)
// 2. For each tier: pace, new identity, fresh lease, invoke, release
// 3. Classify failures and pick the next tier, retry in place, or stop
//
// Attempts within a run are strictly sequential; runs share nothing mutable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::ResolverConfig;
use super::credentials::{Credential, CredentialStore};
use super::diagnostics::{analyze, FailureKind};
use super::errors::{InvokeError, PayloadDefect, ResolveError};
use super::fingerprint::FingerprintGenerator;
use super::invoker::{ExtractionInvoker, Invocation};
use super::lease::{LeaseStats, ResourceLease};
use super::models::{
    AttemptOutcome, AttemptRecord, ExtractionFailure, Operation, Provenance, Resolution, Target,
};
use super::strategy::{CredentialRequirement, Strategy};
use super::surface::ResolveRequest;

/// Last failed attempt, kept for the aggregated error
struct LastFailure {
    tier: usize,
    kind: FailureKind,
    diagnostic: String,
    exit_status: Option<i32>,
    defect: Option<PayloadDefect>,
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Retry,
    Advance { prefer_credentialed: bool },
    Terminate,
}

fn transition(kind: FailureKind, retries: u32, budget: u32) -> Transition {
    if kind.credentials_might_help() {
        Transition::Advance {
            prefer_credentialed: true,
        }
    } else if kind.is_retryable_in_place() && retries < budget {
        Transition::Retry
    } else if kind.is_terminal() {
        Transition::Terminate
    } else {
        Transition::Advance {
            prefer_credentialed: false,
        }
    }
}

/// Mutable state of one run
struct RunState {
    run_id: String,
    deadline: Instant,
    fingerprints: FingerprintGenerator,
    credentials: Vec<Arc<Credential>>,
    credential_cursor: usize,
    tried: Vec<bool>,
    records: Vec<AttemptRecord>,
    invocations: usize,
    budget_exhausted: bool,
    last: Option<LastFailure>,
}

impl RunState {
    fn current_credential(&self) -> Option<Arc<Credential>> {
        self.credentials.get(self.credential_cursor).cloned()
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Drives the strategy ladder through an [`ExtractionInvoker`]
pub struct TieredOrchestrator {
    strategies: Vec<Strategy>,
    invoker: Arc<dyn ExtractionInvoker>,
    credentials: CredentialStore,
    config: ResolverConfig,
    lease_stats: Arc<LeaseStats>,
}

impl TieredOrchestrator {
    pub fn new(
        invoker: Arc<dyn ExtractionInvoker>,
        credentials: CredentialStore,
        config: ResolverConfig,
    ) -> Self {
        Self {
            strategies: Strategy::default_tiers(),
            invoker,
            credentials,
            config,
            lease_stats: Arc::new(LeaseStats::default()),
        }
    }

    /// Replace the ladder; tiers are ordered by rank, ties keep their order.
    pub fn with_strategies(mut self, mut strategies: Vec<Strategy>) -> Self {
        strategies.sort_by_key(|s| s.rank);
        self.strategies = strategies;
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn lease_stats(&self) -> &Arc<LeaseStats> {
        &self.lease_stats
    }

    /// Run one request to completion.
    ///
    /// `user_credential` must already be canonical Netscape text.
    pub async fn resolve(
        &self,
        target: &Target,
        operation: &Operation,
        user_credential: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        let candidates = self.credentials.resolve(user_credential)?;
        let lease = ResourceLease::for_run(
            self.config.temp_root.as_deref(),
            Arc::clone(&self.lease_stats),
        )?;

        let mut state = RunState {
            run_id: lease.run_id(),
            deadline: Instant::now() + self.config.total_budget,
            fingerprints: FingerprintGenerator::new(),
            credentials: candidates
                .iter()
                .filter_map(|c| c.credential().cloned())
                .collect(),
            credential_cursor: 0,
            tried: vec![false; self.strategies.len()],
            records: Vec::new(),
            invocations: 0,
            budget_exhausted: false,
            last: None,
        };

        info!(
            run_id = %state.run_id,
            target = %target,
            operation = operation.name(),
            tiers = self.strategies.len(),
            credentials = state.credentials.len(),
            "Starting extraction run"
        );

        let result = self
            .walk(&mut state, &lease, target, operation, cancel)
            .await;
        lease.close();

        match &result {
            Ok(resolution) => info!(
                run_id = %state.run_id,
                tier = resolution.provenance.tier,
                strategy = %resolution.provenance.strategy,
                attempts = resolution.provenance.attempts,
                "Extraction succeeded"
            ),
            Err(e) => warn!(
                run_id = %state.run_id,
                kind = ?e.failure_kind(),
                attempts = state.invocations,
                "Extraction failed: {}",
                e
            ),
        }
        result
    }

    /// Validate an inbound request and run it.
    pub async fn resolve_request(
        &self,
        request: &ResolveRequest,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        let valid = request.validate()?;
        self.resolve(
            &valid.target,
            &valid.operation,
            valid.credential.as_deref(),
            cancel,
        )
        .await
    }

    async fn walk(
        &self,
        state: &mut RunState,
        lease: &ResourceLease,
        target: &Target,
        operation: &Operation,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        let mut current = self.next_tier(&state.tried, false);
        let mut retries = 0u32;

        while let Some(tier) = current {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }

            let strategy = &self.strategies[tier];
            state.tried[tier] = true;

            let credential = if strategy.credential.accepts_credential() {
                state.current_credential()
            } else {
                None
            };

            if strategy.credential == CredentialRequirement::Required && credential.is_none() {
                info!(
                    run_id = %state.run_id,
                    tier,
                    strategy = %strategy.name,
                    "Skipping tier: no credential available"
                );
                state.records.push(AttemptRecord {
                    tier,
                    strategy: strategy.name.clone(),
                    retry: 0,
                    outcome: AttemptOutcome::Skipped,
                    used_credential: None,
                    elapsed: Duration::ZERO,
                });
                current = self.next_tier(&state.tried, false);
                retries = 0;
                continue;
            }

            if state.invocations > 0 {
                self.pace(state, cancel).await?;
            }

            let remaining = state.remaining();
            if remaining.is_zero() {
                warn!(run_id = %state.run_id, "Run budget exhausted");
                state.budget_exhausted = true;
                break;
            }

            let identity = state.fingerprints.generate();
            let geo_country = strategy
                .geo_bypass
                .then(|| state.fingerprints.geo_country());

            let resources = lease.acquire_attempt(credential.as_deref())?;
            let started = Instant::now();
            let invocation = Invocation {
                target,
                operation,
                strategy,
                identity: &identity,
                credential_file: resources.credential_path(),
                cache_dir: resources.cache_dir.path(),
                geo_country,
                timeout: strategy.timeout.min(remaining),
                cancel,
            };
            let outcome = self.invoker.invoke(invocation).await;
            resources.release();

            let elapsed = started.elapsed();
            state.invocations += 1;
            let used_credential = credential.as_ref().map(|c| c.source());

            let failure = match outcome {
                Ok(result) => match result.payload {
                    Some(payload) => {
                        state.records.push(AttemptRecord {
                            tier,
                            strategy: strategy.name.clone(),
                            retry: retries,
                            outcome: AttemptOutcome::Succeeded,
                            used_credential,
                            elapsed,
                        });
                        return Ok(Resolution {
                            payload,
                            provenance: Provenance {
                                tier,
                                strategy: strategy.name.clone(),
                                attempts: state.invocations,
                            },
                            attempts: std::mem::take(&mut state.records),
                        });
                    }
                    None => LastFailure {
                        tier,
                        kind: analyze(&result.diagnostic, result.exit_status).kind,
                        diagnostic: result.diagnostic,
                        exit_status: result.exit_status,
                        defect: result.defect,
                    },
                },
                Err(InvokeError::Timeout(limit)) => LastFailure {
                    tier,
                    kind: FailureKind::Timeout,
                    diagnostic: InvokeError::Timeout(limit).to_string(),
                    exit_status: None,
                    defect: None,
                },
                Err(InvokeError::Launch { program, reason }) => {
                    return Err(ResolveError::ProcessLaunchFailure { program, reason });
                }
                Err(InvokeError::Cancelled) => return Err(ResolveError::Cancelled),
            };

            let kind = failure.kind;
            warn!(
                run_id = %state.run_id,
                tier,
                strategy = %strategy.name,
                retry = retries,
                %kind,
                with_cookies = used_credential.is_some(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Attempt failed"
            );
            state.records.push(AttemptRecord {
                tier,
                strategy: strategy.name.clone(),
                retry: retries,
                outcome: AttemptOutcome::Failed(kind),
                used_credential,
                elapsed,
            });
            state.last = Some(failure);

            match transition(kind, retries, strategy.retry_budget) {
                Transition::Retry => {
                    // Same strategy and credential, fresh identity on the next pass
                    retries += 1;
                }
                Transition::Terminate => {
                    return Err(self.failure(state, true).into());
                }
                Transition::Advance {
                    prefer_credentialed,
                } => {
                    if prefer_credentialed && used_credential.is_some() {
                        state.credential_cursor += 1;
                    }
                    current = self.next_tier(&state.tried, prefer_credentialed);
                    retries = 0;
                }
            }
        }

        Err(self.failure(state, false).into())
    }

    /// Jittered delay between attempts, bounded by the run budget
    async fn pace(
        &self,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<(), ResolveError> {
        let delay = state
            .fingerprints
            .pacing_delay(self.config.pacing_min, self.config.pacing_max)
            .min(state.remaining());
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(ResolveError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Lowest-ranked untried tier; credential-bearing tiers first when preferred.
    fn next_tier(&self, tried: &[bool], prefer_credentialed: bool) -> Option<usize> {
        let count = self.strategies.len();
        let untried = || (0..count).filter(move |&i| !tried[i]);
        if prefer_credentialed {
            if let Some(i) =
                untried().find(|&i| self.strategies[i].credential.accepts_credential())
            {
                return Some(i);
            }
        }
        untried().next()
    }

    fn failure(&self, state: &mut RunState, terminal: bool) -> ExtractionFailure {
        let attempts = std::mem::take(&mut state.records);

        let Some(last) = state.last.take() else {
            // Nothing ran: the budget was spent before the first attempt, or every
            // tier needed a missing credential.
            let kind = if state.budget_exhausted || attempts.is_empty() {
                FailureKind::Timeout
            } else {
                FailureKind::AuthRequired
            };
            let last_tier = attempts.last().map(|r| Provenance {
                tier: r.tier,
                strategy: r.strategy.clone(),
                attempts: 0,
            });
            return ExtractionFailure {
                kind,
                message: kind.description().to_string(),
                suggestions: kind.suggestions(),
                detail: None,
                diagnostic: String::new(),
                defect: None,
                provenance: last_tier,
                attempts,
                terminal,
            };
        };

        let diagnosis = analyze(&last.diagnostic, last.exit_status);
        let mut message = last.kind.description().to_string();
        if let Some(defect) = &last.defect {
            message = format!("{} ({})", message, defect);
        }

        ExtractionFailure {
            kind: last.kind,
            message,
            suggestions: last.kind.suggestions(),
            detail: diagnosis.context,
            diagnostic: last.diagnostic,
            defect: last.defect,
            provenance: Some(Provenance {
                tier: last.tier,
                strategy: self.strategies[last.tier].name.clone(),
                attempts: state.invocations,
            }),
            attempts,
            terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::credentials::tests::netscape_jar;
    use crate::resolver::credentials::CredentialSource;
    use crate::resolver::models::{AttemptResult, DirectUrl, FormatSelector, Payload};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Scripted step returned by the fake invoker
    #[derive(Clone)]
    enum Step {
        Ok(&'static str),
        Fail(&'static str),
        Timeout,
        Launch,
        /// Cancels the run token, then reports cancellation
        Cancel(CancellationToken),
    }

    #[derive(Debug, Clone)]
    struct Seen {
        strategy: String,
        user_agent: String,
        credential: Option<PathBuf>,
        credential_existed: bool,
        cache_existed: bool,
    }

    struct ScriptedInvoker {
        steps: Mutex<VecDeque<Step>>,
        seen: Mutex<Vec<Seen>>,
    }

    impl ScriptedInvoker {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<Seen> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExtractionInvoker for ScriptedInvoker {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, inv: Invocation<'_>) -> Result<AttemptResult, InvokeError> {
            self.seen.lock().unwrap().push(Seen {
                strategy: inv.strategy.name.clone(),
                user_agent: inv.identity.user_agent.clone(),
                credential: inv.credential_file.map(|p| p.to_path_buf()),
                credential_existed: inv.credential_file.is_some_and(|p| p.exists()),
                cache_existed: inv.cache_dir.is_dir(),
            });
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Fail("ERROR: script exhausted"));
            match step {
                Step::Ok(url) => Ok(AttemptResult {
                    payload: DirectUrl::from_engine_output(url).map(Payload::DirectUrl),
                    diagnostic: String::new(),
                    exit_status: Some(0),
                    defect: None,
                }),
                Step::Fail(stderr) => Ok(AttemptResult {
                    payload: None,
                    diagnostic: stderr.to_string(),
                    exit_status: Some(1),
                    defect: None,
                }),
                Step::Timeout => Err(InvokeError::Timeout(inv.timeout)),
                Step::Launch => Err(InvokeError::Launch {
                    program: "yt-dlp".to_string(),
                    reason: "No such file or directory".to_string(),
                }),
                Step::Cancel(token) => {
                    token.cancel();
                    Err(InvokeError::Cancelled)
                }
            }
        }
    }

    const BOT: &str = "ERROR: [youtube] x: Sign in to confirm you're not a bot";
    const AGE: &str = "ERROR: [youtube] x: Sign in to confirm your age. \
                       This video may be inappropriate for some users.";
    const GONE: &str = "ERROR: [youtube] x: Video unavailable. \
                        This video has been removed by the uploader";
    const RESET: &str = "ERROR: [youtube] x: Unable to download API page: \
                         [Errno 104] Connection reset by peer";

    fn config(root: &std::path::Path) -> ResolverConfig {
        ResolverConfig::default()
            .with_pacing(Duration::ZERO, Duration::ZERO)
            .with_temp_root(Some(root.to_path_buf()))
            .with_cookie_files(Vec::new())
    }

    fn store_with_file_credential() -> CredentialStore {
        let cred = Credential::from_netscape(CredentialSource::File, &netscape_jar(0)).unwrap();
        CredentialStore::new(vec![cred])
    }

    fn target() -> Target {
        Target::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap()
    }

    fn direct() -> Operation {
        Operation::ResolveDirectUrl(FormatSelector::new("22").unwrap())
    }

    fn unwrap_failure(err: ResolveError) -> ExtractionFailure {
        match err {
            ResolveError::Extraction(f) => *f,
            other => panic!("expected extraction failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_tier_succeeds() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![Step::Ok("https://media/1")]);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            CredentialStore::default(),
            config(root.path()),
        );

        let res = orch
            .resolve(&target(), &direct(), None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(res.provenance.tier, 0);
        assert_eq!(res.provenance.strategy, "basic");
        assert_eq!(res.provenance.attempts, 1);
        assert_eq!(invoker.seen().len(), 1);
        assert!(invoker.seen()[0].cache_existed);
        assert!(matches!(res.payload, Payload::DirectUrl(_)));
    }

    #[tokio::test]
    async fn test_bot_detection_escalates_to_credentialed_tier() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![Step::Fail(BOT), Step::Ok("https://media/2")]);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            store_with_file_credential(),
            config(root.path()),
        );

        let res = orch
            .resolve(&target(), &direct(), None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(res.provenance.tier, 1);
        assert_eq!(res.provenance.attempts, 2);
        let seen = invoker.seen();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].credential.is_none());
        assert!(seen[1].credential_existed);
        assert!(!seen[1].credential.as_ref().unwrap().exists());
        assert_eq!(res.attempts[1].used_credential, Some(CredentialSource::File));
    }

    #[tokio::test]
    async fn test_age_restriction_is_terminal() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![Step::Fail(AGE), Step::Ok("https://never")]);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            store_with_file_credential(),
            config(root.path()),
        );

        let err = orch
            .resolve(&target(), &direct(), None, &CancellationToken::new())
            .await
            .unwrap_err();
        let failure = unwrap_failure(err);

        assert_eq!(failure.kind, FailureKind::RegionOrAgeRestricted);
        assert!(failure.terminal);
        assert_eq!(invoker.seen().len(), 1);
        assert_eq!(failure.provenance.unwrap().tier, 0);
    }

    #[tokio::test]
    async fn test_all_unknown_reports_last_diagnostic() {
        let root = tempfile::tempdir().unwrap();
        let steps = (0..5)
            .map(|i| Step::Fail(["ERROR: a", "ERROR: b", "ERROR: c", "ERROR: d", "ERROR: e"][i]))
            .collect();
        let invoker = ScriptedInvoker::new(steps);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            store_with_file_credential(),
            config(root.path()),
        );

        let failure = unwrap_failure(
            orch.resolve(&target(), &direct(), None, &CancellationToken::new())
                .await
                .unwrap_err(),
        );

        assert_eq!(failure.kind, FailureKind::Unknown);
        assert!(!failure.terminal);
        assert_eq!(failure.diagnostic, "ERROR: e");
        assert_eq!(failure.detail.as_deref(), Some("ERROR: e"));
        assert_eq!(failure.provenance.as_ref().unwrap().strategy, "fallback");
        assert_eq!(invoker.seen().len(), orch.strategies().len());
    }

    #[tokio::test]
    async fn test_content_unavailable_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut outcomes = Vec::new();
        for _ in 0..2 {
            let invoker = ScriptedInvoker::new(vec![Step::Fail(GONE)]);
            let orch = TieredOrchestrator::new(
            invoker.clone(),
            store_with_file_credential(),
            config(root.path()),
        );
            let failure = unwrap_failure(
                orch.resolve(
                    &target(),
                    &Operation::FetchMetadata,
                    None,
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err(),
            );
            outcomes.push((failure.kind, invoker.seen().len()));
        }
        assert_eq!(outcomes[0], outcomes[1]);
        assert_eq!(outcomes[0], (FailureKind::ContentUnavailable, 1));
    }

    #[tokio::test]
    async fn test_timeout_retries_same_tier_with_fresh_identity() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![Step::Timeout, Step::Ok("https://media/3")]);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            CredentialStore::default(),
            config(root.path()),
        );

        let res = orch
            .resolve(&target(), &direct(), None, &CancellationToken::new())
            .await
            .unwrap();

        let seen = invoker.seen();
        assert_eq!(res.provenance.tier, 0);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].strategy, seen[1].strategy);
        assert_ne!(seen[0].user_agent, seen[1].user_agent);
        assert_eq!(res.attempts[1].retry, 1);
    }

    #[tokio::test]
    async fn test_retry_budget_then_advance() {
        let root = tempfile::tempdir().unwrap();
        let invoker =
            ScriptedInvoker::new(vec![Step::Timeout, Step::Timeout, Step::Ok("https://m")]);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            CredentialStore::default(),
            config(root.path()),
        );

        let res = orch
            .resolve(&target(), &direct(), None, &CancellationToken::new())
            .await
            .unwrap();

        // basic twice, cookies skipped (no credential), enhanced succeeds
        assert_eq!(res.provenance.strategy, "enhanced");
        assert_eq!(res.provenance.attempts, 3);
        assert!(res
            .attempts
            .iter()
            .any(|r| r.strategy == "cookies" && r.outcome == AttemptOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_credentials_rotate_after_bot_detection() {
        let root = tempfile::tempdir().unwrap();
        let invoker =
            ScriptedInvoker::new(vec![Step::Fail(BOT), Step::Fail(BOT), Step::Ok("https://m")]);
        let env =
            Credential::from_netscape(CredentialSource::Environment, &netscape_jar(0)).unwrap();
        let file = Credential::from_netscape(CredentialSource::File, &netscape_jar(0)).unwrap();
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            CredentialStore::new(vec![file, env]),
            config(root.path()),
        );

        let res = orch
            .resolve(&target(), &direct(), None, &CancellationToken::new())
            .await
            .unwrap();

        let used: Vec<_> = res.attempts.iter().map(|r| r.used_credential).collect();
        assert_eq!(
            used,
            vec![None, Some(CredentialSource::Environment), Some(CredentialSource::File)]
        );
    }

    #[tokio::test]
    async fn test_no_credentials_and_all_required() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![]);
        let only_cookies = Strategy::default_tiers().remove(1);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            CredentialStore::default(),
            config(root.path()),
        )
        .with_strategies(vec![only_cookies]);

        let failure = unwrap_failure(
            orch.resolve(&target(), &direct(), None, &CancellationToken::new())
                .await
                .unwrap_err(),
        );
        assert_eq!(failure.kind, FailureKind::AuthRequired);
        assert!(invoker.seen().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_user_credential_rejected_before_any_tier() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![Step::Ok("https://m")]);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            CredentialStore::default(),
            config(root.path()),
        );

        let empty_jar = Some("# Netscape HTTP Cookie File\n");
        let err = orch
            .resolve(&target(), &direct(), empty_jar, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidCredential { .. }));
        assert!(invoker.seen().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_request_with_user_cookies() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![Step::Fail(BOT), Step::Ok("https://m")]);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            CredentialStore::default(),
            config(root.path()),
        );
        let request = ResolveRequest {
            url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            format_id: Some("140".to_string()),
            cookies: Some("SID=a; HSID=b; SSID=c; APISID=d; SAPISID=e".to_string()),
            operation: None,
        };

        let res = orch
            .resolve_request(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(res.provenance.strategy, "cookies");
        assert_eq!(
            res.attempts[1].used_credential,
            Some(CredentialSource::UserSupplied)
        );
    }

    #[tokio::test]
    async fn test_launch_failure_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![Step::Launch, Step::Ok("https://m")]);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            CredentialStore::default(),
            config(root.path()),
        );

        let err = orch
            .resolve(&target(), &direct(), None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::ProcessLaunchFailure { .. }));
        assert_eq!(invoker.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_run_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let invoker =
            ScriptedInvoker::new(vec![Step::Cancel(cancel.clone()), Step::Ok("https://m")]);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            store_with_file_credential(),
            config(root.path()),
        );

        let err = orch.resolve(&target(), &direct(), None, &cancel).await.unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled));
        assert_eq!(invoker.seen().len(), 1);
        assert_eq!(orch.lease_stats().outstanding(), 0);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_zero_budget_attempts_nothing() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![Step::Ok("https://m")]);
        let cfg = config(root.path()).with_total_budget(Duration::ZERO);
        let orch = TieredOrchestrator::new(invoker.clone(), CredentialStore::default(), cfg);

        let failure = unwrap_failure(
            orch.resolve(&target(), &direct(), None, &CancellationToken::new())
                .await
                .unwrap_err(),
        );
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(invoker.seen().is_empty());
    }

    #[tokio::test]
    async fn test_leases_balance_over_many_runs() {
        let root = tempfile::tempdir().unwrap();
        let stats = Arc::new(LeaseStats::default());

        let mut cancelled = 0;
        for run in 0..1000usize {
            let cancel = CancellationToken::new();
            let steps = match run % 7 {
                0 => vec![Step::Ok("https://m")],
                1 => vec![Step::Fail(BOT), Step::Ok("https://m")],
                2 => vec![Step::Timeout, Step::Launch],
                3 => vec![Step::Fail(GONE)],
                // Cancelled mid-run, on the credentialed tier
                4 => vec![Step::Fail(BOT), Step::Cancel(cancel.clone())],
                5 => vec![Step::Fail(RESET), Step::Cancel(cancel.clone())],
                _ => vec![Step::Fail("ERROR: ?"); 6],
            };
            let invoker = ScriptedInvoker::new(steps);
            let mut orch =
                TieredOrchestrator::new(invoker, store_with_file_credential(), config(root.path()));
            orch.lease_stats = Arc::clone(&stats);
            let result = orch.resolve(&target(), &direct(), None, &cancel).await;
            if matches!(result, Err(ResolveError::Cancelled)) {
                cancelled += 1;
            }
        }

        let expected = (0..1000usize).filter(|r| matches!(r % 7, 4 | 5)).count();
        assert_eq!(cancelled, expected);
        assert!(stats.acquired() > 1000);
        assert_eq!(stats.acquired(), stats.released());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_budget_spent_after_skipped_tier_is_timeout() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![Step::Ok("https://m")]);
        let ladder = vec![
            Strategy::default_tiers().remove(1),
            Strategy::new("plain", 5),
        ];
        let cfg = config(root.path()).with_total_budget(Duration::ZERO);
        let orch = TieredOrchestrator::new(invoker.clone(), CredentialStore::default(), cfg)
            .with_strategies(ladder);

        let failure = unwrap_failure(
            orch.resolve(&target(), &direct(), None, &CancellationToken::new())
                .await
                .unwrap_err(),
        );
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.attempts.len(), 1);
        assert_eq!(failure.attempts[0].outcome, AttemptOutcome::Skipped);
        assert!(invoker.seen().is_empty());
    }

    #[tokio::test]
    async fn test_transient_retries_then_advances() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![
            Step::Fail(RESET),
            Step::Fail(RESET),
            Step::Ok("https://media/4"),
        ]);
        let orch = TieredOrchestrator::new(
            invoker.clone(),
            CredentialStore::default(),
            config(root.path()),
        );

        let res = orch
            .resolve(&target(), &direct(), None, &CancellationToken::new())
            .await
            .unwrap();

        let seen = invoker.seen();
        let strategies: Vec<&str> = seen.iter().map(|s| s.strategy.as_str()).collect();
        assert_eq!(strategies, vec!["basic", "basic", "enhanced"]);
        assert_ne!(seen[0].user_agent, seen[1].user_agent);

        let outcomes: Vec<_> = res.attempts.iter().map(|r| (r.retry, &r.outcome)).collect();
        assert_eq!(
            outcomes,
            vec![
                (0, &AttemptOutcome::Failed(FailureKind::Transient)),
                (1, &AttemptOutcome::Failed(FailureKind::Transient)),
                (0, &AttemptOutcome::Skipped),
                (0, &AttemptOutcome::Succeeded),
            ]
        );
    }

    #[tokio::test]
    async fn test_pacing_is_bounded_by_budget() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ScriptedInvoker::new(vec![Step::Fail("ERROR: a")]);
        let cfg = config(root.path())
            .with_pacing(Duration::from_secs(30), Duration::from_secs(60))
            .with_total_budget(Duration::from_millis(300));
        let orch = TieredOrchestrator::new(invoker.clone(), CredentialStore::default(), cfg);

        let started = Instant::now();
        let failure = unwrap_failure(
            orch.resolve(&target(), &direct(), None, &CancellationToken::new())
                .await
                .unwrap_err(),
        );

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(invoker.seen().len(), 1);
        assert_eq!(failure.kind, FailureKind::Unknown);
        assert_eq!(orch.lease_stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_unusable_temp_root_fails_before_any_tier() {
        let root = tempfile::tempdir().unwrap();
        let not_a_dir = root.path().join("file");
        std::fs::write(&not_a_dir, b"x").unwrap();
        let invoker = ScriptedInvoker::new(vec![Step::Ok("https://m")]);
        let cfg = config(root.path()).with_temp_root(Some(not_a_dir.join("runs")));
        let orch = TieredOrchestrator::new(invoker.clone(), CredentialStore::default(), cfg);

        let err = orch
            .resolve(&target(), &direct(), None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Resource(_)));
        assert!(invoker.seen().is_empty());
        assert_eq!(orch.lease_stats().acquired(), 0);
    }

    #[test]
    fn test_transitions() {
        use FailureKind::*;
        assert_eq!(transition(Timeout, 0, 1), Transition::Retry);
        assert_eq!(transition(Transient, 0, 1), Transition::Retry);
        assert_eq!(
            transition(BotDetectionSuspected, 0, 1),
            Transition::Advance { prefer_credentialed: true }
        );
        assert_eq!(
            transition(Transient, 1, 1),
            Transition::Advance { prefer_credentialed: false }
        );
        assert_eq!(
            transition(AuthRequired, 0, 1),
            Transition::Advance { prefer_credentialed: true }
        );
        for kind in [ContentUnavailable, RegionOrAgeRestricted, FormatUnavailable] {
            assert_eq!(transition(kind, 0, 1), Transition::Terminate);
        }
        assert_eq!(
            transition(Unknown, 0, 1),
            Transition::Advance { prefer_credentialed: false }
        );
    }
}
