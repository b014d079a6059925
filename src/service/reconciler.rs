use crate::config::RetryConfig;
use crate::db::BackendAdapter;
use crate::error::{IsRetryable, ProvisionError};
use crate::types::{ConnectionDescriptor, DatabaseHandle, Outcome, Principal};
use backon::Retryable;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

/// Where a reconciliation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Init,
    ConnectivityVerified,
    PrincipalEnsured,
    DatabaseEnsured,
    PrivilegesGranted,
    Done,
    Aborted,
}

impl ReconcileState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReconcileState::Done | ReconcileState::Aborted)
    }
}

/// Operation names reported when a run aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    VerifyConnectivity,
    Prepare,
    EnsurePrincipal,
    EnsureDatabase,
    GrantPrivileges,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::VerifyConnectivity => "verify_connectivity",
            Step::Prepare => "prepare",
            Step::EnsurePrincipal => "ensure_principal",
            Step::EnsureDatabase => "ensure_database",
            Step::GrantPrivileges => "grant_privileges",
        })
    }
}

/// Result of a run that reached `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub descriptor: ConnectionDescriptor,
    pub database: DatabaseHandle,
    pub principal_outcome: Outcome,
    pub database_outcome: Outcome,
    pub privileges_outcome: Outcome,
}

/// Drives one adapter through
/// `Init → ConnectivityVerified → PrincipalEnsured → DatabaseEnsured →
/// PrivilegesGranted → Done`, aborting on the first non-transient failure.
///
/// Nothing is rolled back on abort; running again converges from whatever
/// the previous attempt left behind.
pub struct Reconciler<'a, A> {
    adapter: &'a A,
    retry: RetryConfig,
    span: Span,
    state: ReconcileState,
    history: Vec<ReconcileState>,
}

impl<'a, A: BackendAdapter> Reconciler<'a, A> {
    pub fn new(adapter: &'a A, retry: RetryConfig) -> Self {
        Self {
            adapter,
            retry,
            span: info_span!("reconcile", backend = %adapter.kind()),
            state: ReconcileState::Init,
            history: vec![ReconcileState::Init],
        }
    }

    /// Log every transition inside a caller-owned span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Every state visited by the last run, starting at `Init`.
    pub fn history(&self) -> &[ReconcileState] {
        &self.history
    }

    pub async fn run(&mut self, principal: &Principal) -> Result<Provisioned, ProvisionError> {
        let span = self.span.clone();
        self.drive(principal).instrument(span).await
    }

    async fn drive(&mut self, principal: &Principal) -> Result<Provisioned, ProvisionError> {
        self.state = ReconcileState::Init;
        self.history = vec![ReconcileState::Init];
        let adapter = self.adapter;
        let username = principal.username();
        let database = principal.database();

        if !adapter.verify_connectivity().await {
            let err = ProvisionError::Connectivity {
                backend: adapter.kind(),
                endpoint: adapter.target().endpoint(),
            };
            return Err(self.abort(Step::VerifyConnectivity, username, err));
        }
        self.advance(ReconcileState::ConnectivityVerified);

        self.step(Step::Prepare, username, || adapter.prepare())
            .await?;

        let principal_outcome = self
            .step(Step::EnsurePrincipal, username, || {
                adapter.ensure_principal(principal)
            })
            .await?;
        info!(username, outcome = %principal_outcome, "principal ensured");
        self.advance(ReconcileState::PrincipalEnsured);

        let database_outcome = self
            .step(Step::EnsureDatabase, username, || {
                adapter.ensure_database(&database)
            })
            .await?;
        info!(database = %database.name, outcome = %database_outcome, "database ensured");
        self.advance(ReconcileState::DatabaseEnsured);

        let privileges_outcome = self
            .step(Step::GrantPrivileges, username, || {
                adapter.grant_privileges(&database)
            })
            .await?;
        self.advance(ReconcileState::PrivilegesGranted);

        let descriptor = adapter.render_connection_descriptor(principal);
        self.advance(ReconcileState::Done);
        info!(username, database = %database.name, "provisioning complete");

        Ok(Provisioned {
            descriptor,
            database,
            principal_outcome,
            database_outcome,
            privileges_outcome,
        })
    }

    /// Run one remote step, retrying while the failure is classified transient.
    async fn step<T, E, F, Fut>(
        &mut self,
        step: Step,
        username: &str,
        op: F,
    ) -> Result<T, ProvisionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: IsRetryable + fmt::Display + Into<ProvisionError>,
    {
        op.retry(self.retry.policy())
            .when(|e: &E| e.is_retryable())
            .notify(|e: &E, dur: Duration| {
                warn!(%step, error = %e, "transient failure, retrying after {:?}", dur);
            })
            .await
            .map_err(|e| self.abort(step, username, e.into()))
    }

    fn advance(&mut self, next: ReconcileState) {
        debug!(from = ?self.state, to = ?next, "transition");
        self.state = next;
        self.history.push(next);
    }

    fn abort(&mut self, step: Step, username: &str, source: ProvisionError) -> ProvisionError {
        error!(%step, username, error = %source, "reconciliation aborted");
        self.advance(ReconcileState::Aborted);
        ProvisionError::aborted(step, username, source)
    }
}
