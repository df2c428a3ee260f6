//! Session state machine: setup, the funding poll, the transaction pipeline and
//! value refresh.
//!
//! Every operation resolves its failures into an outcome value and the session
//! notice. Session writes happen under a short lock between suspension points,
//! never across one.

use crate::error::{RuntimeError, WalletError};
use crate::session::{Flag, Notice, PipelineStage, SessionFlag, SessionState};
use crate::status::{self, StatusView};
use crate::wallet::{WalletAdapter, WalletProvider};
use crate::worker::ComputeHandle;
use ledger_client::{Config, NetworkConfig};
use parking_lot::Mutex;
use std::fmt::Display;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zkapp_lib::{AccountLookup, FeeConfig, Field, PublicKey, TxHash};

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub network: NetworkConfig,
    /// Account of the deployed contract.
    pub contract_address: PublicKey,
    pub fee: FeeConfig,
    /// Gap between funding lookups
    pub polling_interval: Duration,
    pub wallet_install_url: String,
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            network: config.network.clone(),
            contract_address: config.contract.zkapp_address.clone(),
            fee: config.fee_config(),
            polling_interval: config.polling_interval(),
            wallet_install_url: config.wallet.install_url.to_string(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    Ready { funded: bool, counter: Option<Field> },
    /// No wallet injected. Terminal for the session.
    WalletAbsent,
    /// Halted at a step; a later call resumes after the steps that completed.
    Incomplete(String),
    AlreadyComplete,
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Funded { attempts: u32 },
    AlreadyFunded,
    NotReady,
    Cancelled { attempts: u32 },
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted {
        hash: TxHash,
        explorer_url: Option<String>,
    },
    WalletDisconnected,
    AlreadyInFlight,
    NotReady,
    Failed { stage: PipelineStage, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated(Field),
    NotReady,
    Failed(String),
    AlreadyRunning,
}

/// Setup steps that already ran in this session.
#[derive(Debug, Default)]
struct SetupProgress {
    runtime_ready: bool,
    compiled: bool,
    bound: bool,
}

/// Orchestrates one zkApp session
pub struct Orchestrator {
    config: OrchestratorConfig,
    compute: ComputeHandle,
    wallet: WalletAdapter,
    state: Mutex<SessionState>,
    progress: Mutex<SetupProgress>,
    shutdown: CancellationToken,
}

fn setup_halt(step: &'static str) -> impl FnOnce(RuntimeError) -> String {
    move |e| {
        warn!("Setup halted while {} [{}]: {}", step, e.error_code(), e);
        format!("{step}: {e}")
    }
}

fn pipeline_failure(stage: PipelineStage, reason: impl Display) -> SubmitOutcome {
    error!("Transaction failed while {}: {}", stage, reason);
    SubmitOutcome::Failed {
        stage,
        reason: reason.to_string(),
    }
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, compute: ComputeHandle, wallet: WalletAdapter) -> Self {
        Self {
            config,
            compute,
            wallet,
            state: Mutex::new(SessionState::default()),
            progress: Mutex::new(SetupProgress::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Copy of the current session record.
    pub fn session(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn status(&self) -> StatusView {
        status::project(
            &self.session(),
            &self.config.network,
            &self.config.wallet_install_url,
        )
    }

    /// Signal teardown. Ends a running funding poll.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Shutting down orchestrator");
            self.shutdown.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn setup(&self) -> SetupOutcome {
        {
            let mut state = self.state.lock();
            if state.setup_complete {
                return SetupOutcome::AlreadyComplete;
            }
            if state.setup_in_progress {
                return SetupOutcome::AlreadyRunning;
            }
            state.setup_in_progress = true;
        }
        let _flag = SessionFlag::armed(&self.state, Flag::Setup);

        info!("Starting setup");
        match self.run_setup().await {
            Ok(outcome) => {
                info!("Setup finished: {:?}", outcome);
                outcome
            }
            Err(reason) => {
                self.state.lock().notice = Some(Notice::SetupIncomplete(reason.clone()));
                SetupOutcome::Incomplete(reason)
            }
        }
    }

    async fn run_setup(&self) -> Result<SetupOutcome, String> {
        let runtime_ready = self.progress.lock().runtime_ready;
        if !runtime_ready {
            info!("Loading proof runtime");
            self.compute
                .initialize_runtime()
                .await
                .map_err(setup_halt("loading proof runtime"))?;
            self.compute
                .set_network_endpoint(self.config.network.clone())
                .await
                .map_err(setup_halt("setting network endpoint"))?;
            self.progress.lock().runtime_ready = true;
            info!("Proof runtime ready");
        }

        if !self.wallet.is_present() {
            warn!("Could not find a wallet");
            let mut state = self.state.lock();
            state.wallet_detected = Some(false);
            state.setup_complete = true;
            state.notice = Some(Notice::WalletMissing);
            return Ok(SetupOutcome::WalletAbsent);
        }

        let address = self
            .wallet
            .request_accounts()
            .await
            .and_then(|accounts| accounts.into_iter().next().ok_or(WalletError::NoAccounts))
            .map_err(|e| {
                warn!("Account request failed [{}]: {}", e.error_code(), e);
                format!("requesting accounts: {e}")
            })?;
        let local = PublicKey::from_base58(&address)
            .map_err(|e| format!("requesting accounts: {e}"))?;
        info!("Using account {}", local);

        let funded = match self.compute.fetch_account_snapshot(local.clone()).await {
            AccountLookup::Found(_) => true,
            AccountLookup::NotFound => {
                info!("Account {} does not exist yet", local);
                false
            }
            AccountLookup::TransientError(e) => {
                warn!("Could not check account {}: {}", local, e);
                false
            }
        };

        let compiled = self.progress.lock().compiled;
        if !compiled {
            self.compute
                .load_program()
                .await
                .map_err(setup_halt("loading contract"))?;
            info!("Compiling zkApp");
            let key = self
                .compute
                .compile_program()
                .await
                .map_err(setup_halt("compiling contract"))?;
            self.progress.lock().compiled = true;
            debug!("Verification key {}", key.hash);
        }

        let contract = self.config.contract_address.clone();
        let bound = self.progress.lock().bound;
        if !bound {
            self.compute
                .bind_instance(contract.clone())
                .await
                .map_err(setup_halt("binding contract instance"))?;
            self.progress.lock().bound = true;
        }

        let (counter, notice) = match self.compute.fetch_account_snapshot(contract.clone()).await {
            AccountLookup::Found(_) => {
                let value = self
                    .compute
                    .read_observable()
                    .await
                    .map_err(setup_halt("reading counter"))?;
                info!("Current number in zkApp: {}", value);
                (Some(value), None)
            }
            AccountLookup::NotFound => {
                warn!("zkApp account {} not found", contract);
                (None, Some(Notice::ContractNotFound))
            }
            AccountLookup::TransientError(e) => {
                warn!("Could not fetch zkApp account {}: {}", contract, e);
                (None, Some(Notice::ContractUnavailable(e)))
            }
        };

        let mut state = self.state.lock();
        state.wallet_detected = Some(true);
        state.local_account_key = Some(local);
        state.contract_account_key = Some(contract);
        state.account_confirmed_funded |= funded;
        state.observed_counter_value = counter;
        state.notice = notice;
        state.setup_complete = true;

        Ok(SetupOutcome::Ready {
            funded: state.account_confirmed_funded,
            counter,
        })
    }

    /// Look the local account up until it exists, then mark it funded.
    ///
    /// The first lookup is immediate. Only teardown ends an unfunded poll.
    pub async fn poll_account_funding(&self) -> PollOutcome {
        let local = match self.begin_poll() {
            Ok(local) => local,
            Err(outcome) => return outcome,
        };
        let _flag = SessionFlag::armed(&self.state, Flag::Poll);

        let mut ticker = self.poll_ticker();
        let mut attempts = 0u32;

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return poll_cancelled(attempts),
                _ = ticker.tick() => {}
            }
            if let Some(outcome) = self.poll_once(&local, &mut attempts).await {
                return outcome;
            }
        }
    }

    /// Run the funding poll on the tokio runtime.
    ///
    /// The task only holds a weak reference between lookups, so dropping the
    /// last owner of the orchestrator ends the poll.
    pub fn spawn_funding_poll(self: &Arc<Self>) -> JoinHandle<PollOutcome> {
        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let claimed = self.begin_poll();
        let mut ticker = self.poll_ticker();

        tokio::spawn(async move {
            let local = match claimed {
                Ok(local) => local,
                Err(outcome) => return outcome,
            };
            let _flag = DetachedPollFlag(weak.clone());
            let mut attempts = 0u32;

            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => return poll_cancelled(attempts),
                    _ = ticker.tick() => {}
                }
                let Some(this) = weak.upgrade() else {
                    return poll_cancelled(attempts);
                };
                if let Some(outcome) = this.poll_once(&local, &mut attempts).await {
                    return outcome;
                }
            }
        })
    }

    /// Raise the poll flag, or say why no poll should start.
    fn begin_poll(&self) -> Result<PublicKey, PollOutcome> {
        let mut state = self.state.lock();
        if state.account_confirmed_funded {
            return Err(PollOutcome::AlreadyFunded);
        }
        if !state.is_ready() {
            return Err(PollOutcome::NotReady);
        }
        let Some(local) = state.local_account_key.clone() else {
            return Err(PollOutcome::NotReady);
        };
        if state.poll_in_progress {
            return Err(PollOutcome::AlreadyRunning);
        }
        state.poll_in_progress = true;

        info!(
            "Waiting for account {} to be funded (every {:?})",
            local, self.config.polling_interval
        );
        Ok(local)
    }

    fn poll_ticker(&self) -> Interval {
        let mut ticker = interval(self.config.polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// One funding lookup. `Some` ends the poll.
    async fn poll_once(&self, local: &PublicKey, attempts: &mut u32) -> Option<PollOutcome> {
        let lookup = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Some(poll_cancelled(*attempts)),
            lookup = self.compute.fetch_account_snapshot(local.clone()) => lookup,
        };
        *attempts += 1;

        match lookup {
            AccountLookup::Found(_) => {
                self.state.lock().account_confirmed_funded = true;
                info!("Account {} funded after {} lookup(s)", local, attempts);
                Some(PollOutcome::Funded { attempts: *attempts })
            }
            AccountLookup::NotFound => {
                debug!("Account {} not found (lookup {})", local, attempts);
                None
            }
            AccountLookup::TransientError(e) => {
                warn!("Lookup {} for {} failed: {}", attempts, local, e);
                None
            }
        }
    }

    /// Build, prove, serialize and submit one `update` call.
    pub async fn submit_transaction(&self) -> SubmitOutcome {
        let local = {
            let mut state = self.state.lock();
            if !state.account_confirmed_funded {
                return SubmitOutcome::NotReady;
            }
            if state.transaction_in_flight {
                return SubmitOutcome::AlreadyInFlight;
            }
            let Some(local) = state.local_account_key.clone() else {
                return SubmitOutcome::NotReady;
            };
            state.transaction_in_flight = true;
            local
        };
        let _flag = SessionFlag::armed(&self.state, Flag::InFlight);

        info!("Sending transaction");
        let outcome = self.run_pipeline(local).await;

        let mut state = self.state.lock();
        match &outcome {
            SubmitOutcome::Submitted { hash, .. } => {
                state.last_transaction = Some(hash.clone());
                state.notice = None;
            }
            SubmitOutcome::WalletDisconnected => {
                state.notice = Some(Notice::WalletDisconnected);
            }
            SubmitOutcome::Failed { stage, reason } => {
                state.notice = Some(Notice::TransactionFailed {
                    stage: *stage,
                    reason: reason.clone(),
                });
            }
            _ => {}
        }
        outcome
    }

    async fn run_pipeline(&self, local: PublicKey) -> SubmitOutcome {
        match self.compute.fetch_account_snapshot(local.clone()).await {
            AccountLookup::Found(_) => {}
            AccountLookup::NotFound => {
                return pipeline_failure(
                    PipelineStage::RefreshAccount,
                    format!("account {local} not found"),
                );
            }
            AccountLookup::TransientError(e) => {
                return pipeline_failure(PipelineStage::RefreshAccount, e);
            }
        }

        if let Err(e) = self.compute.build_state_mutation(local).await {
            return pipeline_failure(PipelineStage::Build, e);
        }

        info!("Creating proof");
        if let Err(e) = self.compute.prove_state_mutation().await {
            return pipeline_failure(PipelineStage::Prove, e);
        }

        let payload = match self.compute.serialize_transaction().await {
            Ok(payload) => payload,
            Err(e) => return pipeline_failure(PipelineStage::Serialize, e),
        };
        debug!("Transaction payload: {} bytes", payload.len());

        if !self.wallet.is_connected().await {
            warn!("Wallet is not connected; transaction not sent");
            return SubmitOutcome::WalletDisconnected;
        }

        match self.wallet.submit(payload, &self.config.fee).await {
            Ok(hash) => {
                let explorer_url = self.config.network.transaction_url(&hash);
                if let Some(url) = &explorer_url {
                    info!("See transaction at {}", url);
                }
                SubmitOutcome::Submitted { hash, explorer_url }
            }
            Err(e) => pipeline_failure(PipelineStage::Submit, e),
        }
    }

    /// Re-read the counter from freshly fetched ledger state.
    pub async fn refresh_observed_value(&self) -> RefreshOutcome {
        let (local, contract) = {
            let mut state = self.state.lock();
            let (Some(local), Some(contract)) = (
                state.local_account_key.clone(),
                state.contract_account_key.clone(),
            ) else {
                return RefreshOutcome::NotReady;
            };
            if !state.setup_complete {
                return RefreshOutcome::NotReady;
            }
            if state.refresh_in_progress {
                return RefreshOutcome::AlreadyRunning;
            }
            state.refresh_in_progress = true;
            (local, contract)
        };
        let _flag = SessionFlag::armed(&self.state, Flag::Refresh);

        match self.read_counter(local, contract).await {
            Ok(value) => {
                info!("Current number in zkApp: {}", value);
                let mut state = self.state.lock();
                state.observed_counter_value = Some(value);
                if matches!(
                    state.notice,
                    Some(
                        Notice::RefreshFailed(_)
                            | Notice::ContractNotFound
                            | Notice::ContractUnavailable(_)
                    )
                ) {
                    state.notice = None;
                }
                RefreshOutcome::Updated(value)
            }
            Err(reason) => {
                warn!("Refresh failed: {}", reason);
                self.state.lock().notice = Some(Notice::RefreshFailed(reason.clone()));
                RefreshOutcome::Failed(reason)
            }
        }
    }

    async fn read_counter(&self, local: PublicKey, contract: PublicKey) -> Result<Field, String> {
        // The local snapshot only feeds later builds; its absence does not fail a refresh.
        if let AccountLookup::TransientError(e) =
            self.compute.fetch_account_snapshot(local.clone()).await
        {
            debug!("Local account {} not refreshed: {}", local, e);
        }

        match self.compute.fetch_account_snapshot(contract.clone()).await {
            AccountLookup::Found(_) => {}
            AccountLookup::NotFound => return Err(format!("zkApp account {contract} not found")),
            AccountLookup::TransientError(e) => return Err(e),
        }

        self.compute.read_observable().await.map_err(|e| e.to_string())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn poll_cancelled(attempts: u32) -> PollOutcome {
    info!("Funding poll cancelled after {} lookup(s)", attempts);
    PollOutcome::Cancelled { attempts }
}

/// Poll flag of a spawned poll; cleared only if the orchestrator is still alive.
struct DetachedPollFlag(Weak<Orchestrator>);

impl Drop for DetachedPollFlag {
    fn drop(&mut self) {
        if let Some(this) = self.0.upgrade() {
            this.state.lock().poll_in_progress = false;
        }
    }
}

/// Builder for the orchestrator
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    wallet: WalletAdapter,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            wallet: WalletAdapter::absent(),
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.config.polling_interval = interval;
        self
    }

    pub fn wallet(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.wallet = WalletAdapter::new(Some(provider));
        self
    }

    pub fn build(self, compute: ComputeHandle) -> Orchestrator {
        Orchestrator::new(self.config, compute, self.wallet)
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
