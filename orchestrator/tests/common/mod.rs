#![allow(dead_code)]

use async_trait::async_trait;
use ledger_client::{Ledger, NetworkConfig};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zkapp_lib::{AccountLookup, AccountSnapshot, Field, PublicKey, VerificationKey};
use zkapp_orchestrator::{
    ComputeHandle, LocalRuntime, Orchestrator, ProofRuntime, ProvedTransaction, RuntimeError,
    SendTransactionArgs, SendTransactionResult, UnprovedTransaction, WalletError, WalletProvider,
};

pub const LOCAL: &str = "B62qrPN5Y5yq8kGE3FbVKbGTdTAJNdtNtB5sNVpxyRwWGcDEhpMzc8g";
pub const ZKAPP: &str = "B62qjWUofRaBpJypv6DVcVuLic6KkJhBFTwJc4LanS3nMbebGLfetLf";
pub const STUB_HASH: &str = "5JuStubHash";

pub type OpLog = Arc<Mutex<Vec<&'static str>>>;

pub fn local_key() -> PublicKey {
    PublicKey::from_base58(LOCAL).unwrap()
}

pub fn zkapp_key() -> PublicKey {
    PublicKey::from_base58(ZKAPP).unwrap()
}

pub fn funded_local() -> AccountLookup {
    AccountLookup::Found(AccountSnapshot::new(local_key(), 49_000_000_000, 3))
}

pub fn contract_with(counter: u64) -> AccountLookup {
    AccountLookup::Found(
        AccountSnapshot::new(zkapp_key(), 0, 0).with_app_state(vec![Some(Field::new(counter))]),
    )
}

/// Local runtime that records each call and can be told to fail proving.
pub struct RecordingRuntime {
    inner: LocalRuntime,
    ops: OpLog,
    fail_prove: Arc<AtomicBool>,
}

impl RecordingRuntime {
    fn record(&self, op: &'static str) {
        self.ops.lock().push(op);
    }
}

impl ProofRuntime for RecordingRuntime {
    fn initialize(&mut self) -> Result<(), RuntimeError> {
        self.record("initialize");
        self.inner.initialize()
    }

    fn set_network(&mut self, network: &NetworkConfig) -> Result<(), RuntimeError> {
        self.record("set_network");
        self.inner.set_network(network)
    }

    fn load_program(&mut self) -> Result<(), RuntimeError> {
        self.record("load_program");
        self.inner.load_program()
    }

    fn compile_program(&mut self) -> Result<VerificationKey, RuntimeError> {
        self.record("compile_program");
        self.inner.compile_program()
    }

    fn bind_instance(&mut self, address: PublicKey) -> Result<(), RuntimeError> {
        self.record("bind_instance");
        self.inner.bind_instance(address)
    }

    fn cache_account(&mut self, snapshot: AccountSnapshot) {
        self.inner.cache_account(snapshot);
    }

    fn read_observable(&self) -> Result<Field, RuntimeError> {
        self.record("read_observable");
        self.inner.read_observable()
    }

    fn build_state_mutation(
        &mut self,
        fee_payer: &PublicKey,
    ) -> Result<UnprovedTransaction, RuntimeError> {
        self.record("build");
        self.inner.build_state_mutation(fee_payer)
    }

    fn prove(&mut self, transaction: UnprovedTransaction) -> Result<ProvedTransaction, RuntimeError> {
        self.record("prove");
        if self.fail_prove.load(Ordering::SeqCst) {
            return Err(RuntimeError::ProofFailed("prover crashed".to_string()));
        }
        self.inner.prove(transaction)
    }

    fn serialize(&self, transaction: &ProvedTransaction) -> Result<String, RuntimeError> {
        self.record("serialize");
        self.inner.serialize(transaction)
    }
}

/// Ledger answering from a per-account script. The last scripted answer repeats;
/// unscripted accounts are not found.
#[derive(Default)]
pub struct ScriptedLedger {
    scripts: Mutex<HashMap<PublicKey, VecDeque<AccountLookup>>>,
    lookups: Mutex<HashMap<PublicKey, usize>>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, key: &PublicKey, answers: Vec<AccountLookup>) -> Self {
        self.scripts.lock().insert(key.clone(), answers.into());
        self
    }

    /// Replace the remaining answers for `key`.
    pub fn rescript(&self, key: &PublicKey, answers: Vec<AccountLookup>) {
        self.scripts.lock().insert(key.clone(), answers.into());
    }

    pub fn lookups(&self, key: &PublicKey) -> usize {
        self.lookups.lock().get(key).copied().unwrap_or(0)
    }

    pub fn total_lookups(&self) -> usize {
        self.lookups.lock().values().sum()
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn lookup(&self, public_key: &PublicKey) -> AccountLookup {
        *self.lookups.lock().entry(public_key.clone()).or_default() += 1;

        let mut scripts = self.scripts.lock();
        match scripts.get_mut(public_key) {
            Some(answers) if answers.len() > 1 => answers.pop_front().unwrap(),
            Some(answers) => answers.front().cloned().unwrap_or(AccountLookup::NotFound),
            None => AccountLookup::NotFound,
        }
    }
}

pub struct StubWallet {
    pub accounts: Vec<String>,
    pub decline: AtomicBool,
    pub connected: AtomicBool,
    pub submits: AtomicUsize,
    pub last_sent: Mutex<Option<SendTransactionArgs>>,
}

impl StubWallet {
    pub fn with_account(address: &str) -> Self {
        Self {
            accounts: vec![address.to_string()],
            decline: AtomicBool::new(false),
            connected: AtomicBool::new(true),
            submits: AtomicUsize::new(0),
            last_sent: Mutex::new(None),
        }
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletProvider for StubWallet {
    async fn request_accounts(&self) -> Result<Vec<String>, WalletError> {
        if self.decline.load(Ordering::SeqCst) {
            return Err(WalletError::UserRejected("user declined".to_string()));
        }
        Ok(self.accounts.clone())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_transaction(
        &self,
        args: SendTransactionArgs,
    ) -> Result<SendTransactionResult, WalletError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        *self.last_sent.lock() = Some(args);
        Ok(SendTransactionResult {
            hash: STUB_HASH.to_string(),
        })
    }
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub ledger: Arc<ScriptedLedger>,
    pub wallet: Option<Arc<StubWallet>>,
    pub ops: OpLog,
    pub fail_prove: Arc<AtomicBool>,
}

impl Harness {
    pub fn new(ledger: ScriptedLedger, wallet: Option<StubWallet>) -> Self {
        let ops = OpLog::default();
        let fail_prove = Arc::new(AtomicBool::new(false));
        let ledger = Arc::new(ledger);
        let runtime = RecordingRuntime {
            inner: LocalRuntime::new(),
            ops: ops.clone(),
            fail_prove: fail_prove.clone(),
        };
        let compute = ComputeHandle::spawn(runtime, ledger.clone()).unwrap();

        let wallet = wallet.map(Arc::new);
        let mut builder = Orchestrator::builder().polling_interval(Duration::from_millis(10));
        if let Some(wallet) = &wallet {
            builder = builder.wallet(wallet.clone());
        }

        Self {
            orchestrator: Arc::new(builder.build(compute)),
            ledger,
            wallet,
            ops,
            fail_prove,
        }
    }

    /// Funded local account, contract holding `counter`.
    pub fn ready(counter: u64) -> Self {
        let ledger = ScriptedLedger::new()
            .script(&local_key(), vec![funded_local()])
            .script(&zkapp_key(), vec![contract_with(counter)]);
        Self::new(ledger, Some(StubWallet::with_account(LOCAL)))
    }

    pub fn wallet(&self) -> &StubWallet {
        self.wallet.as_deref().unwrap()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.ops.lock().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.ops.lock().iter().filter(|o| **o == op).count()
    }
}
