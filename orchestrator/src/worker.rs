//! Handle to the isolated execution context that owns the proof runtime.
//!
//! Requests travel over a single FIFO channel to a dedicated OS thread, so they run
//! strictly in the order issued and never concurrently. Each request carries a
//! oneshot reply; awaiting it is the only suspension the caller sees.

use crate::error::RuntimeError;
use crate::runtime::ProofRuntime;
use crate::transaction::{ProvedTransaction, UnprovedTransaction};
use ledger_client::{Ledger, NetworkConfig};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use zkapp_lib::{AccountLookup, Field, PublicKey, VerificationKey};

type Reply<T> = oneshot::Sender<Result<T, RuntimeError>>;

enum Request {
    InitializeRuntime { reply: Reply<()> },
    SetNetworkEndpoint { network: NetworkConfig, reply: Reply<()> },
    LoadProgram { reply: Reply<()> },
    CompileProgram { reply: Reply<VerificationKey> },
    BindInstance { address: PublicKey, reply: Reply<()> },
    ReadObservable { reply: Reply<Field> },
    FetchAccountSnapshot { public_key: PublicKey, reply: oneshot::Sender<AccountLookup> },
    BuildStateMutation { fee_payer: PublicKey, reply: Reply<()> },
    ProveStateMutation { reply: Reply<()> },
    SerializeTransaction { reply: Reply<String> },
}

impl Request {
    const fn name(&self) -> &'static str {
        match self {
            Self::InitializeRuntime { .. } => "initialize_runtime",
            Self::SetNetworkEndpoint { .. } => "set_network_endpoint",
            Self::LoadProgram { .. } => "load_program",
            Self::CompileProgram { .. } => "compile_program",
            Self::BindInstance { .. } => "bind_instance",
            Self::ReadObservable { .. } => "read_observable",
            Self::FetchAccountSnapshot { .. } => "fetch_account_snapshot",
            Self::BuildStateMutation { .. } => "build_state_mutation",
            Self::ProveStateMutation { .. } => "prove_state_mutation",
            Self::SerializeTransaction { .. } => "serialize_transaction",
        }
    }
}

/// The transaction currently moving through the pipeline.
#[derive(Debug, Default)]
enum Artifact {
    #[default]
    Empty,
    Unproved(UnprovedTransaction),
    Proved(ProvedTransaction),
}

struct Worker<R> {
    runtime: R,
    ledger: Arc<dyn Ledger>,
    handle: Handle,
    artifact: Artifact,
}

impl<R: ProofRuntime> Worker<R> {
    fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        info!("Computation worker started");
        while let Some(request) = requests.blocking_recv() {
            debug!("worker <- {}", request.name());
            self.dispatch(request);
        }
        info!("Computation worker stopped");
    }

    fn dispatch(&mut self, request: Request) {
        // A dropped receiver means the caller stopped waiting; nothing to report.
        match request {
            Request::InitializeRuntime { reply } => {
                let _ = reply.send(self.runtime.initialize());
            }
            Request::SetNetworkEndpoint { network, reply } => {
                let _ = reply.send(self.runtime.set_network(&network));
            }
            Request::LoadProgram { reply } => {
                let _ = reply.send(self.runtime.load_program());
            }
            Request::CompileProgram { reply } => {
                let _ = reply.send(self.runtime.compile_program());
            }
            Request::BindInstance { address, reply } => {
                let _ = reply.send(self.runtime.bind_instance(address));
            }
            Request::ReadObservable { reply } => {
                let _ = reply.send(self.runtime.read_observable());
            }
            Request::FetchAccountSnapshot { public_key, reply } => {
                let lookup = self.handle.block_on(self.ledger.lookup(&public_key));
                if let AccountLookup::Found(snapshot) = &lookup {
                    self.runtime.cache_account(snapshot.clone());
                }
                let _ = reply.send(lookup);
            }
            Request::BuildStateMutation { fee_payer, reply } => {
                let _ = reply.send(self.build(&fee_payer));
            }
            Request::ProveStateMutation { reply } => {
                let _ = reply.send(self.prove());
            }
            Request::SerializeTransaction { reply } => {
                let _ = reply.send(self.serialize());
            }
        }
    }

    fn build(&mut self, fee_payer: &PublicKey) -> Result<(), RuntimeError> {
        // A new build always starts a fresh run.
        self.artifact = Artifact::Empty;
        let transaction = self.runtime.build_state_mutation(fee_payer)?;
        self.artifact = Artifact::Unproved(transaction);
        Ok(())
    }

    fn prove(&mut self) -> Result<(), RuntimeError> {
        match std::mem::take(&mut self.artifact) {
            Artifact::Unproved(transaction) => {
                let proved = self.runtime.prove(transaction)?;
                self.artifact = Artifact::Proved(proved);
                Ok(())
            }
            Artifact::Proved(_) => Err(RuntimeError::PipelineOrder(
                "transaction already proved".to_string(),
            )),
            Artifact::Empty => Err(RuntimeError::PipelineOrder(
                "no transaction built".to_string(),
            )),
        }
    }

    fn serialize(&mut self) -> Result<String, RuntimeError> {
        match std::mem::take(&mut self.artifact) {
            Artifact::Proved(proved) => self.runtime.serialize(&proved),
            Artifact::Unproved(_) => Err(RuntimeError::PipelineOrder(
                "transaction not proved".to_string(),
            )),
            Artifact::Empty => Err(RuntimeError::PipelineOrder(
                "no transaction built".to_string(),
            )),
        }
    }
}

/// Cloneable proxy to the computation worker.
///
/// The worker thread exits once every clone has been dropped.
#[derive(Clone, Debug)]
pub struct ComputeHandle {
    requests: mpsc::UnboundedSender<Request>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ComputeHandle {
    /// Start the worker thread. Must be called from within a tokio runtime; ledger
    /// lookups issued to the worker are driven on that runtime.
    pub fn spawn<R: ProofRuntime>(runtime: R, ledger: Arc<dyn Ledger>) -> Result<Self, RuntimeError> {
        let handle = Handle::try_current()
            .map_err(|e| RuntimeError::WorkerUnavailable(format!("no tokio runtime: {e}")))?;
        let (requests, receiver) = mpsc::unbounded_channel();

        let worker = Worker {
            runtime,
            ledger,
            handle,
            artifact: Artifact::Empty,
        };

        std::thread::Builder::new()
            .name("zkapp-worker".to_string())
            .spawn(move || worker.run(receiver))
            .map_err(|e| RuntimeError::WorkerUnavailable(format!("failed to spawn worker: {e}")))?;

        Ok(Self { requests })
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(make(reply))
            .map_err(|e| RuntimeError::WorkerUnavailable(format!("{} not delivered", e.0.name())))?;
        response
            .await
            .map_err(|_| RuntimeError::WorkerUnavailable("worker dropped the request".to_string()))?
    }

    pub async fn initialize_runtime(&self) -> Result<(), RuntimeError> {
        self.call(|reply| Request::InitializeRuntime { reply }).await
    }

    pub async fn set_network_endpoint(&self, network: NetworkConfig) -> Result<(), RuntimeError> {
        self.call(|reply| Request::SetNetworkEndpoint { network, reply }).await
    }

    pub async fn load_program(&self) -> Result<(), RuntimeError> {
        self.call(|reply| Request::LoadProgram { reply }).await
    }

    pub async fn compile_program(&self) -> Result<VerificationKey, RuntimeError> {
        self.call(|reply| Request::CompileProgram { reply }).await
    }

    pub async fn bind_instance(&self, address: PublicKey) -> Result<(), RuntimeError> {
        self.call(|reply| Request::BindInstance { address, reply }).await
    }

    pub async fn read_observable(&self) -> Result<Field, RuntimeError> {
        self.call(|reply| Request::ReadObservable { reply }).await
    }

    /// Look an account up through the worker, caching it there when found.
    ///
    /// An unreachable worker is reported as a transient failure.
    pub async fn fetch_account_snapshot(&self, public_key: PublicKey) -> AccountLookup {
        let (reply, response) = oneshot::channel();
        if self
            .requests
            .send(Request::FetchAccountSnapshot { public_key, reply })
            .is_err()
        {
            warn!("Computation worker is gone; lookup not issued");
            return AccountLookup::TransientError("worker unavailable".to_string());
        }
        response
            .await
            .unwrap_or_else(|_| AccountLookup::TransientError("worker dropped the request".to_string()))
    }

    pub async fn build_state_mutation(&self, fee_payer: PublicKey) -> Result<(), RuntimeError> {
        self.call(|reply| Request::BuildStateMutation { fee_payer, reply }).await
    }

    pub async fn prove_state_mutation(&self) -> Result<(), RuntimeError> {
        self.call(|reply| Request::ProveStateMutation { reply }).await
    }

    pub async fn serialize_transaction(&self) -> Result<String, RuntimeError> {
        self.call(|reply| Request::SerializeTransaction { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::LocalRuntime;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use zkapp_lib::AccountSnapshot;

    const ZKAPP: &str = "B62qjWUofRaBpJypv6DVcVuLic6KkJhBFTwJc4LanS3nMbebGLfetLf";
    const PAYER: &str = "B62qrPN5Y5yq8kGE3FbVKbGTdTAJNdtNtB5sNVpxyRwWGcDEhpMzc8g";

    struct FixedLedger(HashMap<PublicKey, AccountSnapshot>);

    #[async_trait]
    impl Ledger for FixedLedger {
        async fn lookup(&self, public_key: &PublicKey) -> AccountLookup {
            self.0
                .get(public_key)
                .cloned()
                .map_or(AccountLookup::NotFound, AccountLookup::Found)
        }
    }

    fn keys() -> (PublicKey, PublicKey) {
        (
            PublicKey::from_base58(ZKAPP).unwrap(),
            PublicKey::from_base58(PAYER).unwrap(),
        )
    }

    async fn ready_handle(counter: u64) -> ComputeHandle {
        let (zkapp, payer) = keys();
        let mut accounts = HashMap::new();
        accounts.insert(
            zkapp.clone(),
            AccountSnapshot::new(zkapp.clone(), 0, 0).with_app_state(vec![Some(Field::new(counter))]),
        );
        accounts.insert(payer.clone(), AccountSnapshot::new(payer.clone(), 10, 1));

        let handle = ComputeHandle::spawn(LocalRuntime::new(), Arc::new(FixedLedger(accounts))).unwrap();
        handle.initialize_runtime().await.unwrap();
        handle
            .set_network_endpoint(ledger_client::Config::default().network)
            .await
            .unwrap();
        handle.load_program().await.unwrap();
        handle.compile_program().await.unwrap();
        handle.bind_instance(zkapp.clone()).await.unwrap();
        assert!(handle.fetch_account_snapshot(zkapp).await.is_found());
        assert!(handle.fetch_account_snapshot(payer).await.is_found());
        handle
    }

    #[tokio::test]
    async fn test_full_pipeline() {
        let handle = ready_handle(4).await;
        let (_, payer) = keys();

        assert_eq!(handle.read_observable().await.unwrap(), Field::new(4));
        handle.build_state_mutation(payer).await.unwrap();
        handle.prove_state_mutation().await.unwrap();
        let payload = handle.serialize_transaction().await.unwrap();
        assert!(payload.contains("\"6\""));
    }

    #[tokio::test]
    async fn test_out_of_order_stages_rejected() {
        let handle = ready_handle(0).await;
        let (_, payer) = keys();

        assert!(matches!(
            handle.prove_state_mutation().await,
            Err(RuntimeError::PipelineOrder(_))
        ));

        handle.build_state_mutation(payer).await.unwrap();
        assert!(matches!(
            handle.serialize_transaction().await,
            Err(RuntimeError::PipelineOrder(_))
        ));
        // The rejected serialize discarded the unproved artifact.
        assert!(matches!(
            handle.prove_state_mutation().await,
            Err(RuntimeError::PipelineOrder(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_account_not_cached() {
        let handle = ready_handle(0).await;
        let stranger =
            PublicKey::from_base58("B62qiy32p8kAKnny8ZFwoMhYpBppM1DWVCqAPBYNcXnsAHhnfAAuXgg").unwrap();

        assert!(matches!(
            handle.fetch_account_snapshot(stranger.clone()).await,
            AccountLookup::NotFound
        ));
        assert!(matches!(
            handle.build_state_mutation(stranger).await,
            Err(RuntimeError::AccountNotCached(_))
        ));
    }

    #[test]
    fn test_spawn_requires_tokio_runtime() {
        let result = ComputeHandle::spawn(LocalRuntime::new(), Arc::new(FixedLedger(HashMap::new())));
        assert!(matches!(result, Err(RuntimeError::WorkerUnavailable(_))));
    }
}
