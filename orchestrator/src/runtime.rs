//! Proof runtime driven by the computation handle.
//!
//! Every method runs on the handle's dedicated worker thread, one at a time and in
//! the order the orchestrator issued them, so implementations may block freely.

use crate::error::RuntimeError;
use crate::transaction::{ProvedTransaction, UnprovedTransaction, ZkappCommand};
use ledger_client::NetworkConfig;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};
use zkapp_lib::{
    AccountSnapshot, ContractProgram, Field, MinaNetwork, PublicKey, VerificationKey, COUNTER_SLOT,
    UPDATE_METHOD,
};

pub trait ProofRuntime: Send + 'static {
    /// Load the proof system.
    fn initialize(&mut self) -> Result<(), RuntimeError>;

    fn set_network(&mut self, network: &NetworkConfig) -> Result<(), RuntimeError>;

    fn load_program(&mut self) -> Result<(), RuntimeError>;

    /// Compile the loaded program. The most expensive setup step.
    fn compile_program(&mut self) -> Result<VerificationKey, RuntimeError>;

    fn bind_instance(&mut self, address: PublicKey) -> Result<(), RuntimeError>;

    /// Make a fetched snapshot visible to later reads and builds.
    fn cache_account(&mut self, snapshot: AccountSnapshot);

    /// Current counter value of the bound instance, from the cached snapshot.
    fn read_observable(&self) -> Result<Field, RuntimeError>;

    fn build_state_mutation(&mut self, fee_payer: &PublicKey)
        -> Result<UnprovedTransaction, RuntimeError>;

    fn prove(&mut self, transaction: UnprovedTransaction) -> Result<ProvedTransaction, RuntimeError>;

    /// Encode a proved transaction as the JSON payload a wallet submits.
    fn serialize(&self, transaction: &ProvedTransaction) -> Result<String, RuntimeError>;
}

/// In-process runtime for the counter contract
#[derive(Debug, Default)]
pub struct LocalRuntime {
    initialized: bool,
    network: Option<MinaNetwork>,
    program: Option<ContractProgram>,
    verification_key: Option<VerificationKey>,
    instance: Option<PublicKey>,
    accounts: HashMap<PublicKey, AccountSnapshot>,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verification_key(&self) -> Option<&VerificationKey> {
        self.verification_key.as_ref()
    }

    fn cached(&self, key: &PublicKey) -> Result<&AccountSnapshot, RuntimeError> {
        self.accounts
            .get(key)
            .ok_or_else(|| RuntimeError::AccountNotCached(key.to_string()))
    }

    fn ensure_initialized(&self) -> Result<(), RuntimeError> {
        if self.initialized {
            Ok(())
        } else {
            Err(RuntimeError::NotInitialized)
        }
    }

    fn counter_of(snapshot: &AccountSnapshot) -> Result<Field, RuntimeError> {
        snapshot
            .app_state_slot(COUNTER_SLOT)
            .ok_or_else(|| RuntimeError::NotAZkapp(snapshot.public_key.to_string()))
    }
}

impl ProofRuntime for LocalRuntime {
    fn initialize(&mut self) -> Result<(), RuntimeError> {
        self.initialized = true;
        info!("Proof runtime loaded");
        Ok(())
    }

    fn set_network(&mut self, network: &NetworkConfig) -> Result<(), RuntimeError> {
        self.ensure_initialized()?;
        self.network = Some(network.name);
        info!("Active network: {} ({})", network.name, network.graphql_url);
        Ok(())
    }

    fn load_program(&mut self) -> Result<(), RuntimeError> {
        self.ensure_initialized()?;
        let program = ContractProgram::add();
        debug!("Loaded contract program {} v{}", program.name, program.version);
        self.program = Some(program);
        Ok(())
    }

    fn compile_program(&mut self) -> Result<VerificationKey, RuntimeError> {
        let program = self.program.as_ref().ok_or(RuntimeError::ProgramNotLoaded)?;
        let start = Instant::now();

        let key = VerificationKey::from_digest(&program.name, program.digest()?);

        info!(
            "Compiled {} in {} ms (verification key {})",
            program.name,
            start.elapsed().as_millis(),
            key.hash
        );
        self.verification_key = Some(key.clone());
        Ok(key)
    }

    fn bind_instance(&mut self, address: PublicKey) -> Result<(), RuntimeError> {
        if self.program.is_none() {
            return Err(RuntimeError::ProgramNotLoaded);
        }
        debug!("Bound contract instance to {}", address);
        self.instance = Some(address);
        Ok(())
    }

    fn cache_account(&mut self, snapshot: AccountSnapshot) {
        self.accounts.insert(snapshot.public_key.clone(), snapshot);
    }

    fn read_observable(&self) -> Result<Field, RuntimeError> {
        let instance = self.instance.as_ref().ok_or(RuntimeError::InstanceNotBound)?;
        Self::counter_of(self.cached(instance)?)
    }

    fn build_state_mutation(
        &mut self,
        fee_payer: &PublicKey,
    ) -> Result<UnprovedTransaction, RuntimeError> {
        let network = self.network.ok_or(RuntimeError::NetworkNotSet)?;
        let program = self.program.as_ref().ok_or(RuntimeError::ProgramNotLoaded)?;
        let method = program
            .method(UPDATE_METHOD)
            .ok_or_else(|| RuntimeError::MethodNotFound(UPDATE_METHOD.to_string()))?;
        let instance = self.instance.clone().ok_or(RuntimeError::InstanceNotBound)?;

        let payer = self.cached(fee_payer)?;
        let state_before = Self::counter_of(self.cached(&instance)?)?;
        let state_after = zkapp_lib::update(state_before)?;

        Ok(UnprovedTransaction {
            network,
            fee_payer: fee_payer.clone(),
            fee_payer_nonce: payer.nonce,
            zkapp: instance,
            method: method.name.clone(),
            slot: COUNTER_SLOT,
            state_before,
            state_after,
        })
    }

    fn prove(&mut self, transaction: UnprovedTransaction) -> Result<ProvedTransaction, RuntimeError> {
        let key = self.verification_key.as_ref().ok_or(RuntimeError::NotCompiled)?;
        if Some(transaction.network) != self.network {
            return Err(RuntimeError::ProofFailed(format!(
                "transaction built for {} but runtime targets {:?}",
                transaction.network, self.network
            )));
        }

        let start = Instant::now();
        let mut hasher = Sha256::new();
        hasher.update(key.hash.as_bytes());
        hasher.update(serde_json::to_vec(&transaction)?);
        let proof = format!("0x{}", hex::encode(hasher.finalize()));

        info!(
            "Proved {}.{} in {} ms",
            transaction.zkapp,
            transaction.method,
            start.elapsed().as_millis()
        );

        Ok(ProvedTransaction {
            transaction,
            verification_key: key.hash.clone(),
            proof,
        })
    }

    fn serialize(&self, transaction: &ProvedTransaction) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string(&ZkappCommand::from(transaction))?)
    }
}
