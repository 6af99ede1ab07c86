//! Remote-execution transport.
//!
//! The registry never runs remote steps itself. It hands a [`RemoteChain`] to
//! a [`RemoteHost`], returns to its caller, and later receives exactly one
//! [`CallbackEnvelope`] per chain over the callback channel. Envelopes can
//! only be built inside this crate, so the callback entry points are reachable
//! through the channel and nowhere else.
//!
//! [`SimulatedHost`] is a deterministic in-process host: it queues chains and
//! executes them when asked to settle, applying the platform's account rules
//! (sub-account creation only, no duplicate accounts, code before calls).

use super::error::{PlatformError, PlatformResult};
use super::models::{AccountId, Balance, PublicKey, VehicleId};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Smallest valid wasm module (magic + version). Used when no vehicle code is
/// configured.
pub const MINIMAL_VEHICLE_MODULE: &[u8] = b"\0asm\x01\0\0\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainTicket(Uuid);

impl ChainTicket {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChainTicket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChainTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Executable payload deployed to every vehicle account.
#[derive(Clone)]
pub struct CodeBundle {
    bytes: Arc<Vec<u8>>,
    hash: String,
}

impl CodeBundle {
    pub fn new(bytes: Vec<u8>) -> Self {
        let hash = URL_SAFE_NO_PAD.encode(Sha256::digest(&bytes));
        Self {
            bytes: Arc::new(bytes),
            hash,
        }
    }

    pub fn minimal() -> Self {
        Self::new(MINIMAL_VEHICLE_MODULE.to_vec())
    }

    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for CodeBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeBundle")
            .field("len", &self.bytes.len())
            .field("hash", &self.hash)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    CreateAccount,
    DeployCode,
    AddAccessKey,
    Transfer,
    FunctionCall,
    DeleteAccount,
}

#[derive(Debug, Clone)]
pub enum RemoteStep {
    CreateAccount,
    DeployCode(CodeBundle),
    AddAccessKey(PublicKey),
    Transfer(Balance),
    FunctionCall {
        method: String,
        args: serde_json::Value,
        deposit: Balance,
    },
    DeleteAccount {
        beneficiary: AccountId,
    },
}

impl RemoteStep {
    pub fn kind(&self) -> StepKind {
        match self {
            RemoteStep::CreateAccount => StepKind::CreateAccount,
            RemoteStep::DeployCode(_) => StepKind::DeployCode,
            RemoteStep::AddAccessKey(_) => StepKind::AddAccessKey,
            RemoteStep::Transfer(_) => StepKind::Transfer,
            RemoteStep::FunctionCall { .. } => StepKind::FunctionCall,
            RemoteStep::DeleteAccount { .. } => StepKind::DeleteAccount,
        }
    }
}

/// Self-addressed continuation scheduled at the end of a chain. Carries the
/// vehicle id only; metadata already went to the child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Callback {
    OnVehicleCreated { vehicle: VehicleId },
    OnVehicleRemoved { vehicle: VehicleId },
}

impl Callback {
    pub fn method(&self) -> &'static str {
        match self {
            Callback::OnVehicleCreated { .. } => "on_vehicle_created",
            Callback::OnVehicleRemoved { .. } => "on_vehicle_removed",
        }
    }

    pub fn vehicle(&self) -> &VehicleId {
        match self {
            Callback::OnVehicleCreated { vehicle } | Callback::OnVehicleRemoved { vehicle } => {
                vehicle
            }
        }
    }
}

/// Ordered steps executed against one receiver account, followed by a
/// callback to `sender`.
#[derive(Debug, Clone)]
pub struct RemoteChain {
    pub sender: AccountId,
    pub receiver: AccountId,
    pub steps: Vec<RemoteStep>,
    pub callback: Callback,
}

impl RemoteChain {
    pub fn new(sender: AccountId, receiver: AccountId, callback: Callback) -> Self {
        Self {
            sender,
            receiver,
            steps: Vec::new(),
            callback,
        }
    }

    pub fn then(mut self, step: RemoteStep) -> Self {
        self.steps.push(step);
        self
    }
}

/// Settled result of the chain a callback reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Pending,
    Succeeded,
    Failed,
}

/// Host-originated callback delivery. Constructible only by hosts in this
/// crate.
#[derive(Debug, Clone)]
pub struct CallbackEnvelope {
    ticket: ChainTicket,
    receiver: AccountId,
    callback: Callback,
    outcome: StepOutcome,
}

impl CallbackEnvelope {
    pub(crate) fn new(
        ticket: ChainTicket,
        receiver: AccountId,
        callback: Callback,
        outcome: StepOutcome,
    ) -> Self {
        Self {
            ticket,
            receiver,
            callback,
            outcome,
        }
    }

    pub fn ticket(&self) -> ChainTicket {
        self.ticket
    }

    pub fn receiver(&self) -> &AccountId {
        &self.receiver
    }

    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    pub fn outcome(&self) -> StepOutcome {
        self.outcome
    }
}

pub type CallbackSender = mpsc::UnboundedSender<CallbackEnvelope>;
pub type CallbackReceiver = mpsc::UnboundedReceiver<CallbackEnvelope>;

pub fn callback_channel() -> (CallbackSender, CallbackReceiver) {
    mpsc::unbounded_channel()
}

pub trait RemoteHost: Send + Sync {
    /// Accepts a chain for later execution. Returns as soon as the chain is
    /// queued; the outcome arrives as a callback.
    fn dispatch(&self, chain: RemoteChain) -> PlatformResult<ChainTicket>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub ticket: ChainTicket,
    pub receiver: AccountId,
    pub outcome: StepOutcome,
    pub failed_step: Option<StepKind>,
    pub delivered: bool,
}

#[derive(Debug, Clone, Default)]
struct HostAccount {
    balance: Balance,
    code_hash: Option<String>,
    access_keys: Vec<PublicKey>,
    init_args: Option<serde_json::Value>,
}

struct QueuedChain {
    ticket: ChainTicket,
    chain: RemoteChain,
}

pub struct SimulatedHost {
    accounts: RwLock<HashMap<AccountId, HostAccount>>,
    queue: Mutex<VecDeque<QueuedChain>>,
    injected_failures: Mutex<HashMap<AccountId, StepKind>>,
    callbacks: CallbackSender,
}

impl SimulatedHost {
    pub fn new(callbacks: CallbackSender) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            injected_failures: Mutex::new(HashMap::new()),
            callbacks,
        }
    }

    /// Seeds an existing account, e.g. the registry's own.
    pub fn with_account(self, account: AccountId, balance: Balance) -> Self {
        self.accounts.write().insert(
            account,
            HostAccount {
                balance,
                ..HostAccount::default()
            },
        );
        self
    }

    pub fn account_exists(&self, account: &AccountId) -> bool {
        self.accounts.read().contains_key(account)
    }

    pub fn balance_of(&self, account: &AccountId) -> Option<Balance> {
        self.accounts.read().get(account).map(|a| a.balance)
    }

    pub fn code_hash_of(&self, account: &AccountId) -> Option<String> {
        self.accounts
            .read()
            .get(account)
            .and_then(|a| a.code_hash.clone())
    }

    pub fn access_keys_of(&self, account: &AccountId) -> Vec<PublicKey> {
        self.accounts
            .read()
            .get(account)
            .map(|a| a.access_keys.clone())
            .unwrap_or_default()
    }

    pub fn init_args_of(&self, account: &AccountId) -> Option<serde_json::Value> {
        self.accounts
            .read()
            .get(account)
            .and_then(|a| a.init_args.clone())
    }

    pub fn pending_chains(&self) -> usize {
        self.queue.lock().len()
    }

    /// Makes the next chain addressed to `receiver` fail at `step`. Steps
    /// before it still take effect.
    pub fn fail_next(&self, receiver: AccountId, step: StepKind) {
        self.injected_failures.lock().insert(receiver, step);
    }

    /// Executes the oldest queued chain and delivers its callback.
    pub fn settle_next(&self) -> Option<ChainReport> {
        let QueuedChain { ticket, chain } = self.queue.lock().pop_front()?;
        let failed_step = self.execute(&chain);
        let outcome = match failed_step {
            Some(_) => StepOutcome::Failed,
            None => StepOutcome::Succeeded,
        };
        Some(self.deliver(ticket, chain, outcome, failed_step))
    }

    /// Delivers `outcome` for the oldest queued chain without executing it.
    pub fn settle_next_with(&self, outcome: StepOutcome) -> Option<ChainReport> {
        let QueuedChain { ticket, chain } = self.queue.lock().pop_front()?;
        Some(self.deliver(ticket, chain, outcome, None))
    }

    pub fn settle_all(&self) -> Vec<ChainReport> {
        std::iter::from_fn(|| self.settle_next()).collect()
    }

    /// Settles queued chains every `every` until the callback receiver is
    /// dropped.
    pub async fn run(self: Arc<Self>, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if self.callbacks.is_closed() {
                tracing::info!("callback channel closed, simulated host stopping");
                break;
            }
            for report in self.settle_all() {
                tracing::debug!(
                    ticket = %report.ticket,
                    receiver = %report.receiver,
                    outcome = ?report.outcome,
                    "chain settled"
                );
            }
        }
    }

    fn deliver(
        &self,
        ticket: ChainTicket,
        chain: RemoteChain,
        outcome: StepOutcome,
        failed_step: Option<StepKind>,
    ) -> ChainReport {
        let envelope = CallbackEnvelope::new(ticket, chain.sender, chain.callback, outcome);
        let delivered = match self.callbacks.send(envelope) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(%ticket, "callback dropped, receiver gone");
                false
            }
        };
        ChainReport {
            ticket,
            receiver: chain.receiver,
            outcome,
            failed_step,
            delivered,
        }
    }

    /// Applies the steps in order; returns the kind of the first step that
    /// failed.
    fn execute(&self, chain: &RemoteChain) -> Option<StepKind> {
        let injected = self.injected_failures.lock().remove(&chain.receiver);
        let mut accounts = self.accounts.write();
        for step in &chain.steps {
            let kind = step.kind();
            if injected == Some(kind) || !apply_step(&mut accounts, chain, step) {
                tracing::debug!(receiver = %chain.receiver, step = ?kind, "remote step failed");
                return Some(kind);
            }
        }
        None
    }
}

fn apply_step(
    accounts: &mut HashMap<AccountId, HostAccount>,
    chain: &RemoteChain,
    step: &RemoteStep,
) -> bool {
    let receiver = &chain.receiver;
    if let RemoteStep::CreateAccount = step {
        if accounts.contains_key(receiver) || !receiver.is_sub_account_of(&chain.sender) {
            return false;
        }
        accounts.insert(receiver.clone(), HostAccount::default());
        return true;
    }
    if let RemoteStep::DeleteAccount { beneficiary } = step {
        let Some(removed) = accounts.remove(receiver) else {
            return false;
        };
        if let Some(target) = accounts.get_mut(beneficiary) {
            target.balance = target.balance.saturating_add(removed.balance);
        }
        return true;
    }
    let Some(account) = accounts.get_mut(receiver) else {
        return false;
    };
    match step {
        RemoteStep::DeployCode(code) => {
            if code.is_empty() {
                return false;
            }
            account.code_hash = Some(code.hash().to_string());
        }
        RemoteStep::AddAccessKey(key) => {
            if account.access_keys.contains(key) {
                return false;
            }
            account.access_keys.push(key.clone());
        }
        RemoteStep::Transfer(amount) => {
            account.balance = account.balance.saturating_add(*amount);
        }
        RemoteStep::FunctionCall {
            method,
            args,
            deposit,
        } => {
            if account.code_hash.is_none() {
                return false;
            }
            if method == "init" {
                if account.init_args.is_some() {
                    return false;
                }
                account.init_args = Some(args.clone());
            }
            account.balance = account.balance.saturating_add(*deposit);
        }
        RemoteStep::CreateAccount | RemoteStep::DeleteAccount { .. } => {}
    }
    true
}

impl RemoteHost for SimulatedHost {
    fn dispatch(&self, chain: RemoteChain) -> PlatformResult<ChainTicket> {
        if self.callbacks.is_closed() {
            return Err(PlatformError::Internal("callback channel closed"));
        }
        let ticket = ChainTicket::new();
        tracing::debug!(
            %ticket,
            receiver = %chain.receiver,
            steps = chain.steps.len(),
            callback = chain.callback.method(),
            "chain queued"
        );
        self.queue.lock().push_back(QueuedChain { ticket, chain });
        Ok(ticket)
    }
}
