//! Entry points of the vehicle registry.
//!
//! Every synchronous operation takes the caller's [`CallContext`], runs the
//! initialization check and role guard, and only then touches the store or
//! dispatches a remote chain. Callbacks enter through
//! [`VehicleRegistry::handle_callback`], which accepts nothing but a
//! host-built [`CallbackEnvelope`].

use super::auth::AuthorizationGate;
use super::decommission::{DecommissionOrchestrator, DecommissionTicket};
use super::diagnostics::Diagnostics;
use super::error::{PlatformError, PlatformResult};
use super::host::{Callback, CallbackEnvelope, CodeBundle, RemoteHost};
use super::membership::Membership;
use super::models::*;
use super::persistence::RegistryStore;
use super::provisioning::{ProvisioningOrchestrator, ProvisioningTicket};
use fleetcommon::auth::RoleSet;
use serde::Serialize;
use std::sync::Arc;

/// What a delivered callback did to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Settlement {
    Provisioning {
        vehicle: VehicleId,
        state: ProvisioningState,
    },
    Decommission {
        vehicle: VehicleId,
        state: DecommissionState,
    },
}

#[derive(Clone)]
pub struct VehicleRegistry {
    settings: Arc<RegistrySettings>,
    membership: Membership,
    gate: AuthorizationGate,
    provisioning: ProvisioningOrchestrator,
    decommission: DecommissionOrchestrator,
}

impl VehicleRegistry {
    pub fn new(
        settings: RegistrySettings,
        store: Arc<dyn RegistryStore>,
        host: Arc<dyn RemoteHost>,
        code: CodeBundle,
        diagnostics: Diagnostics,
    ) -> Self {
        let settings = Arc::new(settings);
        let membership = Membership::new(store);
        let gate = AuthorizationGate::new(membership.clone());
        let provisioning = ProvisioningOrchestrator::new(
            settings.clone(),
            membership.clone(),
            host.clone(),
            code,
            diagnostics.clone(),
        );
        let decommission =
            DecommissionOrchestrator::new(settings.clone(), membership.clone(), host, diagnostics);
        Self {
            settings,
            membership,
            gate,
            provisioning,
            decommission,
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.settings.account_id
    }

    /// One-time creation of the registry record and its owner set.
    pub fn initialize(
        &self,
        ctx: &CallContext,
        name: &str,
        owners: &[String],
    ) -> PlatformResult<RegistryView> {
        if self.membership.is_created()? {
            return Err(PlatformError::AlreadyInitialized);
        }
        if name.trim().is_empty() {
            return Err(PlatformError::InvalidArgument("registry name required"));
        }
        if name.len() > self.settings.max_name_len {
            return Err(PlatformError::InvalidArgument("registry name too long"));
        }
        let owners = owners
            .iter()
            .map(|owner| AccountId::parse(owner.as_str()))
            .collect::<PlatformResult<Vec<_>>>()?;
        if owners.is_empty() {
            return Err(PlatformError::InvalidArgument("at least one owner required"));
        }
        if ctx.attached_deposit < self.settings.init_deposit {
            return Err(PlatformError::InsufficientFunds {
                required: self.settings.init_deposit,
                attached: ctx.attached_deposit,
            });
        }
        self.membership.create_registry(name, &owners)?;
        tracing::info!(
            registry = %self.settings.account_id,
            registry_name = name,
            owners = owners.len(),
            caller = %ctx.predecessor,
            "registry initialized"
        );
        self.get_registry()
    }

    pub fn add_vehicle(
        &self,
        ctx: &CallContext,
        request: NewVehicle,
    ) -> PlatformResult<ProvisioningTicket> {
        self.ensure_initialized()?;
        self.gate.require_contributor_or_owner(&ctx.predecessor)?;
        self.provisioning.request(ctx, request)
    }

    pub fn remove_vehicle(&self, ctx: &CallContext, id: &str) -> PlatformResult<DecommissionTicket> {
        self.ensure_initialized()?;
        self.gate.require_owner(&ctx.predecessor)?;
        self.decommission.request(ctx, id)
    }

    pub fn add_owner(&self, ctx: &CallContext, account: &str) -> PlatformResult<bool> {
        self.ensure_initialized()?;
        self.gate.require_owner(&ctx.predecessor)?;
        let account = AccountId::parse(account)?;
        let added = self.membership.add_owner(&account)?;
        tracing::info!(%account, added, caller = %ctx.predecessor, "owner added");
        Ok(added)
    }

    /// May remove the last owner, after which no owner operation can succeed.
    pub fn remove_owner(&self, ctx: &CallContext, account: &str) -> PlatformResult<bool> {
        self.ensure_initialized()?;
        self.gate.require_owner(&ctx.predecessor)?;
        let account = AccountId::parse(account)?;
        let removed = self.membership.remove_owner(&account)?;
        tracing::info!(%account, removed, caller = %ctx.predecessor, "owner removed");
        if removed && self.membership.list_owners()?.is_empty() {
            tracing::warn!(registry = %self.settings.account_id, "registry has no owners left");
        }
        Ok(removed)
    }

    /// Owner-only unless the caller is adding itself.
    pub fn add_contributor(&self, ctx: &CallContext, account: &str) -> PlatformResult<bool> {
        self.ensure_initialized()?;
        let account = AccountId::parse(account)?;
        if account != ctx.predecessor {
            self.gate.require_owner(&ctx.predecessor)?;
        }
        let added = self.membership.add_contributor(&account)?;
        tracing::info!(%account, added, caller = %ctx.predecessor, "contributor added");
        Ok(added)
    }

    /// Owner-only unless the caller is removing itself.
    pub fn remove_contributor(&self, ctx: &CallContext, account: &str) -> PlatformResult<bool> {
        self.ensure_initialized()?;
        let account = AccountId::parse(account)?;
        if account != ctx.predecessor {
            self.gate.require_owner(&ctx.predecessor)?;
        }
        let removed = self.membership.remove_contributor(&account)?;
        tracing::info!(%account, removed, caller = %ctx.predecessor, "contributor removed");
        Ok(removed)
    }

    pub fn add_self_as_contributor(&self, ctx: &CallContext) -> PlatformResult<bool> {
        self.add_contributor(ctx, ctx.predecessor.as_str())
    }

    pub fn remove_self_as_contributor(&self, ctx: &CallContext) -> PlatformResult<bool> {
        self.remove_contributor(ctx, ctx.predecessor.as_str())
    }

    pub fn get_registry(&self) -> PlatformResult<RegistryView> {
        let record = self.membership.record()?;
        Ok(RegistryView {
            name: record.name,
            created_at: record.created_at,
            account_id: self.settings.account_id.clone(),
            owners: self.membership.list_owners()?,
            contributors: self.membership.list_contributors()?,
            vehicle_count: self.membership.count_vehicles()?,
        })
    }

    pub fn get_owners(&self) -> PlatformResult<Vec<AccountId>> {
        self.ensure_initialized()?;
        self.membership.list_owners()
    }

    pub fn get_contributors(&self) -> PlatformResult<Vec<AccountId>> {
        self.ensure_initialized()?;
        self.membership.list_contributors()
    }

    pub fn get_vehicles(&self) -> PlatformResult<Vec<VehicleId>> {
        self.ensure_initialized()?;
        self.membership.list_vehicles()
    }

    pub fn get_vehicle_count(&self) -> PlatformResult<u64> {
        self.ensure_initialized()?;
        self.membership.count_vehicles()
    }

    pub fn has_vehicle(&self, id: &str) -> PlatformResult<bool> {
        self.ensure_initialized()?;
        self.membership.has_vehicle(&VehicleId::parse(id)?)
    }

    pub fn role_of(&self, account: &str) -> PlatformResult<RoleSet> {
        self.ensure_initialized()?;
        self.gate.role_of(&AccountId::parse(account)?)
    }

    /// Account a vehicle with this id lives at, registered or not.
    pub fn vehicle_address(&self, id: &str) -> PlatformResult<AccountId> {
        child_address(&self.settings.account_id, &VehicleId::parse(id)?)
    }

    /// Callback turn. Runs no role guard; the envelope itself is the proof
    /// that the host sent it.
    pub fn handle_callback(&self, envelope: CallbackEnvelope) -> PlatformResult<Settlement> {
        if envelope.receiver() != &self.settings.account_id {
            tracing::warn!(
                ticket = %envelope.ticket(),
                receiver = %envelope.receiver(),
                "callback addressed to another account"
            );
            return Err(PlatformError::Unauthorized);
        }
        self.ensure_initialized()?;
        let outcome = envelope.outcome();
        tracing::debug!(
            ticket = %envelope.ticket(),
            method = envelope.callback().method(),
            ?outcome,
            "callback received"
        );
        match envelope.callback() {
            Callback::OnVehicleCreated { vehicle } => {
                let state = self.provisioning.on_vehicle_created(vehicle, outcome)?;
                Ok(Settlement::Provisioning {
                    vehicle: vehicle.clone(),
                    state,
                })
            }
            Callback::OnVehicleRemoved { vehicle } => {
                let state = self.decommission.on_vehicle_removed(vehicle, outcome)?;
                Ok(Settlement::Decommission {
                    vehicle: vehicle.clone(),
                    state,
                })
            }
        }
    }

    fn ensure_initialized(&self) -> PlatformResult<()> {
        if self.membership.is_created()? {
            Ok(())
        } else {
            Err(PlatformError::NotInitialized)
        }
    }
}
