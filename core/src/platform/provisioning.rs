use super::diagnostics::{
    Diagnostics, PROVISION_CONFIRMED, PROVISION_DISPATCHED, PROVISION_REJECTED,
    PROVISION_UNRESOLVED,
};
use super::error::{PlatformError, PlatformResult};
use super::host::{Callback, ChainTicket, CodeBundle, RemoteChain, RemoteHost, RemoteStep, StepOutcome};
use super::membership::Membership;
use super::models::*;
use fleetcommon::observability::{LogEvent, LogLevel};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

const COMPONENT: &str = "provisioning";
const INIT_METHOD: &str = "init";

/// Returned to the caller once the creation chain is dispatched. The vehicle
/// is not in the registry yet.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProvisioningTicket {
    pub vehicle: VehicleId,
    pub address: AccountId,
    pub ticket: ChainTicket,
    pub state: ProvisioningState,
}

/// Creates vehicles: validates a request, dispatches the creation chain and
/// commits the vehicle id when the host confirms.
#[derive(Clone)]
pub struct ProvisioningOrchestrator {
    settings: Arc<RegistrySettings>,
    membership: Membership,
    host: Arc<dyn RemoteHost>,
    code: CodeBundle,
    diagnostics: Diagnostics,
}

impl ProvisioningOrchestrator {
    pub fn new(
        settings: Arc<RegistrySettings>,
        membership: Membership,
        host: Arc<dyn RemoteHost>,
        code: CodeBundle,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            settings,
            membership,
            host,
            code,
            diagnostics,
        }
    }

    /// Validates and dispatches. The caller's role must already be checked.
    pub fn request(
        &self,
        ctx: &CallContext,
        request: NewVehicle,
    ) -> PlatformResult<ProvisioningTicket> {
        let attempt = self.prepare(ctx, request)?;
        self.dispatch(ctx, attempt)
    }

    /// The `Requested` checks. Nothing is dispatched or stored here.
    pub fn prepare(
        &self,
        ctx: &CallContext,
        request: NewVehicle,
    ) -> PlatformResult<ProvisioningAttempt> {
        if ctx.attached_deposit < self.settings.vehicle_deposit {
            return Err(PlatformError::InsufficientFunds {
                required: self.settings.vehicle_deposit,
                attached: ctx.attached_deposit,
            });
        }
        let NewVehicle {
            id,
            title,
            data,
            category,
            owner,
        } = request;
        let vehicle = VehicleId::parse(id)?;
        let address = child_address(&self.settings.account_id, &vehicle)?;
        if title.trim().is_empty() {
            return Err(PlatformError::InvalidArgument("vehicle title required"));
        }
        if title.len() > self.settings.max_title_len {
            return Err(PlatformError::InvalidArgument("vehicle title too long"));
        }
        if data.len() > self.settings.max_data_len {
            return Err(PlatformError::InvalidArgument("vehicle data too long"));
        }
        let owner = AccountId::parse(owner)?;
        if self.membership.has_vehicle(&vehicle)? {
            return Err(PlatformError::DuplicateResource(vehicle.to_string()));
        }
        Ok(ProvisioningAttempt {
            vehicle,
            address,
            init: VehicleInit {
                title,
                data,
                category,
                owner,
            },
        })
    }

    fn dispatch(
        &self,
        ctx: &CallContext,
        attempt: ProvisioningAttempt,
    ) -> PlatformResult<ProvisioningTicket> {
        let ProvisioningAttempt {
            vehicle,
            address,
            init,
        } = attempt;
        let args = serde_json::to_value(&init)
            .map_err(|_| PlatformError::Internal("vehicle init args not serializable"))?;
        let chain = RemoteChain::new(
            self.settings.account_id.clone(),
            address.clone(),
            Callback::OnVehicleCreated {
                vehicle: vehicle.clone(),
            },
        )
        .then(RemoteStep::CreateAccount)
        .then(RemoteStep::DeployCode(self.code.clone()))
        .then(RemoteStep::AddAccessKey(ctx.signer_public_key.clone()))
        .then(RemoteStep::Transfer(ctx.attached_deposit))
        .then(RemoteStep::FunctionCall {
            method: INIT_METHOD.to_string(),
            args,
            deposit: Balance::ZERO,
        });
        let ticket = self.host.dispatch(chain)?;
        tracing::info!(
            %vehicle,
            %address,
            %ticket,
            caller = %ctx.predecessor,
            deposit = %ctx.attached_deposit,
            "vehicle provisioning dispatched"
        );
        self.diagnostics.record(
            PROVISION_DISPATCHED,
            self.event(LogLevel::Info, "provisioning dispatched", &vehicle)
                .with_metadata(json!({
                    "ticket": ticket.to_string(),
                    "address": address.as_str(),
                    "caller": ctx.predecessor.as_str(),
                    "category": init.category.as_str(),
                })),
        );
        Ok(ProvisioningTicket {
            vehicle,
            address,
            ticket,
            state: ProvisioningState::Dispatched,
        })
    }

    /// Callback turn. Only a settled success adds the vehicle.
    pub fn on_vehicle_created(
        &self,
        vehicle: &VehicleId,
        outcome: StepOutcome,
    ) -> PlatformResult<ProvisioningState> {
        match outcome {
            StepOutcome::Pending => {
                tracing::debug!(%vehicle, "creation chain still pending at callback");
                self.diagnostics.record(
                    PROVISION_UNRESOLVED,
                    self.event(LogLevel::Debug, "provisioning unresolved", vehicle),
                );
                Ok(ProvisioningState::Unresolved)
            }
            StepOutcome::Succeeded => {
                self.membership.add_vehicle(vehicle)?;
                tracing::info!(%vehicle, "vehicle provisioned");
                self.diagnostics.record(
                    PROVISION_CONFIRMED,
                    self.event(LogLevel::Info, "provisioning confirmed", vehicle),
                );
                Ok(ProvisioningState::Confirmed)
            }
            StepOutcome::Failed => {
                tracing::warn!(%vehicle, "vehicle creation failed, registry unchanged");
                self.diagnostics.record(
                    PROVISION_REJECTED,
                    self.event(LogLevel::Warn, "provisioning rejected", vehicle),
                );
                Ok(ProvisioningState::Rejected)
            }
        }
    }

    fn event(&self, level: LogLevel, message: &str, vehicle: &VehicleId) -> LogEvent {
        LogEvent::new(level, message)
            .with_component(COMPONENT)
            .with_registry(self.settings.account_id.as_str())
            .with_vehicle(vehicle.as_str())
    }
}
