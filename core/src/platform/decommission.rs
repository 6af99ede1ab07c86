use super::diagnostics::{Diagnostics, DECOMMISSION_DISPATCHED, DECOMMISSION_REMOVED};
use super::error::PlatformResult;
use super::host::{Callback, ChainTicket, RemoteChain, RemoteHost, RemoteStep, StepOutcome};
use super::membership::Membership;
use super::models::*;
use fleetcommon::observability::{LogEvent, LogLevel};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

const COMPONENT: &str = "decommission";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DecommissionTicket {
    pub vehicle: VehicleId,
    pub address: AccountId,
    pub ticket: ChainTicket,
    pub state: DecommissionState,
}

/// Deletes vehicle accounts. The remaining balance goes back to the registry.
#[derive(Clone)]
pub struct DecommissionOrchestrator {
    settings: Arc<RegistrySettings>,
    membership: Membership,
    host: Arc<dyn RemoteHost>,
    diagnostics: Diagnostics,
}

impl DecommissionOrchestrator {
    pub fn new(
        settings: Arc<RegistrySettings>,
        membership: Membership,
        host: Arc<dyn RemoteHost>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            settings,
            membership,
            host,
            diagnostics,
        }
    }

    /// Dispatches deletion of the vehicle's account. The id does not need to
    /// be registered; a missing account just fails remotely.
    pub fn request(&self, ctx: &CallContext, id: &str) -> PlatformResult<DecommissionTicket> {
        let vehicle = VehicleId::parse(id)?;
        let address = child_address(&self.settings.account_id, &vehicle)?;
        let chain = RemoteChain::new(
            self.settings.account_id.clone(),
            address.clone(),
            Callback::OnVehicleRemoved {
                vehicle: vehicle.clone(),
            },
        )
        .then(RemoteStep::DeleteAccount {
            beneficiary: self.settings.account_id.clone(),
        });
        let ticket = self.host.dispatch(chain)?;
        tracing::info!(%vehicle, %address, %ticket, caller = %ctx.predecessor, "vehicle decommission dispatched");
        self.diagnostics.record(
            DECOMMISSION_DISPATCHED,
            self.event(LogLevel::Info, "decommission dispatched", &vehicle)
                .with_metadata(json!({
                    "ticket": ticket.to_string(),
                    "address": address.as_str(),
                    "caller": ctx.predecessor.as_str(),
                })),
        );
        Ok(DecommissionTicket {
            vehicle,
            address,
            ticket,
            state: DecommissionState::Dispatched,
        })
    }

    /// Removes the id whatever the remote outcome was. A failed deletion
    /// leaves an orphaned account behind, which is logged.
    pub fn on_vehicle_removed(
        &self,
        vehicle: &VehicleId,
        outcome: StepOutcome,
    ) -> PlatformResult<DecommissionState> {
        let was_registered = self.membership.remove_vehicle(vehicle)?;
        let level = match outcome {
            StepOutcome::Succeeded => {
                tracing::info!(%vehicle, was_registered, "vehicle removed");
                LogLevel::Info
            }
            StepOutcome::Failed | StepOutcome::Pending => {
                tracing::warn!(
                    %vehicle,
                    ?outcome,
                    was_registered,
                    "vehicle removed from registry but account deletion did not succeed"
                );
                LogLevel::Warn
            }
        };
        self.diagnostics.record(
            DECOMMISSION_REMOVED,
            self.event(level, "decommission removed", vehicle).with_metadata(json!({
                "outcome": outcome,
                "was_registered": was_registered,
            })),
        );
        Ok(DecommissionState::Removed)
    }

    fn event(&self, level: LogLevel, message: &str, vehicle: &VehicleId) -> LogEvent {
        LogEvent::new(level, message)
            .with_component(COMPONENT)
            .with_registry(self.settings.account_id.as_str())
            .with_vehicle(vehicle.as_str())
    }
}
