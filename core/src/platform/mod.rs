pub mod auth;
pub mod contract;
pub mod decommission;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod membership;
pub mod models;
pub mod persistence;
pub mod provisioning;
pub mod services;

pub use auth::AuthorizationGate;
pub use contract::{Settlement, VehicleRegistry};
pub use decommission::{DecommissionOrchestrator, DecommissionTicket};
pub use diagnostics::Diagnostics;
pub use dispatch::CallbackDispatcher;
pub use error::{PlatformError, PlatformResult};
pub use host::{
    callback_channel, CallbackEnvelope, ChainTicket, CodeBundle, RemoteHost, SimulatedHost,
    StepKind, StepOutcome,
};
pub use membership::Membership;
pub use models::*;
pub use persistence::{InMemoryPersistence, MemberSet, RegistryStore};
pub use provisioning::{ProvisioningOrchestrator, ProvisioningTicket};
pub use services::PlatformServices;
