use super::contract::{Settlement, VehicleRegistry};
use super::host::{CallbackEnvelope, CallbackReceiver};

/// Sole consumer of the host's callback channel. Feeds every envelope into
/// [`VehicleRegistry::handle_callback`].
pub struct CallbackDispatcher {
    receiver: CallbackReceiver,
    registry: VehicleRegistry,
}

impl CallbackDispatcher {
    pub fn new(receiver: CallbackReceiver, registry: VehicleRegistry) -> Self {
        Self { receiver, registry }
    }

    /// Handles every envelope already queued and returns without waiting.
    pub fn drain(&mut self) -> Vec<Settlement> {
        let mut settled = Vec::new();
        while let Ok(envelope) = self.receiver.try_recv() {
            if let Some(settlement) = self.handle(envelope) {
                settled.push(settlement);
            }
        }
        settled
    }

    /// Runs until every sender is gone.
    pub async fn run(mut self) {
        while let Some(envelope) = self.receiver.recv().await {
            self.handle(envelope);
        }
        tracing::info!("callback channel closed, dispatcher stopping");
    }

    fn handle(&self, envelope: CallbackEnvelope) -> Option<Settlement> {
        let ticket = envelope.ticket();
        match self.registry.handle_callback(envelope) {
            Ok(settlement) => Some(settlement),
            Err(err) => {
                tracing::error!(%ticket, error = %err, "callback handling failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::diagnostics::Diagnostics;
    use crate::platform::host::{callback_channel, CodeBundle, SimulatedHost};
    use crate::platform::models::*;
    use crate::platform::persistence::InMemoryPersistence;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (VehicleRegistry, Arc<SimulatedHost>, CallbackDispatcher) {
        let (tx, rx) = callback_channel();
        let host = Arc::new(SimulatedHost::new(tx));
        let registry = VehicleRegistry::new(
            RegistrySettings::new(AccountId::parse("fleet.testnet").unwrap()),
            Arc::new(InMemoryPersistence::new()),
            host.clone(),
            CodeBundle::minimal(),
            Diagnostics::new(),
        );
        let alice = CallContext::new(
            AccountId::parse("alice").unwrap(),
            PublicKey::parse("ed25519:6E8sCci9badyRkXb3JoRpBj5p8C6Tw41ELDZoiihKEtp").unwrap(),
        )
        .with_deposit(Balance::from_millinear(5_000));
        registry
            .initialize(&alice, "Garage", &["alice".to_string()])
            .unwrap();
        for id in ["car1", "car2"] {
            registry
                .add_vehicle(
                    &alice,
                    NewVehicle::new(id, "Car", "{}", VehicleCategory::Van, "alice"),
                )
                .unwrap();
        }
        let dispatcher = CallbackDispatcher::new(rx, registry.clone());
        (registry, host, dispatcher)
    }

    #[test]
    fn drain_handles_settled_chains_only() {
        let (registry, host, mut dispatcher) = setup();
        assert!(dispatcher.drain().is_empty());
        host.settle_next().unwrap();
        assert_eq!(dispatcher.drain().len(), 1);
        assert_eq!(registry.get_vehicle_count().unwrap(), 1);
        host.settle_next().unwrap();
        dispatcher.drain();
        assert_eq!(registry.get_vehicle_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn run_applies_callbacks_from_host_loop() {
        let (registry, host, dispatcher) = setup();
        let dispatcher = tokio::spawn(dispatcher.run());
        host.settle_all();
        for _ in 0..50 {
            if registry.get_vehicle_count().unwrap() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.get_vehicle_count().unwrap(), 2);
        // the registry keeps the host, and so the sender, alive
        dispatcher.abort();
    }
}
