use super::error::{PlatformError, PlatformResult};
use super::models::{AccountId, RegistryRecord, VehicleId};
use super::persistence::{MemberSet, RegistryStore};
use chrono::Utc;
use std::sync::Arc;

/// Typed view over the registry store: the singleton record and the owner,
/// contributor and vehicle sets. Holds no control flow; callers decide who
/// may mutate what.
#[derive(Clone)]
pub struct Membership {
    store: Arc<dyn RegistryStore>,
}

impl Membership {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Writes the registry record and seeds the owner set atomically. Fails
    /// with `AlreadyInitialized` if a record exists, leaving it untouched.
    pub fn create_registry(
        &self,
        name: &str,
        initial_owners: &[AccountId],
    ) -> PlatformResult<RegistryRecord> {
        if name.trim().is_empty() {
            return Err(PlatformError::InvalidArgument("registry name required"));
        }
        if initial_owners.is_empty() {
            return Err(PlatformError::InvalidArgument("at least one owner required"));
        }
        let record = RegistryRecord {
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let owners: Vec<String> = initial_owners
            .iter()
            .map(|owner| owner.as_str().to_string())
            .collect();
        if !self.store.create_record_if_absent(record.clone(), &owners)? {
            return Err(PlatformError::AlreadyInitialized);
        }
        Ok(record)
    }

    pub fn is_created(&self) -> PlatformResult<bool> {
        Ok(self.store.get_record()?.is_some())
    }

    pub fn record(&self) -> PlatformResult<RegistryRecord> {
        self.store.get_record()?.ok_or(PlatformError::NotInitialized)
    }

    pub fn add_owner(&self, account: &AccountId) -> PlatformResult<bool> {
        self.store.insert_member(MemberSet::Owners, account.as_str())
    }

    pub fn remove_owner(&self, account: &AccountId) -> PlatformResult<bool> {
        self.store.remove_member(MemberSet::Owners, account.as_str())
    }

    pub fn has_owner(&self, account: &AccountId) -> PlatformResult<bool> {
        self.store.contains_member(MemberSet::Owners, account.as_str())
    }

    pub fn list_owners(&self) -> PlatformResult<Vec<AccountId>> {
        self.accounts(MemberSet::Owners)
    }

    pub fn add_contributor(&self, account: &AccountId) -> PlatformResult<bool> {
        self.store
            .insert_member(MemberSet::Contributors, account.as_str())
    }

    pub fn remove_contributor(&self, account: &AccountId) -> PlatformResult<bool> {
        self.store
            .remove_member(MemberSet::Contributors, account.as_str())
    }

    pub fn is_contributor(&self, account: &AccountId) -> PlatformResult<bool> {
        self.store
            .contains_member(MemberSet::Contributors, account.as_str())
    }

    pub fn list_contributors(&self) -> PlatformResult<Vec<AccountId>> {
        self.accounts(MemberSet::Contributors)
    }

    pub fn add_vehicle(&self, vehicle: &VehicleId) -> PlatformResult<bool> {
        self.store.insert_member(MemberSet::Vehicles, vehicle.as_str())
    }

    pub fn remove_vehicle(&self, vehicle: &VehicleId) -> PlatformResult<bool> {
        self.store.remove_member(MemberSet::Vehicles, vehicle.as_str())
    }

    pub fn has_vehicle(&self, vehicle: &VehicleId) -> PlatformResult<bool> {
        self.store
            .contains_member(MemberSet::Vehicles, vehicle.as_str())
    }

    pub fn list_vehicles(&self) -> PlatformResult<Vec<VehicleId>> {
        Ok(self
            .store
            .list_members(MemberSet::Vehicles)?
            .into_iter()
            .map(VehicleId::from_stored)
            .collect())
    }

    pub fn count_vehicles(&self) -> PlatformResult<u64> {
        self.store.count_members(MemberSet::Vehicles)
    }

    fn accounts(&self, set: MemberSet) -> PlatformResult<Vec<AccountId>> {
        Ok(self
            .store
            .list_members(set)?
            .into_iter()
            .map(AccountId::from_stored)
            .collect())
    }
}
