use super::error::PlatformResult;
use super::models::RegistryRecord;
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// The three membership sets kept next to the registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberSet {
    Owners,
    Contributors,
    Vehicles,
}

/// Storage substrate for the registry: one singleton record plus string sets.
/// Set operations are idempotent and report whether anything changed.
pub trait RegistryStore: Send + Sync {
    fn get_record(&self) -> PlatformResult<Option<RegistryRecord>>;
    /// Writes `record` and seeds the owner set in one step, unless a record
    /// already exists. Returns `false` and changes nothing in that case.
    fn create_record_if_absent(
        &self,
        record: RegistryRecord,
        owners: &[String],
    ) -> PlatformResult<bool>;
    fn insert_member(&self, set: MemberSet, member: &str) -> PlatformResult<bool>;
    fn remove_member(&self, set: MemberSet, member: &str) -> PlatformResult<bool>;
    fn contains_member(&self, set: MemberSet, member: &str) -> PlatformResult<bool>;
    fn list_members(&self, set: MemberSet) -> PlatformResult<Vec<String>>;
    fn count_members(&self, set: MemberSet) -> PlatformResult<u64>;
}

#[derive(Default)]
struct InMemoryState {
    record: Option<RegistryRecord>,
    owners: BTreeSet<String>,
    contributors: BTreeSet<String>,
    vehicles: BTreeSet<String>,
}

impl InMemoryState {
    fn set(&self, set: MemberSet) -> &BTreeSet<String> {
        match set {
            MemberSet::Owners => &self.owners,
            MemberSet::Contributors => &self.contributors,
            MemberSet::Vehicles => &self.vehicles,
        }
    }

    fn set_mut(&mut self, set: MemberSet) -> &mut BTreeSet<String> {
        match set {
            MemberSet::Owners => &mut self.owners,
            MemberSet::Contributors => &mut self.contributors,
            MemberSet::Vehicles => &mut self.vehicles,
        }
    }
}

#[derive(Default)]
pub struct InMemoryPersistence {
    state: RwLock<InMemoryState>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for InMemoryPersistence {
    fn get_record(&self) -> PlatformResult<Option<RegistryRecord>> {
        Ok(self.state.read().record.clone())
    }

    fn create_record_if_absent(
        &self,
        record: RegistryRecord,
        owners: &[String],
    ) -> PlatformResult<bool> {
        let mut state = self.state.write();
        if state.record.is_some() {
            return Ok(false);
        }
        state.record = Some(record);
        state.owners.extend(owners.iter().cloned());
        Ok(true)
    }

    fn insert_member(&self, set: MemberSet, member: &str) -> PlatformResult<bool> {
        Ok(self.state.write().set_mut(set).insert(member.to_string()))
    }

    fn remove_member(&self, set: MemberSet, member: &str) -> PlatformResult<bool> {
        Ok(self.state.write().set_mut(set).remove(member))
    }

    fn contains_member(&self, set: MemberSet, member: &str) -> PlatformResult<bool> {
        Ok(self.state.read().set(set).contains(member))
    }

    fn list_members(&self, set: MemberSet) -> PlatformResult<Vec<String>> {
        Ok(self.state.read().set(set).iter().cloned().collect())
    }

    fn count_members(&self, set: MemberSet) -> PlatformResult<u64> {
        Ok(self.state.read().set(set).len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn sets_are_independent_and_idempotent() {
        let store = InMemoryPersistence::new();
        assert!(store.insert_member(MemberSet::Owners, "alice").unwrap());
        assert!(!store.insert_member(MemberSet::Owners, "alice").unwrap());
        assert!(!store.contains_member(MemberSet::Contributors, "alice").unwrap());
        assert!(!store.remove_member(MemberSet::Vehicles, "car1").unwrap());
        assert_eq!(store.count_members(MemberSet::Owners).unwrap(), 1);
        assert!(store.remove_member(MemberSet::Owners, "alice").unwrap());
        assert!(store.list_members(MemberSet::Owners).unwrap().is_empty());
    }

    #[test]
    fn record_is_a_singleton() {
        let store = InMemoryPersistence::new();
        assert!(store.get_record().unwrap().is_none());
        let record = RegistryRecord {
            name: "Garage".into(),
            created_at: Utc::now(),
        };
        assert!(store
            .create_record_if_absent(record.clone(), &["alice".to_string()])
            .unwrap());
        let second = RegistryRecord {
            name: "Other".into(),
            created_at: Utc::now(),
        };
        assert!(!store
            .create_record_if_absent(second, &["mallory".to_string()])
            .unwrap());
        assert_eq!(store.get_record().unwrap(), Some(record));
        assert_eq!(store.list_members(MemberSet::Owners).unwrap(), vec!["alice"]);
    }
}
