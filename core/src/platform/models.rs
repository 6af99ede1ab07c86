use crate::platform::error::{PlatformError, PlatformResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_ACCOUNT_ID_LEN: usize = 2;
pub const MAX_ACCOUNT_ID_LEN: usize = 64;

/// Smallest indivisible unit of value (yocto). One NEAR is 10^24 yocto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(u128);

impl Balance {
    pub const ZERO: Balance = Balance(0);
    pub const ONE_NEAR: Balance = Balance(10u128.pow(24));
    const YOCTO_PER_MILLINEAR: u128 = 10u128.pow(21);

    pub const fn from_yocto(value: u128) -> Self {
        Self(value)
    }

    pub const fn from_millinear(value: u64) -> Self {
        Self(value as u128 * Self::YOCTO_PER_MILLINEAR)
    }

    /// Like [`Balance::from_millinear`] but `None` when the yocto amount does
    /// not fit.
    pub fn checked_from_millinear(value: u64) -> Option<Self> {
        u128::from(value)
            .checked_mul(Self::YOCTO_PER_MILLINEAR)
            .map(Self)
    }

    pub const fn as_yocto(&self) -> u128 {
        self.0
    }

    pub fn saturating_add(self, other: Balance) -> Balance {
        Balance(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Balance) -> Balance {
        Balance(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Balance {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u128>()
            .map(Balance)
            .map_err(|_| PlatformError::InvalidArgument("invalid balance"))
    }
}

/// Platform account identifier, e.g. `alice.testnet`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn parse(value: impl Into<String>) -> PlatformResult<Self> {
        let value = value.into();
        validate_account_label(&value, true)?;
        Ok(Self(value))
    }

    /// Rehydrates an id previously validated and written to the store.
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `self` is a direct sub-account of `parent`.
    pub fn is_sub_account_of(&self, parent: &AccountId) -> bool {
        self.0
            .strip_suffix(parent.as_str())
            .and_then(|prefix| prefix.strip_suffix('.'))
            .map(|label| !label.is_empty() && !label.contains('.'))
            .unwrap_or(false)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccountId {
    type Error = PlatformError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountId::parse(value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl FromStr for AccountId {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountId::parse(s)
    }
}

/// Short name of a vehicle; a single account label without dots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VehicleId(String);

impl VehicleId {
    pub fn parse(value: impl Into<String>) -> PlatformResult<Self> {
        let value = value.into();
        validate_account_label(&value, false)?;
        Ok(Self(value))
    }

    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VehicleId {
    type Error = PlatformError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VehicleId::parse(value)
    }
}

impl From<VehicleId> for String {
    fn from(value: VehicleId) -> Self {
        value.0
    }
}

impl FromStr for VehicleId {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VehicleId::parse(s)
    }
}

fn validate_account_label(value: &str, allow_dots: bool) -> PlatformResult<()> {
    if value.len() < MIN_ACCOUNT_ID_LEN {
        return Err(PlatformError::InvalidArgument("account id too short"));
    }
    if value.len() > MAX_ACCOUNT_ID_LEN {
        return Err(PlatformError::InvalidArgument("account id too long"));
    }
    // a leading separator is rejected the same way as a doubled one
    let mut after_separator = true;
    for c in value.chars() {
        match c {
            'a'..='z' | '0'..='9' => after_separator = false,
            '.' if !allow_dots => {
                return Err(PlatformError::InvalidArgument("vehicle id must be a single label"))
            }
            '-' | '_' | '.' => {
                if after_separator {
                    return Err(PlatformError::InvalidArgument(
                        "account id has a misplaced separator",
                    ));
                }
                after_separator = true;
            }
            _ => {
                return Err(PlatformError::InvalidArgument(
                    "account id contains invalid characters",
                ))
            }
        }
    }
    if after_separator {
        return Err(PlatformError::InvalidArgument(
            "account id has a misplaced separator",
        ));
    }
    Ok(())
}

/// Address of a vehicle: a sub-account of the registry's own account.
pub fn child_address(registry: &AccountId, vehicle: &VehicleId) -> PlatformResult<AccountId> {
    AccountId::parse(format!("{}.{}", vehicle.as_str(), registry.as_str()))
}

/// Public half of a caller's signing key, e.g. `ed25519:<base58>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(String);

impl PublicKey {
    const CURVES: [&'static str; 2] = ["ed25519:", "secp256k1:"];

    pub fn parse(value: impl Into<String>) -> PlatformResult<Self> {
        let value = value.into();
        let body = Self::CURVES
            .iter()
            .find_map(|curve| value.strip_prefix(curve))
            .ok_or(PlatformError::InvalidArgument("unsupported public key curve"))?;
        if body.is_empty() || !body.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PlatformError::InvalidArgument("malformed public key"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PublicKey {
    type Error = PlatformError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PublicKey::parse(value)
    }
}

impl From<PublicKey> for String {
    fn from(value: PublicKey) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VehicleCategory {
    Car,
    Motorcycle,
    Truck,
    Bus,
    Van,
    Other,
}

impl VehicleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCategory::Car => "car",
            VehicleCategory::Motorcycle => "motorcycle",
            VehicleCategory::Truck => "truck",
            VehicleCategory::Bus => "bus",
            VehicleCategory::Van => "van",
            VehicleCategory::Other => "other",
        }
    }
}

impl FromStr for VehicleCategory {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "car" => Ok(VehicleCategory::Car),
            "motorcycle" => Ok(VehicleCategory::Motorcycle),
            "truck" => Ok(VehicleCategory::Truck),
            "bus" => Ok(VehicleCategory::Bus),
            "van" => Ok(VehicleCategory::Van),
            "other" => Ok(VehicleCategory::Other),
            _ => Err(PlatformError::InvalidArgument("invalid vehicle category")),
        }
    }
}

/// Who is calling and what they attached. Built by the transport for every
/// synchronous entry point invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub predecessor: AccountId,
    pub signer_public_key: PublicKey,
    pub attached_deposit: Balance,
}

impl CallContext {
    pub fn new(predecessor: AccountId, signer_public_key: PublicKey) -> Self {
        Self {
            predecessor,
            signer_public_key,
            attached_deposit: Balance::ZERO,
        }
    }

    pub fn with_deposit(mut self, deposit: Balance) -> Self {
        self.attached_deposit = deposit;
        self
    }
}

/// Singleton registry header; membership lives in the store's sets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryRecord {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryView {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub account_id: AccountId,
    pub owners: Vec<AccountId>,
    pub contributors: Vec<AccountId>,
    pub vehicle_count: u64,
}

/// Caller-supplied request to provision a vehicle, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewVehicle {
    pub id: String,
    pub title: String,
    pub data: String,
    pub category: VehicleCategory,
    pub owner: String,
}

impl NewVehicle {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        data: impl Into<String>,
        category: VehicleCategory,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            data: data.into(),
            category,
            owner: owner.into(),
        }
    }
}

/// Arguments of the child's `init` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VehicleInit {
    pub title: String,
    pub data: String,
    pub category: VehicleCategory,
    pub owner: AccountId,
}

/// Validated, ephemeral provisioning attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningAttempt {
    pub vehicle: VehicleId,
    pub address: AccountId,
    pub init: VehicleInit,
}

/// Where a provisioning attempt stands once it has left the synchronous
/// checks. Attempts that fail those checks never get a state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningState {
    Dispatched,
    Confirmed,
    Rejected,
    Unresolved,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecommissionState {
    Dispatched,
    Removed,
}

/// Deposit requirements and text limits applied by the entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    pub account_id: AccountId,
    pub init_deposit: Balance,
    pub vehicle_deposit: Balance,
    pub max_name_len: usize,
    pub max_title_len: usize,
    pub max_data_len: usize,
}

impl RegistrySettings {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            init_deposit: Balance::ONE_NEAR,
            vehicle_deposit: Balance::from_millinear(5_000),
            max_name_len: 64,
            max_title_len: 128,
            max_data_len: 2048,
        }
    }

    pub fn from_config(config: &crate::RegistryConfig) -> PlatformResult<Self> {
        let deposit = |millinear| {
            Balance::checked_from_millinear(millinear)
                .ok_or(PlatformError::InvalidArgument("deposit too large"))
        };
        Ok(Self {
            account_id: AccountId::parse(config.account_id.clone())?,
            init_deposit: deposit(config.init_deposit_millinear)?,
            vehicle_deposit: deposit(config.vehicle_deposit_millinear)?,
            max_name_len: config.max_name_len,
            max_title_len: config.max_title_len,
            max_data_len: config.max_data_len,
        })
    }
}
