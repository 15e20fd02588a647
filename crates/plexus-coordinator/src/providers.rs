// Collaborator seams the coordinator consumes.
//
// Registration/staking, access control, fee settlement, and chain
// randomness are independent services; the coordinator talks to them
// through these traits and never assumes an implementation.

use plexus_core::NodeId;
use std::sync::Arc;

/// Gate on `request_join`: is this identity a registered, staked
/// compute provider?
pub trait ProviderRegistry: Send + Sync {
    fn is_eligible(&self, identity: &NodeId) -> bool;
}

/// Private-run gate: may `identity` join the run protected by
/// `key_ref`? Returns the decision plus diagnostic info for the caller.
pub trait AccessControl: Send + Sync {
    fn check_access(&self, key_ref: &str, identity: &NodeId) -> (bool, String);
}

/// Charges the optional run-creation fee to a configured recipient.
pub trait FeeCollector: Send + Sync {
    fn charge(&self, payer: &NodeId, recipient: &str, amount: u64) -> Result<(), String>;
}

/// Supplies recent chain randomness for round-seed derivation. The
/// coordinator itself generates no randomness, so every transition is
/// replayable from its inputs.
pub trait RandomnessBeacon: Send + Sync {
    fn beacon(&self) -> u64;
}

/// Accepts every identity. For permissionless deployments and tests.
pub struct OpenProviderRegistry;

impl ProviderRegistry for OpenProviderRegistry {
    fn is_eligible(&self, _identity: &NodeId) -> bool {
        true
    }
}

/// Grants every access check.
pub struct OpenAccess;

impl AccessControl for OpenAccess {
    fn check_access(&self, _key_ref: &str, _identity: &NodeId) -> (bool, String) {
        (true, String::new())
    }
}

/// Accepts any fee without settling it anywhere.
pub struct NoFee;

impl FeeCollector for NoFee {
    fn charge(&self, _payer: &NodeId, _recipient: &str, _amount: u64) -> Result<(), String> {
        Ok(())
    }
}

/// A constant beacon. Committee sampling degrades to predictable but
/// still uniform draws; fine for tests and single-operator setups.
pub struct FixedBeacon(pub u64);

impl RandomnessBeacon for FixedBeacon {
    fn beacon(&self) -> u64 {
        self.0
    }
}

/// The collaborator bundle a registry is constructed with.
#[derive(Clone)]
pub struct Providers {
    pub provider_registry: Arc<dyn ProviderRegistry>,
    pub access_control: Arc<dyn AccessControl>,
    pub fee_collector: Arc<dyn FeeCollector>,
    pub randomness: Arc<dyn RandomnessBeacon>,
}

impl Providers {
    /// Fully open wiring: everyone eligible, every access granted, fees
    /// accepted, constant beacon.
    pub fn open() -> Self {
        Providers {
            provider_registry: Arc::new(OpenProviderRegistry),
            access_control: Arc::new(OpenAccess),
            fee_collector: Arc::new(NoFee),
            randomness: Arc::new(FixedBeacon(0)),
        }
    }
}
