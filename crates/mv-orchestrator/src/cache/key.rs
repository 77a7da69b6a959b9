//! Cache keys

use std::fmt;

use mv_core::GatewayType;

/// Every key the gateway cache knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    MxEntryGateways,
    MxExitGateways,
    WgGateways,
    AccountId,
    DeviceId,
}

impl CacheKey {
    pub const ALL: [CacheKey; 5] = [
        CacheKey::MxEntryGateways,
        CacheKey::MxExitGateways,
        CacheKey::WgGateways,
        CacheKey::AccountId,
        CacheKey::DeviceId,
    ];

    /// Keys tied to the stored credential
    pub const IDENTITY: [CacheKey; 2] = [CacheKey::AccountId, CacheKey::DeviceId];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::MxEntryGateways => "mx-entry-gateways",
            CacheKey::MxExitGateways => "mx-exit-gateways",
            CacheKey::WgGateways => "wg-gateways",
            CacheKey::AccountId => "account-id",
            CacheKey::DeviceId => "device-id",
        }
    }
}

impl From<GatewayType> for CacheKey {
    fn from(kind: GatewayType) -> Self {
        match kind {
            GatewayType::MxEntry => CacheKey::MxEntryGateways,
            GatewayType::MxExit => CacheKey::MxExitGateways,
            GatewayType::Wg => CacheKey::WgGateways,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
