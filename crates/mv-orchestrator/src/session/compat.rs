//! Client/network version compatibility

use semver::{Version, VersionReq};

use mv_core::types::BackendInfo;

/// Whether this client satisfies the network's minimum client version
///
/// Unparseable versions are logged and treated as compatible.
pub fn is_network_compatible(client_version: &str, info: &BackendInfo) -> bool {
    let Some(min) = info.min_client_version.as_deref() else {
        return true;
    };

    let version = match Version::parse(client_version) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Unparseable client version {:?}: {}", client_version, e);
            return true;
        }
    };
    let requirement = match VersionReq::parse(&format!(">={}", min)) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!("Unparseable minimum client version {:?}: {}", min, e);
            return true;
        }
    };

    let compatible = requirement.matches(&version);
    if !compatible {
        tracing::warn!(
            client = %version,
            required = %min,
            daemon = %info.version,
            "Client version is below the network minimum"
        );
    }
    compatible
}
