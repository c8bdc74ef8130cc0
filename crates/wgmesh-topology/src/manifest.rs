//! The bundle manifest.
//!
//! Maps use `BTreeMap` so the rendered JSON is canonical: with all keys
//! pre-supplied and the derived PSK strategy, two runs over the same spec
//! produce byte-identical manifests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};
use crate::spec::EndpointVersion;

/// A node as recorded in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestNode {
    /// Display name.
    pub name: String,
    /// Assigned mesh address.
    pub address: String,
    /// Endpoint host.
    pub endpoint: String,
    /// Listen port.
    pub listen_port: u16,
    /// Base64 public key.
    pub public_key: String,
}

/// A client as recorded in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestClient {
    /// Display name.
    pub name: String,
    /// Assigned mesh address.
    pub address: String,
    /// Base64 public key.
    pub public_key: String,
    /// Gateways this client tunnels through.
    pub gateways: Vec<String>,
}

/// Summary document bundled alongside the generated configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Network CIDR from the spec.
    pub network_cidr: String,
    /// Interface name from the spec.
    pub interface_name: String,
    /// Endpoint rendering family.
    pub endpoint_version: EndpointVersion,
    /// Whether missing keys were generated.
    pub auto_generate_keys: bool,
    /// Nodes in input order.
    pub nodes: Vec<ManifestNode>,
    /// Clients in input order.
    pub clients: Vec<ManifestClient>,
    /// Neighbor adjacency, name to names.
    pub neighbors: BTreeMap<String, Vec<String>>,
    /// Pair PSKs keyed `"a::b"` with sorted components.
    pub psk_pairs: BTreeMap<String, String>,
}

impl Manifest {
    /// Renders the manifest as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `Archive` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| TopologyError::Archive(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest {
            network_cidr: "10.20.0.0/24".to_string(),
            interface_name: "wg0".to_string(),
            endpoint_version: EndpointVersion::Ipv4,
            auto_generate_keys: false,
            nodes: vec![ManifestNode {
                name: "n1".to_string(),
                address: "10.20.0.1".to_string(),
                endpoint: "1.1.1.1".to_string(),
                listen_port: 51820,
                public_key: "pub".to_string(),
            }],
            clients: Vec::new(),
            neighbors: BTreeMap::new(),
            psk_pairs: BTreeMap::new(),
        }
    }

    #[test]
    fn manifest_field_names() {
        let json: serde_json::Value =
            serde_json::from_str(&sample().to_json().expect("json")).expect("parse");
        assert_eq!(json["networkCidr"], "10.20.0.0/24");
        assert_eq!(json["interfaceName"], "wg0");
        assert_eq!(json["endpointVersion"], "ipv4");
        assert_eq!(json["nodes"][0]["listenPort"], 51820);
        assert!(json.get("pskPairs").is_some());
    }

    #[test]
    fn manifest_rendering_is_stable() {
        let a = sample().to_json().expect("json");
        let b = sample().to_json().expect("json");
        assert_eq!(a, b);
    }
}
