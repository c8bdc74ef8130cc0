//! Per-peer WireGuard configuration synthesis.
//!
//! Emits the INI-style `.conf` text for every node and client, the optional
//! babeld fragment, and the deploy-path projection of a single node.

use std::fmt::Write as FmtWrite;

use wgmesh_wire::PskBook;

use crate::error::{Result, TopologyError};
use crate::manifest::{Manifest, ManifestClient, ManifestNode};
use crate::resolver::ResolvedMesh;
use crate::spec::{EndpointVersion, MeshSpec, PskMode};

/// One emitted peer artifact.
#[derive(Debug, Clone)]
pub struct PeerArtifact {
    /// Peer display name (unsanitized).
    pub name: String,
    /// Directory-safe name.
    pub file_name: String,
    /// Interface config text.
    pub conf: String,
    /// Optional babeld fragment (nodes only).
    pub babel: Option<String>,
}

/// Everything a synthesis run produces.
#[derive(Debug, Clone)]
pub struct MeshBundle {
    /// `<sanitized-interface>.conf`
    pub interface_file: String,
    /// Node artifacts in input order.
    pub nodes: Vec<PeerArtifact>,
    /// Client artifacts in input order.
    pub clients: Vec<PeerArtifact>,
    /// The bundle manifest.
    pub manifest: Manifest,
}

/// A peer as the deploy path hands it to the provisioning service.
#[derive(Debug, Clone)]
pub struct DeployPeer {
    /// Peer display name.
    pub name: String,
    /// Base64 public key.
    pub public_key: String,
    /// Allowed IPs in CIDR notation.
    pub allowed_ips: Vec<String>,
    /// Rendered `host:port` endpoint, when the peer has one.
    pub endpoint: Option<String>,
    /// Keepalive seconds, when enabled.
    pub persistent_keepalive: Option<u16>,
}

/// The single-node projection used by the deploy endpoint.
#[derive(Debug, Clone)]
pub struct NodeDeployment {
    /// Interface name from the spec.
    pub interface_name: String,
    /// The node's own address as `/32`.
    pub address_cidr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Base64 private key.
    pub private_key: String,
    /// Peers this node tunnels to.
    pub peers: Vec<DeployPeer>,
}

/// Trims and replaces runs of characters outside `[A-Za-z0-9_-]` with `_`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Renders `host:port`, bracketing (and de-bracketing) IPv6 hosts.
#[must_use]
pub fn format_endpoint(host: &str, port: u16, version: EndpointVersion) -> String {
    match version {
        EndpointVersion::Ipv4 => format!("{host}:{port}"),
        EndpointVersion::Ipv6 => {
            let host = host.trim_start_matches('[').trim_end_matches(']');
            format!("[{host}]:{port}")
        }
    }
}

/// Synthesizes the full bundle for a resolved mesh.
///
/// # Errors
///
/// Returns an error if a gateway reference cannot be resolved (the spec
/// validator normally catches this earlier).
pub fn synthesize(spec: &MeshSpec, mesh: &ResolvedMesh, psks: &mut PskBook) -> Result<MeshBundle> {
    let interface_file = format!("{}.conf", sanitize_filename(&spec.interface_name));

    let mut nodes = Vec::with_capacity(mesh.nodes.len());
    for i in 0..mesh.nodes.len() {
        let conf = node_conf(spec, mesh, i, psks);
        let babel = spec
            .enable_babel
            .then(|| babel_conf(&spec.interface_name, &spec.network_cidr));
        nodes.push(PeerArtifact {
            name: mesh.nodes[i].name.clone(),
            file_name: sanitize_filename(&mesh.nodes[i].name),
            conf,
            babel,
        });
    }

    let mut clients = Vec::with_capacity(mesh.clients.len());
    for i in 0..mesh.clients.len() {
        let conf = client_conf(spec, mesh, i, psks)?;
        clients.push(PeerArtifact {
            name: mesh.clients[i].name.clone(),
            file_name: sanitize_filename(&mesh.clients[i].name),
            conf,
            babel: None,
        });
    }

    let manifest = build_manifest(spec, mesh, psks);

    Ok(MeshBundle {
        interface_file,
        nodes,
        clients,
        manifest,
    })
}

fn node_conf(spec: &MeshSpec, mesh: &ResolvedMesh, index: usize, psks: &mut PskBook) -> String {
    let node = &mesh.nodes[index];
    let mut out = String::new();

    out.push_str("[Interface]\n");
    let _ = writeln!(out, "Address = {}/32", node.address);
    let _ = writeln!(out, "ListenPort = {}", node.listen_port);
    let _ = writeln!(out, "PrivateKey = {}", node.private_key);
    if spec.include_ip_forwarding {
        out.push_str("PostUp = sysctl -w net.ipv4.ip_forward=1\n");
        out.push_str("PostDown = sysctl -w net.ipv4.ip_forward=0\n");
    }

    for &j in &mesh.neighbors[index] {
        let peer = &mesh.nodes[j];
        out.push('\n');
        let _ = writeln!(out, "# {}", peer.name);
        out.push_str("[Peer]\n");
        let _ = writeln!(out, "PublicKey = {}", peer.public_key);
        let _ = writeln!(
            out,
            "PresharedKey = {}",
            psks.get(&node.name, &peer.name).to_base64()
        );
        let _ = writeln!(out, "AllowedIPs = {}/32", peer.address);
        let _ = writeln!(
            out,
            "Endpoint = {}",
            format_endpoint(&peer.endpoint, peer.listen_port, spec.endpoint_version)
        );
        if spec.persistent_keepalive > 0 {
            let _ = writeln!(out, "PersistentKeepalive = {}", spec.persistent_keepalive);
        }
    }

    if spec.is_gateway(&node.name) {
        for client in &mesh.clients {
            out.push('\n');
            let _ = writeln!(out, "# {}", client.name);
            out.push_str("[Peer]\n");
            let _ = writeln!(out, "PublicKey = {}", client.public_key);
            let _ = writeln!(
                out,
                "PresharedKey = {}",
                psks.get(&client.name, &node.name).to_base64()
            );
            let _ = writeln!(out, "AllowedIPs = {}/32", client.address);
        }
    }

    out
}

fn client_conf(
    spec: &MeshSpec,
    mesh: &ResolvedMesh,
    index: usize,
    psks: &mut PskBook,
) -> Result<String> {
    let client = &mesh.clients[index];
    let mut out = String::new();

    out.push_str("[Interface]\n");
    let _ = writeln!(out, "Address = {}/32", client.address);
    let _ = writeln!(out, "PrivateKey = {}", client.private_key);

    for gateway_name in &spec.gateway_node_names {
        let gateway = mesh
            .nodes
            .iter()
            .find(|n| &n.name == gateway_name)
            .ok_or_else(|| TopologyError::UnknownGateway(gateway_name.clone()))?;

        out.push('\n');
        let _ = writeln!(out, "# {}", gateway.name);
        out.push_str("[Peer]\n");
        let _ = writeln!(out, "PublicKey = {}", gateway.public_key);
        let _ = writeln!(
            out,
            "PresharedKey = {}",
            psks.get(&client.name, &gateway.name).to_base64()
        );
        let _ = writeln!(out, "AllowedIPs = {}", spec.network_cidr);
        let _ = writeln!(
            out,
            "Endpoint = {}",
            format_endpoint(&gateway.endpoint, gateway.listen_port, spec.endpoint_version)
        );
        if spec.persistent_keepalive > 0 {
            let _ = writeln!(out, "PersistentKeepalive = {}", spec.persistent_keepalive);
        }
    }

    Ok(out)
}

fn babel_conf(interface_name: &str, network_cidr: &str) -> String {
    format!("interface {interface_name}\nredistribute local\nredistribute ip {network_cidr}\n")
}

fn build_manifest(spec: &MeshSpec, mesh: &ResolvedMesh, psks: &mut PskBook) -> Manifest {
    let nodes = mesh
        .nodes
        .iter()
        .map(|n| ManifestNode {
            name: n.name.clone(),
            address: n.address.to_string(),
            endpoint: n.endpoint.clone(),
            listen_port: n.listen_port,
            public_key: n.public_key.clone(),
        })
        .collect();

    let clients = mesh
        .clients
        .iter()
        .map(|c| ManifestClient {
            name: c.name.clone(),
            address: c.address.to_string(),
            public_key: c.public_key.clone(),
            gateways: spec.gateway_node_names.clone(),
        })
        .collect();

    let psk_pairs = psks
        .pairs()
        .into_iter()
        .map(|(pair, psk)| (pair, psk.to_base64()))
        .collect();

    Manifest {
        network_cidr: spec.network_cidr.clone(),
        interface_name: spec.interface_name.clone(),
        endpoint_version: spec.endpoint_version,
        auto_generate_keys: spec.auto_generate_keys,
        nodes,
        clients,
        neighbors: mesh.neighbor_names(),
        psk_pairs,
    }
}

/// Builds a [`PskBook`] matching the spec's requested strategy.
#[must_use]
pub fn psk_book_for(spec: &MeshSpec) -> PskBook {
    match spec.psk_mode {
        PskMode::Derived => PskBook::derived(),
        PskMode::Random => PskBook::random(),
    }
}

/// Projects a single node's deployment view out of a resolved mesh.
///
/// # Errors
///
/// Returns `Validation` when the named node is not part of the mesh.
pub fn node_deployment(
    spec: &MeshSpec,
    mesh: &ResolvedMesh,
    node_name: &str,
) -> Result<NodeDeployment> {
    let (index, node) = mesh
        .nodes
        .iter()
        .enumerate()
        .find(|(_, n)| n.name == node_name)
        .ok_or_else(|| TopologyError::Validation(format!("unknown node: {node_name}")))?;

    let keepalive = (spec.persistent_keepalive > 0).then_some(spec.persistent_keepalive);

    let mut peers = Vec::new();
    for &j in &mesh.neighbors[index] {
        let peer = &mesh.nodes[j];
        peers.push(DeployPeer {
            name: peer.name.clone(),
            public_key: peer.public_key.clone(),
            allowed_ips: vec![format!("{}/32", peer.address)],
            endpoint: Some(format_endpoint(
                &peer.endpoint,
                peer.listen_port,
                spec.endpoint_version,
            )),
            persistent_keepalive: keepalive,
        });
    }

    if spec.is_gateway(&node.name) {
        for client in &mesh.clients {
            peers.push(DeployPeer {
                name: client.name.clone(),
                public_key: client.public_key.clone(),
                allowed_ips: vec![format!("{}/32", client.address)],
                endpoint: None,
                persistent_keepalive: None,
            });
        }
    }

    Ok(NodeDeployment {
        interface_name: spec.interface_name.clone(),
        address_cidr: format!("{}/32", node.address),
        listen_port: node.listen_port,
        private_key: node.private_key.clone(),
        peers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;
    use crate::spec::{ClientInput, NodeInput};

    fn node(name: &str, endpoint: &str) -> NodeInput {
        NodeInput {
            id: format!("id-{name}"),
            name: name.to_string(),
            private_key: None,
            public_key: None,
            endpoint: endpoint.to_string(),
            listen_port: 51820,
            ssh_user: None,
            ssh_port: None,
        }
    }

    fn scenario_spec() -> MeshSpec {
        MeshSpec {
            network_cidr: "10.20.0.0/24".to_string(),
            interface_name: "wg0".to_string(),
            endpoint_version: EndpointVersion::Ipv4,
            persistent_keepalive: 25,
            include_ip_forwarding: true,
            enable_babel: true,
            auto_generate_keys: true,
            nodes: vec![
                node("N1", "1.1.1.1"),
                node("N2", "2.2.2.2"),
                node("N3", "3.3.3.3"),
            ],
            clients: vec![ClientInput {
                id: "id-C1".to_string(),
                name: "C1".to_string(),
                private_key: None,
                public_key: None,
            }],
            gateway_node_names: vec!["N1".to_string()],
            psk_mode: PskMode::Derived,
        }
    }

    #[test]
    fn sanitize_collapses_runs() {
        assert_eq!(sanitize_filename("  node one/two  "), "node_one_two");
        assert_eq!(sanitize_filename("a!!b"), "a_b");
        assert_eq!(sanitize_filename("plain-name_9"), "plain-name_9");
    }

    #[test]
    fn endpoint_formatting() {
        assert_eq!(
            format_endpoint("1.2.3.4", 51820, EndpointVersion::Ipv4),
            "1.2.3.4:51820"
        );
        assert_eq!(
            format_endpoint("fe80::1", 51820, EndpointVersion::Ipv6),
            "[fe80::1]:51820"
        );
        assert_eq!(
            format_endpoint("[fe80::1]", 51820, EndpointVersion::Ipv6),
            "[fe80::1]:51820"
        );
    }

    #[test]
    fn full_mesh_scenario_artifacts() {
        let spec = scenario_spec();
        let mesh = resolve(&spec).expect("resolve");
        let mut psks = psk_book_for(&spec);
        let bundle = synthesize(&spec, &mesh, &mut psks).expect("synthesize");

        assert_eq!(bundle.interface_file, "wg0.conf");
        assert_eq!(bundle.nodes.len(), 3);
        assert_eq!(bundle.clients.len(), 1);

        // N1 is a gateway: neighbors N2, N3 plus the client section.
        let n1 = &bundle.nodes[0].conf;
        assert!(n1.contains("Address = 10.20.0.1/32"));
        assert!(n1.contains("ListenPort = 51820"));
        assert!(n1.contains("PostUp = sysctl -w net.ipv4.ip_forward=1"));
        assert!(n1.contains("PostDown = sysctl -w net.ipv4.ip_forward=0"));
        assert!(n1.contains("# N2"));
        assert!(n1.contains("# N3"));
        assert!(n1.contains("# C1"));
        assert!(n1.contains("AllowedIPs = 10.20.0.101/32"));
        assert!(n1.contains("Endpoint = 2.2.2.2:51820"));
        assert_eq!(n1.matches("[Peer]").count(), 3);

        // Non-gateway node has no client section.
        let n2 = &bundle.nodes[1].conf;
        assert!(!n2.contains("# C1"));
        assert_eq!(n2.matches("[Peer]").count(), 2);

        // The client tunnels to its single gateway over the whole network.
        let c1 = &bundle.clients[0].conf;
        assert!(c1.contains("Address = 10.20.0.101/32"));
        assert!(c1.contains("# N1"));
        assert!(c1.contains("AllowedIPs = 10.20.0.0/24"));
        assert!(c1.contains("Endpoint = 1.1.1.1:51820"));
        assert!(c1.contains("PersistentKeepalive = 25"));
        assert_eq!(c1.matches("[Peer]").count(), 1);
        assert!(!c1.contains("ListenPort"));

        let babel = bundle.nodes[0].babel.as_deref().expect("babel fragment");
        assert_eq!(
            babel,
            "interface wg0\nredistribute local\nredistribute ip 10.20.0.0/24\n"
        );
    }

    #[test]
    fn psks_match_across_both_sides() {
        let spec = scenario_spec();
        let mesh = resolve(&spec).expect("resolve");
        let mut psks = psk_book_for(&spec);
        let bundle = synthesize(&spec, &mesh, &mut psks).expect("synthesize");

        // The client's PSK for N1 appears verbatim in N1's config.
        let c1 = &bundle.clients[0].conf;
        let psk_line = c1
            .lines()
            .find(|l| l.starts_with("PresharedKey = "))
            .expect("client psk line");
        assert!(bundle.nodes[0].conf.contains(psk_line));
    }

    #[test]
    fn keepalive_zero_is_omitted() {
        let mut spec = scenario_spec();
        spec.persistent_keepalive = 0;
        let mesh = resolve(&spec).expect("resolve");
        let mut psks = psk_book_for(&spec);
        let bundle = synthesize(&spec, &mesh, &mut psks).expect("synthesize");
        assert!(!bundle.nodes[0].conf.contains("PersistentKeepalive"));
    }

    #[test]
    fn node_deployment_projection() {
        let spec = scenario_spec();
        let mesh = resolve(&spec).expect("resolve");
        let deployment = node_deployment(&spec, &mesh, "N1").expect("deployment");

        assert_eq!(deployment.interface_name, "wg0");
        assert_eq!(deployment.address_cidr, "10.20.0.1/32");
        assert_eq!(deployment.listen_port, 51820);
        // Two neighbors plus one client.
        assert_eq!(deployment.peers.len(), 3);
        let client_peer = deployment
            .peers
            .iter()
            .find(|p| p.name == "C1")
            .expect("client peer");
        assert!(client_peer.endpoint.is_none());
        assert!(client_peer.persistent_keepalive.is_none());

        assert!(node_deployment(&spec, &mesh, "ghost").is_err());
    }
}
