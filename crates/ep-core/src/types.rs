//! Node and topology types

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::TopologyError;
use crate::traits::NodeTransport;

/// Role held by the bootstrap node that proxies all registry and
/// repository traffic
pub const DAY0_ROLE: &str = "day-0";

/// One node of the cluster
pub struct NodeInfo {
    ip: String,
    roles: Vec<String>,
    client: Arc<dyn NodeTransport>,
}

impl NodeInfo {
    /// Create a node holding the given roles
    pub fn new(
        ip: impl Into<String>,
        roles: impl IntoIterator<Item = impl Into<String>>,
        client: Arc<dyn NodeTransport>,
    ) -> Self {
        Self {
            ip: ip.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            client,
        }
    }

    /// Network address, unique within a topology
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Roles in declaration order
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Check if the node holds a role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Transport used to reach the node
    pub fn client(&self) -> &Arc<dyn NodeTransport> {
        &self.client
    }
}

impl fmt::Debug for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeInfo")
            .field("ip", &self.ip)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ip)
    }
}

/// Role to ordered node list mapping.
///
/// Always resolves [`DAY0_ROLE`] to at least one node. Read-only once built.
#[derive(Debug, Clone)]
pub struct NodeTopology {
    by_role: BTreeMap<String, Vec<Arc<NodeInfo>>>,
    /// Every node in declaration order
    nodes: Vec<Arc<NodeInfo>>,
}

impl NodeTopology {
    /// Build a topology, keeping the declaration order within each role
    pub fn new(nodes: impl IntoIterator<Item = NodeInfo>) -> Result<Self, TopologyError> {
        let mut by_role: BTreeMap<String, Vec<Arc<NodeInfo>>> = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut all = Vec::new();

        for node in nodes {
            if node.roles.is_empty() {
                return Err(TopologyError::NoRole(node.ip));
            }
            if !seen.insert(node.ip.clone()) {
                return Err(TopologyError::DuplicateAddress(node.ip));
            }

            let node = Arc::new(node);
            for role in &node.roles {
                by_role
                    .entry(role.clone())
                    .or_default()
                    .push(Arc::clone(&node));
            }
            all.push(node);
        }

        if by_role.get(DAY0_ROLE).map_or(true, |n| n.is_empty()) {
            return Err(TopologyError::MissingDayZero);
        }

        Ok(Self {
            by_role,
            nodes: all,
        })
    }

    /// The bootstrap node: first node declared with the day-0 role
    pub fn day0(&self) -> &Arc<NodeInfo> {
        // Construction guarantees a non-empty day-0 list
        &self.by_role[DAY0_ROLE][0]
    }

    /// Nodes holding a role, in declaration order
    pub fn nodes_by_role(&self, role: &str) -> &[Arc<NodeInfo>] {
        self.by_role.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every node holding any of `roles`, each node once
    pub fn select(&self, roles: &[&str]) -> Vec<Arc<NodeInfo>> {
        self.nodes
            .iter()
            .filter(|n| roles.iter().any(|r| n.has_role(r)))
            .cloned()
            .collect()
    }

    /// Look up a node by address
    pub fn node(&self, ip: &str) -> Option<&Arc<NodeInfo>> {
        self.nodes.iter().find(|n| n.ip == ip)
    }

    /// Every node in declaration order
    pub fn nodes(&self) -> &[Arc<NodeInfo>] {
        &self.nodes
    }

    /// Role names present in the topology
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.by_role.keys().map(String::as_str)
    }
}
