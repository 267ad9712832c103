//! SFC data model
//!
//! Fixed record types stored in the key-tree:
//! - Service function chains (configuration)
//! - Service function paths (configuration)
//! - Service functions (configuration)
//! - Service function state, the function -> paths back-reference index
//!   (operational)

use serde::{Deserialize, Serialize};
use sfc_datastore::{Address, Partition};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Record stored as a keyed list entry
pub trait Entity: Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static {
    /// Root container address
    const CONTAINER: Address;

    /// Partition the records live in
    const PARTITION: Partition;

    /// Key leaf value
    fn name(&self) -> &str;

    /// Address of the record keyed `name`
    #[inline]
    fn address(name: &str) -> Address {
        Self::CONTAINER.child(name)
    }
}

/// Encapsulation used between hops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportType {
    VxlanGpe,
    Gre,
    Mpls,
    Mac,
}

/// Service function type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceFunctionType {
    Firewall,
    Dpi,
    Napt44,
    HttpHeaderEnrichment,
    Qos,
    Ids,
}

/// Chain member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SfcServiceFunction {
    pub name: String,
    #[serde(rename = "type")]
    pub sf_type: ServiceFunctionType,
}

impl SfcServiceFunction {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, sf_type: ServiceFunctionType) -> Self {
        Self {
            name: name.into(),
            sf_type,
        }
    }
}

/// Ordered set of service-function roles a path must traverse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceFunctionChain {
    pub name: String,
    #[serde(default)]
    pub sfc_service_function: Vec<SfcServiceFunction>,
    #[serde(default)]
    pub symmetric: bool,
}

impl ServiceFunctionChain {
    /// Create an empty, non-symmetric chain
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sfc_service_function: Vec::new(),
            symmetric: false,
        }
    }

    /// Append a member
    #[inline]
    #[must_use]
    pub fn with_function(mut self, function: SfcServiceFunction) -> Self {
        self.sfc_service_function.push(function);
        self
    }

    /// Set the symmetric flag
    #[inline]
    #[must_use]
    pub fn with_symmetric(mut self, symmetric: bool) -> Self {
        self.symmetric = symmetric;
        self
    }

    /// First member name that appears more than once
    #[must_use]
    pub fn duplicate_member(&self) -> Option<&str> {
        let mut seen = BTreeSet::new();
        self.sfc_service_function
            .iter()
            .map(|f| f.name.as_str())
            .find(|name| !seen.insert(*name))
    }

    /// Member names in chain order
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.sfc_service_function.iter().map(|f| f.name.as_str())
    }
}

impl Entity for ServiceFunctionChain {
    const CONTAINER: Address = Address::container("service-function-chains");
    const PARTITION: Partition = Partition::Configuration;

    fn name(&self) -> &str {
        &self.name
    }
}

/// One hop of a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServicePathHop {
    pub hop_number: u8,
    pub service_function_name: String,
    pub service_index: u8,
}

impl ServicePathHop {
    #[inline]
    #[must_use]
    pub fn new(hop_number: u8, service_function_name: impl Into<String>, service_index: u8) -> Self {
        Self {
            hop_number,
            service_function_name: service_function_name.into(),
            service_index,
        }
    }
}

/// Concrete instantiation of a chain
///
/// Every attribute but the name is optional; a path with none of the identity
/// fields set is a default path (see
/// [`is_default_service_path`](crate::lifecycle::is_default_service_path)).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceFunctionPath {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_chain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_type: Option<TransportType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_index: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_path_hop: Option<Vec<ServicePathHop>>,
    /// Forward path this record was generated from; set only on reverse paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_of: Option<String>,
}

impl ServiceFunctionPath {
    /// Create a bare path
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_chain(mut self, chain_name: impl Into<String>) -> Self {
        self.service_chain_name = Some(chain_name.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_path_id(mut self, path_id: u32) -> Self {
        self.path_id = Some(path_id);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportType) -> Self {
        self.transport_type = Some(transport);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_starting_index(mut self, index: u8) -> Self {
        self.starting_index = Some(index);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_hops(mut self, hops: Vec<ServicePathHop>) -> Self {
        self.service_path_hop = Some(hops);
        self
    }

    /// Function names in hop order (empty when no hops are configured)
    pub fn hop_function_names(&self) -> impl Iterator<Item = &str> {
        self.service_path_hop
            .iter()
            .flatten()
            .map(|hop| hop.service_function_name.as_str())
    }
}

impl Entity for ServiceFunctionPath {
    const CONTAINER: Address = Address::container("service-function-paths");
    const PARTITION: Partition = Partition::Configuration;

    fn name(&self) -> &str {
        &self.name
    }
}

/// Root container of all paths
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceFunctionPaths {
    #[serde(default)]
    pub service_function_path: Vec<ServiceFunctionPath>,
}

impl ServiceFunctionPaths {
    #[inline]
    #[must_use]
    pub fn new(service_function_path: Vec<ServiceFunctionPath>) -> Self {
        Self {
            service_function_path,
        }
    }
}

/// Data-plane locator of a service function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SfDataPlaneLocator {
    pub name: String,
    pub ip: IpAddr,
    pub port: u16,
    pub service_function_forwarder: String,
    pub transport: TransportType,
}

/// A network service function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceFunction {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub sf_type: Option<ServiceFunctionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_mgmt_address: Option<IpAddr>,
    #[serde(default)]
    pub sf_data_plane_locator: Vec<SfDataPlaneLocator>,
    #[serde(default)]
    pub nsh_aware: bool,
}

impl ServiceFunction {
    /// Create a function with only its name set
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sf_type: None,
            ip_mgmt_address: None,
            sf_data_plane_locator: Vec::new(),
            nsh_aware: false,
        }
    }
}

impl Entity for ServiceFunction {
    const CONTAINER: Address = Address::container("service-functions");
    const PARTITION: Partition = Partition::Configuration;

    fn name(&self) -> &str {
        &self.name
    }
}

/// Back-reference entry: paths currently referencing one function
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceFunctionState {
    pub name: String,
    #[serde(default)]
    pub sfp: BTreeSet<String>,
}

impl ServiceFunctionState {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sfp: BTreeSet::new(),
        }
    }
}

impl Entity for ServiceFunctionState {
    const CONTAINER: Address = Address::container("service-functions-state");
    const PARTITION: Partition = Partition::Operational;

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_serializes_kebab_case_and_skips_unset() {
        let path = ServiceFunctionPath::new("SFP1")
            .with_chain("C1")
            .with_transport(TransportType::VxlanGpe);

        let value = serde_json::to_value(&path).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "SFP1",
                "service-chain-name": "C1",
                "transport-type": "vxlan-gpe",
            })
        );
    }

    #[test]
    fn reverse_marker_uses_kebab_key() {
        let mut path = ServiceFunctionPath::new("P1-Reverse").with_chain("C1");
        path.reverse_of = Some("P1".to_string());

        let value = serde_json::to_value(&path).unwrap();
        assert_eq!(value["reverse-of"], json!("P1"));

        // Records written without the marker still load
        let plain: ServiceFunctionPath =
            serde_json::from_value(json!({"name": "P2"})).unwrap();
        assert_eq!(plain.reverse_of, None);
    }

    #[test]
    fn empty_hop_list_survives_round_trip() {
        let path = ServiceFunctionPath::new("SFP1").with_hops(Vec::new());
        let value = serde_json::to_value(&path).unwrap();
        let back: ServiceFunctionPath = serde_json::from_value(value).unwrap();
        assert_eq!(back.service_path_hop, Some(Vec::new()));
    }

    #[test]
    fn chain_reports_duplicate_member() {
        let chain = ServiceFunctionChain::new("C1")
            .with_function(SfcServiceFunction::new("SF1", ServiceFunctionType::Firewall))
            .with_function(SfcServiceFunction::new("SF2", ServiceFunctionType::Dpi))
            .with_function(SfcServiceFunction::new("SF1", ServiceFunctionType::Firewall));
        assert_eq!(chain.duplicate_member(), Some("SF1"));

        let unique = ServiceFunctionChain::new("C2")
            .with_function(SfcServiceFunction::new("SF1", ServiceFunctionType::Firewall));
        assert_eq!(unique.duplicate_member(), None);
    }

    #[test]
    fn entity_addresses() {
        assert_eq!(
            ServiceFunctionPath::address("SFP1").to_string(),
            "service-function-paths/SFP1"
        );
        assert_eq!(ServiceFunctionState::PARTITION, Partition::Operational);
    }
}
