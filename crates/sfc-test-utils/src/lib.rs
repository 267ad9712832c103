//! Testing utilities for SFC workspace
//!
//! Shared record builders and provider setup.

#![allow(missing_docs)]

use sfc_datastore::MemoryDataStore;
use sfc_provider::{
    ProviderConfig, ServiceFunction, ServiceFunctionChain, ServiceFunctionPath,
    ServiceFunctionType, ServicePathHop, SfDataPlaneLocator, SfcProvider, SfcServiceFunction,
    TransportType,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

pub fn build_sf_data_plane_locator(
    name: &str,
    ip: IpAddr,
    port: u16,
    forwarder: &str,
    transport: TransportType,
) -> SfDataPlaneLocator {
    SfDataPlaneLocator {
        name: name.to_string(),
        ip,
        port,
        service_function_forwarder: forwarder.to_string(),
        transport,
    }
}

/// Locator shared by the stock firewalls
pub fn dummy_locator() -> SfDataPlaneLocator {
    build_sf_data_plane_locator(
        "moscow-5.5.5.5:555-vxlan",
        IpAddr::V4(Ipv4Addr::new(5, 5, 5, 5)),
        555,
        "sff-moscow",
        TransportType::VxlanGpe,
    )
}

pub fn build_service_function(
    name: &str,
    sf_type: ServiceFunctionType,
    ip_mgmt_address: IpAddr,
    locator: SfDataPlaneLocator,
    nsh_aware: bool,
) -> ServiceFunction {
    ServiceFunction {
        name: name.to_string(),
        sf_type: Some(sf_type),
        ip_mgmt_address: Some(ip_mgmt_address),
        sf_data_plane_locator: vec![locator],
        nsh_aware,
    }
}

/// `simple_fw_101`..`simple_fw_103` on 192.168.100.x
pub fn simple_firewalls() -> Vec<ServiceFunction> {
    (101..=103)
        .map(|host| {
            build_service_function(
                &format!("simple_fw_{host}"),
                ServiceFunctionType::Firewall,
                IpAddr::V4(Ipv4Addr::new(192, 168, 100, host)),
                dummy_locator(),
                false,
            )
        })
        .collect()
}

/// Chain whose members are `functions`, in order
pub fn build_chain(name: &str, functions: &[ServiceFunction], symmetric: bool) -> ServiceFunctionChain {
    functions
        .iter()
        .fold(ServiceFunctionChain::new(name), |chain, function| {
            chain.with_function(SfcServiceFunction::new(
                function.name.clone(),
                function.sf_type.unwrap_or(ServiceFunctionType::Firewall),
            ))
        })
        .with_symmetric(symmetric)
}

/// Chain of firewalls named after `members`
pub fn build_chain_of(name: &str, members: &[&str], symmetric: bool) -> ServiceFunctionChain {
    let functions: Vec<_> = members.iter().map(|m| ServiceFunction::new(*m)).collect();
    build_chain(name, &functions, symmetric)
}

/// Hops over `functions` with indexes counting down from `starting_index`
pub fn build_hops(functions: &[&str], starting_index: u8) -> Vec<ServicePathHop> {
    functions
        .iter()
        .zip(0u8..)
        .map(|(function, position)| {
            ServicePathHop::new(position, *function, starting_index.saturating_sub(position))
        })
        .collect()
}

/// Path with only its name and chain set
pub fn build_path(name: &str, chain: &str) -> ServiceFunctionPath {
    ServiceFunctionPath::new(name).with_chain(chain)
}

pub fn setup_test_store() -> Arc<MemoryDataStore> {
    Arc::new(MemoryDataStore::new())
}

/// Provider over a fresh in-memory store
///
/// Must be called within a Tokio runtime.
pub fn setup_test_provider() -> (Arc<MemoryDataStore>, SfcProvider) {
    setup_test_provider_with(ProviderConfig::default())
}

pub fn setup_test_provider_with(config: ProviderConfig) -> (Arc<MemoryDataStore>, SfcProvider) {
    let store = setup_test_store();
    let provider = SfcProvider::new(store.clone(), config).unwrap();
    (store, provider)
}
