//! Function -> path back-reference index
//!
//! The index lives in `service-functions-state` (operational partition) and is
//! derived from configured paths; it is never a source of truth. Lifecycle
//! operations keep it in step with path writes inside the same transaction,
//! and bulk path writes rebuild it from scratch.

use crate::error::SfcResult;
use crate::model::{ServiceFunctionChain, ServiceFunctionPath, ServiceFunctionState};
use crate::repository::FunctionStateRepository;
use sfc_datastore::ReadWriteTransaction;
use std::collections::{BTreeMap, BTreeSet};

/// Function names a path depends on
///
/// Hop functions when hops are configured, otherwise the members of its chain.
#[must_use]
pub fn path_references(
    path: &ServiceFunctionPath,
    chain: Option<&ServiceFunctionChain>,
) -> BTreeSet<String> {
    if path.service_path_hop.is_some() {
        return path.hop_function_names().map(str::to_string).collect();
    }
    chain
        .into_iter()
        .flat_map(ServiceFunctionChain::member_names)
        .map(str::to_string)
        .collect()
}

/// Functions whose index entry currently lists `path_name`
///
/// Reads the index itself rather than recomputing from the path, so entries
/// written against a chain that has since changed or vanished are found too.
pub(crate) async fn indexed_references(
    tx: &ReadWriteTransaction,
    path_name: &str,
) -> SfcResult<BTreeSet<String>> {
    Ok(FunctionStateRepository::read_all_in(tx)
        .await?
        .into_iter()
        .filter(|state| state.sfp.contains(path_name))
        .map(|state| state.name)
        .collect())
}

/// Stage index changes for `path_name` moving from `old` to `new` references
pub(crate) async fn relink(
    tx: &mut ReadWriteTransaction,
    path_name: &str,
    old: &BTreeSet<String>,
    new: &BTreeSet<String>,
) -> SfcResult<()> {
    for function in old.difference(new) {
        unlink(tx, function, path_name).await?;
    }
    for function in new.difference(old) {
        link(tx, function, path_name).await?;
    }
    Ok(())
}

/// Stage `path_name` into `function`'s entry, creating it if needed
pub(crate) async fn link(
    tx: &mut ReadWriteTransaction,
    function: &str,
    path_name: &str,
) -> SfcResult<()> {
    let mut state = FunctionStateRepository::read_in(tx, function)
        .await?
        .unwrap_or_else(|| ServiceFunctionState::new(function));
    if state.sfp.insert(path_name.to_string()) {
        FunctionStateRepository::stage_put(tx, &state)?;
    }
    Ok(())
}

/// Stage removal of `path_name` from `function`'s entry
///
/// Entries left without paths are removed.
pub(crate) async fn unlink(
    tx: &mut ReadWriteTransaction,
    function: &str,
    path_name: &str,
) -> SfcResult<()> {
    let Some(mut state) = FunctionStateRepository::read_in(tx, function).await? else {
        return Ok(());
    };
    if !state.sfp.remove(path_name) {
        return Ok(());
    }
    if state.sfp.is_empty() {
        FunctionStateRepository::stage_delete(tx, function);
    } else {
        FunctionStateRepository::stage_put(tx, &state)?;
    }
    Ok(())
}

/// Compute the whole index for a set of paths
#[must_use]
pub fn build(
    paths: &[ServiceFunctionPath],
    chains: &[ServiceFunctionChain],
) -> Vec<ServiceFunctionState> {
    let chains: BTreeMap<&str, &ServiceFunctionChain> =
        chains.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut index: BTreeMap<String, ServiceFunctionState> = BTreeMap::new();
    for path in paths {
        let chain = path
            .service_chain_name
            .as_deref()
            .and_then(|name| chains.get(name).copied());
        for function in path_references(path, chain) {
            index
                .entry(function.clone())
                .or_insert_with(|| ServiceFunctionState::new(function))
                .sfp
                .insert(path.name.clone());
        }
    }
    index.into_values().collect()
}

/// Stage a full rebuild of the index
pub(crate) fn stage_rebuild(
    tx: &mut ReadWriteTransaction,
    paths: &[ServiceFunctionPath],
    chains: &[ServiceFunctionChain],
) -> SfcResult<()> {
    let index = build(paths, chains);
    tracing::debug!(entries = index.len(), "rebuilding back-reference index");
    FunctionStateRepository::stage_put_all(tx, &index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ServicePathHop, ServiceFunctionType, SfcServiceFunction};
    use sfc_datastore::MemoryDataStore;
    use std::sync::Arc;

    fn chain() -> ServiceFunctionChain {
        ServiceFunctionChain::new("C1")
            .with_function(SfcServiceFunction::new("SF1", ServiceFunctionType::Firewall))
            .with_function(SfcServiceFunction::new("SF2", ServiceFunctionType::Dpi))
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn hops_take_precedence_over_chain() {
        let chain = chain();
        let plain = ServiceFunctionPath::new("P1").with_chain("C1");
        let hopped = plain
            .clone()
            .with_hops(vec![ServicePathHop::new(0, "SF9", 255)]);

        assert_eq!(path_references(&plain, Some(&chain)), set(&["SF1", "SF2"]));
        assert_eq!(path_references(&hopped, Some(&chain)), set(&["SF9"]));
        assert!(path_references(&plain, None).is_empty());
    }

    #[test]
    fn build_groups_paths_by_function() {
        let paths = vec![
            ServiceFunctionPath::new("P1").with_chain("C1"),
            ServiceFunctionPath::new("P2").with_hops(vec![ServicePathHop::new(0, "SF2", 255)]),
            ServiceFunctionPath::new("P3").with_chain("missing"),
        ];
        let index = build(&paths, &[chain()]);

        assert_eq!(index.len(), 2);
        assert_eq!(index[0].name, "SF1");
        assert_eq!(index[0].sfp, set(&["P1"]));
        assert_eq!(index[1].name, "SF2");
        assert_eq!(index[1].sfp, set(&["P1", "P2"]));
    }

    #[tokio::test]
    async fn relink_moves_references() {
        let store = Arc::new(MemoryDataStore::new());
        let mut tx = ReadWriteTransaction::new(store);

        relink(&mut tx, "P1", &BTreeSet::new(), &set(&["SF1", "SF2"]))
            .await
            .unwrap();
        relink(&mut tx, "P1", &set(&["SF1", "SF2"]), &set(&["SF2", "SF3"]))
            .await
            .unwrap();

        assert!(FunctionStateRepository::read_in(&tx, "SF1").await.unwrap().is_none());
        assert_eq!(indexed_references(&tx, "P1").await.unwrap(), set(&["SF2", "SF3"]));
        let sf3 = FunctionStateRepository::read_in(&tx, "SF3").await.unwrap().unwrap();
        assert_eq!(sf3.sfp, set(&["P1"]));
        let sf2 = FunctionStateRepository::read_in(&tx, "SF2").await.unwrap().unwrap();
        assert_eq!(sf2.sfp, set(&["P1"]));
    }

    #[tokio::test]
    async fn indexed_references_outlive_the_chain() {
        let store = Arc::new(MemoryDataStore::new());
        let mut tx = ReadWriteTransaction::new(store);
        let refs = path_references(&ServiceFunctionPath::new("P1").with_chain("C1"), Some(&chain()));
        relink(&mut tx, "P1", &BTreeSet::new(), &refs).await.unwrap();
        link(&mut tx, "SF2", "P2").await.unwrap();

        // Without the chain the path computes no references, but the index
        // still holds them
        let plain = ServiceFunctionPath::new("P1").with_chain("C1");
        assert!(path_references(&plain, None).is_empty());
        assert_eq!(indexed_references(&tx, "P1").await.unwrap(), set(&["SF1", "SF2"]));
        assert_eq!(indexed_references(&tx, "P2").await.unwrap(), set(&["SF2"]));
        assert!(indexed_references(&tx, "P3").await.unwrap().is_empty());
    }
}
