//! Path lifecycle management
//!
//! Business rules applied on top of the repositories:
//! - Default-path detection
//! - Chain linkage validation
//! - Path-ID allocation
//! - Symmetric (reverse) path synthesis
//! - Back-reference index maintenance
//!
//! # Serialization
//!
//! Every operation that mutates the path table holds the manager's path lock
//! from its first read to its commit. Two creations can therefore never see
//! the same free ID, and a forward path is never observable without its
//! reverse path.

use crate::config::ProviderConfig;
use crate::error::{SfcError, SfcResult};
use crate::index;
use crate::model::{ServiceFunctionChain, ServiceFunctionPath, ServiceFunctionPaths, ServicePathHop};
use crate::repository::{ChainRepository, PathRepository};
use sfc_datastore::{DataStore, ReadWriteTransaction};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Check whether a path is an unconfigured skeleton
///
/// True iff the hop list is absent and transport type, starting index and
/// path ID are all unset. A present but empty hop list counts as configured.
#[must_use]
pub fn is_default_service_path(path: &ServiceFunctionPath) -> bool {
    let no_hops = path.service_path_hop.is_none();
    let no_transport = path.transport_type.is_none();
    let no_starting_index = path.starting_index.is_none();
    let no_path_id = path.path_id.is_none();

    no_hops & no_transport & no_starting_index & no_path_id
}

/// Reverse a hop list
///
/// Hops are renumbered from zero and service indexes count down from
/// `starting_index`, as they would for a forward path.
#[must_use]
pub fn reverse_hops(hops: &[ServicePathHop], starting_index: u8) -> Vec<ServicePathHop> {
    hops.iter()
        .rev()
        .zip(0u8..)
        .map(|(hop, position)| {
            ServicePathHop::new(
                position,
                hop.service_function_name.clone(),
                starting_index.saturating_sub(position),
            )
        })
        .collect()
}

/// Result of a path creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPath {
    /// Path as written, with its allocated ID
    pub forward: ServiceFunctionPath,
    /// Reverse path, written when the chain is symmetric
    pub reverse: Option<ServiceFunctionPath>,
}

/// Path IDs in use, with their owners
#[derive(Debug, Default)]
struct PathIdAllocator {
    used: BTreeMap<u32, String>,
    min: u32,
    max: u32,
}

impl PathIdAllocator {
    fn new<'a>(
        min: u32,
        max: u32,
        paths: impl IntoIterator<Item = &'a ServiceFunctionPath>,
    ) -> Self {
        let used = paths
            .into_iter()
            .filter_map(|p| p.path_id.map(|id| (id, p.name.clone())))
            .collect();
        Self { used, min, max }
    }

    /// Claim an ID for `path`
    ///
    /// Explicit IDs must be free; otherwise `previous` is reused when still
    /// free, else the lowest free ID in range is taken.
    fn claim(
        &mut self,
        path: &str,
        requested: Option<u32>,
        previous: Option<u32>,
    ) -> SfcResult<u32> {
        let id = match requested {
            Some(id) => {
                if let Some(owner) = self.used.get(&id).filter(|owner| owner.as_str() != path) {
                    return Err(SfcError::PathIdConflict {
                        path_id: id,
                        path: path.to_string(),
                        owner: owner.clone(),
                    });
                }
                id
            }
            None => match previous.filter(|id| !self.used.contains_key(id)) {
                Some(id) => id,
                None => self.lowest_free()?,
            },
        };
        self.used.insert(id, path.to_string());
        Ok(id)
    }

    fn lowest_free(&self) -> SfcResult<u32> {
        let mut candidate = self.min;
        for &id in self.used.range(self.min..=self.max).map(|(id, _)| id) {
            if id != candidate {
                break;
            }
            candidate += 1;
        }
        if candidate > self.max {
            return Err(SfcError::PathIdExhausted {
                min: self.min,
                max: self.max,
            });
        }
        Ok(candidate)
    }
}

/// Applies lifecycle rules to paths and chains
#[derive(Debug)]
pub struct PathLifecycleManager {
    store: Arc<dyn DataStore>,
    config: Arc<ProviderConfig>,
    path_lock: Mutex<()>,
}

impl PathLifecycleManager {
    /// Create manager over `store`
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>, config: Arc<ProviderConfig>) -> Self {
        Self {
            store,
            config,
            path_lock: Mutex::new(()),
        }
    }

    /// Acquire the path-table lock
    pub(crate) async fn lock_paths(&self) -> MutexGuard<'_, ()> {
        self.path_lock.lock().await
    }

    pub(crate) fn transaction(&self) -> ReadWriteTransaction {
        ReadWriteTransaction::new(self.store.clone())
    }

    /// Name of the reverse path of `forward_name`
    #[inline]
    #[must_use]
    pub fn reverse_path_name(&self, forward_name: &str) -> String {
        format!("{forward_name}{}", self.config.reverse_path_suffix)
    }

    /// Create a skeleton path on `chain_name` and run it through
    /// [`create_path`](Self::create_path)
    pub async fn create_path_from_chain(
        &self,
        chain_name: &str,
        path_name: &str,
    ) -> SfcResult<CreatedPath> {
        self.create_path(ServiceFunctionPath::new(path_name).with_chain(chain_name))
            .await
    }

    /// Create or update a path
    ///
    /// # Workflow
    /// 1. Resolve the referenced chain
    /// 2. Allocate path IDs (forward, then reverse)
    /// 3. Build the reverse path for symmetric chains
    /// 4. Update the back-reference index
    /// 5. Commit everything in one transaction
    ///
    /// A reverse path left over from an earlier symmetric version of the path
    /// is removed in the same transaction.
    ///
    /// # Errors
    /// - `SfcError::MissingChainName` if the path names no chain
    /// - `SfcError::ChainNotFound` if the chain does not exist
    /// - `SfcError::SymmetricPathConflict` if the path is another path's
    ///   reverse, or its reverse name is held by an unrelated path
    /// - `SfcError::PathIdConflict` if an explicit ID is taken
    /// - `SfcError::PathIdExhausted` if no ID is free
    /// - `SfcError::Store` if the commit fails
    pub async fn create_path(&self, path: ServiceFunctionPath) -> SfcResult<CreatedPath> {
        let chain_name = path
            .service_chain_name
            .clone()
            .ok_or_else(|| SfcError::MissingChainName {
                path: path.name.clone(),
            })?;

        let _guard = self.lock_paths().await;
        let mut tx = self.transaction();

        let chain = ChainRepository::read_in(&tx, &chain_name)
            .await?
            .ok_or_else(|| SfcError::ChainNotFound {
                chain: chain_name.clone(),
            })?;

        let reverse_name = chain
            .symmetric
            .then(|| self.reverse_path_name(&path.name));
        let existing = PathRepository::read_all_in(&tx).await?;
        let previous = |name: &str| existing.iter().find(|p| p.name == name);

        if let Some(owner) = previous(&path.name).and_then(|p| p.reverse_of.as_deref()) {
            return Err(SfcError::SymmetricPathConflict {
                path: path.name.clone(),
                partner: owner.to_string(),
            });
        }
        if let Some(taken) = reverse_name
            .as_deref()
            .and_then(previous)
            .filter(|p| p.reverse_of.as_deref() != Some(path.name.as_str()))
        {
            return Err(SfcError::SymmetricPathConflict {
                path: path.name.clone(),
                partner: taken.name.clone(),
            });
        }
        let stale_reverse = existing
            .iter()
            .find(|p| {
                p.reverse_of.as_deref() == Some(path.name.as_str())
                    && Some(&p.name) != reverse_name.as_ref()
            })
            .map(|p| p.name.clone());

        let mut ids = PathIdAllocator::new(
            self.config.path_id_min,
            self.config.path_id_max,
            existing.iter().filter(|p| {
                p.name != path.name
                    && Some(&p.name) != reverse_name.as_ref()
                    && Some(&p.name) != stale_reverse.as_ref()
            }),
        );

        let mut forward = path;
        forward.reverse_of = None;
        let forward_id = ids.claim(
            &forward.name,
            forward.path_id,
            previous(&forward.name).and_then(|p| p.path_id),
        )?;
        forward.path_id = Some(forward_id);

        let reverse = match reverse_name {
            Some(name) => {
                let reverse_id = ids.claim(&name, None, previous(&name).and_then(|p| p.path_id))?;
                Some(self.build_reverse(&forward, name, reverse_id))
            }
            None => None,
        };

        if let Some(stale) = &stale_reverse {
            tracing::debug!(path = %forward.name, reverse = %stale, "removing stale reverse path");
            stage_path_delete(&mut tx, stale).await?;
        }
        for record in std::iter::once(&forward).chain(reverse.as_ref()) {
            let old = index::indexed_references(&tx, &record.name).await?;
            let new = index::path_references(record, Some(&chain));
            PathRepository::stage_put(&mut tx, record)?;
            index::relink(&mut tx, &record.name, &old, &new).await?;
        }

        tx.commit().await?;
        tracing::info!(
            path = %forward.name,
            chain = %chain_name,
            path_id = forward_id,
            symmetric = reverse.is_some(),
            "service function path created"
        );

        Ok(CreatedPath { forward, reverse })
    }

    /// Delete a path together with its symmetric partner
    ///
    /// # Returns
    /// `true` if the path existed, `false` if it was already absent
    pub async fn delete_path(&self, name: &str) -> SfcResult<bool> {
        let _guard = self.lock_paths().await;
        let mut tx = self.transaction();

        let Some(path) = PathRepository::read_in(&tx, name).await? else {
            tracing::debug!(path = name, "delete of absent path");
            return Ok(false);
        };

        let mut removed = BTreeSet::new();
        stage_removal(&mut tx, path, &mut removed).await?;
        tx.commit().await?;

        tracing::info!(path = name, removed = ?removed, "service function path deleted");
        Ok(true)
    }

    /// Overwrite every path and rebuild the back-reference index
    ///
    /// # Errors
    /// - `SfcError::PathIdConflict` if two records carry the same path ID;
    ///   nothing is written
    pub async fn put_all_paths(&self, paths: &ServiceFunctionPaths) -> SfcResult<bool> {
        let records = &paths.service_function_path;
        let mut ids = PathIdAllocator::new(
            self.config.path_id_min,
            self.config.path_id_max,
            std::iter::empty(),
        );
        for record in records {
            if let Some(id) = record.path_id {
                ids.claim(&record.name, Some(id), None)?;
            }
        }

        let _guard = self.lock_paths().await;
        let mut tx = self.transaction();

        let chains = ChainRepository::read_all_in(&tx).await?;
        PathRepository::stage_put_all(&mut tx, records)?;
        index::stage_rebuild(&mut tx, records, &chains)?;
        tx.commit().await?;

        tracing::info!(count = records.len(), "service function paths replaced");
        Ok(true)
    }

    /// Write a chain after checking member uniqueness
    ///
    /// Paths following the chain's member list (no explicit hops) have their
    /// back-references moved to the new member set.
    ///
    /// # Errors
    /// - `SfcError::DuplicateChainMember` if a member name repeats
    pub async fn put_chain(&self, chain: &ServiceFunctionChain) -> SfcResult<bool> {
        if let Some(member) = chain.duplicate_member() {
            return Err(SfcError::DuplicateChainMember {
                chain: chain.name.clone(),
                member: member.to_string(),
            });
        }

        let _guard = self.lock_paths().await;
        let mut tx = self.transaction();

        ChainRepository::stage_put(&mut tx, chain)?;

        let followers: Vec<_> = PathRepository::read_all_in(&tx)
            .await?
            .into_iter()
            .filter(|p| {
                p.service_chain_name.as_deref() == Some(chain.name.as_str())
                    && p.service_path_hop.is_none()
            })
            .collect();
        for path in &followers {
            let old = index::indexed_references(&tx, &path.name).await?;
            let new = index::path_references(path, Some(chain));
            index::relink(&mut tx, &path.name, &old, &new).await?;
        }

        tx.commit().await?;
        tracing::info!(
            chain = %chain.name,
            members = chain.sfc_service_function.len(),
            symmetric = chain.symmetric,
            "service function chain written"
        );
        Ok(true)
    }

    fn build_reverse(
        &self,
        forward: &ServiceFunctionPath,
        name: String,
        path_id: u32,
    ) -> ServiceFunctionPath {
        let starting_index = forward
            .starting_index
            .unwrap_or(self.config.default_starting_index);
        ServiceFunctionPath {
            name,
            path_id: Some(path_id),
            service_chain_name: forward.service_chain_name.clone(),
            transport_type: forward.transport_type,
            starting_index: forward.starting_index,
            service_path_hop: forward
                .service_path_hop
                .as_deref()
                .map(|hops| reverse_hops(hops, starting_index)),
            reverse_of: Some(forward.name.clone()),
        }
    }
}

/// Stage deletion of `path`, its symmetric partner and their back-references
///
/// Names already in `removed` are skipped; every removed path name is added
/// to it.
pub(crate) async fn stage_removal(
    tx: &mut ReadWriteTransaction,
    path: ServiceFunctionPath,
    removed: &mut BTreeSet<String>,
) -> SfcResult<()> {
    let mut pending = vec![path];
    while let Some(path) = pending.pop() {
        if !removed.insert(path.name.clone()) {
            continue;
        }
        if let Some(partner) = symmetric_partner(tx, &path).await? {
            pending.push(partner);
        }
        stage_path_delete(tx, &path.name).await?;
    }
    Ok(())
}

/// Stage deletion of one path record and every index entry listing it
///
/// The partner is left alone. Also clears index entries of a path whose
/// record is already gone.
pub(crate) async fn stage_path_delete(tx: &mut ReadWriteTransaction, name: &str) -> SfcResult<()> {
    let old = index::indexed_references(tx, name).await?;
    PathRepository::stage_delete(tx, name);
    index::relink(tx, name, &old, &BTreeSet::new()).await
}

/// Generated reverse of a forward path, or the forward of a reverse path
///
/// Pairing follows the `reverse-of` marker only; names are not parsed.
async fn symmetric_partner(
    tx: &ReadWriteTransaction,
    path: &ServiceFunctionPath,
) -> SfcResult<Option<ServiceFunctionPath>> {
    if let Some(forward) = path.reverse_of.as_deref() {
        return PathRepository::read_in(tx, forward).await;
    }
    Ok(PathRepository::read_all_in(tx)
        .await?
        .into_iter()
        .find(|p| p.reverse_of.as_deref() == Some(path.name.as_str())))
}
