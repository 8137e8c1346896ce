// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Hierarchy Resolver.
//!
//! Expands any node of the Enterprise → State → Location → Gateway →
//! Optimizer tree into the optimizers beneath it. One walk serves every
//! level: the frontier moves down one level at a time and each frontier
//! node's children are fetched concurrently. The whole walk shares one
//! deadline.

use fluxion_fleet_types::{Level, NodeRef};
use futures_util::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{FleetError, Result};
use crate::fanout::within;
use crate::traits::TreeStore;

/// Every node visited while resolving a target, grouped by level.
///
/// Includes the target itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtree {
    pub root: NodeRef,
    levels: BTreeMap<Level, BTreeSet<String>>,
}

impl Subtree {
    fn new(root: NodeRef) -> Self {
        let mut levels = BTreeMap::new();
        levels.insert(root.level, BTreeSet::from([root.id.clone()]));
        Self { root, levels }
    }

    /// Ids present at `level`, empty when the walk never reached it
    pub fn nodes(&self, level: Level) -> impl Iterator<Item = &str> + '_ {
        self.levels
            .get(&level)
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    pub fn leaves(&self) -> BTreeSet<String> {
        self.levels.get(&Level::Optimizer).cloned().unwrap_or_default()
    }

    pub fn into_leaves(mut self) -> BTreeSet<String> {
        self.levels.remove(&Level::Optimizer).unwrap_or_default()
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.get(&Level::Optimizer).map_or(0, BTreeSet::len)
    }
}

#[derive(Clone)]
pub struct HierarchyResolver {
    store: Arc<dyn TreeStore>,
    deadline: Duration,
}

impl std::fmt::Debug for HierarchyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyResolver")
            .field("store", &self.store.name())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl HierarchyResolver {
    pub fn new(store: Arc<dyn TreeStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// Resolve `target` into its leaf optimizer ids
    pub async fn resolve_leaves(&self, target: &NodeRef) -> Result<BTreeSet<String>> {
        Ok(self.resolve_subtree(target).await?.into_leaves())
    }

    /// Walk the tree below `target`.
    ///
    /// Fails with `NotFound` when the target is absent and with `Inconsistent`
    /// when a child link points at a record that does not exist. A store that
    /// stalls past the deadline fails the walk with `Timeout`.
    pub async fn resolve_subtree(&self, target: &NodeRef) -> Result<Subtree> {
        let expires_at = Instant::now() + self.deadline;
        let mut subtree = Subtree::new(target.clone());
        // Each frontier entry remembers the parent whose link produced it
        let mut frontier: Vec<(Option<NodeRef>, NodeRef)> = vec![(None, target.clone())];

        while !frontier.is_empty() {
            let level = try_join_all(
                frontier
                    .iter()
                    .map(|(_, node)| async move { self.store.children(node).await }),
            );
            let fetched = within(expires_at, self.deadline, async {
                level.await.map_err(FleetError::from)
            })
            .await?;

            let mut next = Vec::new();
            for ((parent, node), children) in frontier.into_iter().zip(fetched) {
                let Some(children) = children else {
                    return Err(match parent {
                        None => FleetError::not_found(&node),
                        Some(parent) => FleetError::Inconsistent {
                            parent,
                            child: node,
                        },
                    });
                };
                let Some(child_level) = node.level.child() else {
                    continue;
                };
                let ids = subtree.levels.entry(child_level).or_default();
                for id in children {
                    if ids.insert(id.clone()) {
                        next.push((Some(node.clone()), NodeRef::new(child_level, id)));
                    }
                }
            }

            if let Some((_, first)) = next.first() {
                debug!(
                    target_node = %target,
                    level = %first.level,
                    count = next.len(),
                    "Resolved hierarchy level"
                );
            }
            frontier = next;
        }

        Ok(subtree)
    }
}
