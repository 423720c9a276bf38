//! Dependency graph helpers.
//!
//! - [`ResolutionChain`] tracks the keys currently being resolved on one
//!   call chain and turns re-entry into a [`HayatError::CircularDependency`]
//!   instead of unbounded recursion.
//! - [`WaitGraph`] records which in-flight singletons are waiting on
//!   which, so two call chains that would await each other fail instead
//!   of hanging.
//! - [`destruction_order`] orders cached singletons for `stop()`.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::warn;

use crate::definition::UnitDefinition;
use crate::error::{CircularDependencyError, HayatError, Result};
use crate::key::UnitKey;
use crate::settings::DestructionOrder;

/// The keys in flight on one resolution path, outermost first.
#[derive(Debug, Clone, Default)]
pub struct ResolutionChain {
    path: Vec<UnitKey>,
}

impl ResolutionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the chain extended with `key`.
    ///
    /// # Errors
    /// [`HayatError::CircularDependency`] if `key` is already in flight.
    /// The reported chain starts at the first occurrence of `key` and
    /// ends with it again: `A → B → A`.
    pub fn enter(&self, key: UnitKey) -> Result<ResolutionChain> {
        if let Some(start) = self.path.iter().position(|k| *k == key) {
            let mut chain = self.path[start..].to_vec();
            chain.push(key);

            warn!(cycle = ?chain, "Circular dependency detected!");

            return Err(HayatError::CircularDependency(CircularDependencyError { chain }));
        }

        let mut path = self.path.clone();
        path.push(key);
        Ok(Self { path })
    }

    /// The unit whose resolution is currently in progress.
    pub fn current(&self) -> Option<UnitKey> {
        self.path.last().copied()
    }

    pub fn contains(&self, key: &UnitKey) -> bool {
        self.path.contains(key)
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Keys in flight, outermost first.
    pub fn path(&self) -> &[UnitKey] {
        &self.path
    }
}

#[derive(Debug)]
struct Wait {
    path: Vec<UnitKey>,
    awaited: UnitKey,
}

#[derive(Debug, Default)]
struct Waits {
    next_id: u64,
    entries: HashMap<u64, Wait>,
}

/// Wait-for edges between call chains blocked on another chain's
/// in-flight singleton.
///
/// A chain blocked on `awaited` is stuck until whichever chain is
/// building `awaited` finishes. If that builder is itself (transitively)
/// blocked on a key of the waiting chain, neither can make progress.
#[derive(Debug, Default)]
pub(crate) struct WaitGraph {
    waits: Mutex<Waits>,
}

impl WaitGraph {
    /// Records that the chain `path` is about to await `awaited`.
    ///
    /// Check and insert happen under one lock, so of two chains racing
    /// into a mutual wait the second always sees the first.
    ///
    /// # Errors
    /// [`HayatError::CircularDependency`] if awaiting would close a cycle.
    pub(crate) fn enter(&self, path: &[UnitKey], awaited: UnitKey) -> Result<WaitGuard<'_>> {
        let mut waits = self.waits.lock();

        if let Some(chain) = find_wait_cycle(&waits.entries, path, awaited) {
            warn!(cycle = ?chain, "Circular dependency detected across concurrent resolutions!");
            return Err(HayatError::CircularDependency(CircularDependencyError { chain }));
        }

        let id = waits.next_id;
        waits.next_id += 1;
        waits.entries.insert(id, Wait { path: path.to_vec(), awaited });
        Ok(WaitGuard { graph: self, id })
    }

    pub(crate) fn len(&self) -> usize {
        self.waits.lock().entries.len()
    }
}

/// Removes its wait edge when dropped.
pub(crate) struct WaitGuard<'a> {
    graph: &'a WaitGraph,
    id: u64,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.graph.waits.lock().entries.remove(&self.id);
    }
}

/// Follows builders of `awaited` through their own waits; a cycle exists
/// if one of them waits on a key in `path`.
fn find_wait_cycle(
    entries: &HashMap<u64, Wait>,
    path: &[UnitKey],
    awaited: UnitKey,
) -> Option<Vec<UnitKey>> {
    let mut via: HashMap<UnitKey, UnitKey> = HashMap::new();
    let mut frontier = vec![awaited];

    while let Some(key) = frontier.pop() {
        if let Some(start) = path.iter().position(|k| *k == key) {
            let mut tail = vec![key];
            let mut cursor = key;
            while let Some(previous) = via.get(&cursor) {
                cursor = *previous;
                tail.push(cursor);
            }
            tail.reverse();

            let mut chain = path[start..].to_vec();
            chain.extend(tail);
            return Some(chain);
        }

        // Chains whose path holds `key` are building it (or something
        // inside its construction); whatever they await blocks `key` too.
        for wait in entries.values().filter(|w| w.path.contains(&key)) {
            if wait.awaited != awaited && !via.contains_key(&wait.awaited) {
                via.insert(wait.awaited, key);
                frontier.push(wait.awaited);
            }
        }
    }

    None
}

/// Orders `singletons` for destruction.
///
/// `definitions` must be in registration order; keys without a
/// definition are ignored. With [`DestructionOrder::ReverseDependency`]
/// every unit is destroyed before anything it depends on (through
/// constructor dependencies or hook parameters). Cycles do not fail here;
/// the back edge is simply not followed.
pub(crate) fn destruction_order(
    definitions: &[(UnitKey, UnitDefinition)],
    singletons: &HashSet<UnitKey>,
    order: DestructionOrder,
) -> Vec<UnitKey> {
    let registered: Vec<UnitKey> = definitions
        .iter()
        .map(|(k, _)| *k)
        .filter(|k| singletons.contains(k))
        .collect();

    match order {
        DestructionOrder::Registration => registered,
        DestructionOrder::ReverseRegistration => registered.into_iter().rev().collect(),
        DestructionOrder::ReverseDependency => {
            let mut sorter = TopologicalSort::new(definitions);
            for key in &registered {
                sorter.visit(*key);
            }
            sorter
                .sorted
                .into_iter()
                .rev()
                .filter(|k| singletons.contains(k))
                .collect()
        }
    }
}

/// Depth-first post-order walk: dependencies land before dependents.
struct TopologicalSort {
    edges: HashMap<UnitKey, Vec<UnitKey>>,
    visiting: HashSet<UnitKey>,
    visited: HashSet<UnitKey>,
    sorted: Vec<UnitKey>,
}

impl TopologicalSort {
    fn new(definitions: &[(UnitKey, UnitDefinition)]) -> Self {
        let edges = definitions
            .iter()
            .map(|(key, definition)| {
                let hook_params = definition
                    .hooks()
                    .iter()
                    .flat_map(|(_, hook)| hook.parameters().iter().filter_map(|p| p.key()));
                let deps: Vec<UnitKey> =
                    definition.dependencies().iter().copied().chain(hook_params).collect();
                (*key, deps)
            })
            .collect();

        Self {
            edges,
            visiting: HashSet::new(),
            visited: HashSet::new(),
            sorted: Vec::new(),
        }
    }

    fn visit(&mut self, key: UnitKey) {
        if self.visited.contains(&key) || !self.visiting.insert(key) {
            return;
        }

        let deps = self.edges.get(&key).cloned().unwrap_or_default();
        for dep in deps {
            if self.edges.contains_key(&dep) {
                self.visit(dep);
            }
        }

        self.visiting.remove(&key);
        self.visited.insert(key);
        self.sorted.push(key);
    }
}
