//! Reachability-based garbage collection of synchronized beans.
//!
//! Beans live in an index arena. Every bean-typed property value and every
//! bean-list element is an edge from the owning bean to the referenced one.
//! Controller models are roots. A non-root bean with no incoming edge is
//! garbage.
//!
//! ## Invariants
//!
//! - The graph stays acyclic: an edge that would close a cycle is rejected,
//!   so reference counts are exact
//! - `ref_count` of a node equals the number of edges pointing at it
//! - A vetoed bean survives the pass and keeps its children alive

use crate::error::{ServerError, ServerResult};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// Decides whether a collectable bean must be kept.
///
/// Called with the bean id and bean type; returning `true` vetoes removal.
pub type VetoHandler = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Garbage collector statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Beans currently managed.
    pub managed: usize,
    /// Collection passes run.
    pub passes: u64,
    /// Beans removed over all passes.
    pub removed: u64,
    /// Removals vetoed over all passes.
    pub vetoes: u64,
}

#[derive(Debug)]
struct Node {
    bean_id: String,
    bean_type: String,
    root: bool,
    ref_count: usize,
    children: Vec<usize>,
}

/// Tracks bean references and collects unreachable beans.
pub struct GarbageCollector {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    veto: Option<VetoHandler>,
    max_removals_per_pass: usize,
    passes: u64,
    removed: u64,
    vetoes: u64,
}

impl GarbageCollector {
    /// Creates a collector removing at most `max_removals_per_pass` beans per
    /// pass.
    pub fn new(max_removals_per_pass: usize) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            veto: None,
            max_removals_per_pass: max_removals_per_pass.max(1),
            passes: 0,
            removed: 0,
            vetoes: 0,
        }
    }

    /// Installs the veto callback.
    pub fn set_veto(&mut self, veto: Option<VetoHandler>) {
        self.veto = veto;
    }

    /// Starts tracking a bean.
    pub fn on_bean_created(&mut self, bean_id: &str, bean_type: &str, root: bool) -> ServerResult<()> {
        if self.index.contains_key(bean_id) {
            return Err(ServerError::Internal(format!(
                "bean '{bean_id}' is already managed"
            )));
        }
        let node = Node {
            bean_id: bean_id.to_string(),
            bean_type: bean_type.to_string(),
            root,
            ref_count: 0,
            children: Vec::new(),
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(bean_id.to_string(), slot);
        trace!(bean_id, bean_type, root, "bean managed");
        Ok(())
    }

    /// Stops tracking a bean that was removed explicitly.
    ///
    /// Edges from and to the bean are dropped.
    pub fn on_bean_removed(&mut self, bean_id: &str) -> ServerResult<()> {
        let slot = self.slot(bean_id)?;
        for node in self.nodes.iter_mut().flatten() {
            node.children.retain(|&child| child != slot);
        }
        if let Some(node) = self.release_slot(slot) {
            for child in node.children {
                if let Some(child_node) = self.nodes[child].as_mut() {
                    child_node.ref_count = child_node.ref_count.saturating_sub(1);
                }
            }
        }
        Ok(())
    }

    /// Adds a reference edge `from → to`.
    ///
    /// Fails with `CircularDependency` if `from` is reachable from `to`.
    pub fn add_reference(&mut self, from: &str, to: &str) -> ServerResult<()> {
        let from_slot = self.slot(from)?;
        let to_slot = self.slot(to)?;
        if self.reaches(to_slot, from_slot) {
            return Err(ServerError::CircularDependency {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        if let Some(node) = self.nodes[from_slot].as_mut() {
            node.children.push(to_slot);
        }
        if let Some(node) = self.nodes[to_slot].as_mut() {
            node.ref_count += 1;
        }
        Ok(())
    }

    /// Removes one reference edge `from → to`.
    pub fn remove_reference(&mut self, from: &str, to: &str) -> ServerResult<()> {
        let from_slot = self.slot(from)?;
        let to_slot = self.slot(to)?;
        let removed = match self.nodes[from_slot].as_mut() {
            Some(node) => match node.children.iter().position(|&c| c == to_slot) {
                Some(pos) => {
                    node.children.remove(pos);
                    true
                }
                None => false,
            },
            None => false,
        };
        if !removed {
            return Err(ServerError::Internal(format!(
                "no reference from '{from}' to '{to}'"
            )));
        }
        if let Some(node) = self.nodes[to_slot].as_mut() {
            node.ref_count = node.ref_count.saturating_sub(1);
        }
        Ok(())
    }

    /// Runs one collection pass and returns the ids of the removed beans.
    ///
    /// Removal cascades: children whose last reference was dropped are
    /// examined in the same pass, up to the per-pass bound.
    pub fn gc(&mut self) -> Vec<String> {
        self.passes += 1;
        let mut worklist: VecDeque<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(slot, node)| match node {
                Some(node) if !node.root && node.ref_count == 0 => Some(slot),
                _ => None,
            })
            .collect();

        let mut collected = Vec::new();
        while let Some(slot) = worklist.pop_front() {
            if collected.len() >= self.max_removals_per_pass {
                debug!(limit = self.max_removals_per_pass, "gc pass bound reached");
                break;
            }
            let Some(node) = self.nodes[slot].as_ref() else {
                continue;
            };
            if node.root || node.ref_count != 0 {
                continue;
            }
            if let Some(veto) = &self.veto {
                if veto(&node.bean_id, &node.bean_type) {
                    trace!(bean_id = %node.bean_id, "gc removal vetoed");
                    self.vetoes += 1;
                    continue;
                }
            }

            let children = node.children.clone();
            for child in children {
                if let Some(child_node) = self.nodes[child].as_mut() {
                    child_node.ref_count = child_node.ref_count.saturating_sub(1);
                    if child_node.ref_count == 0 && !child_node.root {
                        worklist.push_back(child);
                    }
                }
            }
            if let Some(node) = self.release_slot(slot) {
                collected.push(node.bean_id);
            }
        }

        self.removed += collected.len() as u64;
        if !collected.is_empty() {
            debug!(removed = collected.len(), "gc pass finished");
        }
        collected
    }

    /// Returns true if the bean is tracked.
    pub fn is_managed(&self, bean_id: &str) -> bool {
        self.index.contains_key(bean_id)
    }

    /// Returns the number of incoming references of a bean.
    pub fn ref_count(&self, bean_id: &str) -> Option<usize> {
        let slot = *self.index.get(bean_id)?;
        self.nodes[slot].as_ref().map(|n| n.ref_count)
    }

    /// Returns true if the bean is a root.
    pub fn is_root(&self, bean_id: &str) -> bool {
        self.index
            .get(bean_id)
            .and_then(|&slot| self.nodes[slot].as_ref())
            .is_some_and(|n| n.root)
    }

    /// Returns the number of tracked beans.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if no bean is tracked.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns collector statistics.
    pub fn stats(&self) -> GcStats {
        GcStats {
            managed: self.len(),
            passes: self.passes,
            removed: self.removed,
            vetoes: self.vetoes,
        }
    }

    fn slot(&self, bean_id: &str) -> ServerResult<usize> {
        self.index
            .get(bean_id)
            .copied()
            .ok_or_else(|| ServerError::BeanNotManaged {
                id: bean_id.to_string(),
            })
    }

    fn release_slot(&mut self, slot: usize) -> Option<Node> {
        let node = self.nodes[slot].take()?;
        self.index.remove(&node.bean_id);
        self.free.push(slot);
        Some(node)
    }

    fn reaches(&self, start: usize, target: usize) -> bool {
        let mut stack = vec![start];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(slot) = stack.pop() {
            if slot == target {
                return true;
            }
            if std::mem::replace(&mut seen[slot], true) {
                continue;
            }
            if let Some(node) = &self.nodes[slot] {
                stack.extend(node.children.iter().copied());
            }
        }
        false
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_GC_MAX_REMOVALS)
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("stats", &self.stats())
            .field("max_removals_per_pass", &self.max_removals_per_pass)
            .field("veto", &self.veto.is_some())
            .finish()
    }
}
