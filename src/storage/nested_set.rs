//! Nested-set tree engine.
//!
//! A partition is a vector of nodes kept in pre-order (ascending `left`). Ancestry is
//! interval containment, so every subtree is a contiguous slice starting at its root:
//! `nodes[pos .. pos + size]` where `size = (right - left + 1) / 2`. Structural
//! mutations shift bounds across the whole partition; reads never recurse.
//!
//! This type holds no locks. `Partition` wraps it in a `RwLock` and applies every
//! mutation to a staged copy.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::paths::{self, SEPARATOR};
use crate::error::{RbacError, Result};

pub const ROOT_TITLE: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Id of the sentinel root right after a reset.
    pub const ROOT: NodeId = NodeId(1);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<u64> for NodeId {
    fn from(v: u64) -> Self { NodeId(v) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub left: i64,
    pub right: i64,
    pub title: String,
    pub description: String,
}

impl Node {
    pub fn width(&self) -> i64 { self.right - self.left + 1 }

    /// Number of nodes in this subtree, the node included.
    pub fn subtree_size(&self) -> usize { (self.width() / 2) as usize }

    /// Reflexive interval containment: a node contains itself.
    pub fn contains(&self, other: &Node) -> bool { self.left <= other.left && other.right <= self.right }
}

/// A node as reported by tree queries, annotated with a depth whose origin depends on the
/// query (partition root or the queried node).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub id: NodeId,
    pub title: String,
    pub description: String,
    pub depth: u64,
}

impl PathEntry {
    fn from_node(n: &Node, depth: u64) -> Self {
        Self { id: n.id, title: n.title.clone(), description: n.description.clone(), depth }
    }
}

#[derive(Debug, Clone)]
pub struct NestedSet {
    /// Pre-order: strictly ascending `left`.
    nodes: Vec<Node>,
    /// id -> position in `nodes`; rebuilt after every structural change.
    index: HashMap<NodeId, usize>,
    next_id: u64,
}

impl Default for NestedSet {
    fn default() -> Self { Self::new() }
}

impl NestedSet {
    /// A freshly reset partition: only the sentinel root with bounds (0, 1).
    pub fn new() -> Self {
        let root = Node { id: NodeId::ROOT, left: 0, right: 1, title: ROOT_TITLE.to_string(), description: ROOT_TITLE.to_string() };
        let mut s = Self { nodes: vec![root], index: HashMap::new(), next_id: NodeId::ROOT.0 + 1 };
        s.reindex();
        s
    }

    /// Rebuild from persisted rows. Rows may arrive in any order; the result is validated.
    pub fn from_rows(mut rows: Vec<Node>, next_id: u64) -> Result<Self> {
        rows.sort_by_key(|n| n.left);
        let mut s = Self { nodes: rows, index: HashMap::new(), next_id };
        s.reindex();
        s.validate()?;
        Ok(s)
    }

    /// Rows in pre-order.
    pub fn rows(&self) -> &[Node] { &self.nodes }
    pub fn next_id(&self) -> u64 { self.next_id }
    pub fn count(&self) -> usize { self.nodes.len() }
    pub fn root(&self) -> &Node { &self.nodes[0] }
    pub fn root_id(&self) -> NodeId { self.nodes[0].id }
    pub fn contains_id(&self, id: NodeId) -> bool { self.index.contains_key(&id) }

    fn reindex(&mut self) {
        self.index = self.nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
    }

    fn position(&self, id: NodeId) -> Result<usize> {
        self.index.get(&id).copied()
            .ok_or_else(|| RbacError::invalid("unknown_node", format!("node {} does not exist", id)))
    }

    pub fn get(&self, id: NodeId) -> Result<&Node> {
        let pos = self.position(id)?;
        Ok(&self.nodes[pos])
    }

    fn subtree(&self, pos: usize) -> &[Node] {
        let size = self.nodes[pos].subtree_size();
        &self.nodes[pos..pos + size]
    }

    fn reject_root(&self, id: NodeId, op: &str) -> Result<()> {
        if id == self.root_id() {
            return Err(RbacError::invalid("root_immutable", format!("{} cannot target the root node", op)));
        }
        Ok(())
    }

    // ---- structural mutation ----

    /// Insert a new rightmost child of `parent` (root when `None`).
    pub fn insert(&mut self, title: &str, description: &str, parent: Option<NodeId>) -> Result<NodeId> {
        paths::validate_title(title)?;
        let parent = parent.unwrap_or_else(|| self.root_id());
        let ppos = self.index.get(&parent).copied()
            .ok_or_else(|| RbacError::invalid("parent_not_found", format!("parent node {} does not exist", parent)))?;
        let r = self.nodes[ppos].right;
        let mut shifted = 0usize;
        for n in self.nodes.iter_mut() {
            if n.right >= r { n.right += 2; shifted += 1; }
            if n.left > r { n.left += 2; }
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let at = self.nodes.partition_point(|n| n.left < r);
        self.nodes.insert(at, Node { id, left: r, right: r + 1, title: title.to_string(), description: description.to_string() });
        self.reindex();
        debug!(target: "rbacstore::nested_set", "insert id={} parent={} bounds=({}, {}) shifted={}", id, parent, r, r + 1, shifted);
        Ok(id)
    }

    /// Create every missing prefix of `path`. Returns the number of nodes created and the
    /// id of the final segment.
    pub fn insert_path(&mut self, path: &str, descriptions: &[String]) -> Result<(u64, NodeId)> {
        let segments = paths::split_path(path)?;
        for s in &segments { paths::validate_title(s)?; }
        let mut parent = self.root_id();
        let mut created = 0u64;
        for (i, seg) in segments.iter().enumerate() {
            match self.resolve_segments(&segments[..=i]) {
                Ok(id) => parent = id,
                Err(e) if e.is_not_found() => {
                    let desc = descriptions.get(i).map(String::as_str).unwrap_or("");
                    parent = self.insert(seg, desc, Some(parent))?;
                    created += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((created, parent))
    }

    /// Delete one node and splice its children one level up.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        self.reject_root(id, "remove")?;
        let pos = self.position(id)?;
        let (l, r) = (self.nodes[pos].left, self.nodes[pos].right);
        self.nodes.remove(pos);
        for n in self.nodes.iter_mut() {
            if n.left > l && n.right < r {
                n.left -= 1;
                n.right -= 1;
            } else {
                if n.right > r { n.right -= 2; }
                if n.left > r { n.left -= 2; }
            }
        }
        self.reindex();
        debug!(target: "rbacstore::nested_set", "remove id={} bounds=({}, {})", id, l, r);
        Ok(())
    }

    /// Delete a node together with all of its descendants. Returns the removed ids in
    /// pre-order.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        self.reject_root(id, "remove_subtree")?;
        let pos = self.position(id)?;
        let (l, r) = (self.nodes[pos].left, self.nodes[pos].right);
        let width = r - l + 1;
        let size = self.nodes[pos].subtree_size();
        let removed: Vec<NodeId> = self.nodes.drain(pos..pos + size).map(|n| n.id).collect();
        for n in self.nodes.iter_mut() {
            if n.right > r { n.right -= width; }
            if n.left > r { n.left -= width; }
        }
        self.reindex();
        debug!(target: "rbacstore::nested_set", "remove_subtree id={} bounds=({}, {}) removed={}", id, l, r, removed.len());
        Ok(removed)
    }

    /// Replace title and description in place; bounds are untouched.
    pub fn edit(&mut self, id: NodeId, title: &str, description: &str) -> Result<()> {
        self.reject_root(id, "edit")?;
        paths::validate_title(title)?;
        let pos = self.position(id)?;
        let n = &mut self.nodes[pos];
        n.title = title.to_string();
        n.description = description.to_string();
        Ok(())
    }

    // ---- queries ----

    pub fn children(&self, id: NodeId) -> Result<Vec<PathEntry>> {
        let pos = self.position(id)?;
        let end = pos + self.nodes[pos].subtree_size();
        let mut out = Vec::new();
        let mut i = pos + 1;
        while i < end {
            let c = &self.nodes[i];
            out.push(PathEntry::from_node(c, 1));
            i += c.subtree_size();
        }
        Ok(out)
    }

    /// All descendants in pre-order. Depth is measured from the partition root when
    /// `absolute`, otherwise from `id`.
    pub fn descendants(&self, id: NodeId, absolute: bool) -> Result<Vec<PathEntry>> {
        let pos = self.position(id)?;
        let base = if absolute { self.depth_at(pos) } else { 0 };
        let sub = self.subtree(pos);
        let mut open: Vec<i64> = vec![sub[0].right];
        let mut out = Vec::with_capacity(sub.len().saturating_sub(1));
        for n in &sub[1..] {
            while open.last().is_some_and(|&r| r < n.left) { open.pop(); }
            out.push(PathEntry::from_node(n, base + open.len() as u64));
            open.push(n.right);
        }
        Ok(out)
    }

    /// Root..=id, found by interval containment over the nodes preceding `id`.
    pub fn ancestor_path(&self, id: NodeId) -> Result<Vec<PathEntry>> {
        let pos = self.position(id)?;
        let target = &self.nodes[pos];
        Ok(self.nodes[..=pos].iter()
            .filter(|a| a.contains(target))
            .enumerate()
            .map(|(d, a)| PathEntry::from_node(a, d as u64))
            .collect())
    }

    fn depth_at(&self, pos: usize) -> u64 {
        let target = &self.nodes[pos];
        self.nodes[..pos].iter().filter(|a| a.contains(target)).count() as u64
    }

    pub fn depth(&self, id: NodeId) -> Result<u64> {
        let pos = self.position(id)?;
        Ok(self.depth_at(pos))
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        let pos = self.position(id)?;
        let target = &self.nodes[pos];
        // The nearest container is the last one in pre-order.
        Ok(self.nodes[..pos].iter().rev().find(|a| a.contains(target)).map(|a| a.id))
    }

    pub fn path_string(&self, id: NodeId) -> Result<String> {
        let chain = self.ancestor_path(id)?;
        Ok(paths::join_path(chain.iter().skip(1).map(|e| e.title.as_str())))
    }

    /// Reflexive: a node is its own ancestor.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> Result<bool> {
        Ok(self.get(ancestor)?.contains(self.get(node)?))
    }

    /// Ids of `id` and every node beneath it.
    pub fn subtree_ids(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let pos = self.position(id)?;
        Ok(self.subtree(pos).iter().map(|n| n.id).collect())
    }

    // ---- addressing ----

    /// Resolve a path ("/a/b") or a title ("b").
    pub fn resolve(&self, reference: &str) -> Result<NodeId> {
        if paths::is_path(reference) { self.resolve_path(reference) } else { self.resolve_title(reference) }
    }

    /// First node in pre-order carrying `title`. Titles are not unique across subtrees.
    pub fn resolve_title(&self, title: &str) -> Result<NodeId> {
        self.nodes.iter().find(|n| n.title == title).map(|n| n.id)
            .ok_or_else(|| RbacError::not_found("title_not_found", format!("no node titled '{}'", title)))
    }

    pub fn resolve_path(&self, path: &str) -> Result<NodeId> {
        let segments = paths::split_path(path)?;
        self.resolve_segments(&segments)
    }

    /// Exact match of the full title chain below the root, so equal leaf titles in
    /// different subtrees resolve independently.
    fn resolve_segments(&self, segments: &[&str]) -> Result<NodeId> {
        let Some(leaf) = segments.last() else { return Ok(self.root_id()); };
        for (pos, n) in self.nodes.iter().enumerate() {
            if n.title != *leaf { continue; }
            let chain: Vec<&Node> = self.nodes[..pos].iter().filter(|a| a.contains(n)).collect();
            if chain.len() != segments.len() { continue; }
            if chain.iter().skip(1).zip(segments.iter()).all(|(a, s)| a.title == *s) {
                return Ok(n.id);
            }
        }
        let shown: Vec<String> = segments.iter().map(|s| format!("{}{}", SEPARATOR, s)).collect();
        Err(RbacError::not_found("path_not_found", format!("no node at path '{}'", shown.concat())))
    }

    // ---- integrity ----

    /// Check the nested-set invariants: positive widths, strict nesting or disjointness,
    /// a single enclosing root, subtree sizes matching widths, and dense bounds.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(RbacError::storage("invariant_violation", msg));
        if self.nodes.is_empty() { return fail("partition has no root".into()); }
        if self.index.len() != self.nodes.len() { return fail("duplicate node ids".into()); }
        let root = &self.nodes[0];
        if root.left != 0 || root.right != 2 * self.nodes.len() as i64 - 1 {
            return fail(format!("root bounds ({}, {}) do not enclose {} nodes", root.left, root.right, self.nodes.len()));
        }
        let mut bounds: Vec<i64> = Vec::with_capacity(self.nodes.len() * 2);
        let mut open: Vec<&Node> = Vec::new();
        for (i, n) in self.nodes.iter().enumerate() {
            if n.left >= n.right { return fail(format!("node {} has left {} >= right {}", n.id, n.left, n.right)); }
            if n.id.0 >= self.next_id { return fail(format!("node {} is beyond the id counter {}", n.id, self.next_id)); }
            if i > 0 && self.nodes[i - 1].left >= n.left { return fail(format!("node {} is out of pre-order", n.id)); }
            while open.last().is_some_and(|a| a.right < n.left) { open.pop(); }
            match open.last() {
                Some(a) if n.right >= a.right => {
                    return fail(format!("node {} ({}, {}) partially overlaps node {} ({}, {})", n.id, n.left, n.right, a.id, a.left, a.right));
                }
                None if i > 0 => return fail(format!("node {} lies outside the root", n.id)),
                _ => {}
            }
            let inside = self.nodes[i..].iter().take_while(|m| m.left < n.right).count();
            if (n.width() % 2 != 0) || inside != n.subtree_size() {
                return fail(format!("node {} width {} does not match {} contained nodes", n.id, n.width(), inside));
            }
            open.push(n);
            bounds.push(n.left);
            bounds.push(n.right);
        }
        bounds.sort_unstable();
        if bounds.iter().enumerate().any(|(i, b)| *b != i as i64) {
            return fail("bounds are not dense".into());
        }
        Ok(())
    }
}
