//! Vertex/HyperVertex arenas and nested-tree construction
//!
//! Vertices and hypervertices live in `Vec`-backed arenas addressed by
//! `VertexId`/`HyperVertexId`; all relationships are id sets, never owning
//! pointers. Construction is bottom-up: an internal node's cost includes
//! every STRONG descendant, and a second pass propagates each cascade
//! group's aggregate set onto all of its members so that rolling back any
//! member rolls back the whole group.

use crate::{
    DepKind, HyperVertexId, InvertedIndex, TxNode, TypesError, TypesResult, VertexId,
};
use std::collections::BTreeSet;

/// Sentinel for a reachability label that has never been set
pub const UNSET_LABEL: u32 = u32::MAX;

/// Nesting depth limit; trees deeper than this are rejected as malformed
const MAX_NESTING_DEPTH: usize = 64;

/// One unit of transactional work
#[derive(Clone, Debug)]
pub struct Vertex {
    /// Hierarchical id: root id extended with `_<n>` per nesting level
    pub id: String,
    /// Arena handle of this vertex
    pub vid: VertexId,
    /// Owning hypervertex
    pub hyper_id: HyperVertexId,
    /// Execution cost of this unit alone
    pub self_cost: u64,
    /// Self cost plus the cost cascaded from STRONG descendants
    pub cost: u64,
    /// Keys read
    pub read_set: BTreeSet<String>,
    /// Keys written
    pub write_set: BTreeSet<String>,
    /// Whether this vertex has nested children
    pub is_nested: bool,
    /// Number of conflict edges touching this vertex
    pub degree: u64,
    /// This vertex plus every STRONG-reachable member of its cascade group
    pub cascade: BTreeSet<VertexId>,
    /// Children with their dependency tags
    pub children: Vec<(VertexId, DepKind)>,
    /// STRONG-tagged children
    pub strong_children: Vec<VertexId>,
    /// Parent, if the link to it is STRONG
    pub strong_parent: Option<VertexId>,
}

impl Vertex {
    fn new(id: String, vid: VertexId, hyper_id: HyperVertexId, node: &TxNode) -> Self {
        Self {
            id,
            vid,
            hyper_id,
            self_cost: node.cost,
            cost: node.cost,
            read_set: node.reads.clone(),
            write_set: node.writes.clone(),
            is_nested: node.is_nested(),
            degree: 0,
            cascade: BTreeSet::new(),
            children: Vec::new(),
            strong_children: Vec::new(),
            strong_parent: None,
        }
    }
}

/// One top-level transaction, owning a tree of vertices
#[derive(Clone, Debug)]
pub struct HyperVertex {
    /// Identity; also the reachability-label currency
    pub hyper_id: HyperVertexId,
    /// Root of the vertex tree
    pub root: VertexId,
    /// Every vertex in the tree, in construction (pre-)order
    pub vertices: Vec<VertexId>,
    /// Whether the root has nested children
    pub is_nested: bool,
}

/// Arena of all vertices and hypervertices for one block
#[derive(Debug, Default)]
pub struct TxArena {
    vertices: Vec<Vertex>,
    hypers: Vec<HyperVertex>,
    index: InvertedIndex,
}

impl TxArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one hypervertex from a transaction tree.
    ///
    /// Registers every vertex's reads and writes in the inverted index.
    /// Fails on malformed trees (nesting beyond the supported depth or a
    /// STRONG cycle surfacing during cascade recognition).
    pub fn add_transaction(&mut self, tx: &TxNode) -> TypesResult<HyperVertexId> {
        let hyper_id = HyperVertexId::from(self.hypers.len());
        let root_label = hyper_id.as_u32().to_string();
        let mut members = Vec::new();

        let root = self.build_vertex(tx, root_label, hyper_id, None, 0, &mut members)?;
        self.recognize_cascades(root)?;

        for &vid in &members {
            let v = &self.vertices[vid.index()];
            let (reads, writes): (Vec<String>, Vec<String>) = (
                v.read_set.iter().cloned().collect(),
                v.write_set.iter().cloned().collect(),
            );
            for key in reads {
                self.index.add_reader(&key, vid);
            }
            for key in writes {
                self.index.add_writer(&key, vid);
            }
        }

        self.hypers.push(HyperVertex {
            hyper_id,
            root,
            vertices: members,
            is_nested: tx.is_nested(),
        });
        Ok(hyper_id)
    }

    fn build_vertex(
        &mut self,
        node: &TxNode,
        id: String,
        hyper_id: HyperVertexId,
        strong_parent: Option<VertexId>,
        depth: usize,
        members: &mut Vec<VertexId>,
    ) -> TypesResult<VertexId> {
        if depth > MAX_NESTING_DEPTH {
            return Err(TypesError::NestingTooDeep {
                tx_id: id,
                limit: MAX_NESTING_DEPTH,
            });
        }

        let vid = VertexId::from(self.vertices.len());
        let mut vertex = Vertex::new(id.clone(), vid, hyper_id, node);
        vertex.strong_parent = strong_parent;
        vertex.cascade.insert(vid);
        self.vertices.push(vertex);
        members.push(vid);

        for (n, (child, dep)) in node.children.iter().enumerate() {
            let child_id = format!("{}_{}", id, n);
            let child_parent = dep.is_strong().then_some(vid);
            let cid =
                self.build_vertex(child, child_id, hyper_id, child_parent, depth + 1, members)?;

            self.vertices[vid.index()].children.push((cid, *dep));
            if dep.is_strong() {
                // STRONG child: charge its cascaded cost and absorb its
                // cascade set into the parent's
                let (child_cost, child_cascade) = {
                    let c = &self.vertices[cid.index()];
                    (c.cost, c.cascade.clone())
                };
                let parent = &mut self.vertices[vid.index()];
                parent.cost += child_cost;
                parent.cascade.extend(child_cascade);
                parent.strong_children.push(cid);
            }
        }
        Ok(vid)
    }

    /// Propagate each cascade group's aggregate set onto all of its members.
    ///
    /// A group head is a vertex whose link to its parent is WEAK (or the
    /// root); after this pass, rolling back any STRONG ancestor or
    /// descendant within the group yields the same effective cascade set.
    fn recognize_cascades(&mut self, root: VertexId) -> TypesResult<()> {
        let mut heads = vec![root];
        while let Some(head) = heads.pop() {
            let group = self.vertices[head.index()].cascade.clone();
            for &member in &group {
                if member != head && self.vertices[member.index()].strong_parent.is_none() {
                    // A member other than the head must be STRONG-linked;
                    // anything else means the tree structure is corrupt
                    return Err(TypesError::StrongCycle {
                        tx_id: self.vertices[member.index()].id.clone(),
                    });
                }
                self.vertices[member.index()].cascade = group.clone();
            }
            // WEAK children start their own groups
            let children = self.vertices[head.index()].children.clone();
            for (cid, dep) in children {
                match dep {
                    DepKind::Weak => heads.push(cid),
                    DepKind::Strong => {
                        // Members of this group; their own WEAK children
                        // still need visiting
                        let mut stack = vec![cid];
                        while let Some(v) = stack.pop() {
                            for (gcid, gdep) in self.vertices[v.index()].children.clone() {
                                match gdep {
                                    DepKind::Weak => heads.push(gcid),
                                    DepKind::Strong => stack.push(gcid),
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Look up a vertex
    pub fn vertex(&self, vid: VertexId) -> &Vertex {
        &self.vertices[vid.index()]
    }

    /// Look up a vertex mutably
    pub fn vertex_mut(&mut self, vid: VertexId) -> &mut Vertex {
        &mut self.vertices[vid.index()]
    }

    /// Look up a hypervertex
    pub fn hyper(&self, hid: HyperVertexId) -> &HyperVertex {
        &self.hypers[hid.index()]
    }

    /// All hypervertices
    pub fn hypers(&self) -> &[HyperVertex] {
        &self.hypers
    }

    /// Number of vertices in the arena
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of hypervertices in the arena
    pub fn hyper_count(&self) -> usize {
        self.hypers.len()
    }

    /// The inverted index populated during construction
    pub fn inverted_index(&self) -> &InvertedIndex {
        &self.index
    }

    /// Bump the conflict-edge degree of a vertex
    pub fn add_degree(&mut self, vid: VertexId, by: u64) {
        self.vertices[vid.index()].degree += by;
    }

    /// Sum of `self_cost` over a set of vertices
    pub fn total_self_cost(&self, vids: &BTreeSet<VertexId>) -> u64 {
        vids.iter().map(|v| self.vertex(*v).self_cost).sum()
    }
}
