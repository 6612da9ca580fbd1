//! Integer-id handles and core enums

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable handle into the vertex arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId(pub u32);

impl VertexId {
    /// Create a new vertex ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Get the ID as an arena index
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for VertexId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<usize> for VertexId {
    fn from(id: usize) -> Self {
        Self(id as u32)
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A stable handle into the hypervertex arena.
///
/// The raw value doubles as the reachability-label currency: labels are
/// minima over hypervertex IDs, so the ordering of `HyperVertexId` is
/// meaningful (smaller = "earlier" transaction in the block).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HyperVertexId(pub u32);

impl HyperVertexId {
    /// Create a new hypervertex ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Get the ID as an arena index
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for HyperVertexId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<usize> for HyperVertexId {
    fn from(id: usize) -> Self {
        Self(id as u32)
    }
}

impl fmt::Display for HyperVertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Dependency kind between a parent vertex and one of its children
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepKind {
    /// Rolling back the parent forces the child to roll back too; the
    /// child's cost is charged to the parent's cascade cost
    Strong,
    /// The child commits or aborts independently of the parent
    Weak,
}

impl DepKind {
    /// Whether this is a strong dependency
    pub fn is_strong(&self) -> bool {
        matches!(self, DepKind::Strong)
    }
}

/// Which edge side of a hypervertex is cheaper to roll back
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollbackType {
    /// Remove the hypervertex via its incoming conflict edges
    In,
    /// Remove the hypervertex via its outgoing conflict edges
    Out,
}

impl RollbackType {
    /// The opposite side
    pub fn opposite(&self) -> Self {
        match self {
            RollbackType::In => RollbackType::Out,
            RollbackType::Out => RollbackType::In,
        }
    }
}
