//! IR Handles
//!
//! Arena indices handed out during lowering. Bindings, regions and ledgers refer to
//! nodes and regions through these instead of pointers into the view tree.

use std::fmt;

/// Index of a node created by a component. Component-level nodes live in the
/// component's node array; loop-local nodes are procedure locals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn new(id: usize) -> Self {
        NodeId(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "el{}", self.0)
    }
}

/// Index of a reactive list region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub usize);

impl LoopId {
    pub fn new(id: usize) -> Self {
        LoopId(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop{}", self.0)
    }
}

/// Index of a reactive conditional region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IfId(pub usize);

impl IfId {
    pub fn new(id: usize) -> Self {
        IfId(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for IfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}

/// Which side of an if-region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Branch {
    Then,
    Else,
}

impl Branch {
    pub fn is_then(&self) -> bool {
        matches!(self, Branch::Then)
    }

    pub fn opposite(&self) -> Branch {
        match self {
            Branch::Then => Branch::Else,
            Branch::Else => Branch::Then,
        }
    }
}

/// One branch of one if-region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchRef {
    pub region: IfId,
    pub branch: Branch,
}

impl BranchRef {
    pub fn new(region: IfId, branch: Branch) -> Self {
        BranchRef { region, branch }
    }
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.branch {
            Branch::Then => write!(f, "{}.then", self.region),
            Branch::Else => write!(f, "{}.else", self.region),
        }
    }
}
