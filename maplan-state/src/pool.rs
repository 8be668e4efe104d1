use crate::operator::Cost;
use crate::vars::OpId;
use maplan_collections::{create_ref_type, RefPool, RefVec};

create_ref_type!(StateId);

/// Where a state currently sits in single-agent search (spec §4.B open list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Inserted into the pool but never pushed to an open list.
    New,
    Open,
    Closed,
}

/// A heuristic estimate, or the explicit knowledge that none exists because
/// the state is a recognized dead end (spec §4.B "dead end" edge case).
/// Kept as its own type rather than `Option<Cost>` so "not yet evaluated"
/// and "evaluated, and it's a dead end" can't be confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    Unknown,
    DeadEnd,
    Value(Cost),
}

impl Heuristic {
    pub fn value(&self) -> Option<Cost> {
        match self {
            Heuristic::Value(c) => Some(*c),
            _ => None,
        }
    }

    pub fn is_dead_end(&self) -> bool {
        matches!(self, Heuristic::DeadEnd)
    }
}

/// Search bookkeeping attached to every state in the pool: the back-pointer
/// used for path reconstruction, the best known cost-so-far, heuristic
/// status, and open/closed status (spec §3 "Node").
#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<StateId>,
    pub generating_op: Option<OpId>,
    pub cost: Cost,
    pub heuristic: Heuristic,
    pub status: NodeStatus,
}

impl Node {
    fn root() -> Self {
        Node {
            parent: None,
            generating_op: None,
            cost: 0,
            heuristic: Heuristic::Unknown,
            status: NodeStatus::New,
        }
    }

    fn successor(parent: StateId, op: OpId, cost: Cost) -> Self {
        Node {
            parent: Some(parent),
            generating_op: Some(op),
            cost,
            heuristic: Heuristic::Unknown,
            status: NodeStatus::New,
        }
    }
}

/// Content-addressed store of every packed state byte-buffer seen during a
/// search, handing out dense `StateId`s (spec §4.A "State Pool").
///
/// Insertion is idempotent: inserting the same byte buffer twice returns the
/// same id, which is what lets both a local successor and a peer's announced
/// public state collapse onto one node when they happen to coincide.
#[derive(Default)]
pub struct StatePool {
    pool: RefPool<StateId, Vec<u8>>,
    nodes: RefVec<StateId, Node>,
}

impl StatePool {
    pub fn new() -> Self {
        StatePool::default()
    }

    /// Inserts the root state (cost 0, no parent) and returns its id.
    pub fn insert_root(&mut self, packed: Vec<u8>) -> StateId {
        let id = self.pool.insert(packed);
        self.ensure_node(id, Node::root);
        id
    }

    /// Inserts a successor reached from `parent` via `op` at total cost
    /// `cost`. If the buffer already denotes a known state, the existing
    /// node is left untouched (callers decide whether to relax it via
    /// [`StatePool::relax`]).
    pub fn insert_successor(&mut self, packed: Vec<u8>, parent: StateId, op: OpId, cost: Cost) -> StateId {
        let id = self.pool.insert(packed);
        self.ensure_node(id, || Node::successor(parent, op, cost));
        id
    }

    /// Pushes a fresh node for `id` if this is the first time the pool has
    /// handed out that id (i.e. the underlying buffer was not seen before);
    /// a repeat insertion leaves the existing node untouched.
    fn ensure_node(&mut self, id: StateId, make: impl FnOnce() -> Node) {
        if usize::from(id) == self.nodes.len() {
            self.nodes.push(make());
        }
    }

    pub fn get_packed(&self, id: StateId) -> &[u8] {
        self.pool.get(id).expect("state id from this pool")
    }

    pub fn node(&self, id: StateId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: StateId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Re-parents `id` if arriving via `(parent, op)` at `cost` strictly
    /// improves on its current best cost. Returns whether it did.
    ///
    /// The original C re-opens closed nodes on any cost tie too
    /// (`PLAN_COST_HEAP_... <=`), which can re-expand a node forever when a
    /// cycle of zero-cost operators exists. Requiring strict improvement
    /// (SPEC_FULL.md Open Question decision) closes that hole.
    pub fn relax(&mut self, id: StateId, parent: StateId, op: OpId, cost: Cost) -> bool {
        let node = &mut self.nodes[id];
        if cost < node.cost {
            node.parent = Some(parent);
            node.generating_op = Some(op);
            node.cost = cost;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut pool = StatePool::new();
        let a = pool.insert_root(vec![1, 2, 3]);
        let b = pool.insert_root(vec![1, 2, 3]);
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn relax_requires_strict_improvement() {
        let mut pool = StatePool::new();
        let root = pool.insert_root(vec![0]);
        let s = pool.insert_successor(vec![1], root, OpId::from(0usize), 10);
        assert!(!pool.relax(s, root, OpId::from(0usize), 10));
        assert!(pool.relax(s, root, OpId::from(1usize), 9));
        assert_eq!(pool.node(s).cost, 9);
    }
}
