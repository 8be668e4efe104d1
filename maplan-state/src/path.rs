use crate::agent::AgentId;
use crate::operator::Cost;
use crate::pool::StateId;
use crate::vars::OpId;

/// One step of a solution path: the operator that was applied, who owns it,
/// and the states it connects. `owner`/`global_op_id` survive even after the
/// path crosses into a fragment produced by tracing through another agent's
/// private states (spec §4.K), where `source`/`target` are meaningful only
/// within that agent's own state pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub op_name: String,
    pub global_op_id: u32,
    pub owner: AgentId,
    pub op: Option<OpId>,
    pub cost: Cost,
    pub source: StateId,
    pub target: StateId,
}

/// An ordered, root-to-goal sequence of path entries, assembled by walking
/// back-pointers and, when a back-pointer crosses an agent boundary, by
/// splicing in a fragment traced by a peer (spec §3 "Path", §4.K).
#[derive(Debug, Clone, Default)]
pub struct Path {
    entries: Vec<PathEntry>,
}

impl Path {
    pub fn new() -> Self {
        Path::default()
    }

    /// Prepends an entry; callers walk back-pointers from goal to root and
    /// push entries in that order, so this keeps the path root-first.
    pub fn push_front(&mut self, entry: PathEntry) {
        self.entries.insert(0, entry);
    }

    /// Splices a fragment traced by another agent at the front of this path.
    pub fn prepend_fragment(&mut self, mut fragment: Path) {
        fragment.entries.append(&mut self.entries);
        self.entries = fragment.entries;
    }

    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    pub fn total_cost(&self) -> Cost {
        self.entries.iter().map(|e| e.cost).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cost: Cost, id: u32) -> PathEntry {
        PathEntry {
            op_name: format!("op{id}"),
            global_op_id: id,
            owner: 0,
            op: None,
            cost,
            source: StateId::from(id as usize),
            target: StateId::from((id + 1) as usize),
        }
    }

    #[test]
    fn prepend_fragment_preserves_order() {
        let mut tail = Path::new();
        tail.push_front(entry(1, 2));
        let mut head = Path::new();
        head.push_front(entry(1, 0));
        head.push_front(entry(1, 1));
        tail.prepend_fragment(head);
        let ids: Vec<u32> = tail.entries().iter().map(|e| e.global_op_id).collect();
        assert_eq!(ids, vec![1, 0, 2]);
        assert_eq!(tail.total_cost(), 3);
    }
}
