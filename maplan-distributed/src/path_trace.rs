use std::collections::HashMap;

use maplan_message::{AgentId, Message, PathOpRecord, TracePathMsg};
use maplan_state::{Operators, Path, PathEntry, StateId, StatePool};
use maplan_transport::{Transport, TransportError};

/// Walks a solution path's back-pointers to the root, forwarding a
/// [`TracePathMsg`] to a peer when the chain runs into a state this agent
/// only knows as someone else's public announcement (spec §4.K).
///
/// A state reached via [`StatePool::insert_root`] is locally
/// indistinguishable from this problem's real initial state: both have no
/// parent. `PathTracer` is what tells them apart: every state imported from
/// a peer's `PublicStateMsg` gets recorded here before it's inserted as a
/// pool root, so tracing can recognize the difference and hand off instead
/// of stopping early.
#[derive(Default)]
pub struct PathTracer {
    imported: HashMap<StateId, (AgentId, u32)>,
}

/// Sentinel `private_id` marking a [`TracePathMsg`] as the fully assembled
/// path rather than a request to keep tracing: no real `StateId` ever
/// reaches `u32::MAX` through normal pool growth, since [`StateId`] is
/// backed by a `NonZeroU32` and pools don't grow anywhere near that size.
pub const FINAL_DELIVERY: u32 = u32::MAX;

/// Result of tracing one agent's share of the path.
pub enum TraceStep {
    /// The chain reached the initiator's own genuine root; `path` is the
    /// fully assembled root-to-goal path, ready to hand to termination.
    Complete(Vec<PathOpRecord>),
    /// The chain ran into a state imported from `peer`, or reached a
    /// genuine root belonging to someone other than `initiator`; `path` is
    /// this agent's fragment plus everything traced so far downstream, and
    /// a `TracePathMsg` has already been sent to `peer` to either continue
    /// the trace (ordinary boundary) or adopt the path directly (the
    /// `FINAL_DELIVERY` sentinel case).
    Forwarded { path: Vec<PathOpRecord>, peer: AgentId },
}

impl PathTracer {
    pub fn new() -> Self {
        PathTracer::default()
    }

    /// Records that `id` was inserted locally to represent `peer`'s public
    /// state (identified to `peer` by `private_id`), not a genuine local
    /// root. Call this at the same time the state is inserted via
    /// `StatePool::insert_root`.
    pub fn mark_imported(&mut self, id: StateId, peer: AgentId, private_id: u32) {
        self.imported.insert(id, (peer, private_id));
    }

    /// Walks back-pointers from `from` toward the root, collecting
    /// [`PathEntry`] values along the way, then stitches the result onto
    /// `downstream`, whatever later hops already traced further along the
    /// chain toward the goal. Stops at a genuine root or at an imported
    /// boundary, whichever comes first.
    ///
    /// A genuine root belonging to `initiator` itself completes the path
    /// locally. Any other genuine root (this agent's own real initial
    /// state, reached while tracing on someone else's behalf) has nowhere
    /// further to forward to, so the fully assembled path is sent straight
    /// back to `initiator` with the [`FINAL_DELIVERY`] sentinel instead of a
    /// real private id: there is no further boundary to resume from.
    pub fn trace_back(
        &self,
        pool: &StatePool,
        operators: &Operators,
        local_agent: AgentId,
        initiator: AgentId,
        from: StateId,
        downstream: Vec<PathOpRecord>,
        transport: &impl Transport,
    ) -> Result<TraceStep, TransportError> {
        let mut path = Path::new();
        let mut current = from;

        loop {
            let node = pool.node(current);
            let Some(parent) = node.parent else {
                let mut combined = to_wire_path(&path);
                combined.extend(downstream);

                if let Some(&(peer, private_id)) = self.imported.get(&current) {
                    transport.send(
                        peer,
                        Message::TracePath(TracePathMsg {
                            agent_id: local_agent,
                            initiator,
                            state_buf: pool.get_packed(current).to_vec(),
                            private_id,
                            path: combined.clone(),
                        }),
                    )?;
                    return Ok(TraceStep::Forwarded { path: combined, peer });
                }

                if local_agent == initiator {
                    return Ok(TraceStep::Complete(combined));
                }

                transport.send(
                    initiator,
                    Message::TracePath(TracePathMsg {
                        agent_id: local_agent,
                        initiator,
                        state_buf: Vec::new(),
                        private_id: FINAL_DELIVERY,
                        path: combined.clone(),
                    }),
                )?;
                return Ok(TraceStep::Forwarded { path: combined, peer: initiator });
            };

            let op_id = node.generating_op.expect("non-root state has a generating operator");
            let op = operators.get(op_id);
            path.push_front(PathEntry {
                op_name: op.name.clone(),
                global_op_id: op.global_id,
                owner: op.owner,
                op: Some(op_id),
                cost: op.cost,
                source: parent,
                target: current,
            });
            current = parent;
        }
    }
}

fn to_wire_path(path: &Path) -> Vec<PathOpRecord> {
    path.entries()
        .iter()
        .map(|e| PathOpRecord {
            global_op_id: e.global_op_id,
            owner: e.owner,
            cost: e.cost,
            name: e.op_name.clone(),
        })
        .collect()
}
