use std::collections::HashSet;
use std::time::Duration;

use maplan_message::{
    AgentId, Message, PathOpRecord, PublicStateMsg, SearchOutcome as WireOutcome, SnapshotKind, SnapshotSubType, SnapshotToken,
    TracePathMsg,
};
use maplan_search::{SearchCallbacks, SearchOutcome};
use maplan_state::{Operators, Packer, StateId, StatePool};
use maplan_transport::{Transport, TransportError};

use crate::ma_state::MaStateRegistry;
use crate::path_trace::{PathTracer, TraceStep};
use crate::snapshot::{DeadEndVerificationHandler, SnapshotHandler, SnapshotRegistry, SnapshotResult, SolutionVerificationHandler};
use crate::termination::TerminationProtocol;

/// Glues a single-agent search loop (`a_star`/`lazy_best_first`/`ehc`) to the
/// rest of the protocol stack (spec §4.A-§4.K): on every `post_step` it
/// drains whatever arrived on the transport without blocking and feeds it to
/// the termination protocol, the snapshot registry, or the MA-state/path
/// tracer as appropriate, and on every expansion it announces newly
/// generated public states to every other agent.
///
/// This is a simplification against the original's operator-interest
/// filtering (`ma_comm_send_to_all_by_op`, which only notifies agents that
/// actually own an operator applicable to a state's public projection): this
/// driver floods every public-state announcement to every other agent. It's
/// still correct - nobody is told less than they need to know, just not
/// bandwidth-optimal; see DESIGN.md.
///
/// A second simplification, forced by `SearchCallbacks` only handing its
/// hooks a shared `&StatePool`: a `PublicStateMsg` received mid-search can't
/// be inserted as a pool root from inside a callback, since that needs `&mut
/// StatePool` and the search loop is already holding that borrow for its own
/// call stack. Such messages are queued in `pending_imports` instead, and
/// [`MultiAgentDriver::apply_pending`], called between search attempts when
/// the caller owns `&mut StatePool` again, is what actually inserts them.
/// A caller therefore runs search to exhaustion, applies pending imports, and
/// re-runs if that brought in anything new, before trusting a `NoSolution`
/// result enough to start dead-end verification.
pub struct MultiAgentDriver<'a, T: Transport> {
    transport: &'a T,
    agent_id: AgentId,
    node_size: usize,
    operators: &'a Operators,
    packer: &'a Packer,
    ma_state: MaStateRegistry,
    tracer: PathTracer,
    termination: TerminationProtocol,
    snapshots: SnapshotRegistry,
    next_token: u32,
    announced: HashSet<StateId>,
    best_known_cost: Option<i64>,
    outcome: Option<(SearchOutcome, Vec<PathOpRecord>)>,
    /// Messages that need `&mut StatePool` to handle (importing a peer's
    /// public state as a root) but arrived while a search loop only hands
    /// callbacks `&StatePool`. Drained by [`Self::apply_pending`], which the
    /// caller runs between search attempts, see the type's doc comment.
    pending_imports: Vec<PublicStateMsg>,
    /// `TracePath` messages received mid-search, queued for the orchestrator
    /// loop to act on once it owns `&mut StatePool`/`&mut PathTracer` again,
    /// see [`Self::drain_pending_traces`].
    pending_traces: Vec<TracePathMsg>,
}

impl<'a, T: Transport> MultiAgentDriver<'a, T> {
    pub fn new(transport: &'a T, operators: &'a Operators, packer: &'a Packer) -> Self {
        let agent_id = transport.node_id();
        let node_size = transport.node_size();
        MultiAgentDriver {
            transport,
            agent_id,
            node_size,
            operators,
            packer,
            ma_state: MaStateRegistry::new(),
            tracer: PathTracer::new(),
            termination: TerminationProtocol::new(agent_id, node_size),
            snapshots: SnapshotRegistry::new(agent_id, node_size),
            next_token: 0,
            announced: HashSet::new(),
            best_known_cost: None,
            outcome: None,
            pending_imports: Vec::new(),
            pending_traces: Vec::new(),
        }
    }

    /// The outcome and assembled path fragment reported by the termination
    /// protocol's FINAL_FIN, once it has fired.
    pub fn outcome(&self) -> Option<&(SearchOutcome, Vec<PathOpRecord>)> {
        self.outcome.as_ref()
    }

    /// This agent's own id, as seen by `transport.node_id()`.
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Inserts every queued `PublicStateMsg` as a pool root, marking each as
    /// an import boundary for path tracing. Returns the freshly inserted
    /// `StateId`s so a caller can seed a resumed search directly from them
    /// (`maplan_search::astar::a_star_resume`) instead of re-running from
    /// scratch, and can tell whether anything was imported at all from
    /// whether the result is empty.
    pub fn apply_pending(&mut self, pool: &mut StatePool) -> Vec<StateId> {
        self.pending_imports
            .drain(..)
            .map(|msg| {
                let surrogate = self.ma_state.intern(msg.agent_id, &msg.state_buf);
                let mut packed = msg.state_buf;
                packed.extend_from_slice(&self.packer.encode_surrogate_private_region(surrogate));
                let id = pool.insert_root(packed);
                self.tracer.mark_imported(id, msg.agent_id, msg.private_id);
                id
            })
            .collect()
    }

    /// Drains `TracePath` messages queued by [`Self::drain_inbox`] while a
    /// search loop held `&StatePool`. The caller resumes each one through
    /// [`Self::trace_path`] (if `private_id` names a local boundary to keep
    /// walking back from) or, for [`crate::path_trace::FINAL_DELIVERY`],
    /// adopts `path` directly as the finished solution.
    pub fn drain_pending_traces(&mut self) -> Vec<TracePathMsg> {
        std::mem::take(&mut self.pending_traces)
    }

    /// Non-blockingly drains the transport's inbox, routing each message to
    /// whichever subsystem can handle it immediately and queuing the rest
    /// (see [`Self::apply_pending`]). Safe to call from `post_step` every
    /// iteration: an empty inbox returns immediately.
    fn drain_inbox(&mut self) -> Result<(), TransportError> {
        loop {
            let msg = match self.transport.recv_timeout(Duration::ZERO) {
                Ok(msg) => msg,
                Err(TransportError::TimedOut) => return Ok(()),
                Err(e) => return Err(e),
            };
            self.handle_message(msg)?;
        }
    }

    fn handle_message(&mut self, msg: Message) -> Result<(), TransportError> {
        // An INIT opening a round we haven't joined yet must register before
        // the registry's own `process_msg` looks for a matching entry, or
        // the INIT is silently dropped (spec §8 property 7: unknown tokens
        // must still resolve to a round, not to nothing).
        if let Message::Snapshot(ref snap) = msg {
            if snap.sub_type == SnapshotSubType::Init && !self.snapshots.is_known(snap.token) {
                self.join_round(snap.token, snap.kind)?;
            }
        }

        // Every open snapshot round gets a look first, so dead-end rounds see
        // this message count as "in flight" before it's consumed below.
        self.snapshots.process_msg(&msg, self.transport)?;

        match msg {
            Message::Terminate(t) => {
                if let Some((outcome, path)) = self.termination.process_msg(t, self.transport)? {
                    self.outcome = Some((outcome, path));
                }
            }
            Message::PublicState(ps) => {
                if let Some(h) = ps.heur {
                    self.note_bound(ps.cost + h);
                } else {
                    self.note_bound(ps.cost);
                }
                self.pending_imports.push(ps);
            }
            Message::TracePath(tp) => {
                // Resuming the walk needs `&mut StatePool`/`&mut PathTracer`,
                // which this callback-driven path doesn't have; queued for
                // the orchestrator to act on via `drain_pending_traces`.
                self.pending_traces.push(tp);
            }
            Message::Snapshot(_) => {
                // Already routed to `self.snapshots` above.
            }
            Message::Heur(_) => {
                // No MA heuristic is wired into this driver yet (spec §4.B
                // supplement 4 covers the aggregation rule itself, not its
                // wire exchange); see DESIGN.md Open Question.
            }
        }
        Ok(())
    }

    fn note_bound(&mut self, cost: i64) {
        self.best_known_cost = Some(match self.best_known_cost {
            Some(best) => best.min(cost),
            None => cost,
        });
    }

    /// Announces `id` to every other agent: its packed public region, this
    /// agent's own surrogate id for it, and its cost/heuristic bound.
    fn announce(&mut self, id: StateId, pool: &StatePool) -> Result<(), TransportError> {
        if !self.announced.insert(id) {
            return Ok(());
        }
        let state_buf = pool.get_packed(id)[..self.packer.public_region_len()].to_vec();
        let node = pool.node(id);
        let msg = Message::PublicState(PublicStateMsg {
            agent_id: self.agent_id,
            state_buf,
            private_id: id.to_u32(),
            cost: node.cost,
            heur: node.heuristic.value(),
        });
        for to in 0..self.node_size as u32 {
            if to != self.agent_id {
                self.transport.send(to, msg.clone())?;
            }
        }
        Ok(())
    }

    /// Starts a solution-verification round for a candidate goal just found
    /// locally, and blocks (processing whatever else arrives meanwhile)
    /// until every agent's vote is in.
    pub fn verify_solution(&mut self, candidate_cost: i64) -> Result<SnapshotResult, TransportError> {
        let token = self.fresh_token();
        let handler = Box::new(SolutionVerificationHandler::new(candidate_cost));
        self.snapshots.start(token, SnapshotKind::SolutionVerification, handler, self.transport)?;
        self.run_round_to_completion(token)
    }

    /// Starts a dead-end-verification round once local search is exhausted,
    /// confirming no agent has outstanding work and no message was in flight.
    pub fn verify_dead_end(&mut self) -> Result<SnapshotResult, TransportError> {
        let token = self.fresh_token();
        let handler = Box::new(DeadEndVerificationHandler::new(true));
        self.snapshots.start(token, SnapshotKind::DeadEndVerification, handler, self.transport)?;
        self.run_round_to_completion(token)
    }

    fn fresh_token(&mut self) -> SnapshotToken {
        let t = SnapshotToken::new(self.next_token, self.agent_id);
        self.next_token += 1;
        t
    }

    fn run_round_to_completion(&mut self, token: SnapshotToken) -> Result<SnapshotResult, TransportError> {
        loop {
            let msg = self.transport.recv()?;
            if let Message::Snapshot(ref snap) = msg {
                if snap.token == token {
                    if let Some(result) = self.snapshots.process_msg(&msg, self.transport)? {
                        return Ok(result);
                    }
                    continue;
                }
            }
            self.handle_message(msg)?;
        }
    }

    /// Registers a round this agent did not start, on receiving its INIT.
    /// Picks the matching handler for `kind` so either verification can be
    /// answered the same way regardless of who asked.
    pub fn join_round(&mut self, token: SnapshotToken, kind: SnapshotKind) -> Result<(), TransportError> {
        let handler: Box<dyn SnapshotHandler> = match kind {
            SnapshotKind::SolutionVerification => Box::new(SolutionVerificationHandler::new(i64::MAX)),
            SnapshotKind::DeadEndVerification => Box::new(DeadEndVerificationHandler::new(true)),
        };
        self.snapshots.register(token, kind, handler, self.transport)
    }

    /// Kicks off the ring termination protocol once this agent believes
    /// nothing is left to do, attaching the outcome/path it wants the ring's
    /// elected initiator to broadcast if it turns out to be the one.
    pub fn begin_termination(&mut self, outcome: WireOutcome, path: Vec<PathOpRecord>) -> Result<(), TransportError> {
        self.termination.set_final_payload(outcome, path);
        self.termination.start(self.transport)
    }

    /// Walks a just-found goal's path back to this agent's own root (or to
    /// an imported boundary, forwarding the rest of the trace onward).
    /// `downstream` is whatever a later hop already assembled further along
    /// the chain toward the goal; pass an empty vec when starting a trace
    /// fresh from a locally found goal.
    pub fn trace_path(
        &self,
        pool: &StatePool,
        from: StateId,
        initiator: AgentId,
        downstream: Vec<PathOpRecord>,
    ) -> Result<TraceStep, TransportError> {
        self.tracer
            .trace_back(pool, self.operators, self.agent_id, initiator, from, downstream, self.transport)
    }

    /// Blocks up to `timeout` for the next message, routing it the same way
    /// `drain_inbox` does. Returns whether a message actually arrived, for a
    /// caller that wants to distinguish "processed something" from "timed
    /// out, nothing new" while waiting out a round between search attempts.
    pub fn block_for_message(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        match self.transport.recv_timeout(timeout) {
            Ok(msg) => {
                self.handle_message(msg)?;
                Ok(true)
            }
            Err(TransportError::TimedOut) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<'a, T: Transport> SearchCallbacks for MultiAgentDriver<'a, T> {
    fn post_step(&mut self, _pool: &StatePool) {
        let _ = self.drain_inbox();
    }

    fn expanded_node(&mut self, id: StateId, pool: &StatePool) {
        let op_owner_is_foreign = pool
            .node(id)
            .generating_op
            .map(|op_id| self.operators.get(op_id).owner != self.agent_id)
            .unwrap_or(false);
        if !op_owner_is_foreign {
            let _ = self.announce(id, pool);
        }
    }

    fn reached_goal(&mut self, id: StateId, pool: &StatePool) {
        self.note_bound(pool.node(id).cost);
        let _ = self.announce(id, pool);
    }

    fn dead_end(&mut self, _id: StateId, _pool: &StatePool) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplan_state::{OpId, Variable, Variables};
    use maplan_transport::InProcessTransport;

    fn single_var_problem() -> (Variables, Operators, Packer) {
        let vars = Variables::new(vec![Variable::new("x", 4, false)]);
        let ops = Operators::new(vec![]);
        let packer = Packer::new(&vars);
        (vars, ops, packer)
    }

    #[test]
    fn announce_is_idempotent_per_state() {
        let (_vars, ops, packer) = single_var_problem();
        let transports = InProcessTransport::network(2);
        let mut driver = MultiAgentDriver::new(&transports[0], &ops, &packer);
        let mut pool = StatePool::new();
        let root = pool.insert_root(vec![0, 0]);

        driver.announce(root, &pool).unwrap();
        driver.announce(root, &pool).unwrap();

        let first = transports[1].recv_timeout(Duration::from_millis(200)).unwrap();
        assert!(matches!(first, Message::PublicState(_)));
        assert!(transports[1].recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn importing_a_public_state_marks_it_as_a_tracing_boundary() {
        let (_vars, ops, packer) = single_var_problem();
        let transports = InProcessTransport::network(2);
        let mut driver = MultiAgentDriver::new(&transports[1], &ops, &packer);
        let mut pool = StatePool::new();

        driver.pending_imports.push(PublicStateMsg {
            agent_id: 0,
            state_buf: vec![3, 0],
            private_id: 5,
            cost: 4,
            heur: Some(2),
        });
        driver.note_bound(6);
        let imported = driver.apply_pending(&mut pool);
        assert_eq!(imported.len(), 1);

        assert_eq!(pool.len(), 1);
        assert_eq!(driver.best_known_cost, Some(6));
        let _ = OpId::from(0usize);
    }
}
