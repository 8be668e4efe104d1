use maplan_message::{AgentId, Message, PathOpRecord, SearchOutcome, TerminateMsg, TerminateSubType};
use maplan_transport::{Transport, TransportError};

/// Ring-based two-wave termination protocol (spec §4.E).
///
/// A REQUEST circulates the ring to elect the lowest-id agent as initiator
/// (fixed priority breaks ties when several agents start termination at
/// once). Once it returns to its originator, a FINAL wave travels forward
/// around the ring and a FINAL_ACK wave travels back; every agent counts
/// both against a position computed from `(own_id - initiator_id) mod N`.
/// When the initiator has both counts in, it broadcasts FINAL_FIN carrying
/// the aggregated search result and path, and every agent terminates.
pub struct TerminationProtocol {
    node_id: AgentId,
    node_size: usize,
    state: State,
    initiator_id: Option<AgentId>,
    is_initiator: bool,
    is_first: bool,
    is_last: bool,
    final_counter: u32,
    final_target: u32,
    final_done: bool,
    final_ack_counter: u32,
    final_ack_target: u32,
    final_ack_done: bool,
    final_payload: Option<(SearchOutcome, Vec<PathOpRecord>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    None,
    InProgress,
    Terminated,
}

impl TerminationProtocol {
    pub fn new(node_id: AgentId, node_size: usize) -> Self {
        TerminationProtocol {
            node_id,
            node_size,
            state: State::None,
            initiator_id: None,
            is_initiator: false,
            is_first: false,
            is_last: false,
            final_counter: 0,
            final_target: 0,
            final_done: false,
            final_ack_counter: 0,
            final_ack_target: 0,
            final_ack_done: false,
            final_payload: None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state == State::Terminated
    }

    /// Attaches the payload this agent will broadcast in FINAL_FIN, if it
    /// ends up being the ring's first node. A no-op for every other agent.
    pub fn set_final_payload(&mut self, outcome: SearchOutcome, path: Vec<PathOpRecord>) {
        self.final_payload = Some((outcome, path));
    }

    /// Kicks off termination: sends a REQUEST carrying our own id around the
    /// ring. Only valid once per run.
    pub fn start(&mut self, transport: &impl Transport) -> Result<(), TransportError> {
        if self.state != State::None {
            return Ok(());
        }
        self.send_in_ring(
            transport,
            TerminateMsg {
                agent_id: self.node_id,
                sub_type: TerminateSubType::Request,
                initiator: Some(self.node_id),
                outcome: None,
                path: vec![],
            },
        )?;
        self.state = State::InProgress;
        self.is_initiator = true;
        Ok(())
    }

    /// Processes one incoming TERMINATE message. Returns the final payload
    /// once this agent has fully terminated (on the FINAL_FIN it receives
    /// or, for the ring's first node, the one it just broadcast).
    pub fn process_msg(
        &mut self,
        msg: TerminateMsg,
        transport: &impl Transport,
    ) -> Result<Option<(SearchOutcome, Vec<PathOpRecord>)>, TransportError> {
        match msg.sub_type {
            TerminateSubType::Request => {
                self.state = State::InProgress;
                self.process_request(msg, transport)?;
                return Ok(None);
            }
            TerminateSubType::Final => self.final_counter += 1,
            TerminateSubType::FinalAck => self.final_ack_counter += 1,
            TerminateSubType::FinalFin => {
                self.state = State::Terminated;
                let outcome = msg.outcome.expect("FINAL_FIN always carries an outcome");
                return Ok(Some((outcome, msg.path)));
            }
        }

        if self.final_counter == self.final_target && !self.final_done {
            if self.is_last {
                self.send_final_ack(transport)?;
            } else if !self.is_first {
                self.send_final(transport)?;
            }
            self.final_done = true;
        }

        if self.final_ack_counter == self.final_ack_target && !self.final_ack_done {
            if !self.is_first && !self.is_last {
                self.send_final_ack(transport)?;
            }
            self.final_ack_done = true;
        }

        if self.final_done && self.final_ack_done && self.is_first {
            self.state = State::Terminated;
            let (outcome, path) = self
                .final_payload
                .clone()
                .expect("ring's first node must have a final payload set before termination completes");
            self.broadcast_final_fin(transport, outcome, path.clone())?;
            return Ok(Some((outcome, path)));
        }

        Ok(None)
    }

    fn process_request(&mut self, msg: TerminateMsg, transport: &impl Transport) -> Result<(), TransportError> {
        let candidate = msg.initiator.expect("REQUEST always names a candidate");

        if candidate == self.node_id {
            self.initiator_id = Some(candidate);
            self.prepare_targets(None);
            self.send_final(transport)?;
            return Ok(());
        }

        if self.is_initiator && candidate > self.node_id {
            return Ok(());
        }

        let accept = match self.initiator_id {
            None => true,
            Some(cur) => candidate < cur,
        };
        if accept {
            self.initiator_id = Some(candidate);
            self.prepare_targets(Some(candidate));
        }

        self.send_in_ring(
            transport,
            TerminateMsg {
                agent_id: self.node_id,
                sub_type: TerminateSubType::Request,
                initiator: Some(candidate),
                outcome: None,
                path: vec![],
            },
        )
    }

    /// `initiator_id = None` means "we just learned the REQUEST we sent out
    /// circled back to us": the original's `-1` sentinel for "I am the
    /// first node", kept here as the same `Option` shape used everywhere
    /// else rather than a second encoding of "no value".
    fn prepare_targets(&mut self, initiator_id: Option<AgentId>) {
        match initiator_id {
            None => {
                self.is_first = true;
                self.is_last = false;
                self.final_target = 0;
                self.final_ack_target = self.node_size as u32 - 1;
            }
            Some(initiator_id) => {
                self.is_first = false;
                let target = (self.node_id + self.node_size as u32 - initiator_id) % self.node_size as u32;
                self.final_target = target;
                self.final_ack_target = self.node_size as u32 - 1 - target;
                self.is_last = self.final_ack_target == 0;
            }
        }
        self.final_counter = 0;
        self.final_done = false;
        self.final_ack_counter = 0;
        self.final_ack_done = false;
    }

    fn send_in_ring(&self, transport: &impl Transport, msg: TerminateMsg) -> Result<(), TransportError> {
        let to = (self.node_id + 1) % self.node_size as u32;
        transport.send(to, Message::Terminate(msg))
    }

    /// Sends FINAL to every node still ahead of us in the forward direction
    /// (`final_ack_target` of them, starting at our immediate successor).
    /// These fan-outs overlap: a node `k` hops from the initiator receives
    /// one copy from every node at distance `< k` that has already fired,
    /// so its `final_counter` accumulates to exactly `k` without needing a
    /// single-hop relay chain.
    fn send_final(&self, transport: &impl Transport) -> Result<(), TransportError> {
        if self.final_ack_target == 0 {
            return Ok(());
        }
        let node_size = self.node_size as u32;
        let mut to = (self.node_id + 1) % node_size;
        for _ in 0..self.final_ack_target {
            transport.send(
                to,
                Message::Terminate(TerminateMsg {
                    agent_id: self.node_id,
                    sub_type: TerminateSubType::Final,
                    initiator: None,
                    outcome: None,
                    path: vec![],
                }),
            )?;
            to = (to + 1) % node_size;
        }
        Ok(())
    }

    /// Mirror of [`Self::send_final`] traveling backward: sends FINAL_ACK to
    /// every node still behind us, `final_target` of them starting at our
    /// immediate predecessor.
    fn send_final_ack(&self, transport: &impl Transport) -> Result<(), TransportError> {
        if self.final_target == 0 {
            return Ok(());
        }
        let node_size = self.node_size as u32;
        let mut to = (self.node_id + node_size - 1) % node_size;
        for _ in 0..self.final_target {
            transport.send(
                to,
                Message::Terminate(TerminateMsg {
                    agent_id: self.node_id,
                    sub_type: TerminateSubType::FinalAck,
                    initiator: None,
                    outcome: None,
                    path: vec![],
                }),
            )?;
            to = (to + node_size - 1) % node_size;
        }
        Ok(())
    }

    fn broadcast_final_fin(
        &self,
        transport: &impl Transport,
        outcome: SearchOutcome,
        path: Vec<PathOpRecord>,
    ) -> Result<(), TransportError> {
        for to in 0..self.node_size as u32 {
            if to == self.node_id {
                continue;
            }
            transport.send(
                to,
                Message::Terminate(TerminateMsg {
                    agent_id: self.node_id,
                    sub_type: TerminateSubType::FinalFin,
                    initiator: None,
                    outcome: Some(outcome),
                    path: path.clone(),
                }),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplan_transport::InProcessTransport;
    use std::time::Duration;

    fn drain_terminate(msg: Message) -> TerminateMsg {
        match msg {
            Message::Terminate(t) => t,
            _ => panic!("expected a Terminate message"),
        }
    }

    #[test]
    fn single_initiator_three_agents_terminates_everyone() {
        let transports = InProcessTransport::network(3);
        let mut protos: Vec<TerminationProtocol> =
            (0..3).map(|id| TerminationProtocol::new(id, 3)).collect();

        protos[0].set_final_payload(SearchOutcome::Solved, vec![]);
        protos[0].start(&transports[0]).unwrap();

        let mut done = [false; 3];
        let mut rounds = 0;
        while !done.iter().all(|&d| d) {
            rounds += 1;
            assert!(rounds < 1000, "termination protocol looping forever");
            for id in 0..3usize {
                while let Ok(msg) = transports[id].recv_timeout(Duration::from_millis(5)) {
                    let term = drain_terminate(msg);
                    if let Some((outcome, _)) = protos[id].process_msg(term, &transports[id]).unwrap() {
                        assert_eq!(outcome, SearchOutcome::Solved);
                        done[id] = true;
                    }
                }
            }
        }
        assert!(protos.iter().all(|p| p.is_terminated()));
    }
}
