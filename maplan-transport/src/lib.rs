//! Communication layer contract (spec §4.F): ordered, reliable,
//! point-to-point delivery between every pair of agents, over either
//! in-process channels or TCP.

mod tcp;

use std::time::Duration;

use maplan_message::{AgentId, Message};
use thiserror::Error;

pub use tcp::TcpTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("timed out waiting for a message")]
    TimedOut,
    #[error("unknown peer agent {0}")]
    UnknownPeer(AgentId),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message on the wire: {0}")]
    Decode(#[from] maplan_message::DecodeError),
    #[error("protocol violation: {0}")]
    Protocol(#[from] maplan_message::ProtocolError),
}

/// Point-to-point transport between `node_size` agents. Every implementation
/// must preserve per-peer message order (spec §4.F invariant 1) but makes no
/// ordering guarantee across different peers.
pub trait Transport: Send {
    fn node_id(&self) -> AgentId;
    fn node_size(&self) -> usize;
    fn send(&self, to: AgentId, msg: Message) -> Result<(), TransportError>;
    fn recv(&self) -> Result<Message, TransportError>;
    fn recv_timeout(&self, timeout: Duration) -> Result<Message, TransportError>;
    /// Initiates a graceful shutdown: signals peers no more data is coming,
    /// then waits (bounded by an internal timeout) for them to do the same
    /// before releasing transport resources.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// In-process ring-queue transport for agents running as threads of one
/// process, backed by `crossbeam-channel`'s MPMC queue rather than a
/// TCP round trip.
pub struct InProcessTransport {
    node_id: AgentId,
    node_size: usize,
    senders: Vec<crossbeam_channel::Sender<Message>>,
    receiver: crossbeam_channel::Receiver<Message>,
}

impl InProcessTransport {
    /// Builds one connected transport endpoint per agent, `0..node_size`.
    pub fn network(node_size: usize) -> Vec<InProcessTransport> {
        let channels: Vec<(crossbeam_channel::Sender<Message>, crossbeam_channel::Receiver<Message>)> =
            (0..node_size).map(|_| crossbeam_channel::unbounded()).collect();
        let senders: Vec<_> = channels.iter().map(|(s, _)| s.clone()).collect();
        let mut receivers: Vec<Option<crossbeam_channel::Receiver<Message>>> =
            channels.into_iter().map(|(_, r)| Some(r)).collect();

        (0..node_size)
            .map(|id| InProcessTransport {
                node_id: id as AgentId,
                node_size,
                senders: senders.clone(),
                receiver: receivers[id].take().expect("each receiver consumed once"),
            })
            .collect()
    }
}

impl Transport for InProcessTransport {
    fn node_id(&self) -> AgentId {
        self.node_id
    }

    fn node_size(&self) -> usize {
        self.node_size
    }

    fn send(&self, to: AgentId, msg: Message) -> Result<(), TransportError> {
        let sock = self
            .senders
            .get(to as usize)
            .ok_or(TransportError::UnknownPeer(to))?;
        sock.send(msg).map_err(|_| TransportError::Closed)
    }

    fn recv(&self) -> Result<Message, TransportError> {
        self.receiver.recv().map_err(|_| TransportError::Closed)
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Message, TransportError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(m) => Ok(m),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(TransportError::TimedOut),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // Dropping the senders is enough: peers observe a disconnected
        // channel and every outstanding recv() returns Closed.
        self.senders.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplan_message::{SearchOutcome, TerminateMsg, TerminateSubType};

    #[test]
    fn in_process_delivers_point_to_point() {
        let mut net = InProcessTransport::network(3);
        let a2 = net.remove(2);
        let a1 = net.remove(1);
        let a0 = net.remove(0);

        a0.send(
            1,
            Message::Terminate(TerminateMsg {
                agent_id: 0,
                sub_type: TerminateSubType::Request,
                initiator: Some(0),
                outcome: None,
                path: vec![],
            }),
        )
        .unwrap();

        let got = a1.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(got.agent_id(), 0);
        assert!(a2.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn final_fin_carries_outcome() {
        let mut net = InProcessTransport::network(2);
        let a1 = net.remove(1);
        let a0 = net.remove(0);
        a0.send(
            1,
            Message::Terminate(TerminateMsg {
                agent_id: 0,
                sub_type: TerminateSubType::FinalFin,
                initiator: Some(0),
                outcome: Some(SearchOutcome::Solved),
                path: vec![],
            }),
        )
        .unwrap();
        match a1.recv().unwrap() {
            Message::Terminate(m) => assert_eq!(m.outcome, Some(SearchOutcome::Solved)),
            _ => panic!("expected Terminate"),
        }
    }
}
