//! The wire message model exchanged between agents.
//!
//! Each message is a plain Rust enum variant rather than a reflective,
//! bitmask-tagged field table (`msg_schema.h`): every variant's
//! `encode`/`decode` is hand-written, which costs some duplication but means
//! a decode error points at a concrete field instead of a generic schema
//! mismatch.

mod wire;

pub use wire::DecodeError;
use wire::{Reader, Writer};

pub type AgentId = u32;
pub type Cost = i64;

/// A violation of the protocol invariants spec §7 classifies as fatal on
/// the observing agent rather than tolerated: the transport contract (§4.F)
/// already disallows duplicate delivery, so seeing either of these twice
/// for the same token/peer means a peer misbehaved, not that the network
/// reordered or duplicated something it's allowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("duplicate MARK for snapshot token {token:?} from agent {agent}")]
    DuplicateMark { token: SnapshotToken, agent: AgentId },
    #[error("duplicate RESPONSE for snapshot token {token:?} from agent {agent}")]
    DuplicateResponse { token: SnapshotToken, agent: AgentId },
}

const TYPE_TERMINATE: u8 = 0x0;
const TYPE_TRACE_PATH: u8 = 0x1;
const TYPE_PUBLIC_STATE: u8 = 0x2;
const TYPE_SNAPSHOT: u8 = 0x3;
const TYPE_HEUR: u8 = 0x4;

/// One step of a traced path fragment, as carried on the wire (distinct from
/// `maplan_state::PathEntry`, which also carries local state ids that are
/// meaningless outside the owning agent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOpRecord {
    pub global_op_id: u32,
    pub owner: AgentId,
    pub cost: Cost,
    pub name: String,
}

impl PathOpRecord {
    fn encode(&self, w: &mut Writer) {
        w.u32(self.global_op_id);
        w.u32(self.owner);
        w.i64(self.cost);
        w.string(&self.name);
    }

    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(PathOpRecord {
            global_op_id: r.u32()?,
            owner: r.u32()?,
            cost: r.i64()?,
            name: r.string()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateSubType {
    Request,
    Final,
    FinalAck,
    FinalFin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Solved,
    NoSolution,
}

/// Ring-based termination protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminateMsg {
    pub agent_id: AgentId,
    pub sub_type: TerminateSubType,
    /// Set on REQUEST: the candidate initiator whose id is being compared
    /// around the ring.
    pub initiator: Option<AgentId>,
    /// Set on FINAL_FIN: the aggregated search outcome and assembled path.
    pub outcome: Option<SearchOutcome>,
    pub path: Vec<PathOpRecord>,
}

impl TerminateMsg {
    fn encode(&self, w: &mut Writer) {
        w.u32(self.agent_id);
        w.u8(match self.sub_type {
            TerminateSubType::Request => 0,
            TerminateSubType::Final => 1,
            TerminateSubType::FinalAck => 2,
            TerminateSubType::FinalFin => 3,
        });
        w.option_u32(self.initiator);
        match self.outcome {
            Some(SearchOutcome::Solved) => {
                w.bool(true);
                w.bool(true);
            }
            Some(SearchOutcome::NoSolution) => {
                w.bool(true);
                w.bool(false);
            }
            None => w.bool(false),
        }
        w.u32(self.path.len() as u32);
        for p in &self.path {
            p.encode(w);
        }
    }

    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        let agent_id = r.u32()?;
        let sub_type = match r.u8()? {
            0 => TerminateSubType::Request,
            1 => TerminateSubType::Final,
            2 => TerminateSubType::FinalAck,
            3 => TerminateSubType::FinalFin,
            t => return Err(DecodeError::UnknownSubType(t, TYPE_TERMINATE)),
        };
        let initiator = r.option_u32()?;
        let outcome = if r.bool()? {
            Some(if r.bool()? {
                SearchOutcome::Solved
            } else {
                SearchOutcome::NoSolution
            })
        } else {
            None
        };
        let n = r.u32()? as usize;
        let mut path = Vec::with_capacity(n);
        for _ in 0..n {
            path.push(PathOpRecord::decode(r)?);
        }
        Ok(TerminateMsg {
            agent_id,
            sub_type,
            initiator,
            outcome,
            path,
        })
    }
}

/// Path-tracing request forwarded from agent to agent toward the owner of
/// `state_buf`'s predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePathMsg {
    pub agent_id: AgentId,
    pub initiator: AgentId,
    /// Public bytes of the state to resume tracing from, in the receiving
    /// agent's own state pool.
    pub state_buf: Vec<u8>,
    pub private_id: u32,
    pub path: Vec<PathOpRecord>,
}

impl TracePathMsg {
    fn encode(&self, w: &mut Writer) {
        w.u32(self.agent_id);
        w.u32(self.initiator);
        w.bytes(&self.state_buf);
        w.u32(self.private_id);
        w.u32(self.path.len() as u32);
        for p in &self.path {
            p.encode(w);
        }
    }

    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        let agent_id = r.u32()?;
        let initiator = r.u32()?;
        let state_buf = r.bytes()?;
        let private_id = r.u32()?;
        let n = r.u32()? as usize;
        let mut path = Vec::with_capacity(n);
        for _ in 0..n {
            path.push(PathOpRecord::decode(r)?);
        }
        Ok(TracePathMsg {
            agent_id,
            initiator,
            state_buf,
            private_id,
            path,
        })
    }
}

/// Announces a newly generated state whose public projection another agent
/// may need to expand further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicStateMsg {
    pub agent_id: AgentId,
    pub state_buf: Vec<u8>,
    /// Sender's local private-state fingerprint id, opaque to the receiver;
    /// round-tripped back in any message that references this state so the
    /// sender can recover which of its private states it denotes.
    pub private_id: u32,
    pub cost: Cost,
    pub heur: Option<Cost>,
}

impl PublicStateMsg {
    fn encode(&self, w: &mut Writer) {
        w.u32(self.agent_id);
        w.bytes(&self.state_buf);
        w.u32(self.private_id);
        w.i64(self.cost);
        w.option_i64(self.heur);
    }

    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(PublicStateMsg {
            agent_id: r.u32()?,
            state_buf: r.bytes()?,
            private_id: r.u32()?,
            cost: r.i64()?,
            heur: r.option_i64()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSubType {
    Init,
    Mark,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    SolutionVerification,
    DeadEndVerification,
}

/// A snapshot protocol token: 64 bits, globally unique across a run (spec
/// §3). High 32 bits are a counter the originator increments per round it
/// starts; low 32 bits are the originator's agent id. Folding the
/// originator into the token (rather than just a per-agent counter) is what
/// keeps two agents' concurrently started rounds from aliasing onto the
/// same registry entry, since each originator's counter starts at zero
/// independently.
///
/// Kept a distinct type from [`HeurToken`] even though both are wire
/// integers: the two token spaces are never compared against each other,
/// and mixing them up is a protocol bug the type system should catch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotToken(pub u64);

impl SnapshotToken {
    pub fn new(counter: u32, originator: AgentId) -> Self {
        SnapshotToken(((counter as u64) << 32) | (originator as u64))
    }

    pub fn originator(self) -> AgentId {
        (self.0 & 0xFFFF_FFFF) as AgentId
    }
}

/// Two-wave (Chandy-Lamport style) snapshot messages, used for both solution
/// verification and global dead-end detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMsg {
    pub agent_id: AgentId,
    pub sub_type: SnapshotSubType,
    pub kind: SnapshotKind,
    pub token: SnapshotToken,
    pub init_agent: AgentId,
    /// Set on RESPONSE: whether this agent's local state is consistent with
    /// the condition being verified.
    pub ack: Option<bool>,
}

impl SnapshotMsg {
    fn encode(&self, w: &mut Writer) {
        w.u32(self.agent_id);
        w.u8(match self.sub_type {
            SnapshotSubType::Init => 0,
            SnapshotSubType::Mark => 1,
            SnapshotSubType::Response => 2,
        });
        w.u8(match self.kind {
            SnapshotKind::SolutionVerification => 0,
            SnapshotKind::DeadEndVerification => 1,
        });
        w.u64(self.token.0);
        w.u32(self.init_agent);
        match self.ack {
            Some(v) => {
                w.bool(true);
                w.bool(v);
            }
            None => w.bool(false),
        }
    }

    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        let agent_id = r.u32()?;
        let sub_type = match r.u8()? {
            0 => SnapshotSubType::Init,
            1 => SnapshotSubType::Mark,
            2 => SnapshotSubType::Response,
            t => return Err(DecodeError::UnknownSubType(t, TYPE_SNAPSHOT)),
        };
        let kind = match r.u8()? {
            0 => SnapshotKind::SolutionVerification,
            1 => SnapshotKind::DeadEndVerification,
            t => return Err(DecodeError::UnknownSubType(t, TYPE_SNAPSHOT)),
        };
        let token = SnapshotToken(r.u64()?);
        let init_agent = r.u32()?;
        let ack = if r.bool()? { Some(r.bool()?) } else { None };
        Ok(SnapshotMsg {
            agent_id,
            sub_type,
            kind,
            token,
            init_agent,
            ack,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeurToken(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeurSubType {
    Request,
    Response,
}

/// Request/response pair for the abstract multi-agent heuristic contract,
/// used by `MaxAggregateHeuristic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeurMsg {
    pub agent_id: AgentId,
    pub sub_type: HeurSubType,
    pub token: HeurToken,
    pub requested_agents: Vec<AgentId>,
    pub state_buf: Vec<u8>,
    pub cost: Option<Cost>,
}

impl HeurMsg {
    fn encode(&self, w: &mut Writer) {
        w.u32(self.agent_id);
        w.u8(match self.sub_type {
            HeurSubType::Request => 0,
            HeurSubType::Response => 1,
        });
        w.u32(self.token.0);
        w.vec_u32(&self.requested_agents);
        w.bytes(&self.state_buf);
        w.option_i64(self.cost);
    }

    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        let agent_id = r.u32()?;
        let sub_type = match r.u8()? {
            0 => HeurSubType::Request,
            1 => HeurSubType::Response,
            t => return Err(DecodeError::UnknownSubType(t, TYPE_HEUR)),
        };
        let token = HeurToken(r.u32()?);
        let requested_agents = r.vec_u32()?;
        let state_buf = r.bytes()?;
        let cost = r.option_i64()?;
        Ok(HeurMsg {
            agent_id,
            sub_type,
            token,
            requested_agents,
            state_buf,
            cost,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Terminate(TerminateMsg),
    TracePath(TracePathMsg),
    PublicState(PublicStateMsg),
    Snapshot(SnapshotMsg),
    Heur(HeurMsg),
}

impl Message {
    pub fn agent_id(&self) -> AgentId {
        match self {
            Message::Terminate(m) => m.agent_id,
            Message::TracePath(m) => m.agent_id,
            Message::PublicState(m) => m.agent_id,
            Message::Snapshot(m) => m.agent_id,
            Message::Heur(m) => m.agent_id,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            Message::Terminate(m) => {
                w.u8(TYPE_TERMINATE);
                m.encode(&mut w);
            }
            Message::TracePath(m) => {
                w.u8(TYPE_TRACE_PATH);
                m.encode(&mut w);
            }
            Message::PublicState(m) => {
                w.u8(TYPE_PUBLIC_STATE);
                m.encode(&mut w);
            }
            Message::Snapshot(m) => {
                w.u8(TYPE_SNAPSHOT);
                m.encode(&mut w);
            }
            Message::Heur(m) => {
                w.u8(TYPE_HEUR);
                m.encode(&mut w);
            }
        }
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let ty = r.u8()?;
        Ok(match ty {
            TYPE_TERMINATE => Message::Terminate(TerminateMsg::decode(&mut r)?),
            TYPE_TRACE_PATH => Message::TracePath(TracePathMsg::decode(&mut r)?),
            TYPE_PUBLIC_STATE => Message::PublicState(PublicStateMsg::decode(&mut r)?),
            TYPE_SNAPSHOT => Message::Snapshot(SnapshotMsg::decode(&mut r)?),
            TYPE_HEUR => Message::Heur(HeurMsg::decode(&mut r)?),
            t => return Err(DecodeError::UnknownType(t)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_request_round_trips() {
        let msg = Message::Terminate(TerminateMsg {
            agent_id: 2,
            sub_type: TerminateSubType::Request,
            initiator: Some(2),
            outcome: None,
            path: vec![],
        });
        let encoded = msg.encode();
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn final_fin_round_trips_with_path() {
        let msg = Message::Terminate(TerminateMsg {
            agent_id: 0,
            sub_type: TerminateSubType::FinalFin,
            initiator: Some(0),
            outcome: Some(SearchOutcome::Solved),
            path: vec![PathOpRecord {
                global_op_id: 7,
                owner: 1,
                cost: 3,
                name: "move".into(),
            }],
        });
        let encoded = msg.encode();
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn public_state_round_trips() {
        let msg = Message::PublicState(PublicStateMsg {
            agent_id: 1,
            state_buf: vec![1, 2, 3, 4],
            private_id: 42,
            cost: 10,
            heur: Some(5),
        });
        let encoded = msg.encode();
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn snapshot_mark_round_trips() {
        let msg = Message::Snapshot(SnapshotMsg {
            agent_id: 3,
            sub_type: SnapshotSubType::Mark,
            kind: SnapshotKind::DeadEndVerification,
            token: SnapshotToken::new(9, 2),
            init_agent: 0,
            ack: None,
        });
        let encoded = msg.encode();
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn snapshot_token_carries_full_64_bits_and_exposes_its_originator() {
        let token = SnapshotToken::new(0xABCD_EF01, 3);
        assert_eq!(token.originator(), 3);
        assert_ne!(SnapshotToken::new(0, 0), SnapshotToken::new(0, 1));
        assert_ne!(SnapshotToken::new(1, 0), SnapshotToken::new(2, 0));
    }

    #[test]
    fn truncated_buffer_is_reported() {
        let msg = Message::Heur(HeurMsg {
            agent_id: 0,
            sub_type: HeurSubType::Request,
            token: HeurToken(1),
            requested_agents: vec![1, 2],
            state_buf: vec![0; 8],
            cost: None,
        });
        let mut encoded = msg.encode();
        encoded.truncate(encoded.len() - 2);
        assert!(matches!(Message::decode(&encoded), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn unknown_type_is_reported() {
        let bytes = [0xffu8];
        assert!(matches!(Message::decode(&bytes), Err(DecodeError::UnknownType(0xff))));
    }
}
