use crate::state::{PartialState, State};
use crate::vars::{VarId, Variables};

/// Packs/unpacks states to a fixed-width byte buffer split into a public
/// region (broadcastable) and a private region (meaningful only to the
/// owning agent), per spec §3/§4.A.
///
/// Each value is stored as a little-endian `u16`; a buffer is the
/// concatenation of the public region (one `u16` per public variable, in
/// `Variables` order) followed by the private region (same, for private
/// variables). This fixed layout is what makes two insertions of
/// byte-identical buffers collapse to the same state id (spec §8 property 1).
pub struct Packer {
    public_order: Vec<VarId>,
    private_order: Vec<VarId>,
}

const VALUE_BYTES: usize = 2;

impl Packer {
    pub fn new(vars: &Variables) -> Self {
        Packer {
            public_order: vars.public_ids().collect(),
            private_order: vars.private_ids().collect(),
        }
    }

    pub fn public_region_len(&self) -> usize {
        self.public_order.len() * VALUE_BYTES
    }

    pub fn private_region_len(&self) -> usize {
        self.private_order.len() * VALUE_BYTES
    }

    pub fn pack(&self, state: &State) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.public_region_len() + self.private_region_len());
        for &v in &self.public_order {
            buf.extend_from_slice(&state.get(v).to_le_bytes());
        }
        for &v in &self.private_order {
            buf.extend_from_slice(&state.get(v).to_le_bytes());
        }
        buf
    }

    pub fn pack_public(&self, state: &State) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.public_region_len());
        for &v in &self.public_order {
            buf.extend_from_slice(&state.get(v).to_le_bytes());
        }
        buf
    }

    /// Builds the private region for a state whose real private values are
    /// unknown to us (it was received from a peer): the region is filled
    /// with the local surrogate id standing in for the peer's private
    /// fingerprint (spec §4.H), zero-padded/truncated to the region's width.
    pub fn encode_surrogate_private_region(&self, surrogate: u32) -> Vec<u8> {
        let mut buf = vec![0u8; self.private_region_len()];
        let enc = surrogate.to_le_bytes();
        for (dst, src) in buf.iter_mut().zip(enc.iter().cycle()) {
            *dst = *src;
        }
        buf
    }

    pub fn unpack(&self, vars: &Variables, buf: &[u8]) -> State {
        let mut partial = PartialState::new();
        let mut offset = 0;
        for &v in &self.public_order {
            let val = u16::from_le_bytes([buf[offset], buf[offset + 1]]);
            partial.set(v, val);
            offset += VALUE_BYTES;
        }
        for &v in &self.private_order {
            let val = u16::from_le_bytes([buf[offset], buf[offset + 1]]);
            partial.set(v, val);
            offset += VALUE_BYTES;
        }
        let mut state = State::from_fn(vars, |_| 0);
        state.set_all(&partial);
        state
    }

    pub fn unpack_public(&self, buf: &[u8]) -> PartialState {
        let mut partial = PartialState::new();
        let mut offset = 0;
        for &v in &self.public_order {
            let val = u16::from_le_bytes([buf[offset], buf[offset + 1]]);
            partial.set(v, val);
            offset += VALUE_BYTES;
        }
        partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::Variable;

    #[test]
    fn pack_unpack_round_trips_on_public_slice() {
        let vars = Variables::new(vec![
            Variable::new("x", 4, false),
            Variable::new("secret", 4, true),
            Variable::new("y", 4, false),
        ]);
        let packer = Packer::new(&vars);
        let ids: Vec<VarId> = vars.ids().collect();
        let state = State::from_fn(&vars, |v| if v == ids[0] { 2 } else if v == ids[1] { 3 } else { 1 });

        let packed = packer.pack(&state);
        let unpacked = packer.unpack(&vars, &packed);
        assert_eq!(unpacked, state);

        let pub_only = packer.pack_public(&state);
        let partial = packer.unpack_public(&pub_only);
        assert_eq!(partial.get(ids[0]), Some(2));
        assert_eq!(partial.get(ids[2]), Some(1));
        assert_eq!(partial.get(ids[1]), None);
    }

    #[test]
    fn same_bytes_imply_same_state() {
        let vars = Variables::new(vec![Variable::new("x", 4, false)]);
        let packer = Packer::new(&vars);
        let s1 = State::from_fn(&vars, |_| 2);
        let s2 = State::from_fn(&vars, |_| 2);
        assert_eq!(packer.pack(&s1), packer.pack(&s2));
    }
}
