use std::collections::HashMap;

use maplan_message::AgentId;

/// Translates a peer's private-state fingerprint into a small local id this
/// agent can stash in a `Node`/message without ever learning the peer's
/// actual private variable values (spec §4.H). A peer's private region is
/// opaque to everyone else, so the only thing worth deduplicating locally
/// is "have I seen this exact (peer, fingerprint) pair before" - the
/// fingerprint itself is whatever opaque bytes the peer chose to send
/// (typically the packed private region, or a hash of it for bigger
/// problems).
#[derive(Default)]
pub struct MaStateRegistry {
    by_peer: HashMap<AgentId, HashMap<Vec<u8>, u32>>,
    next_id: HashMap<AgentId, u32>,
}

impl MaStateRegistry {
    pub fn new() -> Self {
        MaStateRegistry::default()
    }

    /// Returns the local surrogate id for `fingerprint` as reported by
    /// `peer`, allocating a fresh one on first sight.
    pub fn intern(&mut self, peer: AgentId, fingerprint: &[u8]) -> u32 {
        if let Some(id) = self.by_peer.get(&peer).and_then(|m| m.get(fingerprint)) {
            return *id;
        }
        let id = *self.next_id.entry(peer).or_insert(0);
        self.next_id.insert(peer, id + 1);
        self.by_peer
            .entry(peer)
            .or_default()
            .insert(fingerprint.to_vec(), id);
        id
    }

    /// Looks up an already-interned surrogate id without allocating one.
    pub fn get(&self, peer: AgentId, fingerprint: &[u8]) -> Option<u32> {
        self.by_peer.get(&peer).and_then(|m| m.get(fingerprint)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_fingerprint_from_same_peer_reuses_id() {
        let mut reg = MaStateRegistry::new();
        let a = reg.intern(1, b"abc");
        let b = reg.intern(1, b"abc");
        assert_eq!(a, b);
    }

    #[test]
    fn same_fingerprint_from_different_peers_gets_distinct_ids() {
        let mut reg = MaStateRegistry::new();
        let a = reg.intern(1, b"abc");
        let b = reg.intern(2, b"abc");
        assert_eq!(a, 0);
        assert_eq!(b, 0);
        assert_ne!(reg.get(1, b"abc"), reg.get(2, b"xyz"));
    }

    #[test]
    fn distinct_fingerprints_from_same_peer_get_distinct_ids() {
        let mut reg = MaStateRegistry::new();
        let a = reg.intern(1, b"abc");
        let b = reg.intern(1, b"def");
        assert_ne!(a, b);
    }
}
