//! The DS committee registry.
//!
//! The roster is kept strictly sorted by ascending public key; a member's
//! consensus index is its position in that order, so every honest node
//! derives the same indices from the same membership. The leader is
//! addressed by index and rotates on view changes.
//!
//! Epoch rotation inserts the PoW winners and evicts the longest-serving
//! members to hold the roster at its configured size. Seniority is
//! tracked per member (`joined_epoch`) because sorted order says nothing
//! about age.

use kestrel_types::{Peer, PubKeyBytes};
use parking_lot::RwLock;

/// One committee member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitteeMember {
    /// Member public key.
    pub pubkey: PubKeyBytes,
    /// Member network endpoint.
    pub peer: Peer,
    /// Epoch at which the member joined the committee.
    pub joined_epoch: u64,
}

struct Roster {
    /// Members sorted by ascending public key.
    members: Vec<CommitteeMember>,
    /// Consensus index of the current leader.
    leader_id: usize,
}

/// Sorted registry of DS committee members.
pub struct Committee {
    roster: RwLock<Roster>,
    size_limit: usize,
}

impl Committee {
    /// Create an empty registry holding at most `size_limit` members.
    pub fn new(size_limit: usize) -> Self {
        Self {
            roster: RwLock::new(Roster {
                members: Vec::new(),
                leader_id: 0,
            }),
            size_limit,
        }
    }

    /// Install the bootstrap membership, replacing any existing roster.
    ///
    /// Entries are sorted and deduplicated by public key; the leader is
    /// reset to index 0 (the smallest public key).
    pub fn bootstrap(&self, entries: Vec<(PubKeyBytes, Peer)>, epoch: u64) {
        let mut members: Vec<CommitteeMember> = entries
            .into_iter()
            .map(|(pubkey, peer)| CommitteeMember {
                pubkey,
                peer,
                joined_epoch: epoch,
            })
            .collect();
        members.sort_by(|a, b| a.pubkey.cmp(&b.pubkey));
        members.dedup_by(|a, b| a.pubkey == b.pubkey);

        let mut roster = self.roster.write();
        roster.members = members;
        roster.leader_id = 0;
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.roster.read().members.len()
    }

    /// Whether the registry is empty (pre-bootstrap).
    pub fn is_empty(&self) -> bool {
        self.roster.read().members.is_empty()
    }

    /// Snapshot of the membership in consensus order.
    pub fn members(&self) -> Vec<CommitteeMember> {
        self.roster.read().members.clone()
    }

    /// Consensus index of `pubkey`, if it is a member.
    pub fn consensus_index(&self, pubkey: &PubKeyBytes) -> Option<usize> {
        self.roster
            .read()
            .members
            .binary_search_by(|m| m.pubkey.cmp(pubkey))
            .ok()
    }

    /// Whether `pubkey` is a member.
    pub fn contains(&self, pubkey: &PubKeyBytes) -> bool {
        self.consensus_index(pubkey).is_some()
    }

    /// Endpoint of the member with `pubkey`.
    pub fn peer_of(&self, pubkey: &PubKeyBytes) -> Option<Peer> {
        let roster = self.roster.read();
        roster
            .members
            .binary_search_by(|m| m.pubkey.cmp(pubkey))
            .ok()
            .map(|idx| roster.members[idx].peer)
    }

    /// Consensus index of the current leader.
    pub fn leader_id(&self) -> usize {
        self.roster.read().leader_id
    }

    /// Public key of the current leader.
    pub fn leader_pubkey(&self) -> Option<PubKeyBytes> {
        let roster = self.roster.read();
        roster.members.get(roster.leader_id).map(|m| m.pubkey)
    }

    /// Set the leader index (reduced modulo the roster size).
    pub fn set_leader(&self, id: usize) {
        let mut roster = self.roster.write();
        if !roster.members.is_empty() {
            roster.leader_id = id % roster.members.len();
        }
    }

    /// Advance the leader to `(leader_id + 1) mod N`, returning the new
    /// index.
    pub fn rotate_leader(&self) -> usize {
        let mut roster = self.roster.write();
        if !roster.members.is_empty() {
            roster.leader_id = (roster.leader_id + 1) % roster.members.len();
        }
        roster.leader_id
    }

    /// Apply a DS-block commit: insert `winners`, evict the
    /// longest-serving members down to the size limit, reset the leader
    /// to index 0. Returns the evicted members.
    pub fn rotate(&self, winners: &[(PubKeyBytes, Peer)], epoch: u64) -> Vec<CommitteeMember> {
        let mut roster = self.roster.write();
        for (pubkey, peer) in winners {
            if !roster.members.iter().any(|m| m.pubkey == *pubkey) {
                roster.members.push(CommitteeMember {
                    pubkey: *pubkey,
                    peer: *peer,
                    joined_epoch: epoch,
                });
            }
        }
        roster.members.sort_by(|a, b| a.pubkey.cmp(&b.pubkey));

        let mut evicted = Vec::new();
        while roster.members.len() > self.size_limit {
            let oldest = roster
                .members
                .iter()
                .enumerate()
                .min_by_key(|(_, m)| (m.joined_epoch, m.pubkey))
                .map(|(idx, _)| idx);
            match oldest {
                Some(idx) => evicted.push(roster.members.remove(idx)),
                None => break,
            }
        }

        roster.leader_id = 0;
        evicted
    }
}
