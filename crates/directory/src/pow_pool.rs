//! Concurrent collectors for PoW submissions.
//!
//! Three record maps describe the epoch's admitted submissions:
//! `all_pow_conns` (submitter endpoints), `all_pows` (latest solution per
//! submitter) and `ds_pows` (the subset at DS-tier difficulty). They live
//! under a single lock so the intake pipeline's record step is one
//! critical section and readers always observe the three maps in a
//! consistent state.
//!
//! The per-submitter counter sits under its own lock, acquired only
//! after the record lock has been released (record lock before counter
//! lock in the crate-wide hierarchy).

use kestrel_types::{Hash, Peer, PubKeyBytes};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct Records {
    /// Peer endpoints of all successful submitters this epoch.
    all_pow_conns: HashMap<PubKeyBytes, Peer>,
    /// Latest valid solution hash per submitter.
    all_pows: HashMap<PubKeyBytes, Hash>,
    /// Submitters whose solution meets the DS tier.
    ds_pows: HashMap<PubKeyBytes, Hash>,
}

/// The PoW submission pool.
pub struct PowPool {
    records: Mutex<Records>,
    submission_count: Mutex<HashMap<PubKeyBytes, u32>>,
    submission_limit: u32,
}

impl PowPool {
    /// Create an empty pool enforcing `submission_limit` per submitter.
    pub fn new(submission_limit: u32) -> Self {
        Self {
            records: Mutex::new(Records::default()),
            submission_count: Mutex::new(HashMap::new()),
            submission_limit,
        }
    }

    /// Whether `pubkey` has exhausted its per-epoch submission budget.
    pub fn exceeds_limit(&self, pubkey: &PubKeyBytes) -> bool {
        self.submission_count
            .lock()
            .get(pubkey)
            .is_some_and(|count| *count >= self.submission_limit)
    }

    /// Record an admitted submission and bump the submitter's counter.
    ///
    /// The three record maps are mutated in one critical section; the
    /// counter is updated afterwards under its own lock.
    pub fn record(&self, pubkey: PubKeyBytes, peer: Peer, solution: Hash, ds_tier: bool) {
        {
            let mut records = self.records.lock();
            records.all_pow_conns.insert(pubkey, peer);
            records.all_pows.insert(pubkey, solution);
            if ds_tier {
                records.ds_pows.insert(pubkey, solution);
            }
        }
        let mut counts = self.submission_count.lock();
        *counts.entry(pubkey).or_insert(0) += 1;
    }

    /// Reset all four maps. Record maps first, counter second, matching
    /// the lock hierarchy.
    pub fn clean(&self) {
        {
            let mut records = self.records.lock();
            records.all_pow_conns.clear();
            records.all_pows.clear();
            records.ds_pows.clear();
        }
        self.submission_count.lock().clear();
    }

    /// Number of distinct submitters this epoch.
    pub fn all_pow_count(&self) -> usize {
        self.records.lock().all_pows.len()
    }

    /// Number of DS-tier submitters this epoch.
    pub fn ds_pow_count(&self) -> usize {
        self.records.lock().ds_pows.len()
    }

    /// Recorded submissions from `pubkey` this epoch.
    pub fn submission_count(&self, pubkey: &PubKeyBytes) -> u32 {
        self.submission_count
            .lock()
            .get(pubkey)
            .copied()
            .unwrap_or(0)
    }

    /// Endpoint recorded for `pubkey`.
    pub fn conn_of(&self, pubkey: &PubKeyBytes) -> Option<Peer> {
        self.records.lock().all_pow_conns.get(pubkey).copied()
    }

    /// Latest solution recorded for `pubkey`.
    pub fn solution_of(&self, pubkey: &PubKeyBytes) -> Option<Hash> {
        self.records.lock().all_pows.get(pubkey).copied()
    }

    /// Whether `pubkey` has a DS-tier solution recorded.
    pub fn has_ds_solution(&self, pubkey: &PubKeyBytes) -> bool {
        self.records.lock().ds_pows.contains_key(pubkey)
    }

    /// DS-tier solutions with their endpoints, for winner selection.
    ///
    /// Submitters whose endpoint record is missing are skipped; the
    /// record step writes both maps together, so that cannot happen for
    /// entries created through [`PowPool::record`].
    pub fn ds_pow_solutions(&self) -> Vec<(PubKeyBytes, Peer, Hash)> {
        let records = self.records.lock();
        records
            .ds_pows
            .iter()
            .filter_map(|(pubkey, solution)| {
                records
                    .all_pow_conns
                    .get(pubkey)
                    .map(|peer| (*pubkey, *peer, *solution))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn key(tag: u8) -> PubKeyBytes {
        let mut bytes = [0u8; 33];
        bytes[0] = 0x03;
        bytes[1] = tag;
        PubKeyBytes::from_bytes(bytes)
    }

    fn peer() -> Peer {
        Peer::new(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)), 40404)
    }

    #[test]
    fn test_record_and_overwrite() {
        let pool = PowPool::new(3);
        let first = Hash::compute(b"first");
        let second = Hash::compute(b"second");

        pool.record(key(1), peer(), first, false);
        pool.record(key(1), peer(), second, false);

        assert_eq!(pool.all_pow_count(), 1);
        assert_eq!(pool.solution_of(&key(1)), Some(second));
        assert_eq!(pool.submission_count(&key(1)), 2);
        assert_eq!(pool.ds_pow_count(), 0);
    }

    #[test]
    fn test_ds_tier_subset() {
        let pool = PowPool::new(3);
        pool.record(key(1), peer(), Hash::compute(b"shard"), false);
        pool.record(key(2), peer(), Hash::compute(b"ds"), true);

        assert_eq!(pool.all_pow_count(), 2);
        assert_eq!(pool.ds_pow_count(), 1);
        assert!(pool.has_ds_solution(&key(2)));
        assert!(!pool.has_ds_solution(&key(1)));

        let solutions = pool.ds_pow_solutions();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].0, key(2));
    }

    #[test]
    fn test_limit_enforcement() {
        let pool = PowPool::new(2);
        assert!(!pool.exceeds_limit(&key(1)));

        pool.record(key(1), peer(), Hash::compute(b"a"), false);
        assert!(!pool.exceeds_limit(&key(1)));

        pool.record(key(1), peer(), Hash::compute(b"b"), false);
        assert!(pool.exceeds_limit(&key(1)));
        assert_eq!(pool.submission_count(&key(1)), 2);
    }

    #[test]
    fn test_clean_resets_everything() {
        let pool = PowPool::new(2);
        pool.record(key(1), peer(), Hash::compute(b"a"), true);
        pool.record(key(2), peer(), Hash::compute(b"b"), false);

        pool.clean();

        assert_eq!(pool.all_pow_count(), 0);
        assert_eq!(pool.ds_pow_count(), 0);
        assert_eq!(pool.submission_count(&key(1)), 0);
        assert_eq!(pool.conn_of(&key(2)), None);
        assert!(!pool.exceeds_limit(&key(1)));
    }
}
