//! The PoW intake pipeline.
//!
//! Every inbound PoW submission runs a fixed verification sequence:
//! state gate, size check, freshness check, whitelist (testnet), source
//! IP check, rate limit, signature verification, difficulty admission,
//! PoW verification, a late-state recheck, and finally the pool record.
//! Any failure short-circuits; the handler logs at the rejection site
//! and reports `false` to the dispatcher.
//!
//! One deliberate asymmetry: a submission whose PoW verifies but whose
//! grace window has closed by the time it would be recorded is dropped
//! silently and the handler still reports success. Honest miners that
//! were merely late are not treated as faulty.

use crate::error::PowRejection;
use crate::service::DirectoryService;
use crate::state::{Action, DirState};
use crate::wire::PowSubmission;
use kestrel_crypto::{SchnorrPublicKey, SchnorrSignature};
use kestrel_metrics::directory::{POW_REJECTIONS_TOTAL, POW_SUBMISSIONS_TOTAL};
use kestrel_types::{Peer, PubKeyBytes};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What became of an admissible submission.
enum Admission {
    /// Recorded in the pool.
    Recorded { pubkey: PubKeyBytes, ds_tier: bool },
    /// Verified but the window closed mid-pipeline; dropped benignly.
    TooLate,
}

impl DirectoryService {
    /// Handler for PoW submissions (opcode 1).
    pub async fn process_pow_submission(&self, message: &[u8], offset: usize, from: &Peer) -> bool {
        if self.cfg.lookup_node_mode {
            warn!("ProcessPoWSubmission not expected on a lookup node");
            return true;
        }

        // Submissions racing the end of final-block consensus get one
        // bounded chance to land in the next window.
        if self.state.current() == DirState::FinalBlockConsensus {
            let bound = Duration::from_secs(self.cfg.pow_submission_timeout);
            if !self.state.wait_for(DirState::PowSubmission, bound).await {
                warn!("timed out waiting for the PoW submission window");
            } else {
                debug!("state transition complete; processing submission");
            }
        }

        if !self.check_action(Action::ProcessPowSubmission) {
            info!(state = %self.state.current(), "not at POW_SUBMISSION");
            POW_REJECTIONS_TOTAL.with_label_values(&["wrong_state"]).inc();
            POW_SUBMISSIONS_TOTAL.with_label_values(&["rejected"]).inc();
            return false;
        }

        match self.admit_pow_submission(message, offset, from) {
            Ok(Admission::Recorded { pubkey, ds_tier }) => {
                info!(%pubkey, ds_tier, "PoW verification passed");
                POW_SUBMISSIONS_TOTAL.with_label_values(&["accepted"]).inc();
                true
            }
            Ok(Admission::TooLate) => {
                POW_SUBMISSIONS_TOTAL.with_label_values(&["late"]).inc();
                true
            }
            Err(rejection) => {
                warn!(%rejection, %from, "rejected PoW submission");
                POW_REJECTIONS_TOTAL
                    .with_label_values(&[rejection.reason()])
                    .inc();
                POW_SUBMISSIONS_TOTAL.with_label_values(&["rejected"]).inc();
                false
            }
        }
    }

    /// Steps 2-10 of the pipeline. Runs entirely on the calling task; no
    /// lock is held across the expensive signature and PoW checks.
    fn admit_pow_submission(
        &self,
        message: &[u8],
        offset: usize,
        from: &Peer,
    ) -> Result<Admission, PowRejection> {
        let submission = PowSubmission::decode(message, offset)?;

        let head = self.chain.snapshot();
        let expected_block = head.last_ds_block_num + 1;
        if submission.block_num < expected_block {
            return Err(PowRejection::StaleBlockNumber {
                got: submission.block_num,
                expected: expected_block,
            });
        }
        if submission.block_num > expected_block {
            return Err(PowRejection::FutureBlockNumber {
                got: submission.block_num,
                expected: expected_block,
            });
        }

        let peer = Peer::new(from.ip, submission.port as u16);

        if self.cfg.test_net_mode && !self.whitelist.contains(&peer, &submission.pubkey) {
            return Err(PowRejection::NotWhitelisted);
        }

        if self.cfg.exclude_priv_ip && !peer.has_routable_ip() {
            return Err(PowRejection::UnroutableSourceIp);
        }

        if self.pow_pool.exceeds_limit(&submission.pubkey) {
            return Err(PowRejection::RateLimited);
        }

        let pubkey = SchnorrPublicKey::from_pubkey_bytes(&submission.pubkey)
            .map_err(|_| PowRejection::InvalidSignature)?;
        let signature = SchnorrSignature::from_bytes(&submission.signature)
            .map_err(|_| PowRejection::InvalidSignature)?;
        let signed_payload = &message[..offset + PowSubmission::UNSIGNED_LEN];
        if !pubkey.verify(signed_payload, &signature) {
            return Err(PowRejection::InvalidSignature);
        }

        if submission.difficulty != head.shard_difficulty
            && submission.difficulty != head.ds_difficulty
        {
            return Err(PowRejection::InvalidDifficulty {
                got: submission.difficulty,
                expected_shard: head.shard_difficulty,
                expected_ds: head.ds_difficulty,
            });
        }

        let started = Instant::now();
        let pow_ok = self.pow_verifier.verify(
            submission.block_num,
            submission.difficulty,
            &head.ds_block_rand,
            &head.tx_block_rand,
            &from.ip,
            &submission.pubkey,
            submission.nonce,
            &submission.result_hash,
            &submission.mix_hash,
        );
        debug!(
            elapsed_us = started.elapsed().as_micros() as u64,
            "PoW verification finished"
        );
        if !pow_ok {
            return Err(PowRejection::InvalidPow);
        }

        // The state may have advanced while we were verifying. Too late
        // to influence this epoch: drop without recording.
        if !self.check_action(Action::VerifyPow) {
            info!(
                state = %self.state.current(),
                "too late; verified PoW dropped without record"
            );
            return Ok(Admission::TooLate);
        }

        let ds_tier = submission.difficulty == head.ds_difficulty;
        self.pow_pool
            .record(submission.pubkey, peer, submission.result_hash, ds_tier);

        Ok(Admission::Recorded {
            pubkey: submission.pubkey,
            ds_tier,
        })
    }
}
