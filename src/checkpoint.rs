//! The checkpoint ring: exactly one worker per island holds the DUMP
//! token at a time. The holder serializes the full replica (active and
//! inactive alike) to disk, then forwards the token to the next worker by
//! intra-island rank, wrapping at the end of the island.

use std::path::{Path, PathBuf};

use log::warn;

use crate::comm::{Communicator, Tag};
use crate::error::OptimizerError;
use crate::individual::Individual;
use crate::population::PopulationReplica;

const CHECKPOINT_EXT: &str = "ckpt";

pub fn checkpoint_file_path(checkpoint_path: &Path, island: usize) -> PathBuf {
    checkpoint_path.join(format!("island_{island}_ckpt.{CHECKPOINT_EXT}"))
}

/// Tracks whether this worker currently holds the DUMP token. Worker 0 of
/// every island starts out holding it.
pub struct CheckpointRing {
    holds_token: bool,
    checkpoint_path: PathBuf,
    island: usize,
}

impl CheckpointRing {
    pub fn new(checkpoint_path: PathBuf, island: usize, local_rank: usize) -> Self {
        Self {
            holds_token: local_rank == 0,
            checkpoint_path,
            island,
        }
    }

    pub fn holds_token(&self) -> bool {
        self.holds_token
    }

    /// Renames any existing checkpoint to a `.bkp` sibling (best-effort;
    /// filesystem errors here are logged and never abort the worker, per
    /// transient-I/O-error handling), writes the new one, then
    /// forwards the token to the next local rank on the island
    /// communicator.
    pub fn write_and_forward(
        &mut self,
        island_comm: &dyn Communicator,
        replica: &PopulationReplica,
    ) -> Result<(), OptimizerError> {
        debug_assert!(self.holds_token);

        let path = checkpoint_file_path(&self.checkpoint_path, self.island);
        if path.exists() {
            let backup = path.with_extension("bkp");
            if let Err(e) = std::fs::rename(&path, &backup) {
                warn!("checkpoint rename to {backup:?} failed, skipping: {e}");
            }
        }

        write_checkpoint(&path, replica)?;

        let next = (island_comm.rank() + 1) % island_comm.size();
        island_comm.send(next, Tag::Dump, Vec::new());
        self.holds_token = false;
        Ok(())
    }

    /// Non-blockingly probes DUMP; receipt sets the local holder flag.
    pub fn probe_for_token(&mut self, island_comm: &dyn Communicator) {
        if island_comm.try_recv(Tag::Dump).is_some() {
            self.holds_token = true;
        }
    }
}

/// Deterministic serialization of a full replica, independent of the
/// ring's token-passing logic so both the periodic and final writes (and
/// tests) can call it directly.
pub fn write_checkpoint(path: &Path, replica: &PopulationReplica) -> Result<(), OptimizerError> {
    let bytes = bincode::serialize(replica.as_slice())?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn read_checkpoint(path: &Path) -> Result<Vec<Individual>, OptimizerError> {
    let bytes = std::fs::read(path)?;
    Ok(bincode::deserialize(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ChannelCommunicator;
    use crate::individual::{Traits, TraitValue};

    fn sample_replica() -> PopulationReplica {
        let mut replica = PopulationReplica::new();
        let mut traits = Traits::new();
        traits.insert("x".to_string(), TraitValue::Float(2.0));
        let mut a = Individual::bred(traits.clone(), 0, 0, 0);
        a.loss = crate::individual::Loss::Value(0.5);
        let mut b = Individual::bred(traits, 1, 0, 0);
        b.active = false;
        replica.push(a);
        replica.push(b);
        replica
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let dir = tempdir();
        let path = checkpoint_file_path(&dir, 0);
        let replica = sample_replica();

        write_checkpoint(&path, &replica).unwrap();
        let restored = read_checkpoint(&path).unwrap();

        assert_eq!(restored, replica.as_slice().to_vec());
    }

    #[test]
    fn existing_checkpoint_is_renamed_to_bkp_before_rewrite() {
        let dir = tempdir();
        let group = ChannelCommunicator::group(2);
        let mut ring = CheckpointRing::new(dir.clone(), 0, 0);
        assert!(ring.holds_token());

        ring.write_and_forward(&group[0], &sample_replica()).unwrap();
        assert!(!ring.holds_token());

        let path = checkpoint_file_path(&dir, 0);
        assert!(path.exists());

        let mut second = sample_replica();
        second.push(Individual::bred(Traits::new(), 2, 0, 0));
        let mut ring2 = CheckpointRing::new(dir.clone(), 0, 0);
        ring2.write_and_forward(&group[0], &second).unwrap();

        assert!(path.with_extension("bkp").exists());
    }

    #[test]
    fn token_forwards_to_next_local_rank_and_wraps() {
        let group = ChannelCommunicator::group(3);
        let dir = tempdir();
        let mut rings: Vec<_> = (0..3)
            .map(|r| CheckpointRing::new(dir.clone(), 0, r))
            .collect();

        assert!(rings[0].holds_token());
        rings[0].write_and_forward(&group[0], &sample_replica()).unwrap();

        rings[1].probe_for_token(&group[1]);
        assert!(rings[1].holds_token());

        rings[1].write_and_forward(&group[1], &sample_replica()).unwrap();
        rings[2].probe_for_token(&group[2]);
        assert!(rings[2].holds_token());

        rings[2].write_and_forward(&group[2], &sample_replica()).unwrap();
        rings[0].probe_for_token(&group[0]);
        assert!(rings[0].holds_token(), "token should wrap back to rank 0");
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "archipelago-ckpt-test-{}-{}",
            std::process::id(),
            NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    static NEXT_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
}
