//! The migration engine: the only component with two interchangeable
//! behaviors, selected once at construction and never mixed within a
//! process (a capability-set re-architecture in place of the more usual
//! base/subclass split).
//!
//! Selection, shuffling, and the cross-island send are identical for both
//! variants; they differ only in whether the sender deactivates its local
//! copy (and tells its island peers to do the same) and whether an
//! immigrant already present under its exact identity is a protocol error
//! or an expected duplicate.

use log::{debug, trace};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::comm::{Communicator, Tag};
use crate::error::{OptimizerError, ProtocolViolation};
use crate::individual::{Individual, IslandId, Rank};
use crate::population::{EmigratedLog, PopulationReplica};
use crate::selection::EmigrationPropagator;
use crate::topology::IslandTopology;

/// The capability set a migration variant must supply. Real migration and
/// pollination are the two values the protocol defines; an embedder could
/// add a third without touching the engine itself.
pub trait MigrationStrategy: Send {
    /// Real migration: the sender removes its copy and tells island peers
    /// to do the same. Pollination: the sender keeps its copy active and
    /// sends no deactivation notice.
    fn deactivates_locally(&self) -> bool;

    /// Real migration: an immigrant whose identity+migration_steps+current
    /// triple already exists is a catastrophic protocol violation.
    /// Pollination: duplicates across islands are the defining property and
    /// are never checked.
    fn checks_duplicate_immigrants(&self) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RealMigration;

impl MigrationStrategy for RealMigration {
    fn deactivates_locally(&self) -> bool {
        true
    }
    fn checks_duplicate_immigrants(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Pollination;

impl MigrationStrategy for Pollination {
    fn deactivates_locally(&self) -> bool {
        false
    }
    fn checks_duplicate_immigrants(&self) -> bool {
        false
    }
}

/// What happened when the generation loop offered a migration opportunity.
/// Purely observational; the orchestrator logs it and moves on.
#[derive(Debug, PartialEq)]
pub enum MigrationOutcome {
    /// The Bernoulli draw didn't fire, or the topology sends nothing from
    /// this island.
    NotAttempted,
    /// The under-population rule: fewer eligible emigrants than the
    /// topology demands, so the whole event was skipped rather than
    /// partially honored.
    Skipped { required: usize, available: usize },
    Sent { count: usize },
}

pub struct MigrationEngine {
    island_id: IslandId,
    topology: IslandTopology,
    propagator: Box<dyn EmigrationPropagator + Send>,
    strategy: Box<dyn MigrationStrategy>,
    migration_prob: f64,
}

impl MigrationEngine {
    pub fn new(
        island_id: IslandId,
        topology: IslandTopology,
        propagator: Box<dyn EmigrationPropagator + Send>,
        strategy: Box<dyn MigrationStrategy>,
        migration_prob: f64,
    ) -> Self {
        Self {
            island_id,
            topology,
            propagator,
            strategy,
            migration_prob,
        }
    }

    /// Runs a single migration opportunity for this worker: the Bernoulli
    /// draw, selection, shuffle, per-destination partition, and the sends
    /// and local bookkeeping for deactivation and duplicate checks.
    pub fn maybe_send_emigrants<R: Rng>(
        &self,
        rng: &mut R,
        local_rank: Rank,
        replica: &mut PopulationReplica,
        world: &dyn Communicator,
        island: &dyn Communicator,
    ) -> Result<MigrationOutcome, OptimizerError> {
        if !rng.random_bool(self.migration_prob) {
            return Ok(MigrationOutcome::NotAttempted);
        }

        let row = self.topology.row(self.island_id).to_vec();
        let total: usize = row.iter().map(|&n| n as usize).sum();
        if total == 0 {
            return Ok(MigrationOutcome::NotAttempted);
        }

        let eligible = replica.eligible_for_emigration(local_rank);
        if eligible.len() < total {
            trace!(
                "island {} worker {}: under-population, need {} eligible emigrants, have {}",
                self.island_id,
                local_rank,
                total,
                eligible.len()
            );
            return Ok(MigrationOutcome::Skipped {
                required: total,
                available: eligible.len(),
            });
        }

        let mut selected: Vec<Individual> = self
            .propagator
            .select(&eligible, total)
            .into_iter()
            .cloned()
            .collect();
        drop(eligible);
        selected.shuffle(rng);

        let mut offset = 0;
        for (dest_island, &count) in row.iter().enumerate() {
            let count = count as usize;
            if count == 0 {
                continue;
            }
            let batch = &selected[offset..offset + count];
            offset += count;

            if self.strategy.deactivates_locally() {
                let payload = bincode::serialize(batch)?;
                for peer in 0..island.size() {
                    if peer == island.rank() {
                        continue;
                    }
                    island.send(peer, Tag::Synchronization, payload.clone());
                }
            }

            let dest_size = self.topology.island_worker_count(dest_island);
            let mutated: Vec<Individual> = batch
                .iter()
                .map(|ind| {
                    let mut wire = ind.clone();
                    wire.current = rng.random_range(0..dest_size);
                    wire
                })
                .collect();
            let payload = bincode::serialize(&mutated)?;
            for dest_rank in self.topology.world_rank_range(dest_island) {
                world.send(dest_rank, Tag::Migration, payload.clone());
            }
        }

        if self.strategy.deactivates_locally() {
            for emigrant in &selected {
                let idx =
                    replica.find_identical_replica_entry(emigrant, self.island_id, local_rank)?;
                replica.deactivate(idx);
            }
        }

        debug!(
            "island {} worker {}: sent {} emigrants",
            self.island_id, local_rank, total
        );
        Ok(MigrationOutcome::Sent { count: total })
    }

    /// Non-blockingly drains MIGRATION on the world communicator.
    pub fn drain_immigrants(
        &self,
        world: &dyn Communicator,
        replica: &mut PopulationReplica,
        local_rank: Rank,
    ) -> Result<usize, OptimizerError> {
        let mut received = 0;
        while let Some(payload) = world.try_recv(Tag::Migration) {
            let batch: Vec<Individual> = bincode::deserialize(&payload)?;
            for mut ind in batch {
                ind.migration_steps += 1;
                if !ind.active {
                    return Err(ProtocolViolation::InactiveImmigrant {
                        island: self.island_id,
                        rank: local_rank,
                    }
                    .into());
                }
                if self.strategy.checks_duplicate_immigrants()
                    && replica.iter().any(|existing| existing.is_identical_replica_entry(&ind))
                {
                    return Err(ProtocolViolation::DuplicateImmigrant {
                        island: self.island_id,
                        rank: local_rank,
                        generation: ind.generation,
                        source_rank: ind.rank,
                    }
                    .into());
                }
                replica.push(ind);
                received += 1;
            }
        }
        Ok(received)
    }

    /// Non-blockingly drains SYNCHRONIZATION on the island
    /// communicator into the emigrated log, then tries to resolve every
    /// pending entry (old and new) against the replica.
    pub fn drain_deactivations(
        &self,
        island: &dyn Communicator,
        replica: &mut PopulationReplica,
        log: &mut EmigratedLog,
        local_rank: Rank,
    ) -> Result<(), OptimizerError> {
        while let Some(payload) = island.try_recv(Tag::Synchronization) {
            let batch: Vec<Individual> = bincode::deserialize(&payload)?;
            log.extend(batch);
        }
        log.resolve_against(replica, self.island_id, local_rank)
    }

    pub fn topology(&self) -> &IslandTopology {
        &self.topology
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ChannelCommunicator;
    use crate::individual::{Loss, Traits, TraitValue};
    use crate::selection::SelectMin;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ind(loss: f64, rank: Rank, island: IslandId) -> Individual {
        let mut traits = Traits::new();
        traits.insert("x".to_string(), TraitValue::Float(loss));
        let mut i = Individual::bred(traits, 0, rank, island);
        i.loss = Loss::Value(loss);
        i
    }

    fn topology_2x2() -> IslandTopology {
        IslandTopology::new(vec![vec![0, 1], vec![1, 0]], vec![0, 2], vec![2, 2]).unwrap()
    }

    #[test]
    fn under_population_skips_entire_event() {
        let engine = MigrationEngine::new(
            0,
            topology_2x2(),
            Box::new(SelectMin),
            Box::new(RealMigration),
            1.0,
        );
        let mut replica = PopulationReplica::new();
        replica.push(ind(1.0, 0, 0));

        let world = ChannelCommunicator::group(4);
        let island = ChannelCommunicator::group(2);
        let mut rng = StdRng::seed_from_u64(1);

        let outcome = engine
            .maybe_send_emigrants(&mut rng, 0, &mut replica, &world[0], &island[0])
            .unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Skipped {
                required: 1,
                available: 0
            }
        );
        assert!(replica.as_slice()[0].active);
    }

    #[test]
    fn real_migration_deactivates_sender_and_activates_receiver() {
        let engine = MigrationEngine::new(
            0,
            topology_2x2(),
            Box::new(SelectMin),
            Box::new(RealMigration),
            1.0,
        );
        let mut sender_replica = PopulationReplica::new();
        sender_replica.push(ind(1.0, 0, 0));

        let world = ChannelCommunicator::group(4);
        let island0 = ChannelCommunicator::group(2);
        let mut rng = StdRng::seed_from_u64(7);

        let outcome = engine
            .maybe_send_emigrants(&mut rng, 0, &mut sender_replica, &world[0], &island0[0])
            .unwrap();
        assert_eq!(outcome, MigrationOutcome::Sent { count: 1 });
        assert!(!sender_replica.as_slice()[0].active, "sender must deactivate locally");

        let mut dest_replica = PopulationReplica::new();
        let received = engine
            .drain_immigrants(&world[2], &mut dest_replica, 0)
            .unwrap();
        assert_eq!(received, 1);
        assert!(dest_replica.as_slice()[0].active);
        assert_eq!(dest_replica.as_slice()[0].migration_steps, 1);
    }

    #[test]
    fn pollination_keeps_sender_active_and_allows_duplicates() {
        let engine = MigrationEngine::new(
            0,
            topology_2x2(),
            Box::new(SelectMin),
            Box::new(Pollination),
            1.0,
        );
        let mut sender_replica = PopulationReplica::new();
        sender_replica.push(ind(1.0, 0, 0));

        let world = ChannelCommunicator::group(4);
        let island0 = ChannelCommunicator::group(2);
        let mut rng = StdRng::seed_from_u64(3);

        engine
            .maybe_send_emigrants(&mut rng, 0, &mut sender_replica, &world[0], &island0[0])
            .unwrap();
        assert!(sender_replica.as_slice()[0].active, "pollination never deactivates");
        assert!(island0[1].try_recv(Tag::Synchronization).is_none());

        // Still eligible (never deactivated), so a second migration event can
        // duplicate-send the very same candidate.
        engine
            .maybe_send_emigrants(&mut rng, 0, &mut sender_replica, &world[0], &island0[0])
            .unwrap();

        let mut dest_replica = PopulationReplica::new();
        engine.drain_immigrants(&world[2], &mut dest_replica, 0).unwrap();
        engine.drain_immigrants(&world[2], &mut dest_replica, 0).unwrap();
        assert_eq!(
            dest_replica.len(),
            2,
            "pollination permits duplicate immigrants, unlike real migration"
        );
    }

    #[test]
    fn out_of_order_deactivation_resolves_on_next_drain() {
        let engine = MigrationEngine::new(
            0,
            topology_2x2(),
            Box::new(SelectMin),
            Box::new(RealMigration),
            1.0,
        );
        let emigrant = ind(1.0, 1, 0);
        let mut replica = PopulationReplica::new();
        let mut log = EmigratedLog::new();
        let island = ChannelCommunicator::group(2);

        // SYNCHRONIZATION arrives before the individual itself does.
        island[1].send(0, Tag::Synchronization, bincode::serialize(&[emigrant.clone()]).unwrap());
        engine
            .drain_deactivations(&island[0], &mut replica, &mut log, 0)
            .unwrap();
        assert_eq!(log.len(), 1, "emigrated log is transiently non-empty");

        replica.push(emigrant);
        engine
            .drain_deactivations(&island[0], &mut replica, &mut log, 0)
            .unwrap();
        assert!(log.is_empty());
        assert!(!replica.as_slice()[0].active);
    }
}
