//! The island orchestrator: the top-level generation loop wiring
//! together breeding, intra-island sync, migration, and the checkpoint
//! ring, followed by the multi-phase termination drain.

use std::path::PathBuf;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::checkpoint::CheckpointRing;
use crate::comm::Communicator;
use crate::error::{OptimizerError, ProtocolViolation};
use crate::genetics::BreedingOperator;
use crate::individual::{IslandId, Rank};
use crate::loss::LossFunction;
use crate::migration::MigrationEngine;
use crate::population::{EmigratedLog, PopulationReplica};
use crate::sync;
use crate::surrogate::Surrogate;

use crate::breeding::BreedingDriver;

/// One worker process's full state: its replica, its two communicators,
/// and the components that act on them each generation.
pub struct Worker<G, L, S>
where
    G: BreedingOperator,
    L: LossFunction,
    S: Surrogate,
{
    world_rank: Rank,
    local_rank: Rank,
    island_id: IslandId,
    generations: i64,
    world_comm: Box<dyn Communicator>,
    island_comm: Box<dyn Communicator>,
    replica: PopulationReplica,
    emigrated_log: EmigratedLog,
    migration: Option<MigrationEngine>,
    checkpoint: CheckpointRing,
    breeding: BreedingDriver<G, L, S>,
    rng: StdRng,
    generation: u64,
}

impl<G, L, S> Worker<G, L, S>
where
    G: BreedingOperator,
    L: LossFunction,
    S: Surrogate,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        world_rank: Rank,
        local_rank: Rank,
        island_id: IslandId,
        generations: i64,
        world_comm: Box<dyn Communicator>,
        island_comm: Box<dyn Communicator>,
        migration: Option<MigrationEngine>,
        checkpoint_path: PathBuf,
        genetics: G,
        loss_fn: L,
        surrogate: S,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(world_rank as u64)),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        Worker {
            world_rank,
            local_rank,
            island_id,
            generations,
            world_comm,
            checkpoint: CheckpointRing::new(checkpoint_path, island_id, local_rank),
            island_comm,
            replica: PopulationReplica::new(),
            emigrated_log: EmigratedLog::new(),
            migration,
            breeding: BreedingDriver::new(genetics, loss_fn, surrogate, local_rank, island_id),
            rng,
            generation: 0,
        }
    }

    pub fn replica(&self) -> &PopulationReplica {
        &self.replica
    }

    pub fn emigrated_log_len(&self) -> usize {
        self.emigrated_log.len()
    }

    pub fn world_rank(&self) -> Rank {
        self.world_rank
    }

    pub fn local_rank(&self) -> Rank {
        self.local_rank
    }

    /// Runs the generation loop to completion (or forever, if `generations`
    /// was negative) and then the termination drain. `generations < 0`
    /// running forever is only ever stopped by an external signal, which is
    /// out of scope for this crate.
    pub fn run(&mut self) -> Result<(), OptimizerError> {
        self.world_comm.barrier();

        while self.generations < 0 || (self.generation as i64) < self.generations {
            self.run_one_generation()?;
            self.generation += 1;
        }

        self.termination_drain()
    }

    fn run_one_generation(&mut self) -> Result<(), OptimizerError> {
        let bred = self
            .breeding
            .evaluate_one(&mut self.rng, self.generation, &mut self.replica)?;
        sync::broadcast(&*self.island_comm, &bred)?;
        sync::drain_inbox(&*self.island_comm, &mut self.replica)?;

        if let Some(engine) = &self.migration {
            let outcome = engine.maybe_send_emigrants(
                &mut self.rng,
                self.local_rank,
                &mut self.replica,
                &*self.world_comm,
                &*self.island_comm,
            )?;
            debug!(
                "island {} worker {} gen {}: migration outcome {:?}",
                self.island_id, self.local_rank, self.generation, outcome
            );
            engine.drain_immigrants(&*self.world_comm, &mut self.replica, self.local_rank)?;
            engine.drain_deactivations(
                &*self.island_comm,
                &mut self.replica,
                &mut self.emigrated_log,
                self.local_rank,
            )?;
        }

        if self.checkpoint.holds_token() {
            self.checkpoint
                .write_and_forward(&*self.island_comm, &self.replica)?;
        }
        self.checkpoint.probe_for_token(&*self.island_comm);

        Ok(())
    }

    /// A fixed sequence of barriers and drains, each completing on
    /// every worker before the next begins, so that both two-channel
    /// migration protocols have fully quiesced before anyone exits.
    fn termination_drain(&mut self) -> Result<(), OptimizerError> {
        self.world_comm.barrier();

        sync::drain_inbox(&*self.island_comm, &mut self.replica)?;
        self.world_comm.barrier();

        if let Some(engine) = &self.migration {
            engine.drain_immigrants(&*self.world_comm, &mut self.replica, self.local_rank)?;
            self.world_comm.barrier();
            engine.drain_deactivations(
                &*self.island_comm,
                &mut self.replica,
                &mut self.emigrated_log,
                self.local_rank,
            )?;

            if !self.emigrated_log.is_empty() {
                engine.drain_deactivations(
                    &*self.island_comm,
                    &mut self.replica,
                    &mut self.emigrated_log,
                    self.local_rank,
                )?;
            }
            if !self.emigrated_log.is_empty() {
                return Err(ProtocolViolation::EmigratedLogNonEmpty {
                    island: self.island_id,
                    rank: self.local_rank,
                    remaining: self.emigrated_log.len(),
                }
                .into());
            }
        }

        self.world_comm.barrier();
        if self.checkpoint.holds_token() {
            self.checkpoint
                .write_and_forward(&*self.island_comm, &self.replica)?;
        }
        self.world_comm.barrier();

        // Drain any DUMP token still in flight so it doesn't linger after exit.
        self.checkpoint.probe_for_token(&*self.island_comm);
        self.world_comm.barrier();

        info!(
            "island {} worker {}: termination drain complete, replica has {} entries",
            self.island_id,
            self.local_rank,
            self.replica.len()
        );
        Ok(())
    }
}
