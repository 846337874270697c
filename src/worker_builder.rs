use std::path::PathBuf;

use crate::comm::Communicator;
use crate::error::{BuildError, OptimizerError};
use crate::genetics::BreedingOperator;
use crate::individual::Rank;
use crate::loss::LossFunction;
use crate::migration::{MigrationEngine, MigrationStrategy, Pollination, RealMigration};
use crate::selection::{EmigrationPropagator, SelectMin};
use crate::surrogate::{NullSurrogate, Surrogate};
use crate::topology::IslandTopology;
use crate::worker::Worker;

/// Which of the two migration capability sets this worker
/// should run. A single process only ever uses one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationVariant {
    Real,
    Pollination,
}

impl MigrationVariant {
    fn into_strategy(self) -> Box<dyn MigrationStrategy> {
        match self {
            MigrationVariant::Real => Box::new(RealMigration),
            MigrationVariant::Pollination => Box::new(Pollination),
        }
    }
}

/// Builds a [`Worker`]. Every field mirrors a configuration option from
/// the builder pattern; `build()` is where the cross-field validation (the
/// "build error" kind) happens, before any communicator traffic is generated.
pub struct WorkerBuilder<G, L, S = NullSurrogate>
where
    G: BreedingOperator,
    L: LossFunction,
    S: Surrogate,
{
    /// Number of generations to run; negative means run forever.
    ///
    /// Default: 1
    pub generations: i64,

    /// Probability, independent per worker per generation, of attempting a
    /// migration event. 0 disables migration entirely.
    ///
    /// Default: 0.0
    pub migration_prob: f64,

    /// Required iff `migration_prob > 0`.
    pub migration_topology: Option<IslandTopology>,

    /// Default: [`MigrationVariant::Real`]
    pub migration_variant: MigrationVariant,

    /// Default: [`SelectMin`] (select lowest-loss).
    pub emigration_propagator: Box<dyn EmigrationPropagator + Send>,

    /// Directory checkpoints are written to. Required.
    pub checkpoint_path: Option<PathBuf>,

    /// Seed combined with the world rank to build this worker's RNG.
    /// `None` seeds from OS entropy.
    pub seed: Option<u64>,

    pub genetics: Option<G>,
    pub loss_fn: Option<L>,
    pub surrogate: S,

    world_rank: Rank,
    world_comm: Option<Box<dyn Communicator>>,
    island_comm: Option<Box<dyn Communicator>>,
}

impl<G, L, S> WorkerBuilder<G, L, S>
where
    G: BreedingOperator,
    L: LossFunction,
    S: Surrogate + Default,
{
    pub fn new(world_rank: Rank) -> Self {
        Self {
            generations: 1,
            migration_prob: 0.0,
            migration_topology: None,
            migration_variant: MigrationVariant::Real,
            emigration_propagator: Box::new(SelectMin),
            checkpoint_path: None,
            seed: None,
            genetics: None,
            loss_fn: None,
            surrogate: S::default(),
            world_rank,
            world_comm: None,
            island_comm: None,
        }
    }
}

impl<G, L, S> WorkerBuilder<G, L, S>
where
    G: BreedingOperator,
    L: LossFunction,
    S: Surrogate,
{
    pub fn with_generations(mut self, generations: i64) -> Self {
        self.generations = generations;
        self
    }

    pub fn with_migration(mut self, prob: f64, topology: IslandTopology) -> Self {
        self.migration_prob = prob;
        self.migration_topology = Some(topology);
        self
    }

    pub fn with_migration_variant(mut self, variant: MigrationVariant) -> Self {
        self.migration_variant = variant;
        self
    }

    pub fn with_emigration_propagator(
        mut self,
        propagator: Box<dyn EmigrationPropagator + Send>,
    ) -> Self {
        self.emigration_propagator = propagator;
        self
    }

    pub fn with_checkpoint_path(mut self, path: PathBuf) -> Self {
        self.checkpoint_path = Some(path);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_genetics(mut self, genetics: G) -> Self {
        self.genetics = Some(genetics);
        self
    }

    pub fn with_loss_fn(mut self, loss_fn: L) -> Self {
        self.loss_fn = Some(loss_fn);
        self
    }

    pub fn with_surrogate(mut self, surrogate: S) -> Self {
        self.surrogate = surrogate;
        self
    }

    /// The world communicator (all workers, every island); carries
    /// MIGRATION only.
    pub fn with_world_communicator(mut self, comm: Box<dyn Communicator>) -> Self {
        self.world_comm = Some(comm);
        self
    }

    /// This worker's island sub-communicator; carries INDIVIDUAL,
    /// SYNCHRONIZATION and DUMP.
    pub fn with_island_communicator(mut self, comm: Box<dyn Communicator>) -> Self {
        self.island_comm = Some(comm);
        self
    }

    pub fn build(self) -> Result<Worker<G, L, S>, OptimizerError> {
        if self.migration_prob > 0.0 && self.migration_topology.is_none() {
            return Err(BuildError::MigrationEnabledWithoutTopology.into());
        }
        let genetics = self.genetics.ok_or(BuildError::MissingBreedingOperator)?;
        let loss_fn = self.loss_fn.ok_or(BuildError::MissingLossFunction)?;
        let checkpoint_path = self.checkpoint_path.ok_or(BuildError::MissingCheckpointPath)?;
        let world_comm = self
            .world_comm
            .expect("with_world_communicator must be called before build()");
        let island_comm = self
            .island_comm
            .expect("with_island_communicator must be called before build()");

        let island_id = match &self.migration_topology {
            Some(topology) => topology
                .island_of(self.world_rank)
                .expect("world_rank must fall within island_displs/island_counts"),
            None => 0,
        };
        let local_rank = island_comm.rank();

        let migration = self.migration_topology.map(|topology| {
            MigrationEngine::new(
                island_id,
                topology,
                self.emigration_propagator,
                self.migration_variant.into_strategy(),
                self.migration_prob,
            )
        });

        Ok(Worker::new(
            self.world_rank,
            local_rank,
            island_id,
            self.generations,
            world_comm,
            island_comm,
            migration,
            checkpoint_path,
            genetics,
            loss_fn,
            self.surrogate,
            self.seed,
        ))
    }
}
