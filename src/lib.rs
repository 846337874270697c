//! A distributed, message-driven island-model evolutionary optimizer.
//!
//! This crate implements the population-consistency and migration
//! protocol: the asynchronous loop each worker runs to breed and evaluate
//! candidates, replicate them across its island, migrate individuals
//! between islands, and quiesce cleanly at shutdown. The breeding
//! arithmetic itself (mutation, crossover, CMA and the like) is an
//! external collaborator, see [`genetics::BreedingOperator`], as is the
//! user's loss function ([`loss::LossFunction`]).
//!
//! A typical embedder implements [`genetics::BreedingOperator`] and
//! [`loss::LossFunction`], optionally a [`surrogate::Surrogate`], builds an
//! [`topology::IslandTopology`], constructs one [`comm::Communicator`] pair
//! per worker (world + island), and drives it all through
//! [`worker_builder::WorkerBuilder`].

pub mod breeding;
pub mod checkpoint;
pub mod comm;
pub mod error;
pub mod genetics;
pub mod individual;
pub mod loss;
pub mod migration;
pub mod population;
pub mod selection;
pub mod surrogate;
pub mod sync;
pub mod topology;
pub mod worker;
pub mod worker_builder;

pub use comm::{ChannelCommunicator, Communicator, Tag};
pub use error::{BuildError, OptimizerError, ProtocolViolation};
pub use genetics::BreedingOperator;
pub use individual::{Individual, IslandId, Loss, Rank, TraitValue, Traits};
pub use loss::{LossError, LossFunction, LossSequence, LossStep, SingleValueLoss};
pub use migration::{MigrationEngine, MigrationOutcome, MigrationStrategy, Pollination, RealMigration};
pub use population::{EmigratedLog, PopulationReplica};
pub use selection::{EmigrationPropagator, SelectMin};
pub use surrogate::{NullSurrogate, Surrogate};
pub use topology::IslandTopology;
pub use worker::Worker;
pub use worker_builder::{MigrationVariant, WorkerBuilder};

#[cfg(feature = "mpi")]
pub use comm::MpiCommunicator;
