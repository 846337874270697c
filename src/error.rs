use thiserror::Error;

use crate::individual::{IslandId, Rank};

/// A fatal violation of a protocol invariant. Always indicates a bug in the
/// migration/synchronization protocol or a checkpoint corrupted outside the
/// running cohort; never recoverable within the worker that raises it.
#[derive(Error, Debug)]
pub enum ProtocolViolation {
    #[error(
        "island {island} worker {rank}: received immigrant with identical migration_steps/current already present in replica (generation {generation}, source rank {source_rank})"
    )]
    DuplicateImmigrant {
        island: IslandId,
        rank: Rank,
        generation: u64,
        source_rank: Rank,
    },

    #[error("island {island} worker {rank}: received immigrant marked inactive, which should be unreachable")]
    InactiveImmigrant { island: IslandId, rank: Rank },

    #[error(
        "island {island} worker {rank}: expected exactly one replica entry identical to emigrant (generation {generation}, source rank {source_rank}), found {found}"
    )]
    ReplicaEntryMismatch {
        island: IslandId,
        rank: Rank,
        generation: u64,
        source_rank: Rank,
        found: usize,
    },

    #[error(
        "island {island} worker {rank}: emigrated log still has {remaining} unresolved entries after the termination drain retried once"
    )]
    EmigratedLogNonEmpty {
        island: IslandId,
        rank: Rank,
        remaining: usize,
    },
}

/// Configuration errors raised eagerly by a builder's `build()`, before any
/// worker loop or communicator is touched.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("migration_topology must be a square matrix; got {rows} rows and {cols} columns")]
    NonSquareTopology { rows: usize, cols: usize },

    #[error("migration_topology[{island}][{island}] must be 0 (an island cannot migrate to itself)")]
    NonZeroDiagonal { island: IslandId },

    #[error("migration_prob > 0 requires a migration_topology to be set")]
    MigrationEnabledWithoutTopology,

    #[error("island_displs and island_counts must have the same length as migration_topology has rows")]
    MismatchedIslandArrays,

    #[error("num_islands must be at least 1")]
    ZeroIslands,

    #[error("a breeding operator implementation is required")]
    MissingBreedingOperator,

    #[error("a loss function implementation is required")]
    MissingLossFunction,

    #[error("checkpoint_path must be set to a writable directory")]
    MissingCheckpointPath,
}

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("user loss function failed for traits {traits:?}: {source}")]
    LossFunction {
        traits: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("loss sequence yielded no values before completion")]
    EmptyLossSequence,

    #[error("checkpoint serialization failed: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
