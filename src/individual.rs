use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Id of a worker within the world communicator.
pub type Rank = usize;

/// Id of an island within the migration topology.
pub type IslandId = usize;

/// A single hyperparameter value. Kept as a small closed set rather than an
/// opaque `f64` so a breeding operator can work with mixed real/integer/
/// categorical search spaces without losing type information on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TraitValue {
    Float(f64),
    Int(i64),
    Categorical(String),
}

/// Ordered so that two traits maps built independently (e.g. a breeding
/// operator filling in keys in different order) still compare equal.
pub type Traits = BTreeMap<String, TraitValue>;

/// An individual's loss, or the sentinel meaning "not evaluated yet".
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Loss {
    Unevaluated,
    Value(f64),
}

impl Loss {
    pub fn value(&self) -> Option<f64> {
        match self {
            Loss::Unevaluated => None,
            Loss::Value(v) => Some(*v),
        }
    }
}

/// A candidate solution together with the bookkeeping the migration protocol
/// needs to keep per-worker population replicas convergent.
///
/// Two `Individual`s are compared under one of three notions of equality,
/// each with its own named method because the protocol cares which one is
/// meant at each call site:
///
/// - full equality (`PartialEq`): every field, including `loss` and `active`.
///   Used for replica-convergence checks and checkpoint round-trips.
/// - [`Individual::same_candidate`]: traits + generation + rank + island.
///   Identifies "the same bred solution" regardless of where it has traveled.
/// - [`Individual::is_identical_replica_entry`]: `same_candidate` plus equal
///   `migration_steps` and `current`. Identifies one specific replica entry,
///   used to locate the exact copy to deactivate or to detect duplicates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub traits: Traits,
    pub loss: Loss,
    pub generation: u64,
    pub rank: Rank,
    pub island: IslandId,
    pub current: Rank,
    pub migration_steps: u32,
    pub active: bool,
}

impl Individual {
    /// A freshly bred individual: active, owned by its breeder, never migrated.
    pub fn bred(traits: Traits, generation: u64, rank: Rank, island: IslandId) -> Self {
        Individual {
            traits,
            loss: Loss::Unevaluated,
            generation,
            rank,
            island,
            current: rank,
            migration_steps: 0,
            active: true,
        }
    }

    pub fn same_candidate(&self, other: &Individual) -> bool {
        self.traits == other.traits
            && self.generation == other.generation
            && self.rank == other.rank
            && self.island == other.island
    }

    pub fn is_identical_replica_entry(&self, other: &Individual) -> bool {
        self.same_candidate(other)
            && self.migration_steps == other.migration_steps
            && self.current == other.current
    }
}
