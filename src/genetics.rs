use rand::rngs::StdRng;

use crate::individual::{Individual, Traits};

/// The breeding operator: a pure function from a sample of active
/// individuals to a new candidate's traits. Mutation, crossover, CMA updates
/// and any other arithmetic live entirely on the implementor's side of this
/// trait; the protocol only ever calls `breed` and stores what comes back.
///
/// Implementations may be stateful across calls on the same worker (a CMA
/// covariance matrix, for instance) but must draw all randomness from the
/// supplied `rng` so runs stay reproducible from a fixed seed.
pub trait BreedingOperator {
    /// `sample` is the replica filtered to `active` individuals, in replica
    /// order. Implementations should not depend on that order for anything
    /// beyond what `rng` already makes reproducible.
    fn breed(&mut self, rng: &mut StdRng, sample: &[&Individual]) -> Traits;
}
