//! The breeding driver: builds the breeding input from the active
//! slice of the replica, invokes the breeding operator, then runs the loss
//! function's (possibly lazy) sequence through the surrogate hook.

use log::error;
use rand::rngs::StdRng;

use crate::error::OptimizerError;
use crate::genetics::BreedingOperator;
use crate::individual::{Individual, IslandId, Rank};
use crate::loss::{LossFunction, LossSequence, LossStep};
use crate::population::PopulationReplica;
use crate::surrogate::Surrogate;

pub struct BreedingDriver<G, L, S>
where
    G: BreedingOperator,
    L: LossFunction,
    S: Surrogate,
{
    genetics: G,
    loss_fn: L,
    surrogate: S,
    rank: Rank,
    island: IslandId,
}

impl<G, L, S> BreedingDriver<G, L, S>
where
    G: BreedingOperator,
    L: LossFunction,
    S: Surrogate,
{
    pub fn new(genetics: G, loss_fn: L, surrogate: S, rank: Rank, island: IslandId) -> Self {
        Self {
            genetics,
            loss_fn,
            surrogate,
            rank,
            island,
        }
    }

    /// Breeds one new individual against the current active replica,
    /// evaluates it (with the surrogate offered every intermediate value),
    /// and appends the completed individual to `replica`. Returns the new
    /// entry so callers can broadcast it without re-scanning the replica.
    pub fn evaluate_one(
        &mut self,
        rng: &mut StdRng,
        generation: u64,
        replica: &mut PopulationReplica,
    ) -> Result<Individual, OptimizerError> {
        let sample: Vec<&Individual> = replica.active_iter().collect();
        let traits = self.genetics.breed(rng, &sample);
        drop(sample);

        let mut ind = Individual::bred(traits, generation, self.rank, self.island);

        self.surrogate.start_run(&ind);
        let mut sequence = self.loss_fn.evaluate(&ind.traits).map_err(|source| {
            let traits = format!("{:?}", ind.traits);
            error!("loss function failed for traits {traits}: {source}");
            OptimizerError::LossFunction { traits, source }
        })?;
        let mut last_value: Option<f64> = None;
        loop {
            match sequence.next() {
                LossStep::Intermediate(value) => {
                    self.surrogate.update(value);
                    last_value = Some(value);
                    if self.surrogate.cancel(value) {
                        break;
                    }
                }
                LossStep::Done => break,
            }
        }

        let loss = last_value.ok_or(OptimizerError::EmptyLossSequence)?;
        ind.loss = crate::individual::Loss::Value(loss);

        replica.push(ind.clone());
        Ok(ind)
    }
}
