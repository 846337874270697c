use crate::individual::Traits;

/// The error type a [`LossFunction`] raises when it fails to evaluate a
/// candidate. The driver attaches the offending traits before this
/// propagates out of `evaluate_one` as [`crate::error::OptimizerError::LossFunction`].
pub type LossError = Box<dyn std::error::Error + Send + Sync>;

/// One step of a lazily-produced loss estimate. `Intermediate` values are
/// offered to a surrogate (if attached) and may trigger early cancellation;
/// `Done` marks the end of the sequence and carries no new value; the last
/// `Intermediate` seen (or the only one, for a single-scalar loss) is the
/// definitive loss.
pub enum LossStep {
    Intermediate(f64),
    Done,
}

/// An explicit, pollable producer of loss estimates, standing in for the
/// source's generator-with-yield. A single-scalar loss is just a sequence
/// that yields one `Intermediate` then `Done`.
pub trait LossSequence {
    fn next(&mut self) -> LossStep;
}

/// A loss sequence that has already fully run and simply replays its one
/// recorded value. Useful for loss functions that only ever produce a single
/// scalar and have no need for the lazy machinery.
pub struct SingleValueLoss {
    value: Option<f64>,
}

impl SingleValueLoss {
    pub fn new(value: f64) -> Self {
        Self { value: Some(value) }
    }
}

impl LossSequence for SingleValueLoss {
    fn next(&mut self) -> LossStep {
        match self.value.take() {
            Some(v) => LossStep::Intermediate(v),
            None => LossStep::Done,
        }
    }
}

/// The user-supplied objective. Any failure evaluating `traits` is fatal to
/// the worker that raised it, never to the rest of the cohort.
pub trait LossFunction {
    type Sequence: LossSequence;

    fn evaluate(&self, traits: &Traits) -> Result<Self::Sequence, LossError>;
}
