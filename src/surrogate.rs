use crate::individual::Individual;

/// Optional early-cancellation hook around a loss sequence. A missing
/// surrogate is modeled as [`NullSurrogate`] rather than an
/// `Option<Box<dyn Surrogate>>` so the no-surrogate path costs nothing and
/// is checked by the type system instead of a runtime branch.
pub trait Surrogate {
    /// Called once before evaluation begins.
    fn start_run(&mut self, _ind: &Individual) {}

    /// Called for every intermediate loss value observed.
    fn update(&mut self, _loss: f64) {}

    /// Called after every `update`; a `true` return truncates the loss
    /// sequence and adopts the last observed value as the definitive loss.
    fn cancel(&mut self, _loss: f64) -> bool {
        false
    }

    /// Reserved for island-boundary exchange of surrogate state. Not
    /// required for protocol correctness.
    fn merge(&mut self, _data: &[u8]) {}

    fn data(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// The default surrogate: never cancels, never updates anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSurrogate;

impl Surrogate for NullSurrogate {}
