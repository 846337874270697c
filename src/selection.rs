use crate::individual::Individual;

/// Picks which eligible individuals emigrate. The default and only
/// implementation the protocol requires is "lowest loss first"; the
/// trait exists so an embedder can substitute a different ordering without
/// touching the migration engine.
pub trait EmigrationPropagator {
    /// `eligible` need not be sorted. Returns exactly `count` references,
    /// ordered with the most-preferred emigrant first, or fewer if `eligible`
    /// is shorter than `count` (the migration engine never calls this when
    /// that would happen; see the under-population skip in the migration engine).
    fn select<'a>(&self, eligible: &[&'a Individual], count: usize) -> Vec<&'a Individual>;
}

/// Selects the `count` individuals with the lowest loss. Individuals with an
/// unevaluated loss sort last and are only chosen if there is nothing else.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectMin;

impl EmigrationPropagator for SelectMin {
    fn select<'a>(&self, eligible: &[&'a Individual], count: usize) -> Vec<&'a Individual> {
        let mut ranked: Vec<&'a Individual> = eligible.to_vec();
        ranked.sort_by(|a, b| match (a.loss.value(), b.loss.value()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        ranked.truncate(count);
        ranked
    }
}
