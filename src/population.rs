use crate::error::{OptimizerError, ProtocolViolation};
use crate::individual::{Individual, IslandId, Rank};

/// The per-worker population replica.
///
/// Append-only for insertion: the only mutation ever performed on an entry
/// already in the replica is flipping `active` to `false` (via
/// [`PopulationReplica::deactivate`]) or resampling `current` on a freshly
/// bred individual before it is sent out as an emigrant. Island peers
/// converge to the same multiset of entries (including `active`) once all
/// pending messages have been drained.
#[derive(Clone, Debug, Default)]
pub struct PopulationReplica {
    entries: Vec<Individual>,
}

impl PopulationReplica {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn push(&mut self, individual: Individual) {
        self.entries.push(individual);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Individual> {
        self.entries.iter()
    }

    pub fn active_iter(&self) -> impl Iterator<Item = &Individual> {
        self.entries.iter().filter(|ind| ind.active)
    }

    /// Individuals this worker is currently responsible for and may
    /// legitimately select as emigrants: active, and not already on their way
    /// elsewhere.
    pub fn eligible_for_emigration(&self, rank: Rank) -> Vec<&Individual> {
        self.entries
            .iter()
            .filter(|ind| ind.active && ind.current == rank)
            .collect()
    }

    pub fn deactivate(&mut self, index: usize) {
        self.entries[index].active = false;
    }

    /// Locate the unique entry that is an identical-replica-entry match for
    /// `needle`. Zero or more-than-one matches is a protocol invariant
    /// violation: the caller is expected to have maintained exactly one live
    /// copy of every candidate at any point in time.
    pub fn find_identical_replica_entry(
        &self,
        needle: &Individual,
        island: IslandId,
        rank: Rank,
    ) -> Result<usize, OptimizerError> {
        let mut matches = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, ind)| ind.is_identical_replica_entry(needle));

        let first = matches.next();
        let extra = matches.count();

        match first {
            Some((idx, _)) if extra == 0 => Ok(idx),
            Some(_) => Err(ProtocolViolation::ReplicaEntryMismatch {
                island,
                rank,
                generation: needle.generation,
                source_rank: needle.rank,
                found: 2 + extra,
            }
            .into()),
            None => Err(ProtocolViolation::ReplicaEntryMismatch {
                island,
                rank,
                generation: needle.generation,
                source_rank: needle.rank,
                found: 0,
            }
            .into()),
        }
    }

    /// Every entry, for checkpointing (active and inactive alike).
    pub fn as_slice(&self) -> &[Individual] {
        &self.entries
    }

    pub fn from_entries(entries: Vec<Individual>) -> Self {
        Self { entries }
    }
}

/// Deactivation notices received from island peers but not yet resolved
/// against the local replica, because the corresponding individual has not
/// yet arrived via the intra-island broadcast (MIGRATION and SYNCHRONIZATION
/// are independent channels with no ordering guarantee between them).
#[derive(Clone, Debug, Default)]
pub struct EmigratedLog {
    pending: Vec<Individual>,
}

impl EmigratedLog {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    pub fn extend(&mut self, batch: Vec<Individual>) {
        self.pending.extend(batch);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Walk the log and flip any entry that now has a matching replica
    /// entry to inactive, removing it from the log. Entries with no match
    /// yet are left for next time. More than one match for a single entry
    /// is a protocol invariant violation.
    pub fn resolve_against(
        &mut self,
        replica: &mut PopulationReplica,
        island: IslandId,
        rank: Rank,
    ) -> Result<(), OptimizerError> {
        let mut unresolved = Vec::with_capacity(self.pending.len());

        for emigrant in self.pending.drain(..) {
            let mut matches = replica
                .entries
                .iter()
                .enumerate()
                .filter(|(_, ind)| ind.is_identical_replica_entry(&emigrant));

            let first = matches.next();
            let extra = matches.count();
            drop(matches);

            match first {
                None => unresolved.push(emigrant),
                Some((idx, _)) if extra == 0 => {
                    replica.deactivate(idx);
                }
                Some(_) => {
                    return Err(ProtocolViolation::ReplicaEntryMismatch {
                        island,
                        rank,
                        generation: emigrant.generation,
                        source_rank: emigrant.rank,
                        found: 2 + extra,
                    }
                    .into());
                }
            }
        }

        self.pending = unresolved;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::individual::{Traits, TraitValue};

    fn ind(gen: u64, rank: Rank, island: IslandId) -> Individual {
        let mut traits = Traits::new();
        traits.insert("x".to_string(), TraitValue::Float(gen as f64));
        Individual::bred(traits, gen, rank, island)
    }

    #[test]
    fn eligible_for_emigration_excludes_inactive_and_foreign_current() {
        let mut pop = PopulationReplica::new();
        let mut a = ind(0, 1, 0);
        a.active = false;
        let b = ind(1, 1, 0);
        let mut c = ind(2, 1, 0);
        c.current = 9;
        pop.push(a);
        pop.push(b.clone());
        pop.push(c);

        let eligible = pop.eligible_for_emigration(1);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].generation, b.generation);
    }

    #[test]
    fn find_identical_replica_entry_errors_on_zero_or_multiple_matches() {
        let mut pop = PopulationReplica::new();
        let needle = ind(0, 1, 0);
        assert!(pop.find_identical_replica_entry(&needle, 0, 1).is_err());

        pop.push(needle.clone());
        pop.push(needle.clone());
        assert!(pop.find_identical_replica_entry(&needle, 0, 1).is_err());
    }

    #[test]
    fn emigrated_log_resolves_only_when_replica_catches_up() {
        let mut pop = PopulationReplica::new();
        let mut log = EmigratedLog::new();
        let target = ind(5, 2, 0);

        log.extend(vec![target.clone()]);
        log.resolve_against(&mut pop, 0, 2).unwrap();
        assert_eq!(log.len(), 1, "individual hasn't arrived yet");

        pop.push(target.clone());
        log.resolve_against(&mut pop, 0, 2).unwrap();
        assert!(log.is_empty());
        assert!(!pop.as_slice()[0].active);
    }
}
