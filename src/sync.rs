//! Intra-island synchronization: every worker's replica converges
//! to the same multiset of individuals by broadcasting each newly bred
//! individual to its island peers and draining whatever peers broadcast
//! back, in whatever order it arrives.

use crate::comm::{Communicator, Tag};
use crate::error::OptimizerError;
use crate::individual::{Individual, Rank};
use crate::population::PopulationReplica;

/// Sends a deep copy of `ind` to every other worker on the island
/// communicator, tagged INDIVIDUAL. Bincode gives us an independent byte
/// copy for free, so there is no risk of a later local mutation leaking
/// into an already-sent payload.
pub fn broadcast(island: &dyn Communicator, ind: &Individual) -> Result<(), OptimizerError> {
    let payload = bincode::serialize(ind)?;
    for peer in 0..island.size() {
        if peer == island.rank() {
            continue;
        }
        island.send(peer, Tag::Individual, payload.clone());
    }
    Ok(())
}

/// Non-blockingly drains every currently pending INDIVIDUAL message and
/// appends each to the local replica. Ordering across senders is
/// unspecified; only eventual multiset equality across peers matters.
pub fn drain_inbox(
    island: &dyn Communicator,
    replica: &mut PopulationReplica,
) -> Result<usize, OptimizerError> {
    let mut drained = 0;
    while let Some(payload) = island.try_recv(Tag::Individual) {
        let ind: Individual = bincode::deserialize(&payload)?;
        replica.push(ind);
        drained += 1;
    }
    Ok(drained)
}
