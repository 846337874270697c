//! A minimal message-passing abstraction over the four protocol channels.
//!
//! The migration protocol only ever needs tagged point-to-point send,
//! non-blocking probe-then-receive, and a collective barrier, never a
//! blocking receive with no matching probe, and never a reduction. Keeping
//! the trait this small means a worker can run against a real MPI
//! communicator in production and against an in-process, thread-backed one
//! in tests without either implementation growing features the protocol
//! doesn't use.
//!
//! A worker holds two communicators: `world` (every worker, used only for
//! MIGRATION) and `island` (just its own island's workers, used for
//! INDIVIDUAL, SYNCHRONIZATION and DUMP). Call this the "one tag, one
//! communicator" rule.

use std::cell::RefCell;
use std::sync::{Arc, Barrier as StdBarrier};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::individual::Rank;

/// The four wire tags, each confined to exactly one communicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Intra-island replication of a freshly evaluated individual.
    Individual,
    /// Cross-island emigrant batch.
    Migration,
    /// Intra-island deactivation notice.
    Synchronization,
    /// The checkpoint-writer token.
    Dump,
}

impl Tag {
    pub fn as_i32(self) -> i32 {
        match self {
            Tag::Individual => 0,
            Tag::Migration => 1,
            Tag::Synchronization => 2,
            Tag::Dump => 3,
        }
    }
}

/// A tagged point-to-point channel plus a barrier, nothing else.
///
/// `rank`/`size` are scoped to whichever group this communicator represents
/// (world rank for the world communicator, local island rank for an island
/// communicator). Callers must not mix the two numberings.
pub trait Communicator: Send {
    fn rank(&self) -> Rank;
    fn size(&self) -> usize;

    /// Buffer and send; the protocol never depends on this returning only
    /// once the peer has received, to avoid a deadlock where both sides
    /// are waiting on each other's receive.
    fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>);

    /// Non-blocking: `None` if nothing with this tag is currently available.
    /// Messages with other tags that are encountered along the way are
    /// buffered for a later call with a matching tag, not discarded.
    fn try_recv(&self, tag: Tag) -> Option<Vec<u8>>;

    fn barrier(&self);
}

/// An in-process communicator backed by one `crossbeam_channel` per rank,
/// shared by every member of the group at construction time. Messages with
/// a tag the caller isn't currently asking for are parked in `undelivered`
/// rather than dropped, mirroring the buffering a real transport does at
/// the socket layer of a real transport.
pub struct ChannelCommunicator {
    rank: Rank,
    size: usize,
    senders: Vec<Sender<(Tag, Vec<u8>)>>,
    receiver: Receiver<(Tag, Vec<u8>)>,
    undelivered: RefCell<Vec<(Tag, Vec<u8>)>>,
    barrier: Arc<StdBarrier>,
}

impl ChannelCommunicator {
    /// Builds `size` communicators that can all reach each other, one per
    /// rank in `0..size`. Clone the returned handles out to the threads or
    /// processes-in-miniature that will own them.
    pub fn group(size: usize) -> Vec<Self> {
        assert!(size > 0, "a communicator group must have at least one member");

        let mut senders = Vec::with_capacity(size);
        let mut receivers = Vec::with_capacity(size);
        for _ in 0..size {
            let (tx, rx) = unbounded();
            senders.push(tx);
            receivers.push(rx);
        }

        let barrier = Arc::new(StdBarrier::new(size));
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| ChannelCommunicator {
                rank,
                size,
                senders: senders.clone(),
                receiver,
                undelivered: RefCell::new(Vec::new()),
                barrier: barrier.clone(),
            })
            .collect()
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) {
        self.senders[dest]
            .send((tag, payload))
            .expect("peer communicator dropped before the run finished");
    }

    fn try_recv(&self, tag: Tag) -> Option<Vec<u8>> {
        let mut undelivered = self.undelivered.borrow_mut();
        if let Some(pos) = undelivered.iter().position(|(t, _)| *t == tag) {
            return Some(undelivered.remove(pos).1);
        }
        while let Ok((t, payload)) = self.receiver.try_recv() {
            if t == tag {
                return Some(payload);
            }
            undelivered.push((t, payload));
        }
        None
    }

    fn barrier(&self) {
        self.barrier.wait();
    }
}

/// Production communicator over a real MPI rank, via `rsmpi`. Compiled only
/// with the `mpi` feature so the rest of the crate (and its test suite)
/// never needs an MPI runtime available.
#[cfg(feature = "mpi")]
pub mod mpi_backend {
    use super::{Communicator, Tag};
    use crate::individual::Rank;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    pub struct MpiCommunicator {
        comm: SimpleCommunicator,
    }

    impl MpiCommunicator {
        pub fn new(comm: SimpleCommunicator) -> Self {
            Self { comm }
        }

        /// Splits this communicator into one sub-communicator per island,
        /// the MPI analogue of `MPI_Comm_split` used to realize the
        /// "process-group subcommunicators".
        pub fn split_by_island(&self, island: usize) -> Self {
            let color = mpi::topology::Color::with_value(island as i32);
            let sub = self
                .comm
                .split_by_color(color)
                .expect("split_by_color should always succeed for a non-negative color");
            Self { comm: sub }
        }
    }

    impl Communicator for MpiCommunicator {
        fn rank(&self) -> Rank {
            self.comm.rank() as Rank
        }

        fn size(&self) -> usize {
            self.comm.size() as usize
        }

        fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) {
            self.comm
                .process_at_rank(dest as i32)
                .send_with_tag(&payload[..], tag.as_i32());
        }

        fn try_recv(&self, tag: Tag) -> Option<Vec<u8>> {
            let (msg, status) = self
                .comm
                .any_process()
                .immediate_matched_probe_with_tag(tag.as_i32())?;
            let count = status.count(u8::equivalent_datatype()) as usize;
            let mut buf: Vec<u8> = vec![0; count];
            msg.matched_receive_into(&mut buf[..]);
            Some(buf)
        }

        fn barrier(&self) {
            self.comm.barrier();
        }
    }
}

#[cfg(feature = "mpi")]
pub use mpi_backend::MpiCommunicator;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_and_recv_round_trip() {
        let mut group = ChannelCommunicator::group(2);
        let b = group.pop().unwrap();
        let a = group.pop().unwrap();

        a.send(1, Tag::Individual, vec![1, 2, 3]);
        assert_eq!(b.try_recv(Tag::Individual), Some(vec![1, 2, 3]));
        assert_eq!(b.try_recv(Tag::Individual), None);
    }

    #[test]
    fn mismatched_tag_is_buffered_not_lost() {
        let mut group = ChannelCommunicator::group(2);
        let b = group.pop().unwrap();
        let a = group.pop().unwrap();

        a.send(1, Tag::Migration, vec![9]);
        a.send(1, Tag::Individual, vec![1]);

        // Probing for Individual first must not lose the buffered Migration message.
        assert_eq!(b.try_recv(Tag::Individual), Some(vec![1]));
        assert_eq!(b.try_recv(Tag::Migration), Some(vec![9]));
    }

    #[test]
    fn barrier_releases_all_members() {
        use std::thread;

        let group = ChannelCommunicator::group(3);
        let handles: Vec<_> = group
            .into_iter()
            .map(|comm| thread::spawn(move || comm.barrier()))
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }
}
