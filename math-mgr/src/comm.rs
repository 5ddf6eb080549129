//! Communication layer for distributed solvers
//!
//! Every distributed object in this crate holds an `Arc<dyn Communicator>`. The trait is
//! deliberately small and object safe: it moves type-erased payloads between ranks, and the
//! typed collectives the algorithms actually call ([`CommExt::all_gather`],
//! [`CommExt::exchange`], [`CommExt::exclusive_scan`], ...) are layered on top of it.
//!
//! Two implementations are provided:
//! - [`SerialComm`]: a single rank, all collectives are local
//! - [`ThreadComm`]: `P` ranks living in one process, one OS thread each, synchronised with a
//!   barrier. This is how multi-rank runs are exercised in tests and benchmarks.
//!
//! All collectives are blocking and must be entered by every rank in the same order.

use num_traits::Zero;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Type-erased message body
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Errors raised by collectives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    #[error("payload from rank {rank} has an unexpected type")]
    TypeMismatch { rank: usize },

    #[error("destination rank {dest} out of range for communicator of size {size}")]
    InvalidRank { dest: usize, size: usize },

    #[error("rank {rank} did not contribute to the collective")]
    MissingContribution { rank: usize },

    #[error("a peer rank failed while inside a collective")]
    PeerFailed,
}

/// Rank-level communication primitives
pub trait Communicator: Send + Sync + fmt::Debug {
    /// This process's rank
    fn rank(&self) -> usize;

    /// Number of ranks
    fn size(&self) -> usize;

    /// Synchronisation barrier
    fn barrier(&self) -> Result<(), CommError>;

    /// Gather one payload from every rank, in rank order, on every rank
    fn all_gather_any(&self, value: Payload) -> Result<Vec<Payload>, CommError>;

    /// Point-to-point exchange.
    ///
    /// `messages` holds `(destination, payload)` pairs. Returns the `(source, payload)` pairs
    /// addressed to this rank, sorted by source; messages from the same source keep their
    /// send order.
    fn exchange_any(
        &self,
        messages: Vec<(usize, Payload)>,
    ) -> Result<Vec<(usize, Payload)>, CommError>;
}

/// Typed collectives built on [`Communicator`]
pub trait CommExt: Communicator {
    /// Gather one value per rank
    fn all_gather<X>(&self, value: X) -> Result<Vec<X>, CommError>
    where
        X: Clone + Send + Sync + 'static,
    {
        self.all_gather_any(Arc::new(value))?
            .into_iter()
            .enumerate()
            .map(|(rank, p)| {
                p.downcast_ref::<X>()
                    .cloned()
                    .ok_or(CommError::TypeMismatch { rank })
            })
            .collect()
    }

    /// Send a vector of values to each listed destination and receive the vectors sent here
    fn exchange<X>(
        &self,
        messages: Vec<(usize, Vec<X>)>,
    ) -> Result<Vec<(usize, Vec<X>)>, CommError>
    where
        X: Clone + Send + Sync + 'static,
    {
        let outgoing = messages
            .into_iter()
            .map(|(dest, data)| (dest, Arc::new(data) as Payload))
            .collect();

        self.exchange_any(outgoing)?
            .into_iter()
            .map(|(src, p)| match p.downcast::<Vec<X>>() {
                Ok(data) => Ok((src, Arc::try_unwrap(data).unwrap_or_else(|a| (*a).clone()))),
                Err(_) => Err(CommError::TypeMismatch { rank: src }),
            })
            .collect()
    }

    /// Exclusive prefix sum of a local count: returns `(start, total)`
    fn exclusive_scan(&self, local: usize) -> Result<(usize, usize), CommError> {
        let counts = self.all_gather(local)?;
        let start = counts[..self.rank()].iter().sum();
        let total = counts.iter().sum();
        Ok((start, total))
    }

    /// Value held by the last rank, on every rank
    fn broadcast_from_last<X>(&self, value: X) -> Result<X, CommError>
    where
        X: Clone + Send + Sync + 'static,
    {
        let mut all = self.all_gather(value)?;
        all.pop().ok_or(CommError::MissingContribution { rank: 0 })
    }

    /// Sum over ranks, accumulated in rank order so every rank gets bitwise the same result
    fn all_reduce_sum<X>(&self, local: X) -> Result<X, CommError>
    where
        X: Zero + Copy + Send + Sync + 'static,
    {
        Ok(self
            .all_gather(local)?
            .into_iter()
            .fold(X::zero(), |acc, v| acc + v))
    }

    /// Maximum over ranks
    fn all_reduce_max_f64(&self, local: f64) -> Result<f64, CommError> {
        Ok(self
            .all_gather(local)?
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max))
    }
}

impl<C: Communicator + ?Sized> CommExt for C {}

/// Single-rank communicator
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl SerialComm {
    /// Shared handle, the form distributed objects store
    pub fn shared() -> Arc<dyn Communicator> {
        Arc::new(SerialComm)
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<(), CommError> {
        Ok(())
    }

    fn all_gather_any(&self, value: Payload) -> Result<Vec<Payload>, CommError> {
        Ok(vec![value])
    }

    fn exchange_any(
        &self,
        messages: Vec<(usize, Payload)>,
    ) -> Result<Vec<(usize, Payload)>, CommError> {
        messages
            .into_iter()
            .map(|(dest, p)| {
                if dest == 0 {
                    Ok((0, p))
                } else {
                    Err(CommError::InvalidRank { dest, size: 1 })
                }
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    poisoned: bool,
}

/// Reusable barrier that can be poisoned when a participant dies
#[derive(Debug)]
struct RankBarrier {
    size: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl RankBarrier {
    fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(BarrierState::default()),
            cvar: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<(), CommError> {
        let mut st = self.state.lock();
        if st.poisoned {
            return Err(CommError::PeerFailed);
        }
        let entered = st.generation;
        st.arrived += 1;
        if st.arrived == self.size {
            st.arrived = 0;
            st.generation += 1;
            self.cvar.notify_all();
            return Ok(());
        }
        while st.generation == entered && !st.poisoned {
            self.cvar.wait(&mut st);
        }
        if st.poisoned && st.generation == entered {
            return Err(CommError::PeerFailed);
        }
        Ok(())
    }

    fn poison(&self) {
        let mut st = self.state.lock();
        st.poisoned = true;
        self.cvar.notify_all();
    }
}

struct Shared {
    barrier: RankBarrier,
    slots: Mutex<Vec<Option<Payload>>>,
    mailboxes: Vec<Mutex<Vec<(usize, Payload)>>>,
}

impl Shared {
    fn new(size: usize) -> Self {
        Self {
            barrier: RankBarrier::new(size),
            slots: Mutex::new(vec![None; size]),
            mailboxes: (0..size).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }
}

/// Wakes the other ranks with an error if this rank unwinds
struct PoisonOnPanic(Arc<Shared>);

impl Drop for PoisonOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.barrier.poison();
        }
    }
}

/// In-process communicator: one rank per thread
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.shared.barrier.size)
            .finish()
    }
}

impl ThreadComm {
    /// Run `f` on `size` ranks, each on its own scoped thread, and return the per-rank
    /// results in rank order.
    ///
    /// A panic on any rank releases the others (their pending collectives fail with
    /// [`CommError::PeerFailed`]) and is re-raised here once every thread has finished.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(Arc<dyn Communicator>) -> R + Sync,
    {
        let shared = Arc::new(Shared::new(size));
        let f = &f;

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..size)
                .map(|rank| {
                    let shared = Arc::clone(&shared);
                    s.spawn(move || {
                        let _guard = PoisonOnPanic(Arc::clone(&shared));
                        let comm: Arc<dyn Communicator> = Arc::new(ThreadComm { rank, shared });
                        f(comm)
                    })
                })
                .collect();

            let mut results = Vec::with_capacity(size);
            let mut first_panic = None;
            for handle in handles {
                match handle.join() {
                    Ok(r) => results.push(r),
                    Err(payload) => {
                        if first_panic.is_none() {
                            first_panic = Some(payload);
                        }
                    }
                }
            }
            if let Some(payload) = first_panic {
                std::panic::resume_unwind(payload);
            }
            results
        })
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.barrier.size
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.shared.barrier.wait()
    }

    fn all_gather_any(&self, value: Payload) -> Result<Vec<Payload>, CommError> {
        self.shared.slots.lock()[self.rank] = Some(value);
        self.shared.barrier.wait()?;

        let gathered: Result<Vec<Payload>, CommError> = self
            .shared
            .slots
            .lock()
            .iter()
            .enumerate()
            .map(|(rank, slot)| slot.clone().ok_or(CommError::MissingContribution { rank }))
            .collect();

        // Nobody may overwrite a slot before every rank has read it
        self.shared.barrier.wait()?;
        self.shared.slots.lock()[self.rank] = None;
        gathered
    }

    fn exchange_any(
        &self,
        messages: Vec<(usize, Payload)>,
    ) -> Result<Vec<(usize, Payload)>, CommError> {
        let size = self.size();
        let mut invalid = None;
        for (dest, payload) in messages {
            match self.shared.mailboxes.get(dest) {
                Some(mailbox) => mailbox.lock().push((self.rank, payload)),
                None => invalid = Some(dest),
            }
        }

        // Still take part in both barriers so the other ranks are not left hanging
        self.shared.barrier.wait()?;
        let mut received = std::mem::take(&mut *self.shared.mailboxes[self.rank].lock());
        self.shared.barrier.wait()?;

        if let Some(dest) = invalid {
            return Err(CommError::InvalidRank { dest, size });
        }
        received.sort_by_key(|(src, _)| *src);
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_collectives() {
        let comm = SerialComm;
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert_eq!(comm.all_gather(7usize).unwrap(), vec![7]);
        assert_eq!(comm.exclusive_scan(5).unwrap(), (0, 5));
        assert_eq!(comm.all_reduce_sum(2.5f64).unwrap(), 2.5);

        let back = comm.exchange(vec![(0, vec![1u32, 2])]).unwrap();
        assert_eq!(back, vec![(0, vec![1, 2])]);
        assert_eq!(
            comm.exchange(vec![(1, vec![1u32])]),
            Err(CommError::InvalidRank { dest: 1, size: 1 })
        );
    }

    #[test]
    fn test_thread_all_gather_and_scan() {
        let results = ThreadComm::run(4, |comm| {
            let r = comm.rank();
            let gathered = comm.all_gather(r * 10).unwrap();
            let scan = comm.exclusive_scan(r + 1).unwrap();
            let sum = comm.all_reduce_sum(r as f64).unwrap();
            let last = comm.broadcast_from_last(r).unwrap();
            (gathered, scan, sum, last)
        });

        for (rank, (gathered, scan, sum, last)) in results.into_iter().enumerate() {
            assert_eq!(gathered, vec![0, 10, 20, 30]);
            let start: usize = (1..=rank).sum();
            assert_eq!(scan, (start, 10));
            assert_eq!(sum, 6.0);
            assert_eq!(last, 3);
        }
    }

    #[test]
    fn test_thread_exchange_ring() {
        let results = ThreadComm::run(3, |comm| {
            let r = comm.rank();
            let next = (r + 1) % comm.size();
            let prev = (r + comm.size() - 1) % comm.size();
            let got = comm
                .exchange(vec![(next, vec![r as i64, -(r as i64)])])
                .unwrap();
            (prev, got)
        });

        for (prev, got) in results {
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].0, prev);
            assert_eq!(got[0].1, vec![prev as i64, -(prev as i64)]);
        }
    }

    #[test]
    fn test_thread_exchange_sorted_by_source() {
        let results = ThreadComm::run(3, |comm| {
            let msgs = if comm.rank() == 0 {
                Vec::new()
            } else {
                vec![(0, vec![comm.rank()])]
            };
            comm.exchange(msgs).unwrap()
        });
        assert_eq!(results[0], vec![(1, vec![1]), (2, vec![2])]);
        assert!(results[1].is_empty());
    }

    #[test]
    fn test_thread_invalid_destination_does_not_deadlock() {
        let results = ThreadComm::run(2, |comm| {
            let dest = if comm.rank() == 0 { 5 } else { 0 };
            comm.exchange(vec![(dest, vec![1u8])])
        });
        assert_eq!(results[0], Err(CommError::InvalidRank { dest: 5, size: 2 }));
        assert!(results[1].is_ok());
    }

    #[test]
    #[should_panic(expected = "rank 1 failed")]
    fn test_thread_panic_is_propagated() {
        ThreadComm::run(2, |comm| {
            if comm.rank() == 1 {
                panic!("rank 1 failed");
            }
            assert_eq!(comm.barrier(), Err(CommError::PeerFailed));
        });
    }
}
