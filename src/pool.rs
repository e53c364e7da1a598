//! Bounded worker pool for cluster-placement jobs.
//!
//! A `rayon::ThreadPool` drains jobs submitted through a bounded
//! `crossbeam_channel` slot queue, which doubles as backpressure on the
//! submitting side: `submit` blocks once the queue is full rather than
//! letting it grow without limit. An `Arc<(Mutex<PoolState>, Condvar)>`
//! tracks in-flight job counts so `join` can wait for drainage without
//! polling. Each job carries a [`crate::sparse::SparseWriter`] handle and a
//! decoded [`crate::extent::ClusterPlacement`]; the first worker error is
//! captured in a small mutex-guarded slot and surfaced by [`WritePool::join`].

use std::sync::{Arc, Condvar, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::ThreadPool as RayonPool;

use crate::config::{QUEUE_MULTIPLIER, WORKER_COUNT_MIN};
use crate::error::{VmaError, VmaResult};
use crate::extent::ClusterPlacement;
use crate::sparse::SparseWriter;

struct PoolState {
    pending: usize,
}

/// One unit of work: write a decoded placement through its device's writer.
pub struct Job {
    pub writer: Arc<SparseWriter>,
    pub placement: ClusterPlacement,
}

pub struct WritePool {
    pool: Arc<RayonPool>,
    slot_tx: Sender<()>,
    slot_rx: Receiver<()>,
    state: Arc<(Mutex<PoolState>, Condvar)>,
    first_error: Arc<Mutex<Option<VmaError>>>,
}

impl WritePool {
    /// `worker_count` defaults to the host's available parallelism, clamped
    /// to a minimum of [`WORKER_COUNT_MIN`]. The job queue holds
    /// `QUEUE_MULTIPLIER * worker_count` jobs before `submit` blocks.
    pub fn new(worker_count: Option<usize>) -> VmaResult<Self> {
        let nb_threads = worker_count.unwrap_or_else(num_cpus::get).max(WORKER_COUNT_MIN);
        let queue_bound = nb_threads * QUEUE_MULTIPLIER;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nb_threads)
            .build()
            .map_err(|e| VmaError::Resource {
                path: std::path::PathBuf::new(),
                detail: format!("failed to start write pool: {e}"),
            })?;

        let capacity = queue_bound + nb_threads;
        let (slot_tx, slot_rx) = bounded(capacity);
        for _ in 0..capacity {
            slot_tx.send(()).ok();
        }

        Ok(WritePool {
            pool: Arc::new(pool),
            slot_tx,
            slot_rx,
            state: Arc::new((Mutex::new(PoolState { pending: 0 }), Condvar::new())),
            first_error: Arc::new(Mutex::new(None)),
        })
    }

    /// Blocks the caller when the queue is full (backpressure on the
    /// extent decode loop).
    pub fn submit(&self, job: Job) {
        self.slot_rx.recv().expect("write pool slot channel closed");

        {
            let (lock, _cvar) = &*self.state;
            let mut s = lock.lock().unwrap();
            s.pending += 1;
        }

        let state = Arc::clone(&self.state);
        let slot_tx = self.slot_tx.clone();
        let first_error = Arc::clone(&self.first_error);

        self.pool.spawn(move || {
            if let Err(e) = job.writer.place(job.placement.cluster_index, &job.placement.data) {
                let mut slot = first_error.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(e);
                }
            }

            let (lock, cvar) = &*state;
            let mut s = lock.lock().unwrap();
            s.pending -= 1;
            if s.pending == 0 {
                cvar.notify_all();
            }
            let _ = slot_tx.send(());
        });
    }

    /// Blocks until every submitted job has finished, then returns the
    /// first worker error, if any. May be called more than once; the pool
    /// remains usable for further submissions afterward.
    pub fn join(&self) -> VmaResult<()> {
        let (lock, cvar) = &*self.state;
        let mut s = lock.lock().unwrap();
        while s.pending > 0 {
            s = cvar.wait(s).unwrap();
        }
        drop(s);

        let mut slot = self.first_error.lock().unwrap();
        match slot.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for WritePool {
    fn drop(&mut self) {
        let (lock, cvar) = &*self.state;
        let mut s = lock.lock().unwrap();
        while s.pending > 0 {
            s = cvar.wait(s).unwrap();
        }
    }
}
