//! Write coalescing for [`Storage::batch`](docstore_core::Storage::batch)
//!
//! The first caller to find no pending batch becomes its leader. The leader
//! waits until the batch is full or the delay runs out, then detaches it and
//! runs every queued function in a single update. Later callers join the next
//! batch and block until the leader reports their result.
//!
//! If one function fails, the update is rolled back, that function is retried
//! alone in its own update (its caller gets that outcome), and the remaining
//! functions run again together. Functions can therefore be invoked more
//! than once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use docstore_core::{BatchFn, Error, Result, Storage};

use crate::options::StoreOptions;

/// One-shot result slot a batch caller blocks on
#[derive(Default)]
pub(crate) struct Reply {
    result: Mutex<Option<Result<()>>>,
    ready: Condvar,
}

impl Reply {
    fn send(&self, result: Result<()>) {
        *self.result.lock() = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> Result<()> {
        let mut slot = self.result.lock();
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            self.ready.wait(&mut slot);
        }
    }
}

/// A queued batch function and where its result goes
pub(crate) struct Call {
    f: BatchFn,
    reply: Arc<Reply>,
}

impl Call {
    pub(crate) fn new(f: BatchFn) -> (Call, Arc<Reply>) {
        let reply = Arc::new(Reply::default());
        (
            Call {
                f,
                reply: Arc::clone(&reply),
            },
            reply,
        )
    }
}

/// Collects concurrent batch calls for one store
pub(crate) struct Batcher {
    pending: Mutex<Option<Vec<Call>>>,
    full: Condvar,
    max_size: usize,
    max_delay: Duration,
}

impl Batcher {
    pub(crate) fn new(options: &StoreOptions) -> Self {
        Batcher {
            pending: Mutex::new(None),
            full: Condvar::new(),
            max_size: options.max_batch_size.max(1),
            max_delay: options.max_batch_delay,
        }
    }

    /// Queue `f` and block until the batch holding it has been applied
    pub(crate) fn submit<S: Storage + ?Sized>(&self, store: &S, f: BatchFn) -> Result<()> {
        let (call, reply) = Call::new(f);

        let mut pending = self.pending.lock();
        if let Some(calls) = pending.as_mut() {
            calls.push(call);
            if calls.len() >= self.max_size {
                self.full.notify_one();
            }
            drop(pending);
            return reply.wait();
        }
        *pending = Some(vec![call]);

        let deadline = Instant::now() + self.max_delay;
        while pending.as_ref().map_or(0, Vec::len) < self.max_size {
            if self.full.wait_until(&mut pending, deadline).timed_out() {
                break;
            }
        }
        let calls = pending.take().unwrap_or_default();
        drop(pending);

        debug!(target: "docstore::storage", calls = calls.len(), "flushing batch");
        run_calls(store, calls);
        reply.wait()
    }
}

/// Apply `calls` in as few updates as possible and answer every caller
pub(crate) fn run_calls<S: Storage + ?Sized>(store: &S, mut calls: Vec<Call>) {
    while !calls.is_empty() {
        let mut failed: Option<usize> = None;
        let result = store.update(&mut |tx| {
            for (i, call) in calls.iter().enumerate() {
                if let Err(e) = (call.f)(tx) {
                    failed = Some(i);
                    return Err(e);
                }
            }
            Ok(())
        });

        match (result, failed) {
            (Ok(()), _) => {
                for call in calls.drain(..) {
                    call.reply.send(Ok(()));
                }
            }
            (Err(e), Some(i)) => {
                let call = calls.remove(i);
                debug!(
                    target: "docstore::storage",
                    error = %e,
                    remaining = calls.len(),
                    "batch function failed, retrying it alone"
                );
                let solo = store.update(&mut |tx| (call.f)(tx));
                call.reply.send(solo);
            }
            (Err(e), None) => {
                warn!(target: "docstore::storage", error = %e, "batch commit failed");
                let reason = e.to_string();
                let mut rest = calls.drain(..);
                if let Some(first) = rest.next() {
                    first.reply.send(Err(e));
                }
                for call in rest {
                    call.reply.send(Err(Error::unavailable(reason.clone())));
                }
            }
        }
    }
}
