// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::pin::Pin;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::task::{Context, Poll};
use core::time::Duration;
use std::sync::Arc;
use std::{fmt, io};

const MAX_THREADS: usize = 4;
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Starts a worker running the given loop.
type Spawner = fn(Box<dyn FnOnce() + Send>) -> io::Result<()>;

struct Shared {
    receiver: flume::Receiver<async_task::Runnable>,
    thread_count: AtomicUsize,
    pending_count: AtomicUsize,
    spawner: Spawner,
}

/// Worker threads that run blocking backend calls on behalf of the async read API.
///
/// Workers are started on demand, up to [`MAX_THREADS`] while calls queue up. Idle workers
/// exit after [`IDLE_TIMEOUT`], except the last one, which exits once every clone of the
/// dispatcher and every queued call is gone.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    sender: flume::Sender<async_task::Runnable>,
    shared: Arc<Shared>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::with_spawner(spawn_thread)
    }

    fn with_spawner(spawner: Spawner) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            shared: Arc::new(Shared {
                receiver,
                thread_count: AtomicUsize::new(0),
                pending_count: AtomicUsize::new(0),
                spawner,
            }),
        }
    }

    /// Runs a blocking call on a worker thread.
    ///
    /// The closure must own everything it touches; dropping or leaking the returned future
    /// never invalidates data the closure still uses. A panic in the closure is re-raised on
    /// the awaiting task.
    ///
    /// # Errors
    ///
    /// Fails if no worker is running and a new one cannot be started. The closure is dropped
    /// without running.
    pub(crate) fn dispatch<T: Send + 'static>(&self, f: impl FnOnce() -> T + Send + 'static) -> io::Result<DispatchFuture<T>> {
        let sender = self.sender.clone();
        let schedule = move |runnable: async_task::Runnable| {
            let _ = sender.send(runnable);
        };

        let (runnable, task) = async_task::spawn(async move { std::panic::catch_unwind(core::panic::AssertUnwindSafe(f)) }, schedule);

        let prev_pending = self.shared.pending_count.fetch_add(1, Ordering::Relaxed);
        let threads = self.shared.thread_count.load(Ordering::Acquire);

        // Scale up if calls are queuing and we haven't hit the limit.
        if prev_pending >= threads
            && threads < MAX_THREADS
            && self
                .shared
                .thread_count
                .compare_exchange(threads, threads + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            && let Err(error) = self.spawn_worker()
        {
            if self.shared.thread_count.load(Ordering::Acquire) == 0 {
                // Nobody would ever run the call; drop it unscheduled.
                let _ = self.shared.pending_count.fetch_sub(1, Ordering::Relaxed);
                return Err(error);
            }
            tracing::warn!(%error, "failed to spawn additional dfs dispatcher worker");
        }

        runnable.schedule();

        Ok(DispatchFuture { task })
    }

    /// Starts a worker the caller has already counted, uncounting it on failure.
    fn spawn_worker(&self) -> io::Result<()> {
        let shared = Arc::clone(&self.shared);
        (self.shared.spawner)(Box::new(move || worker_loop(&shared))).inspect_err(|_| {
            let _ = self.shared.thread_count.fetch_sub(1, Ordering::AcqRel);
        })
    }
}

fn spawn_thread(work: Box<dyn FnOnce() + Send>) -> io::Result<()> {
    std::thread::Builder::new().name("dfs-dispatcher".into()).spawn(work).map(drop)
}

fn worker_loop(shared: &Shared) {
    loop {
        match shared.receiver.recv_timeout(IDLE_TIMEOUT) {
            Ok(runnable) => {
                let _ = runnable.run();
                let _ = shared.pending_count.fetch_sub(1, Ordering::Relaxed);
            }
            Err(flume::RecvTimeoutError::Timeout) => {
                // Scale down, but keep at least one worker.
                let mut count = shared.thread_count.load(Ordering::Relaxed);
                while count > 1 {
                    match shared
                        .thread_count
                        .compare_exchange_weak(count, count - 1, Ordering::AcqRel, Ordering::Relaxed)
                    {
                        Ok(_) => return,
                        Err(actual) => count = actual,
                    }
                }
            }
            Err(flume::RecvTimeoutError::Disconnected) => {
                let _ = shared.thread_count.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("threads", &self.shared.thread_count.load(Ordering::Relaxed))
            .field("pending", &self.shared.pending_count.load(Ordering::Relaxed))
            .finish()
    }
}

/// Resolves to the result of a dispatched call.
///
/// Dropping it before completion abandons the result; the call itself may still run.
pub(crate) struct DispatchFuture<T> {
    task: async_task::Task<std::thread::Result<T>>,
}

impl<T> fmt::Debug for DispatchFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchFuture").field("finished", &self.task.is_finished()).finish()
    }
}

impl<T> Future for DispatchFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        match Pin::new(&mut self.get_mut().task).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(value),
            Poll::Ready(Err(payload)) => std::panic::resume_unwind(payload),
            Poll::Pending => Poll::Pending,
        }
    }
}
