//! Per-plugin home worker.
//!
//! A plugin's interpreter lives on exactly one OS thread for its whole life.
//! Everything that wants to run script code (host calls, event handlers,
//! config watchers) goes through a bounded queue that this thread drains one
//! job at a time, in enqueue order. Producers never block: a full queue is
//! reported as [`DispatchError::QueueFull`].
//!
//! Nothing can preempt a runtime that is executing. Long callbacks are
//! expected to poll [`Interrupt::is_interrupted`]; a worker that still does
//! not stop within the shutdown grace period is detached.

use crate::error::{DispatchError, PluginHostError, ScriptError};
use crate::ids::CallbackId;
use crate::runtime::ScriptRuntime;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Unit of work run against a plugin's runtime on its home worker.
pub type Job<R> = Box<dyn FnOnce(&mut R) + Send + 'static>;

/// How long `shutdown` waits for the job in flight before detaching.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Cancels one queued or running call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Stop signal shared between a plugin's worker and its runtime.
///
/// Set while the running call has been cancelled, and permanently once the
/// worker is shutting down.
#[derive(Debug, Default)]
pub struct Interrupt {
    shutdown: AtomicBool,
    current: Mutex<Option<CancelToken>>,
}

impl Interrupt {
    pub fn is_interrupted(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
            || self
                .current
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(CancelToken::is_cancelled)
    }

    fn enter(&self, token: CancelToken) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn leave(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

enum Message<R> {
    Run(Job<R>),
    Stop,
}

/// Cloneable producer side of a plugin's queue.
pub struct WorkerHandle<R> {
    plugin_id: Arc<str>,
    sender: mpsc::Sender<Message<R>>,
    stopping: Arc<AtomicBool>,
    interrupt: Arc<Interrupt>,
}

impl<R> Clone for WorkerHandle<R> {
    fn clone(&self) -> Self {
        Self {
            plugin_id: Arc::clone(&self.plugin_id),
            sender: self.sender.clone(),
            stopping: Arc::clone(&self.stopping),
            interrupt: Arc::clone(&self.interrupt),
        }
    }
}

impl<R> fmt::Debug for WorkerHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("plugin_id", &self.plugin_id)
            .field("stopping", &self.stopping.load(Ordering::Relaxed))
            .finish()
    }
}

impl<R: ScriptRuntime + 'static> WorkerHandle<R> {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn interrupt(&self) -> &Arc<Interrupt> {
        &self.interrupt
    }

    /// True once shutdown has begun or the worker thread has exited.
    pub fn is_stopped(&self) -> bool {
        self.stopping.load(Ordering::Acquire) || self.sender.is_closed()
    }

    /// Jobs waiting in the queue, not counting the one running.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Enqueues `job` without waiting.
    pub fn submit(&self, job: impl FnOnce(&mut R) + Send + 'static) -> Result<(), DispatchError> {
        if self.stopping.load(Ordering::Acquire) {
            return Err(self.stopped());
        }
        self.sender
            .try_send(Message::Run(Box::new(job)))
            .map_err(|e| match e {
                TrySendError::Full(_) => DispatchError::QueueFull {
                    plugin_id: self.plugin_id.to_string(),
                },
                TrySendError::Closed(_) => self.stopped(),
            })
    }

    /// Enqueues a runtime call and returns a receiver for its result.
    ///
    /// The receiver resolves with an error if the runtime panics, and is
    /// dropped unresolved if the job is discarded by shutdown.
    pub fn invoke(
        &self,
        callback: CallbackId,
        args: Value,
    ) -> Result<oneshot::Receiver<Result<Value, ScriptError>>, DispatchError> {
        self.invoke_with(callback, args, || Ok(()))
            .map(|(receiver, _)| receiver)
    }

    /// Like [`invoke`](Self::invoke), with a `prepare` step that runs on the
    /// worker immediately before the runtime does. An error from `prepare`
    /// is the call's result and the runtime is not entered.
    ///
    /// The returned token cancels the call: a call cancelled while queued is
    /// skipped, one cancelled while running sees [`Interrupt::is_interrupted`].
    pub fn invoke_with<P>(
        &self,
        callback: CallbackId,
        args: Value,
        prepare: P,
    ) -> Result<(oneshot::Receiver<Result<Value, ScriptError>>, CancelToken), DispatchError>
    where
        P: FnOnce() -> Result<(), ScriptError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let token = CancelToken::default();
        let job_token = token.clone();
        let plugin_id = Arc::clone(&self.plugin_id);
        let interrupt = Arc::clone(&self.interrupt);
        self.submit(move |runtime: &mut R| {
            if job_token.is_cancelled() {
                debug!(plugin_id = %plugin_id, callback = %callback, "Skipping cancelled call");
                return;
            }
            interrupt.enter(job_token);
            let result = prepare().and_then(|()| {
                panic::catch_unwind(AssertUnwindSafe(|| runtime.invoke(&callback, &args)))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        warn!(plugin_id = %plugin_id, callback = %callback, "Plugin callback panicked: {}", message);
                        Err(ScriptError::Panicked(message))
                    })
            });
            interrupt.leave();
            // Caller may have timed out and gone away.
            let _ = tx.send(result);
        })?;
        Ok((rx, token))
    }

    /// Enqueues a call whose result nobody waits for. Errors are logged.
    pub fn notify(&self, callback: CallbackId, args: Value) -> Result<(), DispatchError> {
        let plugin_id = Arc::clone(&self.plugin_id);
        self.submit(move |runtime: &mut R| {
            if let Err(e) = runtime.invoke(&callback, &args) {
                warn!(plugin_id = %plugin_id, callback = %callback, "Plugin callback failed: {}", e);
            }
        })
    }

    fn stopped(&self) -> DispatchError {
        DispatchError::WorkerStopped {
            plugin_id: self.plugin_id.to_string(),
        }
    }

    fn signal_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.interrupt.shut_down();
        // Wakes an idle worker. A full queue means the worker is busy and
        // will see the flag on its next dequeue.
        let _ = self.sender.try_send(Message::Stop);
    }
}

/// Owner of a plugin's home worker thread.
pub struct PluginWorker<R: ScriptRuntime + 'static> {
    handle: WorkerHandle<R>,
    thread: Option<JoinHandle<usize>>,
    done: std_mpsc::Receiver<usize>,
}

impl<R: ScriptRuntime + 'static> fmt::Debug for PluginWorker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginWorker")
            .field("plugin_id", &self.handle.plugin_id)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl<R: ScriptRuntime + 'static> PluginWorker<R> {
    /// Starts the home worker and builds the runtime on it.
    ///
    /// Returns once `factory` has finished. A factory error or panic is
    /// reported as [`PluginHostError::InitializationFailed`].
    pub fn spawn<F>(
        plugin_id: impl Into<String>,
        queue_capacity: usize,
        factory: F,
    ) -> Result<(Self, WorkerHandle<R>), PluginHostError>
    where
        F: FnOnce() -> Result<R, ScriptError> + Send + 'static,
    {
        Self::spawn_with_interrupt(plugin_id, queue_capacity, Arc::default(), factory)
    }

    /// Like [`spawn`](Self::spawn), sharing `interrupt` with the caller so the
    /// runtime can be handed the same signal the worker raises.
    pub fn spawn_with_interrupt<F>(
        plugin_id: impl Into<String>,
        queue_capacity: usize,
        interrupt: Arc<Interrupt>,
        factory: F,
    ) -> Result<(Self, WorkerHandle<R>), PluginHostError>
    where
        F: FnOnce() -> Result<R, ScriptError> + Send + 'static,
    {
        let plugin_id: Arc<str> = Arc::from(plugin_id.into());
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let stopping = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), ScriptError>>(1);
        let (done_tx, done) = std_mpsc::sync_channel::<usize>(1);

        let thread = {
            let worker_id = Arc::clone(&plugin_id);
            let stopping = Arc::clone(&stopping);
            thread::Builder::new()
                .name(format!("plugin-{plugin_id}"))
                .spawn(move || {
                    let runtime = match factory() {
                        Ok(runtime) => {
                            let _ = ready_tx.send(Ok(()));
                            runtime
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return 0;
                        }
                    };
                    let discarded = drain(&worker_id, runtime, receiver, &stopping);
                    let _ = done_tx.send(discarded);
                    discarded
                })
                .map_err(|e| PluginHostError::InitializationFailed {
                    plugin_id: plugin_id.to_string(),
                    message: format!("failed to start worker thread: {e}"),
                })?
        };

        let init_failed = |message: String| PluginHostError::InitializationFailed {
            plugin_id: plugin_id.to_string(),
            message,
        };
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(init_failed(e.to_string()));
            }
            Err(_) => {
                let message = match thread.join() {
                    Err(payload) => panic_message(payload.as_ref()),
                    Ok(_) => "worker exited during startup".to_string(),
                };
                return Err(init_failed(message));
            }
        }

        debug!(plugin_id = %plugin_id, capacity = queue_capacity.max(1), "Plugin worker started");
        let handle = WorkerHandle {
            plugin_id,
            sender,
            stopping,
            interrupt,
        };
        Ok((
            Self {
                handle: handle.clone(),
                thread: Some(thread),
                done,
            },
            handle,
        ))
    }

    pub fn handle(&self) -> WorkerHandle<R> {
        self.handle.clone()
    }

    pub fn plugin_id(&self) -> &str {
        self.handle.plugin_id()
    }

    /// [`shutdown_within`](Self::shutdown_within) using [`DEFAULT_SHUTDOWN_GRACE`].
    pub fn shutdown(self) -> usize {
        self.shutdown_within(DEFAULT_SHUTDOWN_GRACE)
    }

    /// Stops accepting jobs, raises the interrupt, discards whatever is
    /// queued and joins the thread.
    ///
    /// A job still running after `grace` is abandoned: the thread is
    /// detached and exits on its own once the job returns. Returns the
    /// number of discarded jobs, or 0 if the thread was detached.
    pub fn shutdown_within(mut self, grace: Duration) -> usize {
        self.handle.signal_stop();
        let Some(thread) = self.thread.take() else {
            return 0;
        };
        if thread.thread().id() == thread::current().id() {
            // Called from one of this plugin's own jobs; the loop exits after it returns.
            return 0;
        }
        let plugin_id = &self.handle.plugin_id;
        match self.done.recv_timeout(grace) {
            Ok(discarded) => {
                let _ = thread.join();
                debug!(plugin_id = %plugin_id, discarded, "Plugin worker stopped");
                discarded
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    plugin_id = %plugin_id,
                    grace_ms = grace.as_millis() as u64,
                    "Plugin worker still busy after grace period, detaching"
                );
                0
            }
            Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    warn!(plugin_id = %plugin_id, "Plugin worker thread panicked");
                }
                0
            }
        }
    }
}

impl<R: ScriptRuntime + 'static> Drop for PluginWorker<R> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.handle.signal_stop();
        }
    }
}

fn drain<R: ScriptRuntime>(
    plugin_id: &str,
    mut runtime: R,
    mut receiver: mpsc::Receiver<Message<R>>,
    stopping: &AtomicBool,
) -> usize {
    let mut discarded = 0;
    while let Some(message) = receiver.blocking_recv() {
        if stopping.load(Ordering::Acquire) {
            if let Message::Run(_) = message {
                discarded += 1;
            }
            break;
        }
        match message {
            Message::Stop => break,
            Message::Run(job) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job(&mut runtime))) {
                    warn!(plugin_id = %plugin_id, "Plugin job panicked: {}", panic_message(payload.as_ref()));
                }
            }
        }
    }

    receiver.close();
    while let Ok(message) = receiver.try_recv() {
        if let Message::Run(_) = message {
            discarded += 1;
        }
    }

    if panic::catch_unwind(AssertUnwindSafe(|| runtime.dispose())).is_err() {
        warn!(plugin_id = %plugin_id, "Plugin runtime panicked during dispose");
    }
    discarded
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
