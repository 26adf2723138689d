//! The home-worker contract: one thread owns the runtime, jobs run one at
//! a time in enqueue order, producers never block.

use inkstone_plugin_host::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Holds an `Rc`, so it cannot leave the thread that built it.
struct LocalRuntime {
    home: ThreadId,
    history: Rc<RefCell<Vec<Value>>>,
    seen_threads: Arc<Mutex<Vec<ThreadId>>>,
    disposed: Arc<AtomicBool>,
}

impl ScriptRuntime for LocalRuntime {
    fn invoke(&mut self, callback: &CallbackId, args: &Value) -> Result<Value, ScriptError> {
        self.seen_threads.lock().unwrap().push(thread::current().id());
        match callback.as_str() {
            "push" => {
                self.history.borrow_mut().push(args.clone());
                Ok(json!(self.history.borrow().len()))
            }
            "history" => Ok(Value::Array(self.history.borrow().clone())),
            "panic" => panic!("script blew up"),
            other => Err(ScriptError::UnknownCallback(other.into())),
        }
    }

    fn dispose(&mut self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

struct Fixture {
    worker: PluginWorker<LocalRuntime>,
    handle: WorkerHandle<LocalRuntime>,
    seen_threads: Arc<Mutex<Vec<ThreadId>>>,
    disposed: Arc<AtomicBool>,
    home: ThreadId,
}

fn spawn(capacity: usize) -> Fixture {
    let seen_threads = Arc::new(Mutex::new(Vec::new()));
    let disposed = Arc::new(AtomicBool::new(false));
    let (home_tx, home_rx) = mpsc::channel();
    let (worker, handle) = {
        let seen_threads = Arc::clone(&seen_threads);
        let disposed = Arc::clone(&disposed);
        PluginWorker::spawn("local.plugin", capacity, move || {
            let home = thread::current().id();
            home_tx.send(home).unwrap();
            Ok(LocalRuntime {
                home,
                history: Rc::new(RefCell::new(Vec::new())),
                seen_threads,
                disposed,
            })
        })
        .unwrap()
    };
    Fixture {
        worker,
        handle,
        seen_threads,
        disposed,
        home: home_rx.recv().unwrap(),
    }
}

fn call(handle: &WorkerHandle<LocalRuntime>, callback: &str, args: Value) -> Result<Value, ScriptError> {
    handle.invoke(callback.into(), args).unwrap().blocking_recv().unwrap()
}

/// Parks the worker inside a job until the returned sender fires.
fn block_worker(handle: &WorkerHandle<LocalRuntime>) -> mpsc::Sender<()> {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    handle
        .submit(move |_| {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        })
        .unwrap();
    started_rx.recv().unwrap();
    release_tx
}

// ================================================================
// Ownership
// ================================================================

#[test]
fn runtime_never_leaves_home_thread() {
    let fx = spawn(16);
    assert_ne!(fx.home, thread::current().id());

    let producers: Vec<_> = (0..3)
        .map(|i| {
            let handle = fx.handle.clone();
            thread::spawn(move || call(&handle, "push", json!(i)).unwrap())
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    let seen = fx.seen_threads.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|t| *t == fx.home));
    fx.worker.shutdown();
}

#[test]
fn runtime_home_is_recorded_by_runtime() {
    let fx = spawn(4);
    let (tx, rx) = mpsc::channel();
    fx.handle
        .submit(move |rt: &mut LocalRuntime| tx.send(rt.home == thread::current().id()).unwrap())
        .unwrap();
    assert!(rx.recv().unwrap());
    fx.worker.shutdown();
}

// ================================================================
// Ordering
// ================================================================

#[test]
fn jobs_from_many_producers_keep_per_producer_order() {
    let fx = spawn(512);
    let producers: Vec<_> = (0..4)
        .map(|p| {
            let handle = fx.handle.clone();
            thread::spawn(move || {
                for seq in 0..50 {
                    handle
                        .submit(move |rt: &mut LocalRuntime| {
                            rt.history.borrow_mut().push(json!([p, seq]));
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    let Value::Array(history) = call(&fx.handle, "history", Value::Null).unwrap() else {
        panic!("history is not an array");
    };
    assert_eq!(history.len(), 200);
    for p in 0..4 {
        let seqs: Vec<u64> = history
            .iter()
            .filter(|e| e[0] == json!(p))
            .map(|e| e[1].as_u64().unwrap())
            .collect();
        assert_eq!(seqs, (0..50).collect::<Vec<u64>>());
    }
    fx.worker.shutdown();
}

// ================================================================
// Backpressure and shutdown
// ================================================================

#[test]
fn full_queue_is_reported_not_awaited() {
    let fx = spawn(2);
    let release = block_worker(&fx.handle);

    fx.handle.submit(|_| {}).unwrap();
    fx.handle.submit(|_| {}).unwrap();
    assert_eq!(fx.handle.queued(), 2);
    assert_eq!(
        fx.handle.submit(|_| {}),
        Err(DispatchError::QueueFull {
            plugin_id: "local.plugin".into()
        })
    );

    release.send(()).unwrap();
    assert_eq!(call(&fx.handle, "history", Value::Null), Ok(json!([])));
    fx.worker.shutdown();
}

#[test]
fn shutdown_discards_queued_jobs() {
    let fx = spawn(8);
    let release = block_worker(&fx.handle);

    let ran = Arc::new(AtomicBool::new(false));
    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        fx.handle
            .submit(move |_| ran.store(true, Ordering::SeqCst))
            .unwrap();
    }

    let watcher = {
        let handle = fx.handle.clone();
        thread::spawn(move || {
            while !handle.is_stopped() {
                thread::sleep(Duration::from_millis(1));
            }
            release.send(()).unwrap();
        })
    };

    let discarded = fx.worker.shutdown();
    watcher.join().unwrap();

    assert_eq!(discarded, 3);
    assert!(!ran.load(Ordering::SeqCst));
    assert!(fx.disposed.load(Ordering::SeqCst));
    assert!(matches!(
        fx.handle.submit(|_| {}),
        Err(DispatchError::WorkerStopped { .. })
    ));
}

#[test]
fn pending_invoke_is_dropped_on_shutdown() {
    let fx = spawn(8);
    let release = block_worker(&fx.handle);
    let pending = fx.handle.invoke("push".into(), json!(1)).unwrap();

    let handle = fx.handle.clone();
    let watcher = thread::spawn(move || {
        while !handle.is_stopped() {
            thread::sleep(Duration::from_millis(1));
        }
        release.send(()).unwrap();
    });
    fx.worker.shutdown();
    watcher.join().unwrap();

    assert!(pending.blocking_recv().is_err());
}

// ================================================================
// Failure isolation
// ================================================================

#[test]
fn panicking_callback_is_contained() {
    let fx = spawn(8);
    match call(&fx.handle, "panic", Value::Null) {
        Err(ScriptError::Panicked(msg)) => assert_eq!(msg, "script blew up"),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(call(&fx.handle, "push", json!("after")), Ok(json!(1)));
    fx.worker.shutdown();
}

#[test]
fn panicking_job_is_contained() {
    let fx = spawn(8);
    fx.handle.submit(|_| panic!("raw job panic")).unwrap();
    assert_eq!(call(&fx.handle, "push", json!("still alive")), Ok(json!(1)));
    fx.worker.shutdown();
}

#[test]
fn unknown_callback_is_an_error() {
    let fx = spawn(8);
    assert_eq!(
        call(&fx.handle, "nope", Value::Null),
        Err(ScriptError::UnknownCallback("nope".into()))
    );
    fx.worker.shutdown();
}
