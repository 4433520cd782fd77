//! Recording collaborators: event logs, callbacks and executors.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sourced_dispatch::{
    CommandCallback, CommandResult, ExecutorError, ExecutorService, Message, Task, TaskExecutor,
};

/// Ordered, shareable log of what happened during a test.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

/// Collects every result delivered to callbacks created from it.
#[derive(Clone)]
pub struct ResultSink {
    tx: mpsc::Sender<(String, CommandResult)>,
    rx: Arc<Mutex<Receiver<(String, CommandResult)>>>,
}

impl ResultSink {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// A callback that records `(command id, result)`.
    pub fn callback(&self) -> Box<dyn CommandCallback> {
        let tx = self.tx.clone();
        Box::new(move |command: &Message, result: CommandResult| {
            let _ = tx.send((command.id().to_string(), result));
        })
    }

    /// A callback that logs `"callback"` before recording.
    pub fn logging_callback(&self, log: &EventLog) -> Box<dyn CommandCallback> {
        let tx = self.tx.clone();
        let log = log.clone();
        Box::new(move |command: &Message, result: CommandResult| {
            log.push("callback");
            let _ = tx.send((command.id().to_string(), result));
        })
    }

    pub fn next(&self) -> (String, CommandResult) {
        self.rx
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(5))
            .expect("no result within 5s")
    }

    /// Everything delivered so far, without waiting.
    pub fn drain(&self) -> Vec<(String, CommandResult)> {
        self.rx.lock().unwrap().try_iter().collect()
    }
}

/// Plain executor that logs each submission and runs the task inline.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    log: EventLog,
    submitted: Arc<AtomicUsize>,
}

impl RecordingExecutor {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            submitted: Arc::default(),
        }
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

impl TaskExecutor for RecordingExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.log.push("submitted");
        task();
        Ok(())
    }
}

/// Shutdown-capable executor that counts shutdown calls.
#[derive(Clone, Default)]
pub struct CountingExecutorService {
    submitted: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

impl CountingExecutorService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl TaskExecutor for CountingExecutorService {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        if self.is_shutdown() {
            return Err(ExecutorError::Shutdown);
        }
        self.submitted.fetch_add(1, Ordering::SeqCst);
        task();
        Ok(())
    }
}

impl ExecutorService for CountingExecutorService {
    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn is_shutdown(&self) -> bool {
        self.shutdowns() > 0
    }
}
