//! Shared test doubles: a recording in-memory connection and its factory

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use sqlbridge::prelude::*;

/// Counters and switches shared by every connection a [`StubFactory`] opens
#[derive(Debug)]
pub struct Recorder {
    statements: Mutex<Vec<String>>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    connects: AtomicUsize,
    terminates: AtomicUsize,
    liveness_checks: AtomicUsize,
    fail_execute: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    fail_terminate: AtomicBool,
    alive: AtomicBool,
    /// Remaining successful connects before the factory starts failing
    connect_budget: AtomicUsize,
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            terminates: AtomicUsize::new(0),
            liveness_checks: AtomicUsize::new(0),
            fail_execute: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
            fail_rollback: AtomicBool::new(false),
            fail_terminate: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            connect_budget: AtomicUsize::new(usize::MAX),
        }
    }
}

impl Recorder {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn terminates(&self) -> usize {
        self.terminates.load(Ordering::SeqCst)
    }

    pub fn liveness_checks(&self) -> usize {
        self.liveness_checks.load(Ordering::SeqCst)
    }

    pub fn set_fail_execute(&self, fail: bool) {
        self.fail_execute.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_terminate(&self, fail: bool) {
        self.fail_terminate.store(fail, Ordering::SeqCst);
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Allow `n` more connects, then fail every further one
    pub fn allow_connects(&self, n: usize) {
        self.connect_budget.store(n, Ordering::SeqCst);
    }
}

/// In-memory connection that records what it is asked to do
#[derive(Debug)]
pub struct StubConnection {
    id: usize,
    recorder: Arc<Recorder>,
    terminated: AtomicBool,
}

impl StubConnection {
    pub fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl Connection for StubConnection {
    async fn execute(&self, sql: &str) -> Result<u64> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(Error::not_connected("stub connection terminated"));
        }
        self.recorder.statements.lock().push(sql.to_string());
        if self.recorder.fail_execute.load(Ordering::SeqCst) {
            return Err(Error::statement_with_sql("stub execute failure", sql));
        }
        Ok(1)
    }

    async fn commit(&self) -> Result<()> {
        self.recorder.commits.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fail_commit.load(Ordering::SeqCst) {
            return Err(Error::statement("stub commit failure"));
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.recorder.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fail_rollback.load(Ordering::SeqCst) {
            return Err(Error::statement("stub rollback failure"));
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.recorder.liveness_checks.fetch_add(1, Ordering::SeqCst);
        !self.terminated.load(Ordering::SeqCst) && self.recorder.alive.load(Ordering::SeqCst)
    }

    async fn terminate(&self) -> Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        self.recorder.terminates.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fail_terminate.load(Ordering::SeqCst) {
            return Err(Error::connection("stub terminate failure"));
        }
        Ok(())
    }
}

/// Factory handing out [`StubConnection`]s bound to one [`Recorder`]
#[derive(Debug, Default)]
pub struct StubFactory {
    recorder: Arc<Recorder>,
}

impl StubFactory {
    pub fn new() -> (Arc<Self>, Arc<Recorder>) {
        let factory = Arc::new(Self::default());
        let recorder = Arc::clone(&factory.recorder);
        (factory, recorder)
    }
}

#[async_trait]
impl ConnectionFactory for StubFactory {
    async fn connect(&self, _params: &ConnectionParameters) -> Result<Box<dyn Connection>> {
        let budget = &self.recorder.connect_budget;
        if budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            return Err(Error::connection("stub connect refused"));
        }

        let id = self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubConnection {
            id,
            recorder: Arc::clone(&self.recorder),
            terminated: AtomicBool::new(false),
        }))
    }

    fn driver_name(&self) -> &str {
        "stub"
    }
}

/// Parameters every test uses
pub fn test_params() -> ConnectionParameters {
    ConnectionParameters::new()
        .with("host", "localhost")
        .with("user", "tester")
        .with("password", "secret")
        .with("database", "test")
}

/// Template values from literal pairs
pub fn values(pairs: &[(&str, &str)]) -> TemplateValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
