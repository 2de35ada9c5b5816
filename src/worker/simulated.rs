use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};

use crate::error::BoxError;
use crate::scheduler::JobParams;
use crate::worker::Worker;

/// Stand-in for a real generator: sleeps, then returns a random number.
#[derive(Debug, Clone)]
pub struct SimulatedWorker {
    delay: Duration,
    fail_at: Option<u64>,
    calls: u64,
}

impl SimulatedWorker {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_at: None,
            calls: 0,
        }
    }

    /// Fail the `call`-th iteration (1-based, counted across all jobs).
    pub fn with_fail_at(mut self, call: u64) -> Self {
        self.fail_at = Some(call);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Worker for SimulatedWorker {
    fn run_iteration(&mut self, params: &JobParams) -> Result<Value, BoxError> {
        std::thread::sleep(self.delay);
        self.calls += 1;

        if self.fail_at == Some(self.calls) {
            return Err(format!("simulated failure on call {}", self.calls).into());
        }

        let value = rand::thread_rng().gen_range(0..100_000u32);
        Ok(json!({
            "call": self.calls,
            "value": value,
            "prompt": params.args.first().cloned().unwrap_or(Value::Null),
        }))
    }
}
