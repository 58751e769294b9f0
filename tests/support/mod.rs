use std::sync::Once;

use chrono::{DateTime, TimeZone, Utc};
use tracing_subscriber::EnvFilter;

use tokkakari::breakdown::{BreakdownFailure, BreakdownService};
use tokkakari::clock::ManualClock;
use tokkakari::config::Config;
use tokkakari::kv::MemoryStore;
use tokkakari::planner::TaskPlanner;
use tokkakari::storage::Storage;

static TRACING: Once = Once::new();

/// Route crate logs through `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Fixed start instant shared by the integration suites.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

/// Planner over in-memory storage with default configuration.
#[allow(dead_code)]
pub fn planner() -> (TaskPlanner, ManualClock) {
    planner_with_storage(Storage::in_memory())
}

/// Planner over a prepared storage (for seeding state before startup).
pub fn planner_with_storage(storage: Storage) -> (TaskPlanner, ManualClock) {
    init_tracing();
    let clock = ManualClock::new(start_time());
    let planner = TaskPlanner::new(storage, Box::new(clock.clone()));
    (planner, clock)
}

/// Planner whose store enforces a hard byte quota.
#[allow(dead_code)]
pub fn quota_planner(quota: u64) -> (TaskPlanner, ManualClock) {
    let mut config = Config::default();
    config.storage.quota_bytes = quota;
    let storage = Storage::new(Box::new(MemoryStore::with_quota(quota)), config);
    planner_with_storage(storage)
}

/// Breakdown service answering with a canned result.
#[allow(dead_code)]
pub struct StubService(pub Result<Vec<String>, BreakdownFailure>);

impl BreakdownService for StubService {
    fn breakdown(
        &self,
        _task_title: &str,
        _description: &str,
    ) -> Result<Vec<String>, BreakdownFailure> {
        self.0.clone()
    }
}

/// Convenience for a service that succeeds with the given steps.
#[allow(dead_code)]
pub fn stub_steps(steps: &[&str]) -> StubService {
    StubService(Ok(steps.iter().map(|s| s.to_string()).collect()))
}
