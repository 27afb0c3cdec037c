//! In-memory `DevOpsSource` for exercising aggregation without a server.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::client::BuildListQuery;
use super::types::{Build, HelixLogInfo, TestCaseResult, TestRun};
use crate::error::{Result, RunfoError};
use crate::providers::DevOpsSource;

#[derive(Default)]
pub struct FakeSource {
    builds: Vec<Build>,
    runs: HashMap<i32, Vec<TestRun>>,
    results: HashMap<i32, Vec<TestCaseResult>>,
    delays: HashMap<i32, u64>,
    failing_runs: HashSet<i32>,
    log_infos: HashMap<i32, HelixLogInfo>,
    build_queries: Mutex<Vec<BuildListQuery>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub result_calls: AtomicUsize,
    pub log_calls: AtomicUsize,
}

fn not_found(what: String) -> RunfoError {
    RunfoError::Api {
        url: what,
        status: StatusCode::NOT_FOUND,
        body: String::new(),
    }
}

impl FakeSource {
    pub fn with_builds(mut self, builds: Vec<Build>) -> Self {
        self.builds = builds;
        self
    }

    pub fn with_run(mut self, build_id: i32, run: TestRun) -> Self {
        self.runs.entry(build_id).or_default().push(run);
        self
    }

    pub fn with_results(mut self, run_id: i32, results: Vec<TestCaseResult>) -> Self {
        self.results.entry(run_id).or_default().extend(results);
        self
    }

    /// Delays the result fetch of a run, to shuffle completion order.
    pub fn with_delay(mut self, run_id: i32, millis: u64) -> Self {
        self.delays.insert(run_id, millis);
        self
    }

    pub fn with_failing_run(mut self, run_id: i32) -> Self {
        self.failing_runs.insert(run_id);
        self
    }

    pub fn with_log_info(mut self, work_item_id: i32, info: HelixLogInfo) -> Self {
        self.log_infos.insert(work_item_id, info);
        self
    }

    pub fn last_build_query(&self) -> Option<BuildListQuery> {
        self.build_queries.lock().ok()?.last().cloned()
    }
}

#[async_trait]
impl DevOpsSource for FakeSource {
    async fn list_builds(&self, _project: &str, query: &BuildListQuery) -> Result<Vec<Build>> {
        if let Ok(mut queries) = self.build_queries.lock() {
            queries.push(query.clone());
        }
        Ok(self.builds.clone())
    }

    async fn get_build(&self, _project: &str, build_id: i32) -> Result<Build> {
        self.builds
            .iter()
            .find(|b| b.id == build_id)
            .cloned()
            .ok_or_else(|| not_found(format!("build {build_id}")))
    }

    async fn list_test_runs(&self, _project: &str, build_id: i32) -> Result<Vec<TestRun>> {
        Ok(self.runs.get(&build_id).cloned().unwrap_or_default())
    }

    async fn list_failed_test_results(
        &self,
        _project: &str,
        run_id: i32,
    ) -> Result<Vec<TestCaseResult>> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(&millis) = self.delays.get(&run_id) {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_runs.contains(&run_id) {
            return Err(RunfoError::Api {
                url: format!("run {run_id}"),
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "boom".to_string(),
            });
        }

        Ok(self
            .results
            .get(&run_id)
            .map(|results| results.iter().filter(|r| r.is_failed()).cloned().collect())
            .unwrap_or_default())
    }

    async fn helix_log_info(
        &self,
        _project: &str,
        _run_id: i32,
        work_item_id: i32,
    ) -> Result<HelixLogInfo> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .log_infos
            .get(&work_item_id)
            .cloned()
            .unwrap_or_default())
    }
}
