pub mod azure;

use async_trait::async_trait;

use crate::error::Result;
use azure::client::BuildListQuery;
use azure::types::{Build, HelixLogInfo, TestCaseResult, TestRun};

/// Read access to builds and test results, as needed by the aggregation engine.
///
/// Implemented by the HTTP client; tests substitute in-memory sources.
#[async_trait]
pub trait DevOpsSource: Sync {
    async fn list_builds(&self, project: &str, query: &BuildListQuery) -> Result<Vec<Build>>;

    async fn get_build(&self, project: &str, build_id: i32) -> Result<Build>;

    async fn list_test_runs(&self, project: &str, build_id: i32) -> Result<Vec<TestRun>>;

    /// Test case results of the run whose outcome is `Failed`.
    async fn list_failed_test_results(
        &self,
        project: &str,
        run_id: i32,
    ) -> Result<Vec<TestCaseResult>>;

    /// Log URIs uploaded by the given work item result.
    async fn helix_log_info(
        &self,
        project: &str,
        run_id: i32,
        work_item_id: i32,
    ) -> Result<HelixLogInfo>;
}
