mod builds;
mod core;
mod test_results;

use async_trait::async_trait;

pub use self::builds::{BuildListQuery, BuildQueryOrder};
pub use self::core::DevOpsClient;

use super::helix;
use super::types::{Build, HelixLogInfo, TestCaseResult, TestOutcome, TestRun};
use crate::error::Result;
use crate::providers::DevOpsSource;

#[async_trait]
impl DevOpsSource for DevOpsClient {
    async fn list_builds(&self, project: &str, query: &BuildListQuery) -> Result<Vec<Build>> {
        DevOpsClient::list_builds(self, project, query).await
    }

    async fn get_build(&self, project: &str, build_id: i32) -> Result<Build> {
        DevOpsClient::get_build(self, project, build_id).await
    }

    async fn list_test_runs(&self, project: &str, build_id: i32) -> Result<Vec<TestRun>> {
        DevOpsClient::list_test_runs(self, project, build_id).await
    }

    async fn list_failed_test_results(
        &self,
        project: &str,
        run_id: i32,
    ) -> Result<Vec<TestCaseResult>> {
        self.list_test_results(project, run_id, &[TestOutcome::Failed])
            .await
    }

    async fn helix_log_info(
        &self,
        project: &str,
        run_id: i32,
        work_item_id: i32,
    ) -> Result<HelixLogInfo> {
        helix::fetch_helix_log_info(self, project, run_id, work_item_id).await
    }
}
