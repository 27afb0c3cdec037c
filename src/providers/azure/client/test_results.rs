use tokio::io::AsyncWrite;

use super::core::{DevOpsClient, BINARY_CONTENT};
use crate::error::Result;
use crate::providers::azure::types::{TestAttachment, TestCaseResult, TestOutcome, TestRun};

const TEST_RUN_API_VERSION: &str = "5.0";
// `outcomes` filtering on the results endpoint needs 5.1
const TEST_RESULT_API_VERSION: &str = "5.1";
const ATTACHMENT_API_VERSION: &str = "5.0-preview.1";

fn build_uri(build_id: i32) -> String {
    format!("vstfs:///Build/Build/{build_id}")
}

impl DevOpsClient {
    pub async fn list_test_runs(&self, project: &str, build_id: i32) -> Result<Vec<TestRun>> {
        let mut url = self.project_url(project, "test/runs")?;
        url.query_pairs_mut()
            .append_pair("buildUri", &build_uri(build_id))
            .append_pair("api-version", TEST_RUN_API_VERSION);

        self.fetch_all(url, None, None).await
    }

    pub async fn list_test_results(
        &self,
        project: &str,
        run_id: i32,
        outcomes: &[TestOutcome],
    ) -> Result<Vec<TestCaseResult>> {
        let mut url = self.project_url(project, &format!("test/runs/{run_id}/results"))?;
        {
            let mut pairs = url.query_pairs_mut();
            if !outcomes.is_empty() {
                let outcomes = outcomes
                    .iter()
                    .map(|o| o.as_query_value())
                    .collect::<Vec<_>>()
                    .join(",");
                pairs.append_pair("outcomes", &outcomes);
            }
            pairs.append_pair("api-version", TEST_RESULT_API_VERSION);
        }

        self.fetch_all(url, None, None).await
    }

    pub async fn list_test_result_attachments(
        &self,
        project: &str,
        run_id: i32,
        test_case_result_id: i32,
    ) -> Result<Vec<TestAttachment>> {
        let mut url = self.project_url(
            project,
            &format!("test/Runs/{run_id}/Results/{test_case_result_id}/attachments"),
        )?;
        url.query_pairs_mut()
            .append_pair("api-version", ATTACHMENT_API_VERSION);

        Ok(self.fetch_page(url).await?.items)
    }

    pub async fn download_test_result_attachment<W>(
        &self,
        project: &str,
        run_id: i32,
        test_case_result_id: i32,
        attachment_id: i32,
        sink: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut url = self.project_url(
            project,
            &format!(
                "test/Runs/{run_id}/Results/{test_case_result_id}/attachments/{attachment_id}"
            ),
        )?;
        url.query_pairs_mut()
            .append_pair("api-version", ATTACHMENT_API_VERSION);

        self.download(url, BINARY_CONTENT, sink).await
    }
}
