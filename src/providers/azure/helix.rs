//! Pairing of failed test results with the Helix work item that carries their logs.
//!
//! Helix reports every work item as a test case result of its own, next to the individual
//! test results it produced. Logs are only uploaded against the work item, so every failure
//! has to be traced back to it before its console log or dump can be found.

use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use log::{debug, warn};
use serde::Deserialize;
use url::Url;

use super::build_test_info::HelixTestRunResult;
use super::client::DevOpsClient;
use super::types::{HelixLogInfo, TestCaseResult};
use crate::error::Result;
use crate::providers::DevOpsSource;

pub const CONCURRENCY: usize = 10;

const WORK_ITEM_SUFFIX: &str = " Work Item";
const UPLOAD_FILE_RESULTS: &str = "UploadFileResults.txt";

/// A failing test together with the work item result holding its logs.
///
/// When the failing result is itself the work item both sides share the same record.
#[derive(Debug, Clone)]
pub struct HelixTestResult {
    test: Arc<TestCaseResult>,
    work_item: Option<Arc<TestCaseResult>>,
}

impl HelixTestResult {
    pub fn new(test: Arc<TestCaseResult>, work_item: Option<Arc<TestCaseResult>>) -> Self {
        Self { test, work_item }
    }

    pub fn for_work_item(work_item: Arc<TestCaseResult>) -> Self {
        Self {
            test: Arc::clone(&work_item),
            work_item: Some(work_item),
        }
    }

    pub fn test(&self) -> &TestCaseResult {
        &self.test
    }

    /// `None` when no owning work item was found in the run.
    pub fn work_item(&self) -> Option<&TestCaseResult> {
        self.work_item.as_deref()
    }

    pub fn is_work_item_result(&self) -> bool {
        self.work_item
            .as_ref()
            .is_some_and(|w| w.id == self.test.id)
    }

    pub fn test_case_title(&self) -> &str {
        &self.test.test_case_title
    }
}

/// Decides which results are Helix work items and which work item a test belongs to.
pub trait HelixClassifier: Send + Sync {
    fn is_work_item(&self, result: &TestCaseResult) -> bool;

    fn owns_work_item(&self, work_item: &TestCaseResult, test: &TestCaseResult) -> bool;
}

/// Helix info the reporter stores as JSON in the result comment.
#[derive(Debug, Deserialize, PartialEq, Eq)]
struct HelixInfo {
    #[serde(rename = "HelixJobId")]
    job_id: String,
    #[serde(rename = "HelixWorkItemName")]
    work_item_name: String,
}

fn helix_info(result: &TestCaseResult) -> Option<HelixInfo> {
    let comment = result.comment.as_deref()?;
    serde_json::from_str(comment).ok()
}

/// Classifies by the naming convention of the Helix test reporter: work items are titled
/// `"<name> Work Item"` and tests point at their work item through the result comment.
#[derive(Debug, Default, Clone, Copy)]
pub struct HelixNamingClassifier;

impl HelixClassifier for HelixNamingClassifier {
    fn is_work_item(&self, result: &TestCaseResult) -> bool {
        result.test_case_title.ends_with(WORK_ITEM_SUFFIX)
    }

    fn owns_work_item(&self, work_item: &TestCaseResult, test: &TestCaseResult) -> bool {
        if !self.is_work_item(work_item) || self.is_work_item(test) {
            return false;
        }

        match (helix_info(work_item), helix_info(test)) {
            (Some(work_item_info), Some(test_info)) => work_item_info == test_info,
            _ => false,
        }
    }
}

/// Pairs every failed result of one test run with its work item.
///
/// Only the same run's results are searched; the first owner wins.
pub fn correlate(
    classifier: &dyn HelixClassifier,
    results: &[Arc<TestCaseResult>],
) -> Vec<HelixTestResult> {
    results
        .iter()
        .map(|result| {
            if classifier.is_work_item(result) {
                return HelixTestResult::for_work_item(Arc::clone(result));
            }

            let work_item = results
                .iter()
                .find(|candidate| classifier.owns_work_item(candidate, result))
                .cloned();

            if work_item.is_none() {
                warn!(
                    "No work item found for test result {} ({})",
                    result.id, result.test_case_title
                );
            }

            HelixTestResult::new(Arc::clone(result), work_item)
        })
        .collect()
}

fn file_name(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

/// Reads the URI listing a work item uploads (one URI per line).
pub fn parse_upload_file_results(text: &str) -> HelixLogInfo {
    let mut info = HelixLogInfo::default();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let name = Url::parse(line)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .unwrap_or_else(|| file_name(line).to_string());

        if name.starts_with("console") {
            info.console_uri.get_or_insert_with(|| line.to_string());
        } else if name.starts_with("core.") {
            info.core_dump_uri.get_or_insert_with(|| line.to_string());
        } else if name.to_ascii_lowercase().ends_with("testresults.xml") {
            info.test_results_uri.get_or_insert_with(|| line.to_string());
        }
    }

    info
}

pub async fn fetch_helix_log_info(
    client: &DevOpsClient,
    project: &str,
    run_id: i32,
    work_item_id: i32,
) -> Result<HelixLogInfo> {
    let attachments = client
        .list_test_result_attachments(project, run_id, work_item_id)
        .await?;

    let Some(attachment) = attachments.iter().find(|a| a.file_name == UPLOAD_FILE_RESULTS) else {
        debug!("Work item {work_item_id} in run {run_id} has no {UPLOAD_FILE_RESULTS}");
        return Ok(HelixLogInfo::default());
    };

    let mut content = Vec::new();
    client
        .download_test_result_attachment(project, run_id, work_item_id, attachment.id, &mut content)
        .await?;

    Ok(parse_upload_file_results(&String::from_utf8_lossy(&content)))
}

/// Looks up log URIs for each failure, preserving input order. Failures without a work
/// item resolve to an empty `HelixLogInfo` without a request.
pub async fn fetch_log_infos<S>(
    source: &S,
    project: &str,
    failures: &[&HelixTestRunResult],
) -> Result<Vec<HelixLogInfo>>
where
    S: DevOpsSource + ?Sized,
{
    stream::iter(failures.iter().copied())
        .map(|failure| async move {
            match failure.helix_test_result.work_item() {
                Some(work_item) => {
                    source
                        .helix_log_info(project, failure.test_run.id, work_item.id)
                        .await
                }
                None => Ok(HelixLogInfo::default()),
            }
        })
        .buffered(CONCURRENCY)
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: i32, title: &str, comment: Option<&str>) -> Arc<TestCaseResult> {
        Arc::new(TestCaseResult {
            id,
            test_case_title: title.to_string(),
            test_run: None,
            outcome: Some(super::super::types::TestOutcome::Failed),
            failing_since: None,
            comment: comment.map(str::to_string),
        })
    }

    const JOB_A: &str = r#"{"HelixJobId":"job-1","HelixWorkItemName":"System.Runtime.Tests"}"#;
    const JOB_B: &str = r#"{"HelixJobId":"job-1","HelixWorkItemName":"System.IO.Tests"}"#;

    /// Title based rule: `W:<name>` is a work item owning every `T:<name>.*` test.
    struct PrefixClassifier;

    impl HelixClassifier for PrefixClassifier {
        fn is_work_item(&self, result: &TestCaseResult) -> bool {
            result.test_case_title.starts_with("W:")
        }

        fn owns_work_item(&self, work_item: &TestCaseResult, test: &TestCaseResult) -> bool {
            work_item
                .test_case_title
                .strip_prefix("W:")
                .is_some_and(|name| test.test_case_title.starts_with(&format!("T:{name}.")))
        }
    }

    #[test]
    fn test_naming_classifier_detects_work_item() {
        let classifier = HelixNamingClassifier;
        assert!(classifier.is_work_item(&result(1, "System.Runtime.Tests Work Item", None)));
        assert!(!classifier.is_work_item(&result(2, "System.Runtime.Tests.Foo", None)));
    }

    #[test]
    fn test_naming_classifier_matches_on_helix_info() {
        let classifier = HelixNamingClassifier;
        let work_item = result(1, "System.Runtime.Tests Work Item", Some(JOB_A));
        let test = result(2, "System.Runtime.Tests.Foo", Some(JOB_A));
        let other_test = result(3, "System.IO.Tests.Bar", Some(JOB_B));
        let no_info = result(4, "Mystery", Some("not json"));

        assert!(classifier.owns_work_item(&work_item, &test));
        assert!(!classifier.owns_work_item(&work_item, &other_test));
        assert!(!classifier.owns_work_item(&work_item, &no_info));
        assert!(!classifier.owns_work_item(&test, &work_item));
        assert!(!classifier.owns_work_item(&work_item, &work_item));
    }

    #[test]
    fn test_work_item_is_self_paired() {
        let results = vec![result(10, "W:Linux", None)];
        let paired = correlate(&PrefixClassifier, &results);

        assert_eq!(paired.len(), 1);
        assert!(paired[0].is_work_item_result());
        assert_eq!(paired[0].test().id, paired[0].work_item().unwrap().id);
        assert!(Arc::ptr_eq(&paired[0].test, paired[0].work_item.as_ref().unwrap()));
    }

    #[test]
    fn test_individual_test_paired_with_first_owner() {
        let results = vec![
            result(1, "T:Lib.Foo", None),
            result(2, "W:Other", None),
            result(3, "W:Lib", None),
            result(4, "W:Lib", None),
        ];
        let paired = correlate(&PrefixClassifier, &results);

        assert_eq!(paired.len(), 4);
        assert_eq!(paired[0].test().id, 1);
        assert_eq!(paired[0].work_item().unwrap().id, 3);
        assert!(!paired[0].is_work_item_result());
    }

    #[test]
    fn test_missing_owner_is_absent_not_error() {
        let results = vec![result(1, "T:Lib.Foo", None), result(2, "W:Other", None)];
        let paired = correlate(&PrefixClassifier, &results);

        assert!(paired[0].work_item().is_none());
        assert!(!paired[0].is_work_item_result());
        assert_eq!(paired[0].test_case_title(), "T:Lib.Foo");
    }

    #[test]
    fn test_parse_upload_file_results() {
        let text = "\
https://helix.blob/logs/job-1/System.Runtime.Tests/console.5c1e3b4a.log
https://helix.blob/logs/job-1/System.Runtime.Tests/core.12345

https://helix.blob/logs/job-1/System.Runtime.Tests/testResults.xml
https://helix.blob/logs/job-1/System.Runtime.Tests/console.second.log
";
        let info = parse_upload_file_results(text);

        assert_eq!(
            info.console_uri.as_deref(),
            Some("https://helix.blob/logs/job-1/System.Runtime.Tests/console.5c1e3b4a.log")
        );
        assert_eq!(
            info.core_dump_uri.as_deref(),
            Some("https://helix.blob/logs/job-1/System.Runtime.Tests/core.12345")
        );
        assert_eq!(
            info.test_results_uri.as_deref(),
            Some("https://helix.blob/logs/job-1/System.Runtime.Tests/testResults.xml")
        );
    }

    #[test]
    fn test_parse_upload_file_results_ignores_other_files() {
        let info = parse_upload_file_results("https://helix.blob/logs/run.sh\nnot a uri\n");
        assert!(info.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_helix_log_info_reads_upload_listing() {
        use mockito::Matcher;

        let mut server = mockito::Server::new_async().await;
        let listing = server
            .mock("GET", "/dnceng/public/_apis/test/Runs/5/Results/100/attachments")
            .match_query(Matcher::Any)
            .with_body(
                r#"{ "count": 2, "value": [
                    { "id": 1, "fileName": "other.txt" },
                    { "id": 2, "fileName": "UploadFileResults.txt" }
                ] }"#,
            )
            .create_async()
            .await;
        let content = server
            .mock("GET", "/dnceng/public/_apis/test/Runs/5/Results/100/attachments/2")
            .match_query(Matcher::Any)
            .with_body("https://helix.blob/x/console.abc.log\n")
            .create_async()
            .await;

        let client = DevOpsClient::new(&server.url(), "dnceng", None).unwrap();
        let info = fetch_helix_log_info(&client, "public", 5, 100).await.unwrap();

        listing.assert_async().await;
        content.assert_async().await;
        assert_eq!(info.console_uri.as_deref(), Some("https://helix.blob/x/console.abc.log"));
        assert!(info.core_dump_uri.is_none());
    }

    #[tokio::test]
    async fn test_fetch_helix_log_info_without_listing_is_empty() {
        use mockito::Matcher;

        let mut server = mockito::Server::new_async().await;
        let listing = server
            .mock("GET", "/dnceng/public/_apis/test/Runs/5/Results/100/attachments")
            .match_query(Matcher::Any)
            .with_body(r#"{ "count": 0, "value": [] }"#)
            .create_async()
            .await;

        let client = DevOpsClient::new(&server.url(), "dnceng", None).unwrap();
        let info = fetch_helix_log_info(&client, "public", 5, 100).await.unwrap();

        listing.assert_async().await;
        assert!(info.is_empty());
    }

    fn console(uri: &str) -> HelixLogInfo {
        HelixLogInfo {
            console_uri: Some(uri.to_string()),
            ..HelixLogInfo::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_log_infos_keeps_order_and_skips_missing_work_items() {
        use std::sync::atomic::Ordering;

        use crate::providers::azure::fake::FakeSource;
        use crate::providers::azure::types::TestRun;

        let run = TestRun {
            id: 5,
            name: "System.Runtime.Tests".to_string(),
            build: None,
        };
        let failure = |helix_test_result: HelixTestResult| HelixTestRunResult {
            test_run: run.clone(),
            helix_test_result,
        };
        let owner = result(10, "System.Runtime.Tests Work Item", Some(JOB_A));
        let work_item = failure(HelixTestResult::for_work_item(result(
            11,
            "System.IO.Tests Work Item",
            Some(JOB_B),
        )));
        let orphan = failure(HelixTestResult::new(result(12, "Orphan.Test", None), None));
        let owned = failure(HelixTestResult::new(
            result(13, "System.Runtime.Tests.Foo", Some(JOB_A)),
            Some(owner),
        ));

        let source = FakeSource::default()
            .with_log_info(10, console("https://helix/10/console.log"))
            .with_log_info(11, console("https://helix/11/console.log"));

        let infos = fetch_log_infos(&source, "public", &[&work_item, &orphan, &owned])
            .await
            .unwrap();

        let consoles: Vec<Option<&str>> =
            infos.iter().map(|info| info.console_uri.as_deref()).collect();
        assert_eq!(
            consoles,
            vec![
                Some("https://helix/11/console.log"),
                None,
                Some("https://helix/10/console.log"),
            ]
        );
        assert_eq!(infos[1], HelixLogInfo::default());
        assert_eq!(source.log_calls.load(Ordering::SeqCst), 2);
    }
}
