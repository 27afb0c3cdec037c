use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use log::info;

use super::build_source;
use super::build_test_info::{BuildTestInfo, BuildTestInfoCollection, HelixTestRunResult};
use super::helix::{self, HelixClassifier};
use super::types::{Build, TestCaseResult, TestRun};
use crate::error::{Result, RunfoError};
use crate::providers::DevOpsSource;

/// Concurrent result fetches per build.
pub const RUN_CONCURRENCY: usize = 10;
/// Builds collected at once when aggregating a window.
pub const BUILD_CONCURRENCY: usize = 4;

/// Gathers the failed tests of builds and pairs them with their Helix work items.
pub struct TestResultCollector<'a, S: ?Sized> {
    source: &'a S,
    project: &'a str,
    classifier: &'a dyn HelixClassifier,
}

impl<'a, S> TestResultCollector<'a, S>
where
    S: DevOpsSource + ?Sized,
{
    pub fn new(source: &'a S, project: &'a str, classifier: &'a dyn HelixClassifier) -> Self {
        Self {
            source,
            project,
            classifier,
        }
    }

    /// Failed results of every run in the build that has any, ordered by run id.
    async fn failed_runs(&self, build_id: i32) -> Result<Vec<(TestRun, Vec<Arc<TestCaseResult>>)>> {
        let runs = self.source.list_test_runs(self.project, build_id).await?;
        info!("Build {build_id}: fetching failed results for {} test runs", runs.len());

        let mut failed: Vec<(TestRun, Vec<Arc<TestCaseResult>>)> = stream::iter(runs)
            .map(|run| async move {
                let results = self
                    .source
                    .list_failed_test_results(self.project, run.id)
                    .await?;
                Ok::<_, RunfoError>((run, results))
            })
            .buffer_unordered(RUN_CONCURRENCY)
            .try_filter_map(|(run, results): (TestRun, Vec<TestCaseResult>)| async move {
                if results.is_empty() {
                    return Ok(None);
                }
                Ok(Some((run, results.into_iter().map(Arc::new).collect())))
            })
            .try_collect()
            .await?;

        failed.sort_by_key(|(run, _)| run.id);
        Ok(failed)
    }

    pub async fn collect(&self, build: Build) -> Result<BuildTestInfo> {
        let failed_runs = self.failed_runs(build.id).await?;

        let results: Vec<HelixTestRunResult> = failed_runs
            .into_iter()
            .flat_map(|(test_run, results)| {
                helix::correlate(self.classifier, &results)
                    .into_iter()
                    .map(move |helix_test_result| HelixTestRunResult {
                        test_run: test_run.clone(),
                        helix_test_result,
                    })
            })
            .collect();

        info!("Build {}: {} failed tests", build.id, results.len());
        Ok(BuildTestInfo::new(build, results))
    }

    pub async fn collect_build_id(&self, build_id: i32) -> Result<BuildTestInfo> {
        let build = self.source.get_build(self.project, build_id).await?;
        self.collect(build).await
    }

    /// Collects every build, then orders the window by build id.
    pub async fn collect_window(&self, builds: Vec<Build>) -> Result<BuildTestInfoCollection> {
        let infos: Vec<BuildTestInfo> = stream::iter(builds)
            .map(|build| self.collect(build))
            .buffer_unordered(BUILD_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(BuildTestInfoCollection::new(infos))
    }

    /// Failures of the last `count` non pull request builds of a definition.
    pub async fn collect_definition(
        &self,
        definition_id: i32,
        count: usize,
    ) -> Result<BuildTestInfoCollection> {
        let builds =
            build_source::list_builds(self.source, self.project, &[definition_id], count).await?;
        self.collect_window(builds).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::providers::azure::fake::FakeSource;
    use crate::providers::azure::helix::HelixNamingClassifier;
    use crate::providers::azure::types::TestOutcome;

    fn build(id: i32) -> Build {
        serde_json::from_value(serde_json::json!({ "id": id, "reason": "individualCI" })).unwrap()
    }

    fn run(id: i32, name: &str) -> TestRun {
        TestRun {
            id,
            name: name.to_string(),
            build: None,
        }
    }

    fn result(id: i32, title: &str, outcome: TestOutcome, comment: Option<&str>) -> TestCaseResult {
        TestCaseResult {
            id,
            test_case_title: title.to_string(),
            test_run: None,
            outcome: Some(outcome),
            failing_since: None,
            comment: comment.map(str::to_string),
        }
    }

    const HELIX: &str = r#"{"HelixJobId":"j1","HelixWorkItemName":"A"}"#;

    /// Build 101 runs "Linux" where work item "A Work Item" owns failing test "A".
    fn scenario() -> FakeSource {
        FakeSource::default()
            .with_builds(vec![build(103), build(102), build(101)])
            .with_run(101, run(1, "Linux"))
            .with_run(102, run(2, "Linux"))
            .with_run(103, run(3, "Linux"))
            .with_results(
                1,
                vec![
                    result(10, "A", TestOutcome::Failed, Some(HELIX)),
                    result(11, "A Work Item", TestOutcome::Failed, Some(HELIX)),
                ],
            )
            .with_results(2, vec![result(20, "A", TestOutcome::Passed, None)])
    }

    #[tokio::test]
    async fn test_collect_pairs_failures_with_work_items() {
        let source = scenario();
        let classifier = HelixNamingClassifier;
        let collector = TestResultCollector::new(&source, "public", &classifier);

        let info = collector.collect(build(101)).await.unwrap();

        assert_eq!(info.build().id, 101);
        assert_eq!(info.results().len(), 2);
        let test = &info.results()[0].helix_test_result;
        assert_eq!(test.test().id, 10);
        assert_eq!(test.work_item().unwrap().id, 11);
        let work_item = &info.results()[1].helix_test_result;
        assert!(work_item.is_work_item_result());
    }

    #[tokio::test]
    async fn test_runs_without_failures_are_dropped() {
        let source = scenario();
        let classifier = HelixNamingClassifier;
        let collector = TestResultCollector::new(&source, "public", &classifier);

        let info = collector.collect(build(102)).await.unwrap();

        assert!(info.results().is_empty());
        assert_eq!(source.result_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_output_ordered_by_run_id_regardless_of_completion() {
        let mut source = FakeSource::default().with_builds(vec![build(1)]);
        for run_id in 1..=6 {
            source = source
                .with_run(1, run(run_id, &format!("config-{run_id}")))
                .with_results(
                    run_id,
                    vec![result(run_id * 100, "T", TestOutcome::Failed, None)],
                )
                // earlier runs finish last
                .with_delay(run_id, (7 - run_id as u64) * 15);
        }
        let classifier = HelixNamingClassifier;
        let collector = TestResultCollector::new(&source, "public", &classifier);

        let info = collector.collect_build_id(1).await.unwrap();

        let run_ids: Vec<i32> = info.results().iter().map(|r| r.test_run.id).collect();
        assert_eq!(run_ids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_run_fetches_are_concurrent_but_capped() {
        let mut source = FakeSource::default();
        for run_id in 1..=25 {
            source = source
                .with_run(1, run(run_id, "Linux"))
                .with_delay(run_id, 20);
        }
        let classifier = HelixNamingClassifier;
        let collector = TestResultCollector::new(&source, "public", &classifier);

        collector.collect(build(1)).await.unwrap();

        let max = source.max_in_flight.load(Ordering::SeqCst);
        assert!(max > 1, "fetches ran sequentially");
        assert!(max <= RUN_CONCURRENCY, "{max} fetches in flight");
        assert_eq!(source.result_calls.load(Ordering::SeqCst), 25);
    }

    #[tokio::test]
    async fn test_any_failed_fetch_aborts_collection() {
        let source = scenario().with_failing_run(1);
        let classifier = HelixNamingClassifier;
        let collector = TestResultCollector::new(&source, "public", &classifier);

        let err = collector.collect(build(101)).await.unwrap_err();
        assert!(matches!(err, RunfoError::Api { .. }));
    }

    #[tokio::test]
    async fn test_collect_definition_scenario() {
        let source = scenario();
        let classifier = HelixNamingClassifier;
        let collector = TestResultCollector::new(&source, "public", &classifier);

        let collection = collector.collect_definition(686, 3).await.unwrap();

        let build_ids: Vec<i32> = collection.iter().map(|i| i.build().id).collect();
        assert_eq!(build_ids, vec![101, 102, 103]);
        assert_eq!(collection.test_case_titles(), vec!["A", "A Work Item"]);
        let builds: Vec<i32> = collection
            .builds_for_title("A")
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(builds, vec![101]);
        let work_item = collection.helix_results_for_title("A Work Item");
        assert_eq!(work_item.len(), 1);
        assert!(work_item[0].helix_test_result().is_work_item_result());
        assert_eq!(collection.total_failures(), 2);
    }
}
