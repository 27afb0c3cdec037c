use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::providers::azure::build_test_info::{
    BuildTestInfo, BuildTestInfoCollection, FailureRef, HelixTestRunResult,
};
use crate::providers::azure::types::{Build, HelixLogInfo};
use crate::providers::azure::url_utils;

/// Where builds live, for turning ids into links.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub organization_url: String,
    pub project: String,
}

impl ReportContext {
    pub fn build_uri(&self, build_id: i32) -> String {
        url_utils::build_uri(&self.organization_url, &self.project, build_id)
    }

    pub fn build_definition_uri(&self, definition_id: i32) -> String {
        url_utils::build_definition_uri(&self.organization_url, &self.project, definition_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildResultSummary {
    pub name: String,
    pub definition_id: i32,
    pub builds_analyzed: usize,
    pub success_rate: f64,
    /// One `Y`/`N` per build, most recent first.
    pub outcomes: String,
}

pub fn summarize_build_results(name: &str, definition_id: i32, builds: &[Build]) -> BuildResultSummary {
    let successful = builds.iter().filter(|b| b.succeeded()).count();

    // Rate over the builds found, not the count requested: a short window is not a failure.
    #[allow(clippy::cast_precision_loss)]
    let success_rate = (successful as f64 / builds.len().max(1) as f64) * 100.0;

    BuildResultSummary {
        name: name.to_string(),
        definition_id,
        builds_analyzed: builds.len(),
        success_rate,
        outcomes: builds
            .iter()
            .map(|b| if b.succeeded() { 'Y' } else { 'N' })
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildLink {
    pub build_id: i32,
    pub build_uri: String,
}

impl BuildLink {
    fn new(ctx: &ReportContext, build_id: i32) -> Self {
        Self {
            build_id,
            build_uri: ctx.build_uri(build_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTest {
    pub title: String,
    /// Build where the failure streak began, when earlier than this build.
    pub failing_since: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailures {
    pub run_name: String,
    pub tests: Vec<FailedTest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub build: BuildLink,
    pub build_number: String,
    pub runs: Vec<RunFailures>,
}

pub fn build_report(info: &BuildTestInfo, ctx: &ReportContext) -> BuildReport {
    let build = info.build();
    let runs = info
        .test_run_names()
        .into_iter()
        .map(|run_name| RunFailures {
            run_name: run_name.to_string(),
            tests: info
                .results_for_run_name(run_name)
                .into_iter()
                .map(|r| {
                    let test = r.helix_test_result.test();
                    FailedTest {
                        title: test.test_case_title.clone(),
                        failing_since: test
                            .failing_since_build_id()
                            .filter(|&since| since != build.id),
                    }
                })
                .collect(),
        })
        .collect();

    BuildReport {
        build: BuildLink::new(ctx, build.id),
        build_number: build.build_number.clone(),
        runs,
    }
}

/// One report per build that has failures, in build id order.
pub fn group_by_builds(collection: &BuildTestInfoCollection, ctx: &ReportContext) -> Vec<BuildReport> {
    collection
        .iter()
        .filter(|info| !info.results().is_empty())
        .map(|info| build_report(info, ctx))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildCount {
    pub build: BuildLink,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunNameCount {
    pub run_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HelixLogRow {
    pub build: BuildLink,
    pub logs: HelixLogInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    pub title: String,
    pub failure_count: usize,
    pub builds: Vec<BuildCount>,
    /// Distinct run names, lexically ordered, with failures of this test in each.
    pub test_runs: Vec<RunNameCount>,
    /// Filled in only when log links are requested.
    pub helix_logs: Vec<HelixLogRow>,
}

pub fn group_by_tests(collection: &BuildTestInfoCollection, ctx: &ReportContext) -> Vec<TestReport> {
    collection
        .test_case_titles()
        .into_iter()
        .map(|title| {
            let failures = collection.helix_results_for_title(title);

            let builds = collection
                .build_test_infos_for_title(title)
                .into_iter()
                .map(|info| BuildCount {
                    build: BuildLink::new(ctx, info.build().id),
                    count: info.results_for_title(title).len(),
                })
                .collect();

            TestReport {
                title: title.to_string(),
                failure_count: failures.len(),
                builds,
                test_runs: count_run_names(&failures),
                helix_logs: Vec::new(),
            }
        })
        .collect()
}

/// `failures` must already be ordered by run name.
fn count_run_names(failures: &[FailureRef<'_>]) -> Vec<RunNameCount> {
    let mut counts: Vec<RunNameCount> = Vec::new();
    for failure in failures {
        let name = &failure.test_run().name;
        match counts.last_mut() {
            Some(last) if &last.run_name == name => last.count += 1,
            _ => counts.push(RunNameCount {
                run_name: name.clone(),
                count: 1,
            }),
        }
    }
    counts
}

pub fn helix_log_rows(
    failures: &[FailureRef<'_>],
    logs: Vec<HelixLogInfo>,
    ctx: &ReportContext,
) -> Vec<HelixLogRow> {
    failures
        .iter()
        .zip(logs)
        .map(|(failure, logs)| HelixLogRow {
            build: BuildLink::new(ctx, failure.build.id),
            logs,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleCount {
    pub title: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub run_name: String,
    pub builds: Vec<BuildLink>,
    pub test_cases: Vec<TitleCount>,
    pub test_case_count: usize,
}

pub fn group_by_jobs(collection: &BuildTestInfoCollection, ctx: &ReportContext) -> Vec<JobReport> {
    collection
        .test_run_names()
        .into_iter()
        .map(|run_name| {
            let failures = collection.test_run_results_for_run_name(run_name);

            let builds = collection
                .build_test_infos_for_run_name(run_name)
                .into_iter()
                .map(|info| BuildLink::new(ctx, info.build().id))
                .collect();

            let mut titles: Vec<&str> = failures
                .iter()
                .map(|f| f.helix_test_result().test_case_title())
                .collect();
            titles.sort_unstable();
            let mut test_cases: Vec<TitleCount> = Vec::new();
            for title in titles {
                match test_cases.last_mut() {
                    Some(last) if last.title == title => last.count += 1,
                    _ => test_cases.push(TitleCount {
                        title: title.to_string(),
                        count: 1,
                    }),
                }
            }

            JobReport {
                run_name: run_name.to_string(),
                builds,
                test_cases,
                test_case_count: failures.len(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "grouping", content = "groups", rename_all = "lowercase")]
pub enum GroupedReport {
    Builds(Vec<BuildReport>),
    Tests(Vec<TestReport>),
    Jobs(Vec<JobReport>),
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedTestsReport {
    pub project: String,
    pub collected_at: DateTime<Utc>,
    pub builds_analyzed: usize,
    pub total_failures: usize,
    #[serde(flatten)]
    pub report: GroupedReport,
}

/// Failures of a build that lead to a work item, one per distinct work item.
pub fn work_item_failures(info: &BuildTestInfo) -> Vec<&HelixTestRunResult> {
    let mut seen = HashSet::new();
    info.results()
        .iter()
        .filter(|r| {
            r.helix_test_result
                .work_item()
                .is_some_and(|w| seen.insert((r.test_run.id, w.id)))
        })
        .collect()
}

/// Helix URIs of a build, grouped by kind, in failure order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HelixUriListing {
    pub console_uris: Vec<String>,
    pub test_results_uris: Vec<String>,
    pub core_dump_uris: Vec<String>,
}

pub fn list_helix_uris(infos: &[HelixLogInfo]) -> HelixUriListing {
    HelixUriListing {
        console_uris: pick_uris(infos, |i| i.console_uri.as_ref()),
        test_results_uris: pick_uris(infos, |i| i.test_results_uri.as_ref()),
        core_dump_uris: pick_uris(infos, |i| i.core_dump_uri.as_ref()),
    }
}

fn pick_uris<F>(infos: &[HelixLogInfo], pick: F) -> Vec<String>
where
    F: Fn(&HelixLogInfo) -> Option<&String>,
{
    infos.iter().filter_map(pick).cloned().collect()
}
