use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;

use super::helix::HelixTestResult;
use super::types::{Build, TestRun};

/// One failure observed in a test run.
#[derive(Debug, Clone)]
pub struct HelixTestRunResult {
    pub test_run: TestRun,
    pub helix_test_result: HelixTestResult,
}

impl HelixTestRunResult {
    pub fn test_case_title(&self) -> &str {
        self.helix_test_result.test_case_title()
    }

    pub fn test_run_name(&self) -> &str {
        &self.test_run.name
    }
}

/// Every failure of a single build, ordered by test run id.
#[derive(Debug, Clone)]
pub struct BuildTestInfo {
    build: Build,
    results: Vec<HelixTestRunResult>,
}

impl BuildTestInfo {
    pub fn new(build: Build, results: Vec<HelixTestRunResult>) -> Self {
        Self { build, results }
    }

    pub fn build(&self) -> &Build {
        &self.build
    }

    pub fn results(&self) -> &[HelixTestRunResult] {
        &self.results
    }

    pub fn test_case_titles(&self) -> Vec<&str> {
        sorted_distinct(self.results.iter().map(HelixTestRunResult::test_case_title))
    }

    pub fn test_run_names(&self) -> Vec<&str> {
        sorted_distinct(self.results.iter().map(HelixTestRunResult::test_run_name))
    }

    pub fn test_run_names_for_title(&self, test_case_title: &str) -> Vec<&str> {
        sorted_distinct(
            self.results_for_title(test_case_title)
                .into_iter()
                .map(HelixTestRunResult::test_run_name),
        )
    }

    pub fn results_for_title(&self, test_case_title: &str) -> Vec<&HelixTestRunResult> {
        self.results
            .iter()
            .filter(|r| r.test_case_title() == test_case_title)
            .collect()
    }

    pub fn results_for_run_name(&self, test_run_name: &str) -> Vec<&HelixTestRunResult> {
        self.results
            .iter()
            .filter(|r| r.test_run_name() == test_run_name)
            .collect()
    }

    pub fn contains_test_case_title(&self, test_case_title: &str) -> bool {
        self.results
            .iter()
            .any(|r| r.test_case_title() == test_case_title)
    }

    pub fn contains_test_run_name(&self, test_run_name: &str) -> bool {
        self.results
            .iter()
            .any(|r| r.test_run_name() == test_run_name)
    }
}

fn sorted_distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    values.collect::<BTreeSet<_>>().into_iter().collect()
}

/// A failure together with the build it was observed in.
#[derive(Debug, Clone, Copy)]
pub struct FailureRef<'a> {
    pub build: &'a Build,
    pub result: &'a HelixTestRunResult,
}

impl<'a> FailureRef<'a> {
    pub fn test_run(&self) -> &'a TestRun {
        &self.result.test_run
    }

    pub fn helix_test_result(&self) -> &'a HelixTestResult {
        &self.result.helix_test_result
    }
}

/// (index into `infos`, index into that build's results)
type Slot = (usize, usize);

/// Failures across a window of builds, indexed by test case title, test run name and build.
///
/// Built once per aggregation; the collection is read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct BuildTestInfoCollection {
    infos: Vec<BuildTestInfo>,
    by_title: IndexMap<String, Vec<Slot>>,
    by_run_name: IndexMap<String, Vec<Slot>>,
    by_build: HashMap<i32, usize>,
}

impl BuildTestInfoCollection {
    pub fn new(mut infos: Vec<BuildTestInfo>) -> Self {
        infos.sort_by_key(|info| info.build.id);

        let mut by_title: IndexMap<String, Vec<Slot>> = IndexMap::new();
        let mut by_run_name: IndexMap<String, Vec<Slot>> = IndexMap::new();
        let mut by_build = HashMap::with_capacity(infos.len());

        for (info_index, info) in infos.iter().enumerate() {
            by_build.insert(info.build.id, info_index);
            for (result_index, result) in info.results.iter().enumerate() {
                let slot = (info_index, result_index);
                by_title
                    .entry(result.test_case_title().to_string())
                    .or_default()
                    .push(slot);
                by_run_name
                    .entry(result.test_run_name().to_string())
                    .or_default()
                    .push(slot);
            }
        }

        by_title.sort_keys();
        by_run_name.sort_keys();

        Self {
            infos,
            by_title,
            by_run_name,
            by_build,
        }
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BuildTestInfo> {
        self.infos.iter()
    }

    pub fn build_test_info(&self, build_id: i32) -> Option<&BuildTestInfo> {
        self.by_build.get(&build_id).map(|&i| &self.infos[i])
    }

    pub fn total_failures(&self) -> usize {
        self.infos.iter().map(|info| info.results.len()).sum()
    }

    fn failure(&self, (info_index, result_index): Slot) -> FailureRef<'_> {
        let info = &self.infos[info_index];
        FailureRef {
            build: &info.build,
            result: &info.results[result_index],
        }
    }

    fn slots<'a>(index: &'a IndexMap<String, Vec<Slot>>, key: &str) -> &'a [Slot] {
        index.get(key).map_or(&[][..], Vec::as_slice)
    }

    fn infos_for(&self, slots: &[Slot]) -> Vec<&BuildTestInfo> {
        // slots are already in build order
        let mut indices: Vec<usize> = slots.iter().map(|&(i, _)| i).collect();
        indices.dedup();
        indices.into_iter().map(|i| &self.infos[i]).collect()
    }

    /// Distinct titles, lexically ordered.
    pub fn test_case_titles(&self) -> Vec<&str> {
        self.by_title.keys().map(String::as_str).collect()
    }

    /// Distinct test run names, lexically ordered.
    pub fn test_run_names(&self) -> Vec<&str> {
        self.by_run_name.keys().map(String::as_str).collect()
    }

    /// Failures of the title, ordered by test run name then build id.
    pub fn helix_results_for_title(&self, test_case_title: &str) -> Vec<FailureRef<'_>> {
        let mut failures: Vec<FailureRef<'_>> = Self::slots(&self.by_title, test_case_title)
            .iter()
            .map(|&slot| self.failure(slot))
            .collect();
        failures.sort_by(|a, b| a.test_run().name.cmp(&b.test_run().name));
        failures
    }

    pub fn build_test_infos_for_title(&self, test_case_title: &str) -> Vec<&BuildTestInfo> {
        self.infos_for(Self::slots(&self.by_title, test_case_title))
    }

    /// Builds with at least one failure of the title, ordered by build id.
    pub fn builds_for_title(&self, test_case_title: &str) -> Vec<&Build> {
        self.build_test_infos_for_title(test_case_title)
            .into_iter()
            .map(BuildTestInfo::build)
            .collect()
    }

    pub fn test_runs_for_title(&self, test_case_title: &str) -> Vec<&TestRun> {
        let mut runs: Vec<&TestRun> = Self::slots(&self.by_title, test_case_title)
            .iter()
            .map(|&slot| self.failure(slot).test_run())
            .collect();
        runs.sort_by_key(|run| run.id);
        runs
    }

    pub fn test_run_names_for_title(&self, test_case_title: &str) -> Vec<&str> {
        sorted_distinct(
            Self::slots(&self.by_title, test_case_title)
                .iter()
                .map(|&slot| self.failure(slot).test_run().name.as_str()),
        )
    }

    /// Failures in runs with the given name, ordered by build id.
    pub fn test_run_results_for_run_name(&self, test_run_name: &str) -> Vec<FailureRef<'_>> {
        Self::slots(&self.by_run_name, test_run_name)
            .iter()
            .map(|&slot| self.failure(slot))
            .collect()
    }

    pub fn build_test_infos_for_run_name(&self, test_run_name: &str) -> Vec<&BuildTestInfo> {
        self.infos_for(Self::slots(&self.by_run_name, test_run_name))
    }
}

impl<'a> IntoIterator for &'a BuildTestInfoCollection {
    type Item = &'a BuildTestInfo;
    type IntoIter = std::slice::Iter<'a, BuildTestInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.infos.iter()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::*;
    use crate::providers::azure::types::{TestCaseResult, TestOutcome};

    pub fn build(id: i32) -> Build {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "buildNumber": format!("2020.{id}"),
            "result": "failed",
            "reason": "individualCI",
        }))
        .unwrap()
    }

    pub fn run(id: i32, name: &str) -> TestRun {
        TestRun {
            id,
            name: name.to_string(),
            build: None,
        }
    }

    pub fn failed(id: i32, title: &str) -> Arc<TestCaseResult> {
        Arc::new(TestCaseResult {
            id,
            test_case_title: title.to_string(),
            test_run: None,
            outcome: Some(TestOutcome::Failed),
            failing_since: None,
            comment: None,
        })
    }

    pub fn failure(run: &TestRun, result: Arc<TestCaseResult>) -> HelixTestRunResult {
        HelixTestRunResult {
            test_run: run.clone(),
            helix_test_result: HelixTestResult::new(result, None),
        }
    }

    /// Three builds over two configurations:
    /// 1 fails A on Linux and Windows, 2 fails A and B on Linux, 3 fails C on Windows.
    pub fn sample() -> BuildTestInfoCollection {
        let linux = run(10, "Linux");
        let windows = run(11, "Windows");
        let linux_2 = run(20, "Linux");
        let windows_3 = run(31, "Windows");

        BuildTestInfoCollection::new(vec![
            BuildTestInfo::new(build(3), vec![failure(&windows_3, failed(301, "C"))]),
            BuildTestInfo::new(
                build(1),
                vec![
                    failure(&linux, failed(101, "A")),
                    failure(&windows, failed(102, "A")),
                ],
            ),
            BuildTestInfo::new(
                build(2),
                vec![
                    failure(&linux_2, failed(201, "A")),
                    failure(&linux_2, failed(202, "B")),
                ],
            ),
        ])
    }
}
