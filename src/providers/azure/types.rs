use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildResult {
    None,
    Succeeded,
    PartiallySucceeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildReason {
    None,
    Manual,
    #[serde(rename = "individualCI")]
    IndividualCi,
    #[serde(rename = "batchedCI")]
    BatchedCi,
    Schedule,
    PullRequest,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildStatus {
    None,
    InProgress,
    Completed,
    Cancelling,
    Postponed,
    NotStarted,
    #[serde(other)]
    Unknown,
}

impl BuildStatus {
    pub fn as_query_value(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::InProgress => "inProgress",
            Self::Completed => "completed",
            Self::Cancelling => "cancelling",
            Self::Postponed => "postponed",
            Self::NotStarted => "notStarted",
            Self::Unknown => "all",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionReference {
    pub id: i32,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: i32,
    #[serde(default)]
    pub build_number: String,
    pub status: Option<BuildStatus>,
    pub result: Option<BuildResult>,
    pub reason: Option<BuildReason>,
    pub definition: Option<DefinitionReference>,
    pub finish_time: Option<DateTime<Utc>>,
}

impl Build {
    pub fn succeeded(&self) -> bool {
        self.result == Some(BuildResult::Succeeded)
    }

    pub fn is_pull_request(&self) -> bool {
        self.reason == Some(BuildReason::PullRequest)
    }

    pub fn result_label(&self) -> String {
        self.result
            .map_or_else(|| "none".to_string(), |r| format!("{r:?}"))
    }
}

/// Reference whose id the service serialises as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShallowReference {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    pub build: Option<ShallowReference>,
}

impl TestRun {
    pub fn build_id(&self) -> Option<i32> {
        self.build.as_ref().and_then(|b| b.id.parse().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestOutcome {
    Passed,
    Failed,
    Inconclusive,
    Timeout,
    Aborted,
    Blocked,
    NotExecuted,
    Warning,
    Error,
    NotApplicable,
    Paused,
    InProgress,
    NotImpacted,
    #[serde(other)]
    Unspecified,
}

impl TestOutcome {
    pub fn as_query_value(self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::Inconclusive => "Inconclusive",
            Self::Timeout => "Timeout",
            Self::Aborted => "Aborted",
            Self::Blocked => "Blocked",
            Self::NotExecuted => "NotExecuted",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::NotApplicable => "NotApplicable",
            Self::Paused => "Paused",
            Self::InProgress => "InProgress",
            Self::NotImpacted => "NotImpacted",
            Self::Unspecified => "Unspecified",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildIdReference {
    pub id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailingSince {
    pub build: Option<BuildIdReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    pub id: i32,
    #[serde(default)]
    pub test_case_title: String,
    pub test_run: Option<ShallowReference>,
    pub outcome: Option<TestOutcome>,
    pub failing_since: Option<FailingSince>,
    pub comment: Option<String>,
}

impl TestCaseResult {
    pub fn failing_since_build_id(&self) -> Option<i32> {
        self.failing_since
            .as_ref()
            .and_then(|f| f.build.as_ref())
            .map(|b| b.id)
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == Some(TestOutcome::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAttachment {
    pub id: i32,
    #[serde(default)]
    pub file_name: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildLog {
    pub id: i32,
    #[serde(rename = "type")]
    pub log_type: Option<String>,
    pub url: Option<String>,
    pub line_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogReference {
    pub id: i32,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRecord {
    pub id: String,
    pub parent_id: Option<String>,
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    #[serde(default)]
    pub name: String,
    pub state: Option<String>,
    pub result: Option<String>,
    pub error_count: Option<i32>,
    pub warning_count: Option<i32>,
    pub log: Option<LogReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub id: String,
    pub change_id: Option<i32>,
    #[serde(default)]
    pub records: Vec<TimelineRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactResource {
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifact {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    pub resource: Option<ArtifactResource>,
}

/// Log URIs uploaded by a Helix work item. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelixLogInfo {
    pub console_uri: Option<String>,
    pub core_dump_uri: Option<String>,
    pub test_results_uri: Option<String>,
}

impl HelixLogInfo {
    pub fn is_empty(&self) -> bool {
        self.console_uri.is_none() && self.core_dump_uri.is_none() && self.test_results_uri.is_none()
    }
}
