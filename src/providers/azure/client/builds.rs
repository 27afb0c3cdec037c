use std::path::Path;

use url::Url;

use super::core::{DevOpsClient, ZIP_CONTENT};
use crate::error::Result;
use crate::providers::azure::types::{
    Build, BuildArtifact, BuildLog, BuildStatus, Timeline,
};

const BUILD_API_VERSION: &str = "5.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildQueryOrder {
    FinishTimeDescending,
}

impl BuildQueryOrder {
    fn as_query_value(self) -> &'static str {
        match self {
            Self::FinishTimeDescending => "finishTimeDescending",
        }
    }
}

/// Filters for the build list endpoint.
#[derive(Debug, Clone, Default)]
pub struct BuildListQuery {
    pub definitions: Vec<i32>,
    pub status_filter: Option<BuildStatus>,
    pub query_order: Option<BuildQueryOrder>,
    pub top: Option<usize>,
}

fn with_api_version(mut url: Url) -> Url {
    url.query_pairs_mut()
        .append_pair("api-version", BUILD_API_VERSION);
    url
}

impl DevOpsClient {
    fn build_url(&self, project: &str, build_id: i32, suffix: &str) -> Result<Url> {
        self.project_url(project, &format!("build/builds/{build_id}{suffix}"))
    }

    pub async fn list_builds(&self, project: &str, query: &BuildListQuery) -> Result<Vec<Build>> {
        let mut url = self.project_url(project, "build/builds")?;
        {
            let mut pairs = url.query_pairs_mut();
            if !query.definitions.is_empty() {
                let definitions = query
                    .definitions
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                pairs.append_pair("definitions", &definitions);
            }
            if let Some(status) = query.status_filter {
                pairs.append_pair("statusFilter", status.as_query_value());
            }
            if let Some(order) = query.query_order {
                pairs.append_pair("queryOrder", order.as_query_value());
            }
            pairs.append_pair("api-version", BUILD_API_VERSION);
        }

        self.fetch_all(url, query.top, query.top).await
    }

    pub async fn get_build(&self, project: &str, build_id: i32) -> Result<Build> {
        let url = with_api_version(self.build_url(project, build_id, "")?);
        self.get_json(url).await
    }

    pub async fn list_build_logs(&self, project: &str, build_id: i32) -> Result<Vec<BuildLog>> {
        let url = with_api_version(self.build_url(project, build_id, "/logs")?);
        Ok(self.fetch_page(url).await?.items)
    }

    pub async fn get_build_log(
        &self,
        project: &str,
        build_id: i32,
        log_id: i32,
        start_line: Option<u32>,
        end_line: Option<u32>,
    ) -> Result<String> {
        let mut url = self.build_url(project, build_id, &format!("/logs/{log_id}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(start_line) = start_line {
                pairs.append_pair("startLine", &start_line.to_string());
            }
            if let Some(end_line) = end_line {
                pairs.append_pair("endLine", &end_line.to_string());
            }
        }
        self.get_text(with_api_version(url)).await
    }

    /// Downloads every log of the build as a single zip archive.
    pub async fn download_build_logs(&self, project: &str, build_id: i32, path: &Path) -> Result<u64> {
        let url = with_api_version(self.build_url(project, build_id, "/logs")?);
        self.download_to_file(url, ZIP_CONTENT, path).await
    }

    pub async fn get_timeline(&self, project: &str, build_id: i32) -> Result<Timeline> {
        let url = with_api_version(self.build_url(project, build_id, "/timeline")?);
        self.get_json(url).await
    }

    pub async fn get_timeline_by_id(
        &self,
        project: &str,
        build_id: i32,
        timeline_id: &str,
        change_id: Option<i32>,
    ) -> Result<Timeline> {
        let mut url = self.build_url(project, build_id, &format!("/timeline/{timeline_id}"))?;
        if let Some(change_id) = change_id {
            url.query_pairs_mut()
                .append_pair("changeId", &change_id.to_string());
        }
        self.get_json(with_api_version(url)).await
    }

    pub async fn list_artifacts(&self, project: &str, build_id: i32) -> Result<Vec<BuildArtifact>> {
        let url = with_api_version(self.build_url(project, build_id, "/artifacts")?);
        Ok(self.fetch_page(url).await?.items)
    }

    fn artifact_url(&self, project: &str, build_id: i32, artifact_name: &str) -> Result<Url> {
        let mut url = self.build_url(project, build_id, "/artifacts")?;
        url.query_pairs_mut()
            .append_pair("artifactName", artifact_name);
        Ok(with_api_version(url))
    }

    pub async fn get_artifact(
        &self,
        project: &str,
        build_id: i32,
        artifact_name: &str,
    ) -> Result<BuildArtifact> {
        let url = self.artifact_url(project, build_id, artifact_name)?;
        self.get_json(url).await
    }

    pub async fn download_artifact(
        &self,
        project: &str,
        build_id: i32,
        artifact_name: &str,
        path: &Path,
    ) -> Result<u64> {
        let url = self.artifact_url(project, build_id, artifact_name)?;
        self.download_to_file(url, ZIP_CONTENT, path).await
    }
}
