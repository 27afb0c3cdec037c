use log::{info, warn};

use super::client::{BuildListQuery, BuildQueryOrder};
use super::types::{Build, BuildStatus};
use crate::error::Result;
use crate::providers::DevOpsSource;

/// The list endpoint cannot filter by reason, so request enough builds that dropping the
/// pull request ones still leaves `count`.
pub const OVER_FETCH_FACTOR: usize = 20;

/// Drops pull request builds and keeps the first `count` of the rest, in input order.
pub fn select_builds(builds: Vec<Build>, count: usize) -> Vec<Build> {
    builds
        .into_iter()
        .filter(|b| !b.is_pull_request())
        .take(count)
        .collect()
}

/// Most recently finished non pull request builds of the given definitions.
pub async fn list_builds<S>(
    source: &S,
    project: &str,
    definition_ids: &[i32],
    count: usize,
) -> Result<Vec<Build>>
where
    S: DevOpsSource + ?Sized,
{
    let query = BuildListQuery {
        definitions: definition_ids.to_vec(),
        status_filter: Some(BuildStatus::Completed),
        query_order: Some(BuildQueryOrder::FinishTimeDescending),
        top: Some(count.saturating_mul(OVER_FETCH_FACTOR)),
    };

    info!("Fetching up to {count} builds for definitions {definition_ids:?}...");
    let raw = source.list_builds(project, &query).await?;
    let raw_count = raw.len();
    let builds = select_builds(raw, count);

    if builds.len() < count {
        warn!(
            "Only {} of {count} requested builds found ({raw_count} fetched before filtering)",
            builds.len()
        );
    }

    Ok(builds)
}
