/// Web page of a build, e.g. `https://dev.azure.com/dnceng/public/_build/results?buildId=42`.
pub fn build_uri(organization_url: &str, project: &str, build_id: i32) -> String {
    format!(
        "{}/{project}/_build/results?buildId={build_id}",
        organization_url.trim_end_matches('/')
    )
}

pub fn build_definition_uri(organization_url: &str, project: &str, definition_id: i32) -> String {
    format!(
        "{}/{project}/_build?definitionId={definition_id}",
        organization_url.trim_end_matches('/')
    )
}

/// Display name for a log link: the last path segment of the URI, or `fallback` when the
/// URI has none.
pub fn uri_display_name(uri: &str, fallback: &str) -> String {
    url::Url::parse(uri)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_uri() {
        let uri = build_uri("https://dev.azure.com/dnceng/", "public", 123456);
        assert_eq!(
            uri,
            "https://dev.azure.com/dnceng/public/_build/results?buildId=123456"
        );
    }

    #[test]
    fn test_build_uri_without_trailing_slash() {
        let uri = build_uri("https://dev.azure.com/dnceng", "public", 7);
        assert_eq!(uri, "https://dev.azure.com/dnceng/public/_build/results?buildId=7");
    }

    #[test]
    fn test_build_definition_uri() {
        let uri = build_definition_uri("https://dev.azure.com/dnceng/", "public", 686);
        assert_eq!(uri, "https://dev.azure.com/dnceng/public/_build?definitionId=686");
    }

    #[test]
    fn test_uri_display_name_uses_file_name() {
        assert_eq!(
            uri_display_name("https://helix.blob/logs/job/console.1a2b.log", "console"),
            "console.1a2b.log"
        );
    }

    #[test]
    fn test_uri_display_name_falls_back() {
        assert_eq!(uri_display_name("not a uri", "core"), "core");
        assert_eq!(uri_display_name("https://helix.blob/", "testResults.xml"), "testResults.xml");
    }
}
