use reqwest::RequestBuilder;

/// Azure DevOps personal access token.
///
/// Sent as basic auth with an empty user name, which is how the service accepts PATs.
pub struct PersonalAccessToken(String);

impl From<&str> for PersonalAccessToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl PersonalAccessToken {
    /// Returns `None` for an empty or whitespace-only value so callers fall back to
    /// anonymous access.
    pub fn from_optional(value: Option<&str>) -> Option<Self> {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Self::from)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth("", Some(self.as_str()))
    }
}

impl std::fmt::Debug for PersonalAccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<redacted>")
    }
}
