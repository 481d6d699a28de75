//! Default User-Agent string for outgoing HTTP requests.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/outcall";

/// Default User-Agent for requests built from a default [`HttpClientConfig`].
///
/// [`HttpClientConfig`]: crate::http::HttpClientConfig
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("outcall/{version} (+{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent_carries_version_and_project_url() {
        let ua = default_user_agent();
        assert!(
            ua.contains(PROJECT_UA_URL),
            "UA must contain project URL: {ua}"
        );
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("outcall/")
                .and_then(|s| s.split(' ').next())
                .expect("UA has version"),
            "UA must contain crate version"
        );
    }
}
