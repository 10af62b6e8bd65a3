//! Route destinations shared by guards and handlers.

use axum::response::Redirect;

/// Where unauthenticated clients are sent.
pub const LOGIN_PATH: &str = "/auth";

/// Landing page for authenticated users, and the fallback destination when
/// a role check fails.
pub const DEFAULT_AUTHENTICATED_PATH: &str = "/home";

/// Notice value attached when access was denied on role grounds.
pub const ACCESS_NOTICE: &str = "not-permitted";

/// Redirect to the login page, carrying the requested path so login can
/// resume it afterwards.
pub fn login_redirect(from: &str) -> Redirect {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("from", from)
        .finish();
    Redirect::to(&format!("{LOGIN_PATH}?{query}"))
}

/// Redirect to the default page with an access notice.
pub fn notice_redirect() -> Redirect {
    Redirect::to(&format!("{DEFAULT_AUTHENTICATED_PATH}?notice={ACCESS_NOTICE}"))
}

/// Resolve the post-login destination from a preserved `from` value.
///
/// Only site-local absolute paths are honored; anything else (external
/// URLs, scheme-relative `//host` tricks, relative paths) falls back to
/// the default page.
pub fn resume_target(from: Option<&str>) -> String {
    match from {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => DEFAULT_AUTHENTICATED_PATH.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_target_accepts_local_paths() {
        assert_eq!(resume_target(Some("/messages")), "/messages");
        assert_eq!(resume_target(Some("/quests/abc?tab=detail")), "/quests/abc?tab=detail");
    }

    #[test]
    fn test_resume_target_rejects_external_destinations() {
        assert_eq!(resume_target(Some("https://evil.example.com")), DEFAULT_AUTHENTICATED_PATH);
        assert_eq!(resume_target(Some("//evil.example.com")), DEFAULT_AUTHENTICATED_PATH);
        assert_eq!(resume_target(Some("messages")), DEFAULT_AUTHENTICATED_PATH);
        assert_eq!(resume_target(None), DEFAULT_AUTHENTICATED_PATH);
    }
}
