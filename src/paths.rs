//! Request-path classification for the 401 policy.
//!
//! Three disjoint questions are asked about every failing request path:
//! is it the identity check, is it in the never-refresh set, is it under a
//! protected prefix. The answers drive the transport's refresh-and-retry
//! decision, so the sets live here as plain data rather than inline in the
//! retry loop.

use crate::config::DeployMode;

/// API prefixes whose 401s are eligible for refresh-and-retry.
pub(crate) const DEFAULT_PROTECTED_PREFIXES: &[&str] = &[
    "/pets",
    "/calendar",
    "/alarms",
    "/ai-report",
    "/members",
    "/remarks",
    "/routines",
    "/slots",
    "/entities",
];

/// Path classification consumed by the transport.
///
/// Built from [`SessionConfig::path_policy`](crate::SessionConfig::path_policy);
/// the never-refresh set defaults to the six auth/session endpoints derived
/// from the configured provider.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    me: String,
    refresh: String,
    demo_login: String,
    login: String,
    logout: String,
    withdraw: String,
    never_refresh: Vec<String>,
    protected_prefixes: Vec<String>,
}

impl PathPolicy {
    pub(crate) fn new(
        provider: &str,
        protected_prefixes: Vec<String>,
        never_refresh_override: Option<Vec<String>>,
    ) -> Self {
        let me = "/auth/me".to_string();
        let refresh = "/auth/refresh".to_string();
        let demo_login = "/auth/demo-login".to_string();
        let login = format!("/auth/{provider}/login");
        let logout = format!("/auth/{provider}/logout");
        let withdraw = format!("/auth/{provider}/withdraw");

        // Match is exact-or-segment-prefix, so the bare login entry also
        // covers its `/dev` variant.
        let never_refresh = never_refresh_override.unwrap_or_else(|| {
            vec![
                me.clone(),
                refresh.clone(),
                demo_login.clone(),
                login.clone(),
                logout.clone(),
                withdraw.clone(),
            ]
        });

        Self {
            me,
            refresh,
            demo_login,
            login,
            logout,
            withdraw,
            never_refresh,
            protected_prefixes,
        }
    }

    /// Strip the query string and ensure a leading slash.
    #[must_use]
    pub fn normalize(path: &str) -> String {
        let stripped = path.split('?').next().unwrap_or("");
        if stripped.is_empty() || stripped.starts_with('/') {
            stripped.to_string()
        } else {
            format!("/{stripped}")
        }
    }

    /// A 401 on these paths must never trigger a refresh attempt.
    #[must_use]
    pub fn is_never_refresh(&self, path: &str) -> bool {
        let path = Self::normalize(path);
        self.never_refresh.iter().any(|p| segment_match(&path, p))
    }

    /// Only these paths are eligible for refresh-and-retry on a 401.
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        let path = Self::normalize(path);
        self.protected_prefixes.iter().any(|p| segment_match(&path, p))
    }

    /// Is this the identity check (`/auth/me`)?
    #[must_use]
    pub fn is_identity_check(&self, path: &str) -> bool {
        Self::normalize(path) == self.me
    }

    #[must_use]
    pub fn me_path(&self) -> &str {
        &self.me
    }

    #[must_use]
    pub fn refresh_path(&self) -> &str {
        &self.refresh
    }

    #[must_use]
    pub fn demo_login_path(&self) -> &str {
        &self.demo_login
    }

    /// Provider login path; `Dev` mode uses the `/dev` variant that returns
    /// tokens in the body.
    #[must_use]
    pub fn login_path(&self, mode: DeployMode) -> String {
        match mode {
            DeployMode::Dev => format!("{}/dev", self.login),
            _ => self.login.clone(),
        }
    }

    #[must_use]
    pub fn logout_path(&self, mode: DeployMode) -> String {
        match mode {
            DeployMode::Dev => format!("{}/dev", self.logout),
            _ => self.logout.clone(),
        }
    }

    #[must_use]
    pub fn withdraw_path(&self) -> String {
        self.withdraw.clone()
    }
}

/// `path` matches `entry` exactly or as a whole leading path segment
/// (`/pets` matches `/pets` and `/pets/3`, never `/petstore`).
fn segment_match(path: &str, entry: &str) -> bool {
    match path.strip_prefix(entry) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PathPolicy {
        PathPolicy::new(
            "kakao",
            DEFAULT_PROTECTED_PREFIXES.iter().map(|p| (*p).to_string()).collect(),
            None,
        )
    }

    #[test]
    fn normalize_strips_query_and_adds_slash() {
        assert_eq!(PathPolicy::normalize("/pets/3?expand=true"), "/pets/3");
        assert_eq!(PathPolicy::normalize("auth/me"), "/auth/me");
        assert_eq!(PathPolicy::normalize(""), "");
    }

    #[test]
    fn auth_endpoints_never_refresh() {
        let p = policy();
        assert!(p.is_never_refresh("/auth/me"));
        assert!(p.is_never_refresh("/auth/refresh"));
        assert!(p.is_never_refresh("/auth/demo-login"));
        assert!(p.is_never_refresh("/auth/kakao/login"));
        assert!(p.is_never_refresh("/auth/kakao/login/dev"));
        assert!(p.is_never_refresh("/auth/kakao/logout?reason=manual"));
        assert!(!p.is_never_refresh("/pets/3"));
    }

    #[test]
    fn protected_prefixes_match_whole_segments() {
        let p = policy();
        assert!(p.is_protected("/pets"));
        assert!(p.is_protected("/pets/3/routines"));
        assert!(p.is_protected("/calendar?month=2024-06"));
        assert!(!p.is_protected("/petstore"));
        assert!(!p.is_protected("/auth/me"));
        assert!(!p.is_protected("/health"));
    }

    #[test]
    fn identity_check_is_exact() {
        let p = policy();
        assert!(p.is_identity_check("/auth/me"));
        assert!(p.is_identity_check("auth/me?fresh=1"));
        assert!(!p.is_identity_check("/auth/me/extra"));
    }

    #[test]
    fn provider_shapes_login_paths() {
        let p = PathPolicy::new("naver", Vec::new(), None);
        assert_eq!(p.login_path(DeployMode::Prod), "/auth/naver/login");
        assert_eq!(p.login_path(DeployMode::Dev), "/auth/naver/login/dev");
        assert!(p.is_never_refresh("/auth/naver/withdraw"));
    }

    #[test]
    fn never_refresh_override_replaces_derived_set() {
        let p = PathPolicy::new("kakao", Vec::new(), Some(vec!["/custom".into()]));
        assert!(p.is_never_refresh("/custom/x"));
        assert!(!p.is_never_refresh("/auth/kakao/login"));
        // The identity check is still recognized by path, not by set membership.
        assert!(p.is_identity_check("/auth/me"));
    }
}
