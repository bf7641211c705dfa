use std::path::PathBuf;

use url::Url;

use crate::error::Error;
use crate::paths::{PathPolicy, DEFAULT_PROTECTED_PREFIXES};

/// Deployment mode of the surrounding application.
///
/// Mirrors the shell's build mode: `Dev` talks to the `[/dev]` auth endpoint
/// variants and sees tokens in login bodies, `Demo` runs against seeded
/// backend datasets behind a manual scenario gate, `Prod` is cookie-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployMode {
    Dev,
    #[default]
    Prod,
    Demo,
}

impl DeployMode {
    /// The identity check must not auto-run while `Idle` in this mode;
    /// `Idle` means "awaiting an explicit scenario choice".
    #[must_use]
    pub fn manual_demo_gate(self) -> bool {
        matches!(self, Self::Demo)
    }
}

/// Redirect targets handed out by the route guards.
#[derive(Debug, Clone)]
pub struct RoutePaths {
    /// Main screen of the authenticated area.
    pub home: String,
    /// Login screen (public-only).
    pub login: String,
    /// Onboarding entry = pet-registration step.
    pub onboarding_entry: String,
    /// Routine-slot configuration step.
    pub routine_step: String,
}

impl Default for RoutePaths {
    fn default() -> Self {
        Self {
            home: "/".into(),
            login: "/login".into(),
            onboarding_entry: "/signup/pet".into(),
            routine_step: "/slot".into(),
        }
    }
}

/// Session core configuration.
///
/// The required field (`base_url`) is a constructor parameter, so there are
/// no runtime "missing field" errors. Use
/// [`from_env()`](SessionConfig::from_env) for convention-based setup, or
/// [`new()`](SessionConfig::new) with `with_*` methods for full control.
///
/// ```rust,ignore
/// use petcare_session::{DeployMode, SessionConfig};
///
/// let config = SessionConfig::new("https://app.example.com/api".parse()?)
///     .with_mode(DeployMode::Demo)
///     .with_provider("kakao");
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) base_url: Url,
    pub(crate) mode: DeployMode,
    pub(crate) provider: String,
    pub(crate) routes: RoutePaths,
    pub(crate) protected_prefixes: Vec<String>,
    pub(crate) never_refresh_override: Option<Vec<String>>,
    pub(crate) cache_path: Option<PathBuf>,
}

impl SessionConfig {
    /// Create a configuration for the backend at `base_url`.
    ///
    /// All optional fields use the conventions of the deployed app: `kakao`
    /// provider, `Prod` mode, the standard route targets and protected
    /// prefixes.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            mode: DeployMode::default(),
            provider: "kakao".into(),
            routes: RoutePaths::default(),
            protected_prefixes: DEFAULT_PROTECTED_PREFIXES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            never_refresh_override: None,
            cache_path: None,
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// # Required env vars
    /// - `PETCARE_BASE_URL`: backend base URL (must parse as a URL)
    ///
    /// # Optional env vars
    /// - `PETCARE_MODE`: `development` / `production` / `demo` (default
    ///   `production`)
    /// - `PETCARE_PROVIDER`: social login provider segment (default `kakao`)
    /// - `PETCARE_CACHE_PATH`: file backing the durable selected-pet cache
    ///   (default: in-memory only)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or invalid.
    pub fn from_env() -> Result<Self, Error> {
        let base_url_str = std::env::var("PETCARE_BASE_URL")
            .map_err(|_| Error::Config("PETCARE_BASE_URL is required".into()))?;
        let base_url: Url = base_url_str
            .parse()
            .map_err(|e| Error::Config(format!("PETCARE_BASE_URL: {e}")))?;

        let mut config = Self::new(base_url);

        if let Ok(mode) = std::env::var("PETCARE_MODE") {
            config = config.with_mode(match mode.as_str() {
                "development" | "dev" => DeployMode::Dev,
                "production" | "prod" => DeployMode::Prod,
                "demo" => DeployMode::Demo,
                other => {
                    return Err(Error::Config(format!("PETCARE_MODE: unknown mode '{other}'")));
                }
            });
        }
        if let Ok(provider) = std::env::var("PETCARE_PROVIDER") {
            config = config.with_provider(provider);
        }
        if let Ok(path) = std::env::var("PETCARE_CACHE_PATH") {
            config = config.with_cache_path(PathBuf::from(path));
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_mode(mut self, mode: DeployMode) -> Self {
        self.mode = mode;
        self
    }

    /// Override the social login provider path segment (default `kakao`).
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Override the guard redirect targets.
    #[must_use]
    pub fn with_routes(mut self, routes: RoutePaths) -> Self {
        self.routes = routes;
        self
    }

    /// Override the protected API path prefixes (the only paths eligible for
    /// refresh-and-retry on a 401).
    #[must_use]
    pub fn with_protected_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.protected_prefixes = prefixes;
        self
    }

    /// Override the never-refresh path set. Defaults to the six auth/session
    /// endpoints derived from `provider`.
    #[must_use]
    pub fn with_never_refresh_paths(mut self, paths: Vec<String>) -> Self {
        self.never_refresh_override = Some(paths);
        self
    }

    /// Back the durable selected-pet cache with a file at `path`.
    #[must_use]
    pub fn with_cache_path(mut self, path: PathBuf) -> Self {
        self.cache_path = Some(path);
        self
    }

    /// Backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn mode(&self) -> DeployMode {
        self.mode
    }

    /// Social login provider path segment.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Guard redirect targets.
    #[must_use]
    pub fn routes(&self) -> &RoutePaths {
        &self.routes
    }

    #[must_use]
    pub fn cache_path(&self) -> Option<&PathBuf> {
        self.cache_path.as_ref()
    }

    /// Path classification consumed by the transport's 401 policy.
    #[must_use]
    pub fn path_policy(&self) -> PathPolicy {
        PathPolicy::new(
            &self.provider,
            self.protected_prefixes.clone(),
            self.never_refresh_override.clone(),
        )
    }
}
