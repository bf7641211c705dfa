//! Public facade over the session core.
//!
//! [`SessionClient`] owns the wired-together pieces: configuration, the
//! observable session store, the credentialed transport, and the spawnable
//! bootstrap controller. The embedding shell creates one per process and
//! keeps it for the lifetime of the app.

use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{Bootstrap, BootstrapTask};
use crate::cache::{FileCache, MemoryCache, SelectedPetCache};
use crate::config::{DeployMode, SessionConfig};
use crate::error::Error;
use crate::guard::{self, Decision, RouteSpec};
use crate::session::SessionHandle;
use crate::transport::{ApiClient, RequestSpec};
use crate::types::{DemoScenario, LoginTokens, MemberId, WhoAmI};

/// Everything the shell needs, in one place.
///
/// ```rust,ignore
/// use petcare_session::{SessionClient, SessionConfig};
///
/// let client = SessionClient::new(SessionConfig::from_env()?)?;
/// let _controller = client.spawn_bootstrap();
/// let mut changes = client.session().subscribe();
/// while changes.changed().await.is_ok() {
///     // re-evaluate the current route
/// }
/// ```
pub struct SessionClient {
    config: SessionConfig,
    session: SessionHandle,
    api: Arc<ApiClient>,
}

impl SessionClient {
    /// Wire up the core for `config`.
    ///
    /// The durable selected-pet cache is file-backed when the config names
    /// a cache path, in-memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: SessionConfig) -> Result<Self, Error> {
        let cache: Arc<dyn SelectedPetCache> = match config.cache_path() {
            Some(path) => Arc::new(FileCache::new(path.clone())),
            None => Arc::new(MemoryCache::new()),
        };
        Self::with_cache(config, cache)
    }

    /// Wire up the core with a caller-provided selected-pet cache, for
    /// shells that mirror the selection into their own storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn with_cache(
        config: SessionConfig,
        cache: Arc<dyn SelectedPetCache>,
    ) -> Result<Self, Error> {
        let session = SessionHandle::new(cache);
        let api = Arc::new(ApiClient::new(&config, session.clone())?);
        Ok(Self { config, session, api })
    }

    /// Shorthand for [`SessionConfig::from_env`] + [`new`](Self::new).
    ///
    /// # Errors
    ///
    /// As the two underlying constructors.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(SessionConfig::from_env()?)
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle to the observable session state.
    #[must_use]
    pub fn session(&self) -> SessionHandle {
        self.session.clone()
    }

    /// The shared transport, for feature calls issued by the shell.
    #[must_use]
    pub fn api(&self) -> Arc<ApiClient> {
        Arc::clone(&self.api)
    }

    /// Start the bootstrap controller task.
    ///
    /// The returned [`BootstrapTask`] owns it: keep the value alive for as
    /// long as identity checks should keep flowing; dropping it aborts the
    /// task.
    pub fn spawn_bootstrap(&self) -> BootstrapTask {
        Bootstrap::new(self.session.clone(), Arc::clone(&self.api), self.config.mode()).spawn()
    }

    /// Guard decision for `route` against the live session state, with
    /// one-shot cache recovery of a missing pet selection.
    #[must_use]
    pub fn evaluate_route(&self, route: &RouteSpec) -> Decision {
        guard::evaluate(&self.session, route, self.config.routes(), self.config.mode())
    }

    /// Run the identity check directly.
    ///
    /// Most shells never call this: the bootstrap controller runs it in
    /// response to [`SessionHandle::request_recheck`].
    ///
    /// # Errors
    ///
    /// As [`ApiClient::who_am_i`].
    pub async fn who_am_i(&self) -> Result<WhoAmI, Error> {
        self.api.who_am_i().await
    }

    /// Complete the social login with the provider's authorization `code`.
    ///
    /// On success the backend has set session cookies; a recheck is
    /// requested so the bootstrap controller re-derives the session state.
    /// `Dev` deployments also surface the token pair the dev endpoint
    /// returns in its body; elsewhere the body is ignored.
    ///
    /// # Errors
    ///
    /// Transport errors as [`ApiClient::send`]; the 401 policy never
    /// refreshes on the login path.
    pub async fn login(&self, code: &str) -> Result<Option<LoginTokens>, Error> {
        let path = self.api.policy().login_path(self.config.mode());
        let response = self
            .api
            .send(RequestSpec::get(path).with_query("code", code))
            .await?;

        let tokens = if self.config.mode() == DeployMode::Dev {
            Some(response.json().await?)
        } else {
            None
        };

        info!("login exchange complete, requesting identity check");
        self.session.request_recheck();
        Ok(tokens)
    }

    /// Sign out.
    ///
    /// The session is reset to `Idle` and a recheck is requested whether or
    /// not the server call succeeds; signing out locally must not depend on
    /// the network. The recheck re-derives the next state from the backend,
    /// the same way [`switch_scenario`](Self::switch_scenario) does: after a
    /// credential-clearing logout it lands `Unauthenticated` and the guards
    /// route to the login screen rather than suspending in `Idle`. `Dev`
    /// deployments pass the refresh token in the body as the dev logout
    /// endpoint expects.
    ///
    /// # Errors
    ///
    /// The server-side failure is still surfaced after the local reset.
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), Error> {
        let path = self.api.policy().logout_path(self.config.mode());
        let mut spec = RequestSpec::post(path);
        if self.config.mode() == DeployMode::Dev {
            if let Some(token) = refresh_token {
                spec = spec.with_json(serde_json::json!({ "refreshToken": token }));
            }
        }

        let result = self.api.send(spec).await;
        info!("logged out, resetting session");
        self.session.reset();
        self.session.request_recheck();
        result?;
        Ok(())
    }

    /// Delete the account, then reset the session.
    ///
    /// Unlike [`logout`](Self::logout), the reset happens only after the
    /// server confirms: a failed withdrawal leaves the session intact. A
    /// recheck is requested after the reset so the guards settle on the
    /// login screen instead of suspending in `Idle`.
    ///
    /// # Errors
    ///
    /// Transport errors as [`ApiClient::send`].
    pub async fn withdraw(&self, member_id: Option<MemberId>) -> Result<(), Error> {
        let path = self.api.policy().withdraw_path();
        let spec = RequestSpec::post(path).with_json(serde_json::json!({ "memberId": member_id }));
        self.api.send(spec).await?;

        info!("account withdrawn, resetting session");
        self.session.reset();
        self.session.request_recheck();
        Ok(())
    }

    /// Enter or switch the seeded demo scenario.
    ///
    /// Used both for the initial choice (from `Idle`) and for switching
    /// mid-session: the backend re-seeds the session cookies, local state
    /// is reset, and a recheck re-derives everything from the new
    /// scenario's data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] outside demo deployment mode; transport
    /// errors as [`ApiClient::send`] (on failure the local session is left
    /// untouched).
    pub async fn switch_scenario(&self, scenario: DemoScenario) -> Result<(), Error> {
        if self.config.mode() != DeployMode::Demo {
            return Err(Error::Config(
                "demo scenarios require demo deployment mode".into(),
            ));
        }

        let spec = RequestSpec::post(self.api.policy().demo_login_path())
            .with_json(serde_json::json!({ "scenario": scenario }));
        self.api.send(spec).await?;

        info!(?scenario, "demo scenario switched, restarting session");
        self.session.reset();
        self.session.request_recheck();
        Ok(())
    }
}
