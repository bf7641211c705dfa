//! Credentialed HTTP transport with the 401 recovery policy.
//!
//! One [`ApiClient`] wraps one `reqwest::Client` with its cookie store
//! enabled; credentials travel only as cookies, never as injected headers.
//! Every response passes through the unauthorized-recovery policy before
//! the caller sees it: a 401 on a protected path triggers one credential
//! refresh (single-flight across concurrent callers) and one retry, and
//! everything else is surfaced unchanged.

use reqwest::{Method, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::Error;
use crate::paths::PathPolicy;
use crate::refresh::{RefreshError, RefreshGate};
use crate::session::SessionHandle;
use crate::types::{UnauthReason, WhoAmI};

/// A rebuildable request description.
///
/// The transport reissues the request after a refresh, so everything needed
/// to rebuild it lives here rather than in a consumed `reqwest` builder.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<serde_json::Value>,
    /// This request IS the credential refresh; its 401 must never recurse.
    pub(crate) refresh_call: bool,
    pub(crate) retried: bool,
}

impl RequestSpec {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: PathPolicy::normalize(&path.into()),
            query: Vec::new(),
            body: None,
            refresh_call: false,
            retried: false,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub(crate) fn refresh_marker(mut self) -> Self {
        self.refresh_call = true;
        self
    }
}

/// The one outbound HTTP client of the session core.
pub struct ApiClient {
    http: reqwest::Client,
    /// Base URL with any trailing slash stripped; paths are appended as-is.
    base: String,
    policy: PathPolicy,
    session: SessionHandle,
    gate: RefreshGate,
}

impl ApiClient {
    /// Build the transport for `config`, reporting auth failures to
    /// `session`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the underlying client cannot be built.
    pub fn new(config: &SessionConfig, session: SessionHandle) -> Result<Self, Error> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base: config.base_url().as_str().trim_end_matches('/').to_string(),
            policy: config.path_policy(),
            session,
            gate: RefreshGate::new(),
        })
    }

    /// Send `spec`, apply the 401 policy, and return the successful
    /// response.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] for network-level failures.
    /// - [`Error::RefreshFailed`] when a 401 triggered a refresh and the
    ///   refresh itself failed (the session is already demoted).
    /// - [`Error::Api`] for any non-2xx response that survives the policy,
    ///   including 401s on never-refresh paths and 401s on the retry.
    pub async fn send(&self, spec: RequestSpec) -> Result<Response, Error> {
        let first = self.issue(&spec).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return ensure_success(first).await;
        }

        // Ordered 401 policy.
        if self.policy.is_never_refresh(&spec.path) {
            if self.policy.is_identity_check(&spec.path) {
                self.session.mark_unauthenticated(UnauthReason::WhoAmIFailed);
            }
            debug!(path = %spec.path, "401 on never-refresh path, surfacing");
            return ensure_success(first).await;
        }
        if spec.refresh_call {
            return ensure_success(first).await;
        }
        if !self.policy.is_protected(&spec.path) {
            debug!(path = %spec.path, "401 outside protected prefixes, surfacing");
            return ensure_success(first).await;
        }

        self.refresh_credentials().await?;

        debug!(path = %spec.path, "retrying after credential refresh");
        let mut retry = spec;
        retry.retried = true;
        let second = self.issue(&retry).await?;
        // A second 401 is surfaced; never refresh twice for one request.
        ensure_success(second).await
    }

    /// Send `spec` and decode the response body as JSON.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send), plus [`Error::Http`] when the body does not
    /// decode as `T`.
    pub async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        spec: RequestSpec,
    ) -> Result<T, Error> {
        let response = self.send(spec).await?;
        Ok(response.json().await?)
    }

    /// Run the identity check.
    ///
    /// # Errors
    ///
    /// A 401 here is surfaced as [`Error::Api`] after the session has been
    /// marked `Unauthenticated(WhoAmIFailed)`; no refresh is attempted.
    pub async fn who_am_i(&self) -> Result<WhoAmI, Error> {
        self.fetch_json(RequestSpec::get(self.policy.me_path())).await
    }

    pub(crate) fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// One refresh per storm; concurrent callers join the in-flight
    /// attempt. On failure the session is demoted exactly once, by the
    /// caller that ran the network call.
    async fn refresh_credentials(&self) -> Result<(), Error> {
        let outcome = self
            .gate
            .run(|| async {
                debug!("refreshing credentials");
                let spec = RequestSpec::post(self.policy.refresh_path()).refresh_marker();
                let result = match self.issue(&spec).await {
                    // Server-set cookies are the whole payload; the body is
                    // discarded.
                    Ok(response) if response.status().is_success() => {
                        debug!("credential refresh succeeded");
                        return Ok(());
                    }
                    Ok(response) => {
                        let status = response.status().as_u16();
                        let detail = response.text().await.unwrap_or_default();
                        RefreshError { detail: format!("status {status}: {detail}") }
                    }
                    Err(e) => RefreshError { detail: e.to_string() },
                };
                warn!(error = %result, "credential refresh failed, demoting session");
                self.session.mark_unauthenticated(UnauthReason::RefreshFailed);
                Err(result)
            })
            .await;

        outcome.map_err(|e| Error::RefreshFailed { detail: e.detail })
    }

    async fn issue(&self, spec: &RequestSpec) -> Result<Response, Error> {
        let url = format!("{}{}", self.base, spec.path);
        let mut request = self.http.request(spec.method.clone(), url);
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

/// 2xx passes through; anything else becomes [`Error::Api`] with the
/// response body as detail.
async fn ensure_success(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_else(|_| "<unreadable body>".into());
    Err(Error::Api { status: status.as_u16(), detail })
}
