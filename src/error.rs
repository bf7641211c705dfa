/// Errors surfaced by the session core.
///
/// Authorization failures on protected endpoints are recovered internally
/// (refresh + one retry) before anything reaches a caller; what does reach a
/// caller is terminal for that request.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Network or request-building failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response surfaced after the 401 policy ran.
    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    /// The credential refresh itself failed; the session has already been
    /// marked `Unauthenticated(RefreshFailed)`.
    #[error("credential refresh failed: {detail}")]
    RefreshFailed { detail: String },

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable selected-pet cache IO failure.
    #[error("selected-pet cache error: {0}")]
    Cache(String),
}
