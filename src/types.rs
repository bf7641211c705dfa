use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};

/// Identifier of a registered pet.
///
/// Numeric, assigned by the backend. Also the value mirrored into the durable
/// selected-pet cache (as its decimal string).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr, From, Into,
)]
#[serde(transparent)]
pub struct PetId(pub i64);

/// Identifier of the account holder.
///
/// Only crosses the wire in the withdrawal request; everything else is
/// cookie-scoped on the backend side.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct MemberId(pub i64);

/// Seeded dataset the demo backend presents.
///
/// Only meaningful in demo deployments; tags which scenario the server-side
/// session was seeded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemoScenario {
    /// Fresh account: onboarding not finished, no data.
    New,
    /// Established account: pets, routines and history present.
    Existing,
}

/// Why the session ended up `Unauthenticated`.
///
/// Preserved for the shell; this core does not mandate per-reason UI
/// treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum UnauthReason {
    TokenExpired,
    /// The credential refresh itself failed (terminal).
    RefreshFailed,
    /// The identity check failed or was rejected.
    WhoAmIFailed,
    AccountDisabled,
    /// Explicit logout by the user.
    Logout,
}

/// Onboarding completion snapshot from the identity check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingProgress {
    /// Pet registration step finished.
    pub pet_done: bool,
    /// Routine-slot configuration step finished.
    pub routine_done: bool,
}

impl OnboardingProgress {
    /// Both onboarding steps are finished.
    #[must_use]
    pub fn complete(&self) -> bool {
        self.pet_done && self.routine_done
    }
}

/// Identity-check (`whoAmI`) response.
///
/// The authoritative response shape; demo deployments additionally echo the
/// seeded `scenario` so the client can re-derive it after a session reset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct WhoAmI {
    pub onboarding: OnboardingProgress,
    #[serde(default)]
    pub selected_pet_id: Option<PetId>,
    #[serde(default)]
    pub scenario: Option<DemoScenario>,
}

/// Token pair returned by the dev-mode login exchange.
///
/// Production and demo deployments set HttpOnly cookies instead and return an
/// empty body; the tokens here exist so a dev shell can hand the refresh
/// token back at logout.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct LoginTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
