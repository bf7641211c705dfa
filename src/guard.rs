//! Route guards: pure decisions from session state.
//!
//! The shell asks one question per navigation: given the current session
//! state and what kind of route this is, render it, redirect somewhere, or
//! suspend until the in-flight identity check settles. The answer is a
//! pure function of the inputs, so decisions never stick; the shell
//! re-evaluates on every route change and every session change (via
//! [`SessionHandle::subscribe`]).

use tracing::debug;

use crate::config::{DeployMode, RoutePaths};
use crate::session::{AuthPhase, SessionHandle, SessionState};

/// The two onboarding screens, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingStep {
    RegisterPet,
    ConfigureRoutine,
}

/// What kind of route the shell is about to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSpec {
    /// Reachable only while signed out (login, landing).
    PublicOnly,
    /// Requires a fully authenticated session; `needs_selected_pet` also
    /// requires a current pet selection.
    Protected { needs_selected_pet: bool },
    /// Part of the onboarding tree; only the step matching the recorded
    /// progress may render.
    OnboardingOnly { step: OnboardingStep },
}

/// Guard verdict for one route evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Render,
    Redirect(String),
    Suspend,
}

/// Decide what to do with `route` under `state`.
///
/// Rule order matters: settledness first, then route-kind rules. While the
/// session is `Idle` or `Checking` nothing renders, with one exception: a
/// demo deployment waits in `Idle` for an explicit scenario choice, so
/// public-only routes (where the chooser lives) render there.
#[must_use]
pub fn decide(
    state: &SessionState,
    route: &RouteSpec,
    paths: &RoutePaths,
    mode: DeployMode,
) -> Decision {
    match state.phase {
        AuthPhase::Idle
            if mode.manual_demo_gate() && matches!(route, RouteSpec::PublicOnly) =>
        {
            return Decision::Render;
        }
        AuthPhase::Idle | AuthPhase::Checking => return Decision::Suspend,
        _ => {}
    }

    match route {
        RouteSpec::PublicOnly => match state.phase {
            AuthPhase::Authenticated => Decision::Redirect(paths.home.clone()),
            AuthPhase::Onboarding(_) => Decision::Redirect(paths.onboarding_entry.clone()),
            _ => Decision::Render,
        },

        RouteSpec::Protected { needs_selected_pet } => match state.phase {
            AuthPhase::Unauthenticated(_) => Decision::Redirect(paths.login.clone()),
            AuthPhase::Onboarding(_) => Decision::Redirect(paths.onboarding_entry.clone()),
            AuthPhase::Authenticated => {
                if *needs_selected_pet && state.selected_pet.is_none() {
                    Decision::Redirect(paths.onboarding_entry.clone())
                } else {
                    Decision::Render
                }
            }
            AuthPhase::Idle | AuthPhase::Checking => Decision::Suspend,
        },

        RouteSpec::OnboardingOnly { step } => match state.phase {
            AuthPhase::Onboarding(progress) => {
                // The current step is implied by progress: pet first, then
                // routine.
                let expected = if progress.pet_done {
                    OnboardingStep::ConfigureRoutine
                } else {
                    OnboardingStep::RegisterPet
                };
                if *step == expected {
                    Decision::Render
                } else {
                    Decision::Redirect(match expected {
                        OnboardingStep::RegisterPet => paths.onboarding_entry.clone(),
                        OnboardingStep::ConfigureRoutine => paths.routine_step.clone(),
                    })
                }
            }
            _ => Decision::Redirect(paths.home.clone()),
        },
    }
}

/// Evaluate `route` against the live session, with one-shot recovery of a
/// missing pet selection from the durable cache.
///
/// Recovery applies only to the pet-requiring authenticated case: if the
/// cache still holds a selection (say, after a reload that rebuilt the
/// in-memory state), it is adopted through the normal transition and the
/// decision is recomputed once. An empty or unusable cache falls through
/// to the redirect the pure rules produce.
#[must_use]
pub fn evaluate(
    session: &SessionHandle,
    route: &RouteSpec,
    paths: &RoutePaths,
    mode: DeployMode,
) -> Decision {
    let mut state = session.snapshot();

    let wants_missing_pet = matches!(route, RouteSpec::Protected { needs_selected_pet: true })
        && state.phase == AuthPhase::Authenticated
        && state.selected_pet.is_none();
    if wants_missing_pet {
        if let Some(pet) = session.load_cached_pet() {
            // A demotion can land while the cache is being read; re-read
            // the phase so the recovered selection is never written back
            // into a session that is no longer `Authenticated`.
            state = session.snapshot();
            if state.phase == AuthPhase::Authenticated {
                debug!(?pet, "recovered pet selection from durable cache");
                if session.set_selected_pet(Some(pet)).is_ok() {
                    state = session.snapshot();
                }
            }
        }
    }

    decide(&state, route, paths, mode)
}
