//! Observable session state and its named transitions.
//!
//! One [`SessionState`] value lives inside a watch channel; everything the
//! rest of the crate (and the embedding shell) knows about the signed-in
//! user flows through it. There are no partial field writes from outside:
//! state changes only through the transition methods on [`SessionHandle`],
//! which keep the in-memory value and the durable selected-pet cache in
//! step.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::SelectedPetCache;
use crate::error::Error;
use crate::types::{DemoScenario, OnboardingProgress, PetId, UnauthReason};

/// Where the session stands.
///
/// The payload lives on the variant that needs it: onboarding progress
/// exists exactly while `Onboarding`, the demotion reason exactly while
/// `Unauthenticated`. Stale payload combinations are unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthPhase {
    /// No identity check has run (or the session was reset).
    #[default]
    Idle,
    /// An identity check is in flight; render nothing that depends on auth.
    Checking,
    /// Fully signed in, onboarding complete.
    Authenticated,
    /// Signed in but onboarding is unfinished.
    Onboarding(OnboardingProgress),
    /// Not signed in, with the reason for the demotion.
    Unauthenticated(UnauthReason),
}

/// The one shared session value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub phase: AuthPhase,
    /// Seeded demo dataset this session runs against; demo deployments only.
    pub demo_scenario: Option<DemoScenario>,
    /// Monotonic counter; each increment requests one identity check.
    /// `0` means no check has been requested yet. Never decreases, not even
    /// across [`SessionHandle::reset`].
    pub recheck_tick: u64,
    /// Pet whose data the shell is showing. Display continuity only, never
    /// an access-control input.
    pub selected_pet: Option<PetId>,
}

/// Handle to the session store.
///
/// Cheap to clone; all clones share the same state. Observers call
/// [`subscribe`](Self::subscribe) and re-evaluate on every change.
#[derive(Clone)]
pub struct SessionHandle {
    tx: Arc<watch::Sender<SessionState>>,
    cache: Arc<dyn SelectedPetCache>,
}

impl SessionHandle {
    /// Create the store in the `Idle` phase.
    ///
    /// The selected pet is preloaded from `cache` so the previous session's
    /// selection shows up before the first identity check lands; the check
    /// then overwrites it with the backend's value.
    #[must_use]
    pub fn new(cache: Arc<dyn SelectedPetCache>) -> Self {
        let selected_pet = match cache.load() {
            Ok(pet) => pet,
            Err(e) => {
                warn!(error = %e, "failed to preload selected-pet cache");
                None
            }
        };
        let (tx, _rx) = watch::channel(SessionState {
            selected_pet,
            ..SessionState::default()
        });
        Self { tx: Arc::new(tx), cache }
    }

    /// Subscribe to state changes. The receiver sees the current value
    /// immediately and is notified on every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Current state, cloned out of the channel.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Request a (re)confirmation of identity.
    ///
    /// Bumps the recheck tick; the bootstrap controller reacts to the new
    /// value. Safe to call any number of times, from any phase.
    pub fn request_recheck(&self) {
        self.tx.send_modify(|s| {
            s.recheck_tick += 1;
            debug!(tick = s.recheck_tick, "identity recheck requested");
        });
    }

    /// An identity check is now in flight.
    pub fn start_check(&self) {
        self.tx.send_modify(|s| s.phase = AuthPhase::Checking);
        debug!("identity check started");
    }

    /// The identity check confirmed a fully onboarded member.
    pub fn mark_authenticated(&self, scenario: Option<DemoScenario>) {
        self.tx.send_modify(|s| {
            s.phase = AuthPhase::Authenticated;
            if scenario.is_some() {
                s.demo_scenario = scenario;
            }
        });
        debug!(?scenario, "session authenticated");
    }

    /// The identity check found an unfinished onboarding.
    ///
    /// Demotes below `Authenticated`, so the selected pet is cleared from
    /// memory and from the durable cache.
    pub fn mark_onboarding(&self, progress: OnboardingProgress, scenario: Option<DemoScenario>) {
        self.clear_cache_logged();
        self.tx.send_modify(|s| {
            s.phase = AuthPhase::Onboarding(progress);
            if scenario.is_some() {
                s.demo_scenario = scenario;
            }
            s.selected_pet = None;
        });
        debug!(?progress, "session in onboarding");
    }

    /// The session is over; record why.
    ///
    /// Clears the scenario and the selected pet (memory and durable cache).
    /// The demotion itself never fails: a cache removal error is logged and
    /// swallowed here.
    pub fn mark_unauthenticated(&self, reason: UnauthReason) {
        self.clear_cache_logged();
        self.tx.send_modify(|s| {
            s.phase = AuthPhase::Unauthenticated(reason);
            s.demo_scenario = None;
            s.selected_pet = None;
        });
        info!(?reason, "session marked unauthenticated");
    }

    /// Change which pet the shell is showing.
    ///
    /// The durable cache is written first; on failure the in-memory value is
    /// left untouched, so memory never claims a selection the cache lost.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] if the durable mirror cannot be updated.
    pub fn set_selected_pet(&self, pet: Option<PetId>) -> Result<(), Error> {
        match pet {
            Some(id) => self.cache.store(id)?,
            None => self.cache.clear()?,
        }
        self.tx.send_modify(|s| s.selected_pet = pet);
        debug!(?pet, "selected pet updated");
        Ok(())
    }

    /// Return to `Idle` as if freshly mounted.
    ///
    /// Clears the scenario and the selection (memory and durable cache) but
    /// preserves the recheck tick, so results of checks started before the
    /// reset are recognizably stale.
    pub fn reset(&self) {
        self.clear_cache_logged();
        self.tx.send_modify(|s| {
            s.phase = AuthPhase::Idle;
            s.demo_scenario = None;
            s.selected_pet = None;
        });
        debug!("session reset");
    }

    /// Read the durable cache without touching state; unusable caches read
    /// as `None`.
    pub(crate) fn load_cached_pet(&self) -> Option<PetId> {
        match self.cache.load() {
            Ok(pet) => pet,
            Err(e) => {
                warn!(error = %e, "failed to read selected-pet cache");
                None
            }
        }
    }

    fn clear_cache_logged(&self) {
        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "failed to clear selected-pet cache");
        }
    }
}
