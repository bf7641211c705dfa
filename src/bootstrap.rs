//! Identity-check orchestration.
//!
//! One spawned task owns the whole who-am-I flow: it watches the session's
//! recheck tick, runs one identity check per requested tick, and feeds the
//! result back through the session transitions. Because it is a single
//! task, checks are serialized; a tick that arrives mid-flight is handled
//! right after the in-flight call settles, whose result is then discarded
//! as stale.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::DeployMode;
use crate::session::{AuthPhase, SessionHandle};
use crate::transport::ApiClient;
use crate::types::UnauthReason;

pub struct Bootstrap {
    session: SessionHandle,
    api: Arc<ApiClient>,
    manual_demo_gate: bool,
}

/// Owner of the running controller task; dropping it aborts the task.
///
/// The task keeps its own [`SessionHandle`] (and the transport's) alive, so
/// it never observes the session store closing on its own. Its lifetime is
/// this owner's: hold it for as long as identity checks should keep
/// flowing, and drop it (or call [`abort`](Self::abort)) on shell teardown.
#[must_use = "dropping this stops the bootstrap controller"]
#[derive(Debug)]
pub struct BootstrapTask {
    task: JoinHandle<()>,
}

impl BootstrapTask {
    /// Stop the controller now.
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for BootstrapTask {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Bootstrap {
    #[must_use]
    pub fn new(session: SessionHandle, api: Arc<ApiClient>, mode: DeployMode) -> Self {
        Self {
            session,
            api,
            manual_demo_gate: mode.manual_demo_gate(),
        }
    }

    /// Start the controller task and hand its lifetime to the caller.
    ///
    /// On a fresh `Idle` session the task requests the first identity check
    /// itself, unless the deployment gates checks behind an explicit
    /// demo-scenario choice.
    pub fn spawn(self) -> BootstrapTask {
        BootstrapTask { task: tokio::spawn(self.run()) }
    }

    async fn run(self) {
        let mut rx = self.session.subscribe();

        let mount_idle = {
            let state = rx.borrow_and_update();
            matches!(state.phase, AuthPhase::Idle)
        };
        if mount_idle && !self.manual_demo_gate {
            self.session.request_recheck();
        }

        let mut last_handled: u64 = 0;
        loop {
            let tick = rx.borrow_and_update().recheck_tick;
            if tick > last_handled {
                last_handled = tick;
                self.check_identity(tick).await;
                // Re-read immediately: the tick may have moved on while the
                // check was in flight.
                continue;
            }
            if rx.changed().await.is_err() {
                debug!("session store dropped, bootstrap controller exiting");
                break;
            }
        }
    }

    /// Run one identity check for `tick` and apply the outcome, unless the
    /// tick moved while the call was in flight.
    async fn check_identity(&self, tick: u64) {
        self.session.start_check();
        debug!(tick, "running identity check");

        let result = self.api.who_am_i().await;

        let current = self.session.snapshot().recheck_tick;
        if current != tick {
            debug!(tick, current, "discarding stale identity result");
            return;
        }

        match result {
            Ok(who) => {
                if who.onboarding.complete() {
                    self.session.mark_authenticated(who.scenario);
                    // The backend's selection is authoritative; losing the
                    // durable mirror must not demote a confirmed session.
                    if let Err(e) = self.session.set_selected_pet(who.selected_pet_id) {
                        warn!(error = %e, "failed to mirror selected pet from identity check");
                    }
                } else {
                    self.session.mark_onboarding(who.onboarding, who.scenario);
                }
            }
            Err(e) => {
                warn!(error = %e, tick, "identity check failed");
                self.session.mark_unauthenticated(UnauthReason::WhoAmIFailed);
            }
        }
    }
}
