//! End-to-end session lifecycle against a scripted mock backend: cold
//! load, onboarding completion, demo scenario switching, stale-tick
//! discard, and the login/logout/withdraw flows.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use petcare_session::{
    AuthPhase, Decision, DemoScenario, DeployMode, MemberId, OnboardingStep, PetId, RouteSpec,
    SessionClient, SessionConfig, SessionHandle, SessionState,
};

/// One scripted reply for the identity check.
#[derive(Clone)]
struct MeReply {
    status: StatusCode,
    body: Value,
    delay: Duration,
}

impl MeReply {
    fn delayed(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }
}

fn fully_onboarded(selected: Option<i64>) -> MeReply {
    MeReply {
        status: StatusCode::OK,
        body: json!({
            "onboarding": {"petDone": true, "routineDone": true},
            "selectedPetId": selected,
        }),
        delay: Duration::ZERO,
    }
}

fn mid_onboarding(pet_done: bool) -> MeReply {
    MeReply {
        status: StatusCode::OK,
        body: json!({
            "onboarding": {"petDone": pet_done, "routineDone": false},
            "selectedPetId": null,
        }),
        delay: Duration::ZERO,
    }
}

fn demo_member(scenario: &str, selected: Option<i64>) -> MeReply {
    MeReply {
        status: StatusCode::OK,
        body: json!({
            "onboarding": {"petDone": true, "routineDone": true},
            "selectedPetId": selected,
            "scenario": scenario,
        }),
        delay: Duration::ZERO,
    }
}

#[derive(Default)]
struct ServerState {
    me_script: Mutex<VecDeque<MeReply>>,
    me_calls: AtomicUsize,
    demo_calls: AtomicUsize,
    login_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    withdraw_calls: AtomicUsize,
    last_scenario: Mutex<Option<String>>,
    last_login_code: Mutex<Option<String>>,
    last_logout_body: Mutex<Option<Value>>,
    last_withdraw_body: Mutex<Option<Value>>,
}

impl ServerState {
    fn script_me(&self, replies: impl IntoIterator<Item = MeReply>) {
        self.me_script.lock().extend(replies);
    }
}

async fn me(State(s): State<Arc<ServerState>>) -> Response {
    s.me_calls.fetch_add(1, Ordering::SeqCst);
    let reply = s.me_script.lock().pop_front();
    match reply {
        Some(reply) => {
            tokio::time::sleep(reply.delay).await;
            (reply.status, Json(reply.body)).into_response()
        }
        None => (StatusCode::UNAUTHORIZED, Json(json!({"message": "no session"}))).into_response(),
    }
}

async fn demo_login(State(s): State<Arc<ServerState>>, Json(body): Json<Value>) -> StatusCode {
    s.demo_calls.fetch_add(1, Ordering::SeqCst);
    *s.last_scenario.lock() = body["scenario"].as_str().map(str::to_owned);
    StatusCode::NO_CONTENT
}

async fn login_dev(
    State(s): State<Arc<ServerState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    s.login_calls.fetch_add(1, Ordering::SeqCst);
    *s.last_login_code.lock() = params.get("code").cloned();
    Json(json!({"accessToken": "access-abc", "refreshToken": "refresh-xyz"})).into_response()
}

async fn logout_dev(State(s): State<Arc<ServerState>>, Json(body): Json<Value>) -> StatusCode {
    s.logout_calls.fetch_add(1, Ordering::SeqCst);
    *s.last_logout_body.lock() = Some(body);
    StatusCode::NO_CONTENT
}

async fn withdraw(State(s): State<Arc<ServerState>>, Json(body): Json<Value>) -> StatusCode {
    s.withdraw_calls.fetch_add(1, Ordering::SeqCst);
    *s.last_withdraw_body.lock() = Some(body);
    StatusCode::NO_CONTENT
}

struct MockBackend {
    base_url: String,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn start_mock() -> MockBackend {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind 127.0.0.1:0");
    let base_url = format!("http://{}", listener.local_addr().expect("local addr"));

    let state = Arc::new(ServerState::default());
    let app = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/demo-login", post(demo_login))
        .route("/auth/kakao/login/dev", get(login_dev))
        .route("/auth/kakao/logout/dev", post(logout_dev))
        .route("/auth/kakao/withdraw", post(withdraw))
        .with_state(Arc::clone(&state));

    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    MockBackend { base_url, state, task }
}

fn client_for(mock: &MockBackend, mode: DeployMode) -> SessionClient {
    let config = SessionConfig::new(mock.base_url.parse().expect("base url")).with_mode(mode);
    SessionClient::new(config).expect("client")
}

/// Wait until the session satisfies `pred`, returning the matching state.
async fn wait_until(
    session: &SessionHandle,
    pred: impl Fn(&SessionState) -> bool,
) -> SessionState {
    let mut rx = session.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let state = rx.borrow_and_update();
                if pred(&state) {
                    return state.clone();
                }
            }
            rx.changed().await.expect("session store alive");
        }
    })
    .await
    .expect("condition not reached in time")
}

async fn wait_for_calls(counter: &AtomicUsize, at_least: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while counter.load(Ordering::SeqCst) < at_least {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("call count not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cold_load_confirms_returning_member() {
    let mock = start_mock().await;
    mock.state.script_me([fully_onboarded(Some(3))]);

    let dir = tempfile::tempdir().expect("tempdir");
    let cache_path = dir.path().join("selected-pet");
    let config = SessionConfig::new(mock.base_url.parse().expect("base url"))
        .with_cache_path(cache_path.clone());
    let client = SessionClient::new(config).expect("client");
    let session = client.session();

    let controller = client.spawn_bootstrap();
    let state = wait_until(&session, |s| s.phase == AuthPhase::Authenticated).await;

    assert_eq!(state.selected_pet, Some(PetId(3)));
    assert_eq!(state.recheck_tick, 1);
    assert_eq!(mock.state.me_calls.load(Ordering::SeqCst), 1);
    // The durable mirror now holds the backend's selection.
    assert_eq!(std::fs::read_to_string(&cache_path).expect("cache file"), "3");

    let pet_route = RouteSpec::Protected { needs_selected_pet: true };
    assert_eq!(client.evaluate_route(&pet_route), Decision::Render);
    assert_eq!(
        client.evaluate_route(&RouteSpec::PublicOnly),
        Decision::Redirect("/".into()),
    );

    controller.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn onboarding_member_is_guided_then_promoted() {
    let mock = start_mock().await;
    mock.state.script_me([mid_onboarding(true), fully_onboarded(None)]);

    let client = client_for(&mock, DeployMode::Prod);
    let session = client.session();
    let controller = client.spawn_bootstrap();

    let state = wait_until(&session, |s| matches!(s.phase, AuthPhase::Onboarding(_))).await;
    match state.phase {
        AuthPhase::Onboarding(progress) => {
            assert!(progress.pet_done);
            assert!(!progress.routine_done);
        }
        other => panic!("expected onboarding, got {other:?}"),
    }

    // Mid-onboarding: protected bounces to the onboarding tree, and only
    // the routine step may render.
    assert_eq!(
        client.evaluate_route(&RouteSpec::Protected { needs_selected_pet: false }),
        Decision::Redirect("/signup/pet".into()),
    );
    assert_eq!(
        client.evaluate_route(&RouteSpec::OnboardingOnly { step: OnboardingStep::ConfigureRoutine }),
        Decision::Render,
    );
    assert_eq!(
        client.evaluate_route(&RouteSpec::OnboardingOnly { step: OnboardingStep::RegisterPet }),
        Decision::Redirect("/slot".into()),
    );

    // The shell finished the last step and asks for confirmation.
    session.request_recheck();
    let state = wait_until(&session, |s| s.phase == AuthPhase::Authenticated).await;
    assert_eq!(state.selected_pet, None);
    assert_eq!(mock.state.me_calls.load(Ordering::SeqCst), 2);

    controller.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn demo_mode_waits_for_scenario_then_switches() {
    let mock = start_mock().await;
    mock.state
        .script_me([demo_member("new", Some(1)), demo_member("existing", Some(9))]);

    let client = client_for(&mock, DeployMode::Demo);
    let session = client.session();
    let controller = client.spawn_bootstrap();

    // Manual gate: no auto check, chooser renders, everything else waits.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.snapshot().phase, AuthPhase::Idle);
    assert_eq!(mock.state.me_calls.load(Ordering::SeqCst), 0);
    assert_eq!(client.evaluate_route(&RouteSpec::PublicOnly), Decision::Render);
    assert_eq!(
        client.evaluate_route(&RouteSpec::Protected { needs_selected_pet: false }),
        Decision::Suspend,
    );

    client.switch_scenario(DemoScenario::New).await.expect("enter demo");
    let state = wait_until(&session, |s| s.phase == AuthPhase::Authenticated).await;
    assert_eq!(state.demo_scenario, Some(DemoScenario::New));
    assert_eq!(state.selected_pet, Some(PetId(1)));
    assert_eq!(mock.state.last_scenario.lock().as_deref(), Some("new"));

    client
        .switch_scenario(DemoScenario::Existing)
        .await
        .expect("switch demo scenario");
    let state = wait_until(&session, |s| {
        s.demo_scenario == Some(DemoScenario::Existing) && s.phase == AuthPhase::Authenticated
    })
    .await;
    assert_eq!(state.selected_pet, Some(PetId(9)));
    assert_eq!(state.recheck_tick, 2);
    assert_eq!(mock.state.demo_calls.load(Ordering::SeqCst), 2);
    assert_eq!(mock.state.me_calls.load(Ordering::SeqCst), 2);
    assert_eq!(mock.state.last_scenario.lock().as_deref(), Some("existing"));

    controller.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_identity_result_is_discarded() {
    let mock = start_mock().await;
    // The first check dawdles; a second recheck lands while it is in
    // flight, so its result (pet 7) must never be applied.
    mock.state
        .script_me([fully_onboarded(Some(7)).delayed(300), fully_onboarded(Some(9))]);

    let client = client_for(&mock, DeployMode::Prod);
    let session = client.session();

    let seen: Arc<Mutex<Vec<SessionState>>> = Arc::new(Mutex::new(Vec::new()));
    let collector = {
        let mut rx = session.subscribe();
        let seen = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                {
                    let state = rx.borrow_and_update();
                    seen.lock().push(state.clone());
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    };

    let controller = client.spawn_bootstrap();

    // First check is inside the handler now; request another.
    wait_for_calls(&mock.state.me_calls, 1).await;
    session.request_recheck();

    let state = wait_until(&session, |s| s.phase == AuthPhase::Authenticated).await;
    assert_eq!(state.selected_pet, Some(PetId(9)));
    assert_eq!(state.recheck_tick, 2);
    assert_eq!(mock.state.me_calls.load(Ordering::SeqCst), 2);

    // The stale result never surfaced, not even transiently.
    assert!(
        !seen.lock().iter().any(|s| s.selected_pet == Some(PetId(7))),
        "stale selection was applied",
    );

    controller.abort();
    collector.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dev_login_surfaces_tokens_and_requests_recheck() -> anyhow::Result<()> {
    let mock = start_mock().await;
    let client = client_for(&mock, DeployMode::Dev);

    let tokens = client.login("code123").await?.expect("dev tokens");
    assert_eq!(tokens.access_token, "access-abc");
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-xyz"));

    assert_eq!(mock.state.login_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.state.last_login_code.lock().as_deref(), Some("code123"));
    // The exchange only set cookies; deriving state is the bootstrap's
    // job, so a recheck must now be pending.
    assert_eq!(client.session().snapshot().recheck_tick, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dev_logout_sends_token_and_resets() {
    let mock = start_mock().await;
    let client = client_for(&mock, DeployMode::Dev);
    client.session().mark_authenticated(None);

    client.logout(Some("refresh-xyz")).await.expect("logout");

    assert_eq!(mock.state.logout_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        mock.state.last_logout_body.lock().clone(),
        Some(json!({"refreshToken": "refresh-xyz"})),
    );
    let state = client.session().snapshot();
    assert_eq!(state.phase, AuthPhase::Idle);
    // Reset is paired with a recheck, as the demo switch does.
    assert_eq!(state.recheck_tick, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logout_rechecks_and_settles_on_login() {
    let mock = start_mock().await;
    mock.state.script_me([fully_onboarded(Some(3))]);

    let client = client_for(&mock, DeployMode::Dev);
    let session = client.session();
    let controller = client.spawn_bootstrap();
    wait_until(&session, |s| s.phase == AuthPhase::Authenticated).await;

    client.logout(Some("refresh-xyz")).await.expect("logout");

    // The post-logout recheck finds no session (the script is exhausted,
    // so the identity check 401s) and the guards settle on the login
    // screen instead of suspending in `Idle` forever.
    let state = wait_until(&session, |s| matches!(s.phase, AuthPhase::Unauthenticated(_))).await;
    assert_eq!(state.recheck_tick, 2);
    assert_eq!(mock.state.me_calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.evaluate_route(&RouteSpec::PublicOnly), Decision::Render);
    assert_eq!(
        client.evaluate_route(&RouteSpec::Protected { needs_selected_pet: false }),
        Decision::Redirect("/login".into()),
    );

    controller.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn withdraw_resets_only_after_server_confirms() -> anyhow::Result<()> {
    let mock = start_mock().await;
    let client = client_for(&mock, DeployMode::Prod);
    client.session().mark_authenticated(None);

    client.withdraw(Some(MemberId(77))).await?;

    assert_eq!(mock.state.withdraw_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        mock.state.last_withdraw_body.lock().clone(),
        Some(json!({"memberId": 77})),
    );
    let state = client.session().snapshot();
    assert_eq!(state.phase, AuthPhase::Idle);
    assert_eq!(state.recheck_tick, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_the_controller_owner_stops_the_task() {
    // Nothing listens on the discard port; the first check fails fast.
    let config = SessionConfig::new("http://127.0.0.1:9".parse().expect("base url"));
    let client = SessionClient::new(config).expect("client");
    let session = client.session();
    let mut rx = session.subscribe();

    let controller = client.spawn_bootstrap();
    wait_until(&session, |s| matches!(s.phase, AuthPhase::Unauthenticated(_))).await;

    drop(controller);
    drop(client);
    drop(session);

    // After the owner is gone the aborted task is the only thing that could
    // still hold a sender, so the channel must close promptly.
    tokio::time::timeout(Duration::from_secs(2), async {
        while rx.changed().await.is_ok() {}
    })
    .await
    .expect("controller task kept the session alive after its owner was dropped");
}
