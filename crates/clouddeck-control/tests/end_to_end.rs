//! End-to-end tests against mocked identity and machine APIs.
//!
//! Both services are served by one wiremock server: the identity provider
//! at `/` (routed by `X-Amz-Target`) and the machine API under
//! `/accounts` and `/machines`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clouddeck_auth::AuthConfig;
use clouddeck_control::{
    CloudDeckController, ControlConfig, ControllerEvent, ControllerEvents, LifecycleAction,
    Outcome,
};
use clouddeck_store::{CredentialStore, RocksCredentialStore};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

struct Setup {
    server: MockServer,
    controller: CloudDeckController,
    events: ControllerEvents,
    store: Arc<RocksCredentialStore>,
    _dir: tempfile::TempDir,
}

async fn setup() -> Setup {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RocksCredentialStore::open(dir.path()).unwrap());

    let config = ControlConfig {
        poll_interval_ms: 20,
        ..ControlConfig::with_base_url(server.uri())
    };
    let (controller, events) =
        CloudDeckController::new(AuthConfig::with_endpoint(server.uri()), config, store.clone())
            .unwrap();

    Setup {
        server,
        controller,
        events,
        store,
        _dir: dir,
    }
}

async fn next(events: &mut ControllerEvents) -> ControllerEvent {
    timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

fn machine(status: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "m-1",
        "status": status,
        "password": "host-pw",
        "public_ip": "203.0.113.7",
        "last_started": 1_700_000_000,
        "created_at": 1_600_000_000,
    }))
}

#[tokio::test]
async fn login_resolve_and_start() {
    let mut s = setup().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("X-Amz-Target", "AWSCognitoIdentityProviderService.InitiateAuth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AuthenticationResult": {
                "AccessToken": "at",
                "ExpiresIn": 3600,
                "IdToken": "it",
                "RefreshToken": "rt",
                "TokenType": "Bearer"
            }
        })))
        .expect(1)
        .mount(&s.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("X-Amz-Target", "AWSCognitoIdentityProviderService.GetUser"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "UserAttributes": [
                {"Name": "email", "Value": "a@b.com"},
                {"Name": "custom:account", "Value": "acct-1"}
            ]
        })))
        .mount(&s.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/accounts/acct-1"))
        .and(header("Authorization", "Bearer at"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"machine_id": "m-1"})))
        .mount(&s.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/machines/m-1/start"))
        .and(header("Authorization", "Bearer at"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&s.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/machines/m-1"))
        .respond_with(machine("starting"))
        .up_to_n_times(1)
        .mount(&s.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/machines/m-1"))
        .respond_with(machine("running"))
        .mount(&s.server)
        .await;

    s.controller.login("a@b.com", "pw");
    assert_eq!(next(&mut s.events).await.outcome(), Outcome::Success);
    let tokens = s.controller.tokens();
    assert_eq!(tokens.access_token, "at");
    assert!((3590..=3600).contains(&tokens.seconds_remaining()));

    let token = s.controller.access_token();
    s.controller.resolve_machine_id(&token);
    assert_eq!(
        next(&mut s.events).await,
        ControllerEvent::AccountIdResolved("acct-1".to_string())
    );
    assert_eq!(
        next(&mut s.events).await,
        ControllerEvent::MachineIdResolved(Ok("m-1".to_string()))
    );

    let machine_id = s.controller.machine_id();
    s.controller.start(&machine_id, &token);
    assert_eq!(s.controller.action(), LifecycleAction::Starting);

    match next(&mut s.events).await {
        ControllerEvent::StatusUpdated(record) => assert_eq!(record.status, "starting"),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(s.controller.stall_count(), 0);
    assert!(matches!(next(&mut s.events).await, ControllerEvent::StatusUpdated(_)));

    match next(&mut s.events).await {
        ControllerEvent::StartFinished { result, status } => {
            assert_eq!(result.unwrap().status, "running");
            assert_eq!(status, "running");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(s.controller.action(), LifecycleAction::None);

    assert_eq!(s.store.stored_email().unwrap().as_deref(), Some("a@b.com"));
    assert_eq!(s.store.stored_server_address().unwrap().as_deref(), Some("203.0.113.7"));
    assert_eq!(s.store.stored_host_password().unwrap().as_deref(), Some("host-pw"));
    assert!(s.controller.is_clouddeck_host("203.0.113.7"));
}

#[tokio::test]
async fn wrong_password_is_classified() {
    let mut s = setup().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "__type": "com.amazonaws#NotAuthorizedException",
            "message": "Incorrect username or password."
        })))
        .mount(&s.server)
        .await;

    s.controller.login("a@b.com", "wrong");
    let event = next(&mut s.events).await;
    let failure = event.failure().unwrap();
    assert_eq!(failure.outcome, Outcome::NotAuthorized);
    assert_eq!(failure.code, "NotAuthorizedException");
    assert_eq!(failure.message, "Incorrect username or password.");
    assert!(s.controller.tokens().is_empty());
    assert!(!s.controller.has_stored_credentials().unwrap());
}

#[tokio::test]
async fn empty_machine_id_makes_no_request() {
    let mut s = setup().await;

    s.controller.fetch_status("", "at");
    match next(&mut s.events).await {
        ControllerEvent::StatusFailed(failure) => {
            assert_eq!(failure.code, "EmptyMachineId");
            assert_eq!(failure.outcome, Outcome::InvalidInput);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let requests = s.server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn failed_command_ends_the_start() {
    let mut s = setup().await;
    Mock::given(method("POST"))
        .and(path("/machines/m-1/start"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&s.server)
        .await;

    s.controller.start("m-1", "at");
    match next(&mut s.events).await {
        ControllerEvent::StartFinished { result, .. } => {
            let failure = result.unwrap_err();
            assert_eq!(failure.outcome, Outcome::HttpError(503));
            assert_eq!(failure.message, "HTTP error 503");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(s.controller.action(), LifecycleAction::None);
}

#[tokio::test]
async fn cancel_stops_polling_and_events() {
    let mut s = setup().await;
    Mock::given(method("POST"))
        .and(path("/machines/m-1/stop"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&s.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/machines/m-1"))
        .respond_with(machine("stopping"))
        .mount(&s.server)
        .await;

    s.controller.stop("m-1", "at");
    assert!(matches!(next(&mut s.events).await, ControllerEvent::StatusUpdated(_)));

    s.controller.cancel();
    assert_eq!(s.controller.action(), LifecycleAction::None);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let seen = s.server.received_requests().await.unwrap().len();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(s.server.received_requests().await.unwrap().len(), seen);
    assert!(s.events.try_recv().is_none());
}
