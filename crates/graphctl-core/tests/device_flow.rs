//! Integration tests for the device-code login flow

use std::time::{Duration, Instant};

use graphctl_core::auth::{AuthError, DeviceCode, DeviceCodeAuthenticator, PollTiming};
use graphctl_core::config::AuthEndpoints;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SLOW_DOWN_STEP: Duration = Duration::from_millis(200);

/// Polls as fast as the device code allows, with a short `slow_down` step.
fn authenticator(server: &MockServer) -> DeviceCodeAuthenticator {
    DeviceCodeAuthenticator::new(AuthEndpoints::from_authority(&server.uri()))
        .unwrap()
        .with_timing(PollTiming {
            min_interval: Duration::ZERO,
            slow_down_step: SLOW_DOWN_STEP,
        })
}

fn device_code(interval: u64, expires_in: u64) -> DeviceCode {
    DeviceCode {
        device_code: "device-123".to_string(),
        user_code: "ABCD-EFGH".to_string(),
        verification_uri: "https://microsoft.com/devicelogin".to_string(),
        interval,
        expires_in,
        message: None,
    }
}

fn token_error(code: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(serde_json::json!({
        "error": code,
        "error_description": format!("{} description", code),
    }))
}

fn token_success() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "access_token": "access-1",
        "refresh_token": "refresh-1",
        "expires_in": 3600,
        "token_type": "Bearer",
        "scope": "User.Read",
    }))
}

#[tokio::test]
async fn request_code_parses_response() {
    //* Given
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/devicecode"))
        .and(body_string_contains("client_id=client-abc"))
        .and(body_string_contains("offline_access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "device_code": "device-123",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 900,
            "interval": 5,
            "message": "Sign in at https://microsoft.com/devicelogin",
        })))
        .expect(1)
        .mount(&server)
        .await;

    //* When
    let code = authenticator(&server).request_code("client-abc").await.unwrap();

    //* Then
    assert_eq!(code.device_code, "device-123");
    assert_eq!(code.user_code, "ABCD-EFGH");
    assert_eq!(code.interval, 5);
    assert_eq!(code.expires_in, 900);
}

#[tokio::test]
async fn request_code_rejects_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/devicecode"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"unexpected\": true}"))
        .mount(&server)
        .await;

    let result = authenticator(&server).request_code("client-abc").await;
    assert!(matches!(result, Err(AuthError::AuthServerError(_))));
}

#[tokio::test]
async fn poll_retries_while_pending() {
    //* Given
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_error("authorization_pending"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("device_code=device-123"))
        .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code"))
        .respond_with(token_success())
        .expect(1)
        .mount(&server)
        .await;

    //* When
    let credential = authenticator(&server)
        .poll("client-abc", &device_code(0, 60), &CancellationToken::new())
        .await
        .unwrap();

    //* Then
    assert_eq!(credential.access_token, "access-1");
    assert_eq!(credential.refresh_token, "refresh-1");
    assert!(credential.has_expiry());
    assert!(!credential.is_expired());
}

#[tokio::test]
async fn poll_backs_off_on_slow_down() {
    //* Given
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_error("slow_down"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_success())
        .expect(1)
        .mount(&server)
        .await;

    //* When
    let started = Instant::now();
    let credential = authenticator(&server)
        .poll("client-abc", &device_code(0, 60), &CancellationToken::new())
        .await
        .unwrap();

    //* Then
    assert!(started.elapsed() >= SLOW_DOWN_STEP);
    assert_eq!(credential.access_token, "access-1");
}

#[tokio::test]
async fn zero_interval_is_raised_to_default_floor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_success())
        .expect(1)
        .mount(&server)
        .await;
    let authenticator =
        DeviceCodeAuthenticator::new(AuthEndpoints::from_authority(&server.uri())).unwrap();

    let started = Instant::now();
    authenticator
        .poll("client-abc", &device_code(0, 60), &CancellationToken::new())
        .await
        .unwrap();

    assert!(started.elapsed() >= PollTiming::default().min_interval);
}

#[tokio::test]
async fn poll_fails_on_denial() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_error("access_denied"))
        .expect(1)
        .mount(&server)
        .await;

    let result = authenticator(&server)
        .poll("client-abc", &device_code(0, 60), &CancellationToken::new())
        .await;

    match result {
        Err(AuthError::AuthorizationFailed { code, description }) => {
            assert_eq!(code, "access_denied");
            assert_eq!(description, "access_denied description");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn poll_stops_at_device_code_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_error("authorization_pending"))
        .expect(0)
        .mount(&server)
        .await;

    let result = authenticator(&server)
        .poll("client-abc", &device_code(0, 0), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AuthError::DeviceCodeExpired)));
}

#[tokio::test]
async fn poll_honors_cancellation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_error("authorization_pending"))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = authenticator(&server)
        .poll("client-abc", &device_code(5, 900), &cancel)
        .await;

    assert!(matches!(result, Err(AuthError::Cancelled)));
}

#[tokio::test]
async fn login_shows_code_then_polls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/devicecode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "device_code": "device-123",
            "user_code": "WXYZ",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 60,
            "interval": 0,
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_success())
        .expect(1)
        .mount(&server)
        .await;

    let mut shown = None;
    let credential = authenticator(&server)
        .login("client-abc", &CancellationToken::new(), |code| {
            shown = Some(code.user_code.clone())
        })
        .await
        .unwrap();

    assert_eq!(shown.as_deref(), Some("WXYZ"));
    assert_eq!(credential.access_token, "access-1");
}
