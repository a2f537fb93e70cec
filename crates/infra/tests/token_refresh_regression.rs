//! Regression tests for the bounded token-refresh retry
//!
//! A token-expired signal from the upstream must trigger exactly one
//! refresh and one retried request. A second consecutive signal has to
//! propagate as an error; an earlier revision of this logic could loop
//! on a persistently invalid token.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use synergia_domain::errors::{AuthError, TransportError};
use synergia_domain::types::TokenState;
use synergia_infra::{AuthFlow, ClientConfig, Session};

struct SequencedFlow {
    renewals: AtomicUsize,
    reject: bool,
}

impl SequencedFlow {
    fn accepting() -> Arc<Self> {
        Arc::new(Self { renewals: AtomicUsize::new(0), reject: false })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self { renewals: AtomicUsize::new(0), reject: true })
    }

    fn count(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthFlow for SequencedFlow {
    async fn renew(&self, state: &TokenState) -> Result<TokenState, AuthError> {
        if self.reject {
            return Err(AuthError::RefreshRejected("invalid_grant".into()));
        }
        let n = self.renewals.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenState {
            access_token: format!("token-{n}"),
            expires_at: Utc::now() + TimeDelta::seconds(3600),
            ..state.clone()
        })
    }

    async fn probe(&self, _access_token: &str) -> Result<bool, AuthError> {
        Ok(true)
    }
}

fn session_for(server: &MockServer, flow: Arc<SequencedFlow>) -> Session {
    let state = TokenState {
        access_token: "token-0".into(),
        refresh_token: "refresh".into(),
        root_token: None,
        login: "1234567u".into(),
        expires_at: Utc::now() + TimeDelta::seconds(3600),
    };
    Session::builder()
        .config(ClientConfig::for_base_url(server.uri()))
        .token_state(state)
        .auth_flow(flow)
        .build()
        .unwrap()
}

#[tokio::test]
async fn one_expiry_signal_is_refreshed_and_retried_transparently() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Grades"))
        .and(header("Authorization", "Bearer token-0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"Code": "TokenIsExpired"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Grades"))
        .and(header("Authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Grades": []})))
        .expect(1)
        .mount(&server)
        .await;

    let flow = SequencedFlow::accepting();
    let session = session_for(&server, Arc::clone(&flow));

    let document = session.get(&["Grades"], &[]).await.unwrap();
    assert!(document["Grades"].is_array());
    assert_eq!(flow.count(), 1);
}

#[tokio::test]
async fn persistent_expiry_signal_stops_after_one_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Grades"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"Code": "TokenIsExpired"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let flow = SequencedFlow::accepting();
    let session = session_for(&server, Arc::clone(&flow));

    let err = session.get(&["Grades"], &[]).await.unwrap_err();
    assert!(matches!(err, TransportError::TokenExpired));

    // Exactly one refresh and exactly two requests in total
    assert_eq!(flow.count(), 1);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn rejected_refresh_surfaces_without_a_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Grades"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"Code": "TokenIsExpired"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server, SequencedFlow::rejecting());

    let err = session.get(&["Grades"], &[]).await.unwrap_err();
    assert!(matches!(err, TransportError::Auth(AuthError::RefreshRejected(_))));

    // The failed refresh aborts the call before a second request is sent
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn cached_reads_survive_a_mid_sequence_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Subjects"))
        .and(header("Authorization", "Bearer token-0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"Code": "TokenIsExpired"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Subjects"))
        .and(header("Authorization", "Bearer token-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"Subjects": [{"Id": 3, "Name": "Physics"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let flow = SequencedFlow::accepting();
    let session = session_for(&server, Arc::clone(&flow));

    // First listing refreshes mid-flight and still returns data
    let subjects = session.subjects(&[]).await.unwrap();
    assert_eq!(subjects.len(), 1);

    // Second listing is served from the query cache: the two mounted
    // mocks above saturate at their expected counts
    let again = session.subjects(&[]).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(flow.count(), 1);
}
