//! End-to-end session behavior over the durable SQLite backend
//!
//! Exercises the full read path — listing, relation resolution, cache
//! replacement — with both logical tables living in one database file,
//! and verifies the entries survive a process-style restart.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use synergia_domain::errors::AuthError;
use synergia_domain::types::{EntityId, EntityKind, TokenState};
use synergia_infra::{AuthFlow, ClientConfig, Session, SqliteCache};

struct StaticFlow;

#[async_trait]
impl AuthFlow for StaticFlow {
    async fn renew(&self, state: &TokenState) -> Result<TokenState, AuthError> {
        Ok(state.clone())
    }

    async fn probe(&self, _access_token: &str) -> Result<bool, AuthError> {
        Ok(true)
    }
}

fn token_state() -> TokenState {
    TokenState {
        access_token: "token-0".into(),
        refresh_token: "refresh".into(),
        root_token: None,
        login: "1234567u".into(),
        expires_at: Utc::now() + TimeDelta::seconds(3600),
    }
}

fn session_over(server: &MockServer, store: Arc<SqliteCache>) -> Session {
    Session::builder()
        .config(ClientConfig::for_base_url(server.uri()))
        .token_state(token_state())
        .auth_flow(Arc::new(StaticFlow))
        .shared_cache(store)
        .build()
        .unwrap()
}

async fn mount_fixtures(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/Grades"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Grades": [
                {"Id": 7, "Grade": "4+", "Subject": {"Id": 3}, "Category": {"Id": 9}, "AddedBy": {"Id": 1}}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Subjects/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Subject": {"Id": 3, "Name": "Physics", "Short": "phys"}
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn resolution_populates_both_sqlite_tables() {
    let server = MockServer::start().await;
    mount_fixtures(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteCache::open(dir.path().join("cache.db")).unwrap());
    let session = session_over(&server, Arc::clone(&store));

    let grades = session.grades(&[]).await.unwrap();
    assert_eq!(grades.len(), 1);
    let grade = &grades[0];
    assert_eq!(grade.related_id("subject").unwrap(), Some(EntityId(3)));

    // First resolve fetches from the origin and caches the snapshot;
    // the second is answered by the object table (the /Subjects/3 mock
    // expects exactly one request)
    let subject = grade.resolve("subject").await.unwrap().unwrap();
    assert_eq!(subject.str_field("Name"), Some("Physics"));
    let again = grade.resolve("subject").await.unwrap().unwrap();
    assert_eq!(again.id(), EntityId(3));

    assert!(session.object_cache().get(EntityId(3), EntityKind::Subject).unwrap().is_some());
    assert!(session.query_cache().count().unwrap() >= 1);
}

#[tokio::test]
async fn cached_state_survives_reopening_the_database() {
    let server = MockServer::start().await;
    mount_fixtures(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cache.db");

    {
        let store = Arc::new(SqliteCache::open(&db_path).unwrap());
        let session = session_over(&server, store);
        let grades = session.grades(&[]).await.unwrap();
        grades[0].resolve("subject").await.unwrap();
    }

    // A new session over the reopened file reads the same snapshots
    // without touching the network for the subject
    let store = Arc::new(SqliteCache::open(&db_path).unwrap());
    let session = session_over(&server, Arc::clone(&store));

    let entry = session.object_cache().get(EntityId(3), EntityKind::Subject).unwrap().unwrap();
    assert_eq!(entry.payload["Name"], "Physics");

    let subject = session
        .get_cached_object(EntityId(3), EntityKind::Subject, None)
        .await
        .unwrap();
    assert_eq!(subject.str_field("Short"), Some("phys"));

    // Still only the single original request against /Subjects/3
    let subject_hits = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/Subjects/3")
        .count();
    assert_eq!(subject_hits, 1);
}

#[tokio::test]
async fn diagnostics_name_the_database_file() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteCache::open(dir.path().join("cache.db")).unwrap());
    let session = session_over(&server, store);

    assert!(session.object_cache().about().contains("cache.db"));
}
