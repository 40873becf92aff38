//! End-to-end flow against a mocked server: sign in, resolve the endpoint
//! map, persist the session, and serve a dashboard snapshot through it.

use async_trait::async_trait;
use serde_json::{json, Value};

use screepsdash::api::transport::{ApiRequest, ApiResponse, Transport};
use screepsdash::api::{acquire_token, resolve_endpoints};
use screepsdash::dashboard::fetch_dashboard;
use screepsdash::session::{Session, SessionStore};

/// A fork-flavored server: it only answers the second-ranked candidate in
/// each group and wants the sign-in identifier under `username`.
struct ForkServer;

impl ForkServer {
    fn answer(&self, request: &ApiRequest) -> (u16, Value) {
        match (request.method.as_str(), request.endpoint.as_str()) {
            ("POST", "/api/auth/signin") => {
                let body = request.body.clone().unwrap_or(Value::Null);
                if body.get("username").is_some() && body["password"] == "secret" {
                    (200, json!({ "ok": 1, "token": "fork-token" }))
                } else {
                    (401, json!({ "error": "invalid credentials" }))
                }
            }
            ("GET", "/api/user/me") => (
                200,
                json!({
                    "username": "bob",
                    "cpu": { "limit": 100, "used": 40 },
                    "gcl": { "progress": 50, "progressTotal": 200 }
                }),
            ),
            ("GET", "/api/game/rooms") => (
                200,
                json!({ "rooms": [ { "room": "W1N1", "owner": "bob" } ] }),
            ),
            ("GET", "/api/user/overview") => (
                200,
                json!({ "stats": { "W1N1": { "_id": "W1N1", "level": 4 } } }),
            ),
            _ => (404, json!({ "error": "not found" })),
        }
    }
}

#[async_trait]
impl Transport for ForkServer {
    async fn send(&self, request: ApiRequest) -> screepsdash::Result<ApiResponse> {
        let (status, data) = self.answer(&request);
        Ok(ApiResponse {
            status,
            ok: (200..300).contains(&status),
            data,
            url: request.url(),
        })
    }
}

#[tokio::test]
async fn signin_probe_persist_and_fetch() {
    let transport = ForkServer;
    let base_url = "https://fork.example";

    let token = acquire_token(&transport, base_url, "bob", "secret")
        .await
        .expect("sign-in should succeed on the username-shaped candidate");
    assert_eq!(token, "fork-token");

    let outcome = resolve_endpoints(&transport, base_url, &token)
        .await
        .expect("probe should resolve on second-ranked candidates");
    assert_eq!(outcome.endpoints.profile.path, "/api/user/me");
    assert_eq!(outcome.endpoints.rooms.as_ref().unwrap().path, "/api/game/rooms");
    assert_eq!(outcome.endpoints.stats.as_ref().unwrap().path, "/api/user/overview");
    // every first-ranked candidate produced a failed record before the
    // second one won
    assert_eq!(outcome.log.len(), 6);
    assert_eq!(outcome.log.iter().filter(|record| record.success).count(), 3);

    let session = Session {
        base_url: base_url.to_string(),
        token,
        username: Some("bob".to_string()),
        endpoints: outcome.endpoints,
        probe_log: outcome.log,
        verified_at: outcome.verified_at,
    };

    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::at(dir.path().join("session.json"));
    store.save(&session).unwrap();
    let restored = store.load().unwrap().expect("session should round-trip");

    let snapshot = fetch_dashboard(&transport, &restored)
        .await
        .expect("snapshot should build from the cached endpoint map");
    assert_eq!(snapshot.resources.username.as_deref(), Some("bob"));
    assert_eq!(snapshot.resources.cpu_limit, Some(100.0));
    assert_eq!(snapshot.resources.gcl_progress_percent, Some(25.0));
    assert_eq!(snapshot.rooms.len(), 1);
    assert_eq!(snapshot.rooms[0].name, "W1N1");
    assert_eq!(snapshot.rooms[0].owner.as_deref(), Some("bob"));
    assert_eq!(snapshot.rooms[0].level, Some(4.0));
}
