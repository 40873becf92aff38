//! Snapshot assembly: one fetch pass over a session's resolved endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::endpoints::{leaderboard_candidates, seasons_candidate};
use crate::api::extract::{
    leaderboard, payload_error, resources, rooms_from, seasons, status_line, LeaderboardEntry,
    ResourceSummary, RoomSummary,
};
use crate::api::transport::Transport;
use crate::error::{DashError, Result};
use crate::session::Session;

/// One refresh of the signed-in dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub resources: ResourceSummary,
    pub rooms: Vec<RoomSummary>,
}

/// Fetch the dashboard using the session's endpoint map. The profile call
/// must answer; rooms and stats degrade to whatever they can contribute.
pub async fn fetch_dashboard(
    transport: &dyn Transport,
    session: &Session,
) -> Result<DashboardSnapshot> {
    let profile_request = session
        .endpoints
        .profile
        .to_request(&session.base_url, &session.token);
    let rooms_request = session
        .endpoints
        .rooms
        .as_ref()
        .map(|candidate| candidate.to_request(&session.base_url, &session.token));
    let stats_request = session
        .endpoints
        .stats
        .as_ref()
        .map(|candidate| candidate.to_request(&session.base_url, &session.token));

    let (profile, rooms_payload, stats_payload) = tokio::join!(
        transport.send(profile_request),
        optional_payload(transport, rooms_request, "rooms"),
        optional_payload(transport, stats_request, "stats"),
    );

    let profile = profile?;
    if !profile.ok {
        return Err(DashError::Probe(format!(
            "profile endpoint stopped answering: {}",
            status_line(&profile)
        )));
    }

    let mut payloads: Vec<&Value> = Vec::new();
    if let Some(payload) = &rooms_payload {
        payloads.push(payload);
    }
    if let Some(payload) = &stats_payload {
        payloads.push(payload);
    }

    Ok(DashboardSnapshot {
        fetched_at: Utc::now(),
        resources: resources(&profile.data),
        rooms: rooms_from(&payloads),
    })
}

/// Send an optional request; any failure degrades to an absent payload.
async fn optional_payload(
    transport: &dyn Transport,
    request: Option<crate::api::transport::ApiRequest>,
    label: &str,
) -> Option<Value> {
    let request = request?;
    match transport.send(request).await {
        Ok(response) if response.ok => Some(response.data),
        Ok(response) => {
            warn!("{} endpoint answered {}", label, status_line(&response));
            None
        }
        Err(error) => {
            warn!("{} fetch failed: {}", label, error);
            None
        }
    }
}

/// Public data browsable without a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub seasons: Vec<String>,
}

/// Fetch the anonymous leaderboard view. Candidates are walked in order;
/// a server with no leaderboard yields an empty snapshot, not an error.
pub async fn fetch_public(
    transport: &dyn Transport,
    base_url: &str,
    limit: usize,
) -> Result<PublicSnapshot> {
    let leaderboard_rows = async {
        for candidate in leaderboard_candidates(limit) {
            let request = candidate.to_request(base_url, "");
            match transport.send(request).await {
                Ok(response) if response.ok && payload_error(&response.data).is_none() => {
                    return leaderboard(&response.data);
                }
                Ok(response) => {
                    debug!("{} answered {}", candidate.path, status_line(&response));
                }
                Err(error) => {
                    debug!("{} failed: {}", candidate.path, error);
                }
            }
        }
        Vec::new()
    };
    let season_ids = async {
        match transport
            .send(seasons_candidate().to_request(base_url, ""))
            .await
        {
            Ok(response) if response.ok => seasons(&response.data),
            _ => Vec::new(),
        }
    };

    let (rows, season_ids) = tokio::join!(leaderboard_rows, season_ids);
    Ok(PublicSnapshot { fetched_at: Utc::now(), leaderboard: rows, seasons: season_ids })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::api::endpoints::{group_candidates, ResourceGroup};
    use crate::api::probe::EndpointMap;
    use crate::api::transport::testing::{Rule, ScriptedTransport};

    use super::*;

    fn session(endpoints: EndpointMap) -> Session {
        Session {
            base_url: "screeps.example".to_string(),
            token: "tok".to_string(),
            username: Some("bob".to_string()),
            endpoints,
            probe_log: Vec::new(),
            verified_at: Utc::now(),
        }
    }

    fn full_map() -> EndpointMap {
        EndpointMap {
            profile: group_candidates(ResourceGroup::Profile).remove(0),
            rooms: Some(group_candidates(ResourceGroup::Rooms).remove(0)),
            stats: Some(group_candidates(ResourceGroup::Stats).remove(0)),
        }
    }

    #[tokio::test]
    async fn snapshot_merges_rooms_across_both_payloads() {
        let transport = ScriptedTransport::new(vec![
            Rule {
                method: "GET",
                endpoint: "/api/auth/me",
                body_key: None,
                status: 200,
                data: json!({ "username": "bob", "cpu": { "limit": 100, "used": 40 } }),
            },
            Rule {
                method: "GET",
                endpoint: "/api/user/rooms",
                body_key: None,
                status: 200,
                data: json!({ "rooms": [ { "room": "W1N1", "owner": "bob" } ] }),
            },
            Rule {
                method: "GET",
                endpoint: "/api/user/stats",
                body_key: None,
                status: 200,
                data: json!({ "stats": { "W1N1": { "_id": "W1N1", "level": 4 } } }),
            },
        ]);

        let snapshot = fetch_dashboard(&transport, &session(full_map())).await.unwrap();
        assert_eq!(snapshot.resources.username.as_deref(), Some("bob"));
        assert_eq!(snapshot.resources.cpu_used, Some(40.0));
        assert_eq!(snapshot.rooms.len(), 1);
        assert_eq!(snapshot.rooms[0].owner.as_deref(), Some("bob"));
        assert_eq!(snapshot.rooms[0].level, Some(4.0));
    }

    #[tokio::test]
    async fn profile_failure_fails_the_snapshot() {
        let transport = ScriptedTransport::new(vec![Rule {
            method: "GET",
            endpoint: "/api/user/rooms",
            body_key: None,
            status: 200,
            data: json!({ "rooms": [] }),
        }]);
        let error = fetch_dashboard(&transport, &session(full_map())).await.unwrap_err();
        assert!(error.to_string().contains("status 404"));
    }

    #[tokio::test]
    async fn optional_failures_degrade_to_empty() {
        let transport = ScriptedTransport::new(vec![Rule {
            method: "GET",
            endpoint: "/api/auth/me",
            body_key: None,
            status: 200,
            data: json!({ "username": "bob" }),
        }]);
        let snapshot = fetch_dashboard(&transport, &session(full_map())).await.unwrap();
        assert!(snapshot.rooms.is_empty());
        assert_eq!(snapshot.resources.username.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn absent_groups_are_never_requested() {
        let transport = ScriptedTransport::new(vec![Rule {
            method: "GET",
            endpoint: "/api/auth/me",
            body_key: None,
            status: 200,
            data: json!({ "username": "bob" }),
        }]);
        let map = EndpointMap {
            profile: group_candidates(ResourceGroup::Profile).remove(0),
            rooms: None,
            stats: None,
        };
        fetch_dashboard(&transport, &session(map)).await.unwrap();
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn public_snapshot_walks_leaderboard_candidates() {
        let transport = ScriptedTransport::new(vec![
            Rule {
                method: "GET",
                endpoint: "/api/leaderboard/list",
                body_key: None,
                status: 200,
                data: json!({ "list": [ { "username": "alice", "rank": 1 } ] }),
            },
            Rule {
                method: "GET",
                endpoint: "/api/leaderboard/seasons",
                body_key: None,
                status: 200,
                data: json!({ "seasons": [ { "_id": "2026-08" } ] }),
            },
        ]);
        let snapshot = fetch_public(&transport, "screeps.example", 10).await.unwrap();
        assert_eq!(snapshot.leaderboard.len(), 1);
        assert_eq!(snapshot.leaderboard[0].username, "alice");
        assert_eq!(snapshot.seasons, vec!["2026-08"]);
    }

    #[tokio::test]
    async fn missing_leaderboard_yields_an_empty_snapshot() {
        let transport = ScriptedTransport::new(vec![]);
        let snapshot = fetch_public(&transport, "screeps.example", 10).await.unwrap();
        assert!(snapshot.leaderboard.is_empty());
        assert!(snapshot.seasons.is_empty());
    }
}
