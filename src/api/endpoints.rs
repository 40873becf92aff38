use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::transport::ApiRequest;

/// Logical resources the probe resolves an endpoint for. Profile is the one
/// group a session cannot exist without; rooms and stats are best effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceGroup {
    Profile,
    Rooms,
    Stats,
}

impl ResourceGroup {
    pub const ALL: [ResourceGroup; 3] =
        [ResourceGroup::Profile, ResourceGroup::Rooms, ResourceGroup::Stats];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceGroup::Profile => "profile",
            ResourceGroup::Rooms => "rooms",
            ResourceGroup::Stats => "stats",
        }
    }

    pub fn is_required(self) -> bool {
        matches!(self, ResourceGroup::Profile)
    }
}

impl fmt::Display for ResourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One guessed endpoint shape for a logical resource: path, method and any
/// static query/body it needs. Candidates live in fixed ranked lists; the
/// ranking is part of the contract and never reordered at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointCandidate {
    pub id: String,
    pub path: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl EndpointCandidate {
    fn get(id: &str, path: &str) -> Self {
        Self {
            id: id.to_string(),
            path: path.to_string(),
            method: "GET".to_string(),
            query: None,
            body: None,
        }
    }

    fn with_query(mut self, key: &str, value: Value) -> Self {
        self.query.get_or_insert_with(HashMap::new).insert(key.to_string(), value);
        self
    }

    /// Materialize this candidate into an authenticated request.
    pub fn to_request(&self, base_url: &str, token: &str) -> ApiRequest {
        let mut request =
            ApiRequest::new(base_url, &self.method, &self.path).with_token(token);
        request.query = self.query.clone();
        request.body = self.body.clone();
        request
    }
}

/// Ranked sign-in attempts: the two auth paths, each tried with the
/// identifier sent as `email` first and `username` second.
pub fn signin_candidates(username: &str, password: &str) -> Vec<EndpointCandidate> {
    let mut out = Vec::with_capacity(4);
    for path in ["/api/auth/signin", "/api/user/auth"] {
        for identifier in ["email", "username"] {
            let tag = path.rsplit('/').next().unwrap_or(path);
            out.push(EndpointCandidate {
                id: format!("{}-{}", tag, identifier),
                path: path.to_string(),
                method: "POST".to_string(),
                query: None,
                body: Some(json!({ identifier: username, "password": password })),
            });
        }
    }
    out
}

/// Ranked candidates per resource group.
pub fn group_candidates(group: ResourceGroup) -> Vec<EndpointCandidate> {
    match group {
        ResourceGroup::Profile => vec![
            EndpointCandidate::get("auth-me", "/api/auth/me"),
            EndpointCandidate::get("user-me", "/api/user/me"),
        ],
        ResourceGroup::Rooms => vec![
            EndpointCandidate::get("user-rooms", "/api/user/rooms"),
            EndpointCandidate::get("game-rooms", "/api/game/rooms"),
        ],
        ResourceGroup::Stats => vec![
            EndpointCandidate::get("user-stats", "/api/user/stats").with_query("interval", json!(8)),
            EndpointCandidate::get("user-overview", "/api/user/overview")
                .with_query("interval", json!(8)),
        ],
    }
}

/// Public endpoints browsable without a session.
pub fn leaderboard_candidates(limit: usize) -> Vec<EndpointCandidate> {
    vec![
        EndpointCandidate::get("leaderboard-list", "/api/leaderboard/list")
            .with_query("limit", json!(limit))
            .with_query("mode", json!("world")),
        EndpointCandidate::get("leaderboard-list-bare", "/api/leaderboard/list")
            .with_query("limit", json!(limit)),
    ]
}

pub fn seasons_candidate() -> EndpointCandidate {
    EndpointCandidate::get("leaderboard-seasons", "/api/leaderboard/seasons")
}

pub fn map_stats_candidate(rooms: &[String], shard: Option<&str>) -> EndpointCandidate {
    EndpointCandidate {
        id: "map-stats".to_string(),
        path: "/api/game/map-stats".to_string(),
        method: "POST".to_string(),
        query: None,
        body: Some(json!({
            "rooms": rooms,
            "statName": "owner0",
            "shard": shard,
        })),
    }
}
