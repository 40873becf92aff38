use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{DashError, Result};

use super::endpoints::{group_candidates, EndpointCandidate, ResourceGroup};
use super::extract::status_line;
use super::transport::Transport;

/// One probe attempt against one candidate, as shown in the UI log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRecord {
    pub group: ResourceGroup,
    pub candidate: String,
    pub endpoint: String,
    pub method: String,
    pub status: u16,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The winning candidate per resource group. A session cannot exist without
/// a profile selection; rooms and stats may be absent on sparse forks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointMap {
    pub profile: EndpointCandidate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rooms: Option<EndpointCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<EndpointCandidate>,
}

impl EndpointMap {
    pub fn for_group(&self, group: ResourceGroup) -> Option<&EndpointCandidate> {
        match group {
            ResourceGroup::Profile => Some(&self.profile),
            ResourceGroup::Rooms => self.rooms.as_ref(),
            ResourceGroup::Stats => self.stats.as_ref(),
        }
    }
}

/// Everything one probe pass produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub endpoints: EndpointMap,
    pub log: Vec<ProbeRecord>,
    pub verified_at: DateTime<Utc>,
    /// Sample of the winning profile payload, kept for diagnostics.
    pub profile_sample: Value,
}

struct GroupResult {
    selection: Option<EndpointCandidate>,
    sample: Option<Value>,
}

async fn probe_group(
    transport: &dyn Transport,
    base_url: &str,
    token: &str,
    group: ResourceGroup,
    log: &mut Vec<ProbeRecord>,
) -> GroupResult {
    for candidate in group_candidates(group) {
        let request = candidate.to_request(base_url, token);
        match transport.send(request).await {
            Ok(response) => {
                log.push(ProbeRecord {
                    group,
                    candidate: candidate.id.clone(),
                    endpoint: candidate.path.clone(),
                    method: candidate.method.clone(),
                    status: response.status,
                    success: response.ok,
                    error: if response.ok { None } else { Some(status_line(&response)) },
                });
                if response.ok {
                    debug!("{} resolved to {}", group, candidate.path);
                    return GroupResult {
                        selection: Some(candidate),
                        sample: Some(response.data),
                    };
                }
            }
            Err(error) => {
                log.push(ProbeRecord {
                    group,
                    candidate: candidate.id.clone(),
                    endpoint: candidate.path.clone(),
                    method: candidate.method.clone(),
                    status: 0,
                    success: false,
                    error: Some(error.to_string()),
                });
            }
        }
    }
    GroupResult { selection: None, sample: None }
}

/// Resolve the endpoint map for a session: each group's ranked candidates
/// are tried sequentially, every attempt is logged, and the first success
/// per group wins. Profile exhaustion fails the whole probe; rooms/stats
/// exhaustion degrades to an absent selection.
pub async fn resolve_endpoints(
    transport: &dyn Transport,
    base_url: &str,
    token: &str,
) -> Result<ProbeOutcome> {
    let mut log: Vec<ProbeRecord> = Vec::new();

    let profile = probe_group(transport, base_url, token, ResourceGroup::Profile, &mut log).await;
    let Some(profile_selection) = profile.selection else {
        let attempts = log
            .iter()
            .filter(|record| record.group == ResourceGroup::Profile)
            .map(|record| {
                format!(
                    "{} {} -> {}",
                    record.method,
                    record.endpoint,
                    record.error.as_deref().unwrap_or("no response")
                )
            })
            .collect::<Vec<String>>()
            .join("; ");
        return Err(DashError::Probe(format!(
            "no profile endpoint answered ({})",
            attempts
        )));
    };

    let rooms = probe_group(transport, base_url, token, ResourceGroup::Rooms, &mut log).await;
    let stats = probe_group(transport, base_url, token, ResourceGroup::Stats, &mut log).await;
    if rooms.selection.is_none() {
        warn!("no rooms endpoint answered; room list will be empty");
    }
    if stats.selection.is_none() {
        warn!("no stats endpoint answered; stats will be empty");
    }

    info!(
        "probe resolved profile={} rooms={:?} stats={:?}",
        profile_selection.path,
        rooms.selection.as_ref().map(|c| c.path.as_str()),
        stats.selection.as_ref().map(|c| c.path.as_str())
    );

    Ok(ProbeOutcome {
        endpoints: EndpointMap {
            profile: profile_selection,
            rooms: rooms.selection,
            stats: stats.selection,
        },
        log,
        verified_at: Utc::now(),
        profile_sample: profile.sample.unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::transport::testing::{Rule, ScriptedTransport};
    use super::*;

    fn full_server() -> ScriptedTransport {
        ScriptedTransport::new(vec![
            Rule {
                method: "GET",
                endpoint: "/api/auth/me",
                body_key: None,
                status: 200,
                data: json!({ "username": "bob", "cpu": { "limit": 100 } }),
            },
            Rule {
                method: "GET",
                endpoint: "/api/user/rooms",
                body_key: None,
                status: 200,
                data: json!({ "rooms": ["W1N1"] }),
            },
            Rule {
                method: "GET",
                endpoint: "/api/user/stats",
                body_key: None,
                status: 200,
                data: json!({ "stats": {} }),
            },
        ])
    }

    #[tokio::test]
    async fn first_success_per_group_wins() {
        let transport = full_server();
        let outcome = resolve_endpoints(&transport, "screeps.example", "tok")
            .await
            .unwrap();
        assert_eq!(outcome.endpoints.profile.path, "/api/auth/me");
        assert_eq!(outcome.endpoints.rooms.as_ref().unwrap().path, "/api/user/rooms");
        assert_eq!(outcome.endpoints.stats.as_ref().unwrap().path, "/api/user/stats");
        // one attempt per group, all successful
        assert_eq!(outcome.log.len(), 3);
        assert!(outcome.log.iter().all(|record| record.success));
        assert_eq!(outcome.profile_sample["username"], "bob");
    }

    #[tokio::test]
    async fn later_candidate_selected_after_failures() {
        // /api/auth/me 404s; /api/user/me answers. Exactly two profile
        // records must exist, the second successful.
        let transport = ScriptedTransport::new(vec![Rule {
            method: "GET",
            endpoint: "/api/user/me",
            body_key: None,
            status: 200,
            data: json!({ "username": "bob" }),
        }]);
        let outcome = resolve_endpoints(&transport, "screeps.example", "tok")
            .await
            .unwrap();
        assert_eq!(outcome.endpoints.profile.path, "/api/user/me");
        let profile_records: Vec<&ProbeRecord> = outcome
            .log
            .iter()
            .filter(|record| record.group == ResourceGroup::Profile)
            .collect();
        assert_eq!(profile_records.len(), 2);
        assert!(!profile_records[0].success);
        assert_eq!(profile_records[0].status, 404);
        assert!(profile_records[1].success);
    }

    #[tokio::test]
    async fn profile_exhaustion_fails_with_every_attempt_listed() {
        let transport = ScriptedTransport::new(vec![]);
        let error = resolve_endpoints(&transport, "screeps.example", "tok")
            .await
            .unwrap_err();
        let message = error.to_string();
        assert!(message.contains("/api/auth/me"), "{}", message);
        assert!(message.contains("/api/user/me"), "{}", message);
        assert!(message.contains("status 404"), "{}", message);
    }

    #[tokio::test]
    async fn optional_groups_degrade_without_failing() {
        let transport = ScriptedTransport::new(vec![Rule {
            method: "GET",
            endpoint: "/api/auth/me",
            body_key: None,
            status: 200,
            data: json!({ "username": "bob" }),
        }]);
        let outcome = resolve_endpoints(&transport, "screeps.example", "tok")
            .await
            .unwrap();
        assert!(outcome.endpoints.rooms.is_none());
        assert!(outcome.endpoints.stats.is_none());
        // 1 profile + 2 rooms + 2 stats attempts
        assert_eq!(outcome.log.len(), 5);
    }

    #[tokio::test]
    async fn log_is_in_group_order() {
        let transport = full_server();
        let outcome = resolve_endpoints(&transport, "screeps.example", "tok")
            .await
            .unwrap();
        let groups: Vec<ResourceGroup> =
            outcome.log.iter().map(|record| record.group).collect();
        let mut sorted = groups.clone();
        sorted.sort_by_key(|group| ResourceGroup::ALL.iter().position(|g| g == group));
        assert_eq!(groups, sorted);
    }

    #[test]
    fn endpoint_map_requires_profile() {
        let map = EndpointMap {
            profile: group_candidates(ResourceGroup::Profile).remove(0),
            rooms: None,
            stats: None,
        };
        assert!(map.for_group(ResourceGroup::Profile).is_some());
        assert!(map.for_group(ResourceGroup::Rooms).is_none());
    }
}
