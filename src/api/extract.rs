//! Best-effort extraction over untrusted JSON.
//!
//! Server forks disagree wildly on response shapes, so nothing in here ever
//! errors on a malformed payload: a field that cannot be read is simply
//! absent. All tree walks carry an explicit depth bound to stay safe on
//! pathological or deeply nested structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::transport::ApiResponse;

/// Recursion ceiling for payload walks.
const MAX_DEPTH: usize = 6;

/// Display caps: the dashboard shows at most this many rooms / entries.
pub const ROOM_CAP: usize = 12;
pub const LEADERBOARD_CAP: usize = 10;

pub(crate) fn non_empty_str(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Numbers may arrive as JSON numbers or numeric strings.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| map.get(*key).and_then(non_empty_str))
}

pub(crate) fn first_number(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| map.get(*key).and_then(as_number))
}

fn lookup<'a>(map: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (head, rest) = path.split_first()?;
    let value = map.get(*head)?;
    if rest.is_empty() {
        Some(value)
    } else {
        lookup(value.as_object()?, rest)
    }
}

/// Try each alternative path against the current object, in priority order,
/// then descend. First convertible match wins.
fn pick<T>(
    value: &Value,
    paths: &[&[&str]],
    depth: usize,
    convert: &dyn Fn(&Value) -> Option<T>,
) -> Option<T> {
    match value {
        Value::Object(map) => {
            for path in paths {
                if let Some(found) = lookup(map, path).and_then(convert) {
                    return Some(found);
                }
            }
            if depth < MAX_DEPTH {
                for child in map.values() {
                    if child.is_object() || child.is_array() {
                        if let Some(found) = pick(child, paths, depth + 1, convert) {
                            return Some(found);
                        }
                    }
                }
            }
            None
        }
        Value::Array(items) if depth < MAX_DEPTH => items
            .iter()
            .find_map(|item| pick(item, paths, depth + 1, convert)),
        _ => None,
    }
}

pub(crate) fn pick_number(value: &Value, paths: &[&[&str]]) -> Option<f64> {
    pick(value, paths, 0, &as_number)
}

pub(crate) fn pick_string(value: &Value, paths: &[&[&str]]) -> Option<String> {
    pick(value, paths, 0, &non_empty_str)
}

/// Best-effort human-readable error out of an arbitrary payload.
pub fn error_message(payload: &Value) -> Option<String> {
    pick_string(payload, &[&["error"], &["message"], &["text"]])
}

/// Error text an HTTP-level failure surfaces to callers and the probe log.
pub fn status_line(response: &ApiResponse) -> String {
    match error_message(&response.data) {
        Some(detail) => format!("status {}: {}", response.status, detail),
        None => format!("status {}", response.status),
    }
}

/// Some forks answer 200 with an error in the body (`ok: 0` or an explicit
/// error field). Detect those so candidates can be failed anyway.
pub fn payload_error(payload: &Value) -> Option<String> {
    if let Some(explicit) =
        pick_string(payload, &[&["error"], &["err"], &["errorMessage"]])
    {
        return Some(explicit);
    }
    let map = payload.as_object()?;
    if map.get("ok").and_then(as_number) == Some(0.0) {
        return first_string(map, &["message", "text"])
            .or_else(|| Some("unknown error".to_string()));
    }
    None
}

/// Depth-first search for a credential-shaped field. The winning field is
/// whatever a candidate's response calls `token` or `authToken`.
pub fn find_token(payload: &Value) -> Option<String> {
    pick_string(payload, &[&["token"], &["authToken"]])
}

/// Account-level numbers the dashboard header shows. Every field is optional:
/// absence renders as a not-available marker, never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub username: Option<String>,
    pub credits: Option<f64>,
    pub cpu_limit: Option<f64>,
    pub cpu_used: Option<f64>,
    pub memory_used: Option<f64>,
    pub gcl_level: Option<f64>,
    pub gcl_progress: Option<f64>,
    pub gcl_progress_total: Option<f64>,
    pub gcl_progress_percent: Option<f64>,
    pub power: Option<f64>,
}

/// Resource extraction: first defined match per logical field across the
/// spellings known from official and fork servers.
pub fn resources(payload: &Value) -> ResourceSummary {
    let gcl_progress = pick_number(payload, &[&["gcl", "progress"], &["gclProgress"]]);
    let gcl_progress_total =
        pick_number(payload, &[&["gcl", "progressTotal"], &["gclProgressTotal"]]);
    // The derived percentage only exists when both operands do and the
    // denominator is positive.
    let gcl_progress_percent = match (gcl_progress, gcl_progress_total) {
        (Some(progress), Some(total)) if total > 0.0 => Some(progress / total * 100.0),
        _ => None,
    };

    ResourceSummary {
        username: pick_string(payload, &[&["username"], &["user", "username"]]),
        credits: pick_number(payload, &[&["credits"], &["money"]]),
        cpu_limit: pick_number(payload, &[&["cpu", "limit"], &["cpuLimit"], &["cpu"]]),
        cpu_used: pick_number(payload, &[&["cpu", "used"], &["cpuUsed"]]),
        memory_used: pick_number(payload, &[&["memory", "used"], &["memoryUsed"]]),
        gcl_level: pick_number(payload, &[&["gcl", "level"], &["gclLevel"]]),
        gcl_progress,
        gcl_progress_total,
        gcl_progress_percent,
        power: pick_number(payload, &[&["power"], &["powerExperimentations"]]),
    }
}

/// One room as the dashboard lists it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub name: String,
    pub owner: Option<String>,
    pub level: Option<f64>,
    pub shard: Option<String>,
    pub energy: Option<f64>,
}

/// Scan text for a room-name-shaped token: `[WE]<digits>[NS]<digits>`.
pub fn room_name_in(text: &str) -> Option<String> {
    let chars: Vec<char> = text.trim().to_ascii_uppercase().chars().collect();
    for start in 0..chars.len() {
        if chars[start] != 'W' && chars[start] != 'E' {
            continue;
        }
        let mut index = start + 1;
        let horizontal_start = index;
        while index < chars.len() && chars[index].is_ascii_digit() {
            index += 1;
        }
        if index == horizontal_start || index >= chars.len() {
            continue;
        }
        if chars[index] != 'N' && chars[index] != 'S' {
            continue;
        }
        index += 1;
        let vertical_start = index;
        while index < chars.len() && chars[index].is_ascii_digit() {
            index += 1;
        }
        if index == vertical_start {
            continue;
        }
        return Some(chars[start..index].iter().collect());
    }
    None
}

const ROOM_ID_KEYS: [&str; 6] = ["room", "roomName", "room_id", "roomId", "_id", "name"];

fn record_room_name(map: &Map<String, Value>) -> Option<String> {
    ROOM_ID_KEYS.iter().find_map(|key| {
        map.get(*key)
            .and_then(non_empty_str)
            .and_then(|text| room_name_in(&text))
    })
}

pub(crate) fn record_owner(map: &Map<String, Value>) -> Option<String> {
    for key in ["owner", "user", "username"] {
        match map.get(key) {
            Some(Value::String(_)) => {
                if let Some(text) = map.get(key).and_then(non_empty_str) {
                    return Some(text);
                }
            }
            Some(Value::Object(nested)) => {
                if let Some(text) = first_string(nested, &["username", "name"]) {
                    return Some(text);
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn walk_objects(
    value: &Value,
    depth: usize,
    visit: &mut dyn FnMut(&Map<String, Value>),
) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                walk_objects(item, depth + 1, visit);
            }
        }
        Value::Object(map) => {
            visit(map);
            for child in map.values() {
                walk_objects(child, depth + 1, visit);
            }
        }
        _ => {}
    }
}

/// Collect room summaries out of one or more payloads.
///
/// The same room id often appears in several partial records (ownership in
/// one place, controller level in another), so sightings merge with
/// first-write-wins per field. First-seen order is preserved and the result
/// is capped for display.
pub fn rooms_from(payloads: &[&Value]) -> Vec<RoomSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, RoomSummary> = HashMap::new();

    for payload in payloads {
        walk_objects(payload, 0, &mut |map| {
            let Some(name) = record_room_name(map) else {
                return;
            };
            let entry = merged.entry(name.clone()).or_insert_with(|| {
                order.push(name.clone());
                RoomSummary { name: name.clone(), ..RoomSummary::default() }
            });
            if entry.owner.is_none() {
                entry.owner = record_owner(map);
            }
            if entry.level.is_none() {
                entry.level = first_number(map, &["level", "rcl", "controllerLevel"]);
            }
            if entry.shard.is_none() {
                entry.shard = first_string(map, &["shard"]);
            }
            if entry.energy.is_none() {
                entry.energy = first_number(map, &["energy", "energyAvailable"]);
            }
        });
    }

    order
        .into_iter()
        .take(ROOM_CAP)
        .filter_map(|name| merged.remove(&name))
        .collect()
}

/// One leaderboard row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub username: String,
    pub rank: Option<f64>,
    pub score: Option<f64>,
    pub season: Option<String>,
}

/// Collect leaderboard rows: any object carrying a username plus a
/// rank/score-shaped number. Merged first-write-wins per user, capped for
/// display.
pub fn leaderboard(payload: &Value) -> Vec<LeaderboardEntry> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, LeaderboardEntry> = HashMap::new();

    walk_objects(payload, 0, &mut |map| {
        let Some(username) = first_string(map, &["username"]) else {
            return;
        };
        let rank = first_number(map, &["rank", "position"]);
        let score = first_number(map, &["score", "points"]);
        if rank.is_none() && score.is_none() {
            return;
        }
        let entry = merged.entry(username.clone()).or_insert_with(|| {
            order.push(username.clone());
            LeaderboardEntry { username: username.clone(), ..LeaderboardEntry::default() }
        });
        if entry.rank.is_none() {
            entry.rank = rank;
        }
        if entry.score.is_none() {
            entry.score = score;
        }
        if entry.season.is_none() {
            entry.season = first_string(map, &["season", "seasonId"]);
        }
    });

    order
        .into_iter()
        .take(LEADERBOARD_CAP)
        .filter_map(|username| merged.remove(&username))
        .collect()
}

/// Season identifiers out of a `/api/leaderboard/seasons` payload.
pub fn seasons(payload: &Value) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(items) = payload.get("seasons").and_then(Value::as_array) {
        for item in items {
            if let Some(id) = item
                .as_object()
                .and_then(|map| first_string(map, &["_id", "id", "name"]))
            {
                out.push(id);
            } else if let Some(id) = non_empty_str(item) {
                out.push(id);
            }
        }
    }
    out
}
