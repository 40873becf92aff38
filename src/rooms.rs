//! Room detail lookups: terrain, objects and ownership for a single room.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::api::endpoints::map_stats_candidate;
use crate::api::extract::{
    as_number, first_number, first_string, payload_error, pick_number, pick_string,
    record_owner, room_name_in, walk_objects,
};
use crate::api::transport::{ApiRequest, Transport};
use crate::error::{DashError, Result};

/// Validate and canonicalize a room name. The whole input must be one
/// room-name token, not merely contain one.
pub fn normalize_room_name(input: &str) -> Result<String> {
    let trimmed = input.trim();
    match room_name_in(trimmed) {
        Some(name) if name.len() == trimmed.len() => Ok(name),
        _ => Err(DashError::Input(format!("'{}' is not a room name", input))),
    }
}

/// Canonicalize a shard name: `shard<digits>`, lowercase. A bare number is
/// accepted as shorthand.
pub fn normalize_shard(input: &str) -> Result<String> {
    let trimmed = input.trim().to_ascii_lowercase();
    let digits = trimmed.strip_prefix("shard").unwrap_or(&trimmed);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(format!("shard{}", digits))
    } else {
        Err(DashError::Input(format!("'{}' is not a shard name", input)))
    }
}

/// One in-room game object, reduced to the fields the room view shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntity {
    pub kind: String,
    pub x: u8,
    pub y: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_capacity: Option<f64>,
}

/// Everything known about one room after the detail endpoints answered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terrain: Option<String>,
    pub spawn_count: usize,
    pub creep_count: usize,
    pub spawn_energy: f64,
    pub extension_energy: f64,
    pub entities: Vec<RoomEntity>,
}

fn valid_coord(value: Option<f64>) -> Option<u8> {
    let number = value?;
    if number.fract() != 0.0 || !(0.0..=49.0).contains(&number) {
        return None;
    }
    Some(number as u8)
}

/// Collect well-formed game objects out of an arbitrary payload. A record
/// counts when it carries a type plus in-range coordinates.
pub fn entities_from(payload: &Value) -> Vec<RoomEntity> {
    let mut out = Vec::new();
    walk_objects(payload, 0, &mut |map| {
        let Some(kind) = first_string(map, &["type"]) else {
            return;
        };
        let Some(x) = valid_coord(map.get("x").and_then(as_number)) else {
            return;
        };
        let Some(y) = valid_coord(map.get("y").and_then(as_number)) else {
            return;
        };
        let store_energy = map
            .get("store")
            .and_then(Value::as_object)
            .and_then(|store| first_number(store, &["energy"]));
        out.push(RoomEntity {
            kind,
            x,
            y,
            owner: record_owner(map),
            level: first_number(map, &["level"]),
            energy: first_number(map, &["energy"]).or(store_energy),
            energy_capacity: first_number(map, &["energyCapacity", "storeCapacity"]),
        });
    });
    out
}

fn shard_query(room: &str, shard: Option<&str>) -> HashMap<String, Value> {
    let mut query = HashMap::from([("room".to_string(), json!(room))]);
    if let Some(name) = shard {
        query.insert("shard".to_string(), json!(name));
    }
    query
}

/// Ranked request shapes for the room objects listing.
fn object_requests(base_url: &str, token: &str, room: &str, shard: Option<&str>) -> Vec<ApiRequest> {
    let mut out = Vec::new();
    if shard.is_some() {
        out.push(
            ApiRequest::get(base_url, "/api/game/room-objects")
                .with_token(token)
                .with_query(shard_query(room, shard)),
        );
    }
    out.push(
        ApiRequest::post(base_url, "/api/game/room-objects")
            .with_token(token)
            .with_body(json!({ "room": room, "shard": shard })),
    );
    out.push(
        ApiRequest::get(base_url, "/api/game/room-objects")
            .with_token(token)
            .with_query(shard_query(room, None)),
    );
    out
}

fn terrain_requests(base_url: &str, token: &str, room: &str, shard: Option<&str>) -> Vec<ApiRequest> {
    let mut out = Vec::new();
    if shard.is_some() {
        out.push(
            ApiRequest::get(base_url, "/api/game/room-terrain")
                .with_token(token)
                .with_query(shard_query(room, shard)),
        );
    }
    out.push(
        ApiRequest::get(base_url, "/api/game/room-terrain")
            .with_token(token)
            .with_query(shard_query(room, None)),
    );
    out
}

/// Try requests in order; the first 2xx answer without a body-level error
/// wins. Exhaustion is an absent payload, never an error.
async fn first_success(transport: &dyn Transport, requests: Vec<ApiRequest>) -> Option<Value> {
    for request in requests {
        let label = format!("{} {}", request.method, request.endpoint);
        match transport.send(request).await {
            Ok(response) if response.ok && payload_error(&response.data).is_none() => {
                return Some(response.data);
            }
            Ok(response) => {
                debug!("{} rejected with status {}", label, response.status);
            }
            Err(error) => {
                debug!("{} errored: {}", label, error);
            }
        }
    }
    None
}

/// Fetch a single room's detail view. Objects, terrain and map-stats are
/// each best effort; the lookup only fails when no source answers at all.
pub async fn fetch_room_detail(
    transport: &dyn Transport,
    base_url: &str,
    token: &str,
    room: &str,
    shard: Option<&str>,
) -> Result<RoomDetail> {
    let name = normalize_room_name(room)?;
    let shard = match shard {
        Some(input) => Some(normalize_shard(input)?),
        None => None,
    };
    let shard_ref = shard.as_deref();

    let objects = first_success(transport, object_requests(base_url, token, &name, shard_ref)).await;
    let terrain = first_success(transport, terrain_requests(base_url, token, &name, shard_ref)).await;
    let stats_request = map_stats_candidate(&[name.clone()], shard_ref).to_request(base_url, token);
    let map_stats = first_success(transport, vec![stats_request]).await;

    if objects.is_none() && terrain.is_none() && map_stats.is_none() {
        return Err(DashError::Probe(format!("no endpoint answered for room {}", name)));
    }

    let entities = objects.as_ref().map(|payload| entities_from(payload)).unwrap_or_default();

    let controller = entities.iter().find(|entity| entity.kind == "controller");
    let mut owner = controller.and_then(|entity| entity.owner.clone());
    let mut controller_level = controller.and_then(|entity| entity.level);
    if let Some(stats) = &map_stats {
        if owner.is_none() {
            owner = pick_string(stats, &[&["own", "user"], &["owner"], &["username"]]);
        }
        if controller_level.is_none() {
            controller_level = pick_number(stats, &[&["own", "level"], &["level"]]);
        }
    }

    let spawn_energy: f64 = entities
        .iter()
        .filter(|entity| entity.kind == "spawn")
        .filter_map(|entity| entity.energy)
        .sum();
    let extension_energy: f64 = entities
        .iter()
        .filter(|entity| entity.kind == "extension")
        .filter_map(|entity| entity.energy)
        .sum();

    let game_time = [objects.as_ref(), terrain.as_ref(), map_stats.as_ref()]
        .into_iter()
        .flatten()
        .find_map(|payload| pick_number(payload, &[&["gameTime"], &["time"]]));

    Ok(RoomDetail {
        name,
        shard,
        owner,
        controller_level,
        game_time,
        terrain: terrain
            .as_ref()
            .and_then(|payload| pick_string(payload, &[&["terrain"]])),
        spawn_count: entities.iter().filter(|entity| entity.kind == "spawn").count(),
        creep_count: entities.iter().filter(|entity| entity.kind == "creep").count(),
        spawn_energy,
        extension_energy,
        entities,
    })
}
