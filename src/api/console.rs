use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{DashError, Result};

use super::extract::{payload_error, pick_string, status_line};
use super::transport::{ApiRequest, Transport};

const CONSOLE_PATH: &str = "/api/user/console";
const DEFAULT_SHARDS: [&str; 4] = ["shard0", "shard1", "shard2", "shard3"];

/// Result of one console execution, including which payload shape the
/// server finally accepted and every shape tried before it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_variant: Option<String>,
    pub tried: Vec<String>,
}

struct ConsoleVariant {
    id: String,
    request: ApiRequest,
}

/// Servers disagree on both the code key (`expression` vs `command`) and on
/// where the shard goes. Build every shape in fixed rank order; the caller
/// tries them until one sticks.
fn console_variants(
    base_url: &str,
    token: &str,
    code: &str,
    shard: Option<&str>,
) -> Vec<ConsoleVariant> {
    let shards: Vec<&str> = match shard {
        Some(name) => vec![name],
        None => DEFAULT_SHARDS.to_vec(),
    };

    let mut variants = Vec::new();
    for key in ["expression", "command"] {
        let bare = ApiRequest::post(base_url, CONSOLE_PATH)
            .with_token(token)
            .with_body(json!({ key: code }));
        variants.push(ConsoleVariant { id: format!("{}-bare", key), request: bare });

        for shard_name in &shards {
            variants.push(ConsoleVariant {
                id: format!("{}-shard-body-{}", key, shard_name),
                request: ApiRequest::post(base_url, CONSOLE_PATH)
                    .with_token(token)
                    .with_body(json!({ key: code, "shard": shard_name })),
            });
            variants.push(ConsoleVariant {
                id: format!("{}-shardname-body-{}", key, shard_name),
                request: ApiRequest::post(base_url, CONSOLE_PATH)
                    .with_token(token)
                    .with_body(json!({ key: code, "shardName": shard_name })),
            });
            variants.push(ConsoleVariant {
                id: format!("{}-shard-query-{}", key, shard_name),
                request: ApiRequest::post(base_url, CONSOLE_PATH)
                    .with_token(token)
                    .with_query(HashMap::from([(
                        "shard".to_string(),
                        json!(shard_name),
                    )]))
                    .with_body(json!({ key: code })),
            });
        }
    }
    variants
}

fn is_opaque_hex(text: &str) -> bool {
    text.len() >= 16 && text.chars().all(|c| c.is_ascii_hexdigit())
}

/// Drop acknowledgement noise the game server echoes back: bare "1", "ok",
/// "ok <id>" and long opaque hex ids carry no information for the user.
pub fn sanitize_feedback(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower == "1" || lower == "ok" {
        return None;
    }
    if let Some(rest) = lower.strip_prefix("ok ") {
        if is_opaque_hex(rest.trim()) {
            return None;
        }
    }
    if is_opaque_hex(&lower) {
        return None;
    }
    Some(trimmed.to_string())
}

fn feedback_in(payload: &Value) -> Option<String> {
    pick_string(payload, &[&["result"], &["message"], &["text"], &["insertedText"]])
        .and_then(|text| sanitize_feedback(&text))
}

/// Run a line of code on the game server, walking the payload-shape matrix
/// until one variant is accepted. A 2xx answer that carries an error in the
/// body still fails that variant.
pub async fn execute(
    transport: &dyn Transport,
    base_url: &str,
    token: &str,
    code: &str,
    shard: Option<&str>,
) -> Result<ConsoleOutcome> {
    let code = code.trim();
    if code.is_empty() {
        return Err(DashError::Input("console expression is empty".to_string()));
    }

    let mut tried = Vec::new();
    let mut last_reason = "no console variant available".to_string();

    for variant in console_variants(base_url, token, code, shard) {
        tried.push(variant.id.clone());
        let response = match transport.send(variant.request).await {
            Ok(response) => response,
            Err(error) => {
                debug!("console variant {} errored: {}", variant.id, error);
                last_reason = error.to_string();
                continue;
            }
        };

        if !response.ok {
            last_reason = status_line(&response);
            continue;
        }
        if let Some(reason) = payload_error(&response.data) {
            last_reason = reason;
            continue;
        }

        info!("console accepted variant {}", variant.id);
        return Ok(ConsoleOutcome {
            ok: true,
            feedback: feedback_in(&response.data),
            error: None,
            used_variant: Some(variant.id),
            tried,
        });
    }

    Ok(ConsoleOutcome {
        ok: false,
        feedback: None,
        error: Some(last_reason),
        used_variant: None,
        tried,
    })
}
