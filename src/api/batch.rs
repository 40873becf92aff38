use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::warn;

use super::transport::{ApiRequest, ApiResponse, Transport};

pub const DEFAULT_CONCURRENCY: usize = 8;
const MAX_CONCURRENCY: usize = 32;

/// Fan a list of independent requests out over a bounded worker pool.
///
/// The output order matches the input order. Per-request transport failures
/// never abort the batch: they fold into error-shaped responses the caller
/// can inspect like any other non-2xx result.
pub async fn send_many(
    transport: Arc<dyn Transport>,
    requests: Vec<ApiRequest>,
    max_concurrency: Option<usize>,
) -> Vec<ApiResponse> {
    if requests.is_empty() {
        return Vec::new();
    }

    let ceiling = max_concurrency
        .unwrap_or(DEFAULT_CONCURRENCY)
        .clamp(1, MAX_CONCURRENCY);
    let total = requests.len();
    let mut output: Vec<Option<ApiResponse>> = (0..total).map(|_| None).collect();
    let mut requests = requests.into_iter().enumerate();
    let mut in_flight = JoinSet::new();

    loop {
        while in_flight.len() < ceiling {
            let Some((index, request)) = requests.next() else {
                break;
            };
            let task_transport = Arc::clone(&transport);
            in_flight.spawn(async move {
                let response = match task_transport.send(request.clone()).await {
                    Ok(response) => response,
                    Err(error) => ApiResponse::from_failure(&request, error.to_string()),
                };
                (index, response)
            });
        }

        match in_flight.join_next().await {
            Some(Ok((index, response))) => output[index] = Some(response),
            Some(Err(join_error)) => {
                // A panicked worker loses its slot; the placeholder below
                // covers it.
                warn!("batch worker failed: {}", join_error);
            }
            None => break,
        }
    }

    output
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| ApiResponse {
                status: 0,
                ok: false,
                data: serde_json::json!({ "error": "batch worker failed" }),
                url: format!("batch[{}]", index),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::transport::testing::{Rule, ScriptedTransport};
    use super::*;

    fn transport() -> Arc<dyn Transport> {
        Arc::new(ScriptedTransport::new(vec![
            Rule {
                method: "GET",
                endpoint: "/api/auth/me",
                body_key: None,
                status: 200,
                data: json!({ "username": "bob" }),
            },
            Rule {
                method: "GET",
                endpoint: "/api/user/rooms",
                body_key: None,
                status: 200,
                data: json!({ "rooms": [] }),
            },
        ]))
    }

    #[tokio::test]
    async fn output_order_matches_input_order() {
        let requests = vec![
            ApiRequest::get("s.example", "/api/user/rooms"),
            ApiRequest::get("s.example", "/api/auth/me"),
            ApiRequest::get("s.example", "/api/missing"),
        ];
        let responses = send_many(transport(), requests, Some(2)).await;
        assert_eq!(responses.len(), 3);
        assert!(responses[0].data.get("rooms").is_some());
        assert_eq!(responses[1].data["username"], "bob");
        assert_eq!(responses[2].status, 404);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let responses = send_many(transport(), Vec::new(), None).await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn concurrency_ceiling_is_clamped() {
        // A ceiling of 0 must still make progress (clamped to 1), and a
        // huge ceiling must not panic.
        let requests = vec![ApiRequest::get("s.example", "/api/auth/me"); 5];
        let low = send_many(transport(), requests.clone(), Some(0)).await;
        assert_eq!(low.len(), 5);
        let high = send_many(transport(), requests, Some(10_000)).await;
        assert_eq!(high.len(), 5);
        assert!(high.iter().all(|response| response.ok));
    }
}
