use tracing::{debug, info};

use crate::error::{DashError, Result};

use super::endpoints::signin_candidates;
use super::extract::{find_token, status_line};
use super::transport::{ApiRequest, Transport};

/// Acquire an auth token by walking the ranked sign-in candidates.
///
/// A candidate wins when it answers 2xx AND a token-shaped field is found
/// anywhere in the body. Candidates are tried strictly in order, one at a
/// time, so the first success short-circuits the rest. When everything
/// fails the error carries the last attempt's reason.
pub async fn acquire_token(
    transport: &dyn Transport,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<String> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(DashError::Auth("username and password are required".to_string()));
    }

    let candidates = signin_candidates(username, password);
    let attempts = candidates.len();
    let mut last_reason = "no sign-in endpoint available".to_string();

    for candidate in candidates {
        let mut request = ApiRequest::post(base_url, &candidate.path);
        request.body = candidate.body.clone();

        let response = match transport.send(request).await {
            Ok(response) => response,
            Err(error) => {
                debug!("sign-in candidate {} errored: {}", candidate.id, error);
                last_reason = error.to_string();
                continue;
            }
        };

        if !response.ok {
            last_reason = format!("{} -> {}", candidate.path, status_line(&response));
            continue;
        }

        match find_token(&response.data) {
            Some(token) => {
                info!("signed in via {} as {}", candidate.id, username);
                return Ok(token);
            }
            None => {
                last_reason =
                    format!("{} answered 2xx without a token field", candidate.path);
            }
        }
    }

    Err(DashError::Auth(format!(
        "all {} sign-in attempts failed; last: {}",
        attempts, last_reason
    )))
}
