//! Profile lookup against the stats API
//!
//! Issues `GET {api_base}/users/{id}/{mode}` with a bearer token. The caller
//! owns the `reqwest::Client` (and its timeout) and is responsible for quota
//! accounting; this function only performs the request and maps the outcome.

use tracing::debug;

use crate::error::{Error, Result};
use crate::{Mode, UserPayload};

/// Fetch one player's profile and statistics for `mode`.
pub async fn get_user(
    client: &reqwest::Client,
    api_base: &str,
    token: &str,
    user_id: u64,
    mode: Mode,
) -> Result<UserPayload> {
    let url = format!(
        "{}/users/{}/{}",
        api_base.trim_end_matches('/'),
        user_id,
        mode.api_name()
    );

    let response = client
        .get(&url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| Error::Http(format!("profile request failed: {e}")))?;

    let status = response.status();
    if status.as_u16() == 404 {
        debug!(user_id, %mode, "player not found upstream");
        return Err(Error::NotFound);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Status {
            status: status.as_u16(),
            code: crate::error_code(&body),
        });
    }

    response
        .json::<UserPayload>()
        .await
        .map_err(|e| Error::Decode(e.to_string()))
}
