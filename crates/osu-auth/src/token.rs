//! Client-credentials token exchange
//!
//! POSTs the application's client id and secret to the token endpoint as a
//! form and returns the bearer token with its lifetime. Quota accounting and
//! caching happen in the broker; this module only performs the exchange.

use serde::{Deserialize, Serialize};

use crate::constants::GRANT_TYPE;
use crate::error::{Error, Result};

/// Response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time. The broker
/// converts it to an absolute unix millisecond timestamp when caching.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
}

/// Exchange client id/secret for an application bearer token.
pub async fn request_client_token(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    scope: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_url)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", GRANT_TYPE),
            ("scope", scope),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let code = osu_api::error_code(&body);

        // invalid_client means the id/secret pair is wrong or revoked
        if code.as_deref() == Some("invalid_client") {
            return Err(Error::InvalidCredentials(format!(
                "token endpoint rejected client ({status})"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {}",
            code.as_deref().unwrap_or("no error code")
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}
