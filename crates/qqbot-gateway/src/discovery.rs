//! Gateway endpoint discovery.

use qqbot_core::Credentials;
use serde::Deserialize;
use thiserror::Error;

/// Discovery error.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Gateway lookup returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    url: String,
}

/// Resolve the socket URL with an authenticated `GET {base_url}/gateway`.
///
/// # Errors
/// Returns error if the request fails or the response has no `url`.
pub async fn discover_gateway(
    client: &reqwest::Client,
    base_url: &str,
    credentials: &Credentials,
) -> Result<String, DiscoveryError> {
    let resp = client
        .get(format!("{}/gateway", base_url.trim_end_matches('/')))
        .header(reqwest::header::AUTHORIZATION, credentials.authorization())
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(DiscoveryError::Status {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        });
    }

    let gateway: GatewayResponse = resp.json().await?;
    tracing::info!(url = %gateway.url, "Resolved gateway");
    Ok(gateway.url)
}
