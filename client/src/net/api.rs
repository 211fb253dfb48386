//! Map-library REST client.
//!
//! Only the listing endpoint is consumed here; uploads, saves and loads
//! belong to the storage service and pass through untouched.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status { status: u16, url: String },
    #[error("invalid map listing: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One image in the map library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapListing {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MapListResponse {
    #[serde(default)]
    maps: Vec<MapListing>,
}

/// Client for `{base_url}/maps/...`.
#[derive(Debug, Clone)]
pub struct MapLibrary {
    http: reqwest::Client,
    base_url: String,
}

impl MapLibrary {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// `GET /maps/list`.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-2xx responses, or a body that is not a
    /// map listing.
    pub async fn list_maps(&self) -> Result<Vec<MapListing>, ApiError> {
        let url = self.endpoint("/maps/list");
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), url });
        }
        let body = response.text().await?;
        parse_map_list(&body)
    }
}

/// Parse a `{"maps": [...]}` listing body.
///
/// # Errors
///
/// Returns [`ApiError::Decode`] if the body is not a listing.
pub fn parse_map_list(body: &str) -> Result<Vec<MapListing>, ApiError> {
    let parsed: MapListResponse = serde_json::from_str(body)?;
    Ok(parsed.maps)
}

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;
