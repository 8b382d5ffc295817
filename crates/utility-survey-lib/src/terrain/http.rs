//! HTTP elevation service client

use super::service::{ElevationError, ElevationService, Priority, TerrainSample};
use crate::Coordinate;
use serde::Deserialize;
use tracing::trace;

/// Wire format of an elevation lookup
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElevationResponse {
    z: Option<f64>,
    #[serde(default)]
    terrain_type: String,
    #[serde(default)]
    source: String,
}

/// Elevation service reached over HTTP
///
/// Requests go to `{base_url}/elevation?x=..&y=..&epsg=..`, or to
/// `{base_url}/elevation/priority?...` for promoted lines. A 404 or a null `z` means the
/// service has no elevation for the position.
#[derive(Debug, Clone)]
pub struct HttpElevationService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpElevationService {
    /// Create a client for the given service root
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing `reqwest::Client`
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Endpoint for the request variant
    fn endpoint(&self, priority: Priority) -> String {
        match priority {
            Priority::Normal => format!("{}/elevation", self.base_url),
            Priority::High => format!("{}/elevation/priority", self.base_url),
        }
    }

    /// Decode a response body into a sample
    fn decode(body: &[u8]) -> Result<Option<TerrainSample>, ElevationError> {
        let response: ElevationResponse = serde_json::from_slice(body)
            .map_err(|e| ElevationError::InvalidResponse(e.to_string()))?;
        Ok(response
            .z
            .filter(|z| z.is_finite())
            .map(|z| TerrainSample::new(z, response.terrain_type, response.source)))
    }
}

impl ElevationService for HttpElevationService {
    async fn sample(
        &self,
        coordinate: Coordinate,
        epsg: u32,
        priority: Priority,
    ) -> Result<Option<TerrainSample>, ElevationError> {
        let url = self.endpoint(priority);
        trace!(%url, x = coordinate.x, y = coordinate.y, epsg, "Requesting elevation");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("x", coordinate.x.to_string()),
                ("y", coordinate.y.to_string()),
                ("epsg", epsg.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ElevationError::Http(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ElevationError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ElevationError::Http(e.to_string()))?;
        Self::decode(&body)
    }
}
