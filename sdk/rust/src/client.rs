use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {error} ({message})")]
    Api {
        status: StatusCode,
        error: String,
        message: String,
    },
}

impl SdkError {
    /// HTTP status of an API error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SdkError::Api { status, .. } => Some(*status),
            SdkError::Http(e) => e.status(),
        }
    }

    /// Machine-readable error code of an API error.
    pub fn code(&self) -> Option<&str> {
        match self {
            SdkError::Api { error, .. } => Some(error),
            SdkError::Http(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedDriver {
    pub id: String,
    pub name: String,
    pub rating: f64,
    pub vehicle: String,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub ride_id: String,
    pub driver: AssignedDriver,
    pub status: String,
    pub price: f64,
    pub eta_minutes: u32,
    pub surge_applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RideOutcome {
    Assigned(Assignment),
    NoDriverAvailable { radius_km: f64 },
}

impl RideOutcome {
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            RideOutcome::Assigned(a) => Some(a),
            RideOutcome::NoDriverAvailable { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideView {
    pub id: String,
    pub rider_id: String,
    pub driver_id: Option<String>,
    pub status: String,
    pub price: f64,
    pub eta_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverView {
    pub id: String,
    pub position: Coordinates,
    pub available: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

/// Client for one caller. Set the caller's token with [`DispatchClient::with_token`].
#[derive(Debug, Clone)]
pub struct DispatchClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl DispatchClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .pool_max_idle_per_host(0)
                .no_proxy()
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// WebSocket URL for the driver channel, carrying the token as a query
    /// parameter.
    pub fn driver_channel_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        match &self.token {
            Some(token) => format!("{ws_base}/v1/drivers/ws?token={token}"),
            None => format!("{ws_base}/v1/drivers/ws"),
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, SdkError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let text = resp.text().await?;
        let (error, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error, body.message),
            Err(_) => ("unknown".to_string(), text),
        };
        Err(SdkError::Api {
            status,
            error,
            message,
        })
    }

    pub async fn health(&self) -> Result<Value, SdkError> {
        let resp = self.client.get(format!("{}/health", self.base_url)).send().await?;
        Self::decode(resp).await
    }

    /// Ask for a ride from `pickup`, optionally to `dropoff`.
    pub async fn request_ride(
        &self,
        pickup: Coordinates,
        dropoff: Option<Coordinates>,
    ) -> Result<RideOutcome, SdkError> {
        let resp = self
            .authed(self.client.post(format!("{}/v1/rides", self.base_url)))
            .json(&json!({ "pickup": pickup, "dropoff": dropoff }))
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn get_ride(&self, ride_id: &str) -> Result<RideView, SdkError> {
        let resp = self
            .authed(self.client.get(format!("{}/v1/rides/{}", self.base_url, ride_id)))
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Move a ride to `status` (e.g. `"accepted"`, `"cancelled"`).
    pub async fn update_status(&self, ride_id: &str, status: &str) -> Result<RideView, SdkError> {
        let resp = self
            .authed(self.client.post(format!("{}/v1/rides/{}/status", self.base_url, ride_id)))
            .json(&json!({ "status": status }))
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Report the calling driver's position.
    pub async fn update_location(&self, position: Coordinates) -> Result<DriverView, SdkError> {
        let resp = self
            .authed(self.client.put(format!("{}/v1/drivers/location", self.base_url)))
            .json(&position)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn set_availability(&self, available: bool) -> Result<DriverView, SdkError> {
        let resp = self
            .authed(self.client.put(format!("{}/v1/drivers/availability", self.base_url)))
            .json(&json!({ "available": available }))
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn nearby(&self, point: Coordinates, radius_km: Option<f64>) -> Result<Vec<Value>, SdkError> {
        let mut query = vec![("lat", point.lat.to_string()), ("lng", point.lng.to_string())];
        if let Some(radius) = radius_km {
            query.push(("radius_km", radius.to_string()));
        }
        let resp = self
            .authed(self.client.get(format!("{}/v1/drivers/nearby", self.base_url)))
            .query(&query)
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// `GET /admin/status` with the admin API key.
    pub async fn admin_status(&self, api_key: &str) -> Result<Value, SdkError> {
        let resp = self
            .client
            .get(format!("{}/admin/status", self.base_url))
            .bearer_auth(api_key)
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// `GET /admin/pending` with the admin API key.
    pub async fn admin_pending(&self, api_key: &str) -> Result<Vec<Value>, SdkError> {
        let resp = self
            .client
            .get(format!("{}/admin/pending", self.base_url))
            .bearer_auth(api_key)
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Seed or update a driver through the admin API.
    pub async fn register_driver(
        &self,
        api_key: &str,
        driver_id: &str,
        name: &str,
        vehicle: &str,
        rating: f64,
        position: Coordinates,
    ) -> Result<DriverView, SdkError> {
        let resp = self
            .client
            .post(format!("{}/admin/drivers", self.base_url))
            .bearer_auth(api_key)
            .json(&json!({
                "driver_id": driver_id,
                "profile": { "name": name, "vehicle": vehicle, "rating": rating },
                "position": position,
            }))
            .send()
            .await?;
        Self::decode(resp).await
    }
}
