// API models and data fetching for GO Transit (Metrolinx) real-time operations data
// GO Transit Official website: https://www.gotransit.com/
//
// Upstream JSON endpoints (all under https://ttc-alerts-api.vercel.app/api/go):
// - ?type=stats                          - network metrics as [{metric, value}]
// - ?type=timeseries                     - 24h activity as [{target, datapoints: [[value, ms]]}]
// - ?type=vehicles                       - {vehicles: [{Type, TripNumber, Line, ...}]}
// - ?type=union                          - Union Station departure board rows
// - ?type=lines&vehicleType=trains|buses - per-line [{Code, Total, OnTime, Delayed}]

use reqwest::blocking;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::response_cache::ResponseCache;

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum VehicleKind {
    Train,
    Bus,
    #[default]
    Other,
}

impl VehicleKind {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "train" | "trains" => VehicleKind::Train,
            "bus" | "buses" => VehicleKind::Bus,
            _ => VehicleKind::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VehicleKind::Train => "Train",
            VehicleKind::Bus => "Bus",
            VehicleKind::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ServiceStatus {
    #[serde(rename = "On Time")]
    OnTime,
    Delayed,
    Early,
    #[default]
    Unknown,
}

impl ServiceStatus {
    /// Classifies free-form upstream status text ("On Time", "Delayed 4 min", ...).
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if label.contains("on time") {
            ServiceStatus::OnTime
        } else if label.contains("delay") {
            ServiceStatus::Delayed
        } else if label.contains("early") {
            ServiceStatus::Early
        } else {
            ServiceStatus::Unknown
        }
    }

    /// Parses a user-selected status. `Ok(None)` means no constraint.
    pub fn from_filter_value(value: &str) -> Result<Option<Self>> {
        let normalized: String = value
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();

        match normalized.as_str() {
            "" | "all" | "allstatuses" => Ok(None),
            "ontime" => Ok(Some(ServiceStatus::OnTime)),
            "delayed" => Ok(Some(ServiceStatus::Delayed)),
            "early" => Ok(Some(ServiceStatus::Early)),
            _ => Err(GoApiError::InvalidQuery(format!("unknown status '{}'", value.trim()))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleRecord {
    #[serde(rename = "Id", alias = "VehicleId", default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "Type", default, deserialize_with = "vehicle_kind")]
    pub kind: VehicleKind,
    #[serde(rename = "TripNumber", default, deserialize_with = "string_or_number")]
    pub trip_number: String,
    #[serde(rename = "Line", default, deserialize_with = "string_or_number")]
    pub route_code: String,
    #[serde(rename = "Display", default, deserialize_with = "string_or_number")]
    pub display: String,
    #[serde(rename = "Status", default, deserialize_with = "string_or_number")]
    pub status_text: String,
    #[serde(rename = "IsInMotion", default, deserialize_with = "false_if_null")]
    pub is_in_motion: bool,
    #[serde(rename = "Latitude", default, deserialize_with = "lenient_f64")]
    pub latitude: f64,
    #[serde(rename = "Longitude", default, deserialize_with = "lenient_f64")]
    pub longitude: f64,
    #[serde(rename = "ModifiedDate", alias = "Timestamp", default, deserialize_with = "string_or_number")]
    pub timestamp: String,
}

impl VehicleRecord {
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus::from_label(&self.status_text)
    }

    /// Vehicles reporting 0/0 have no GPS fix.
    pub fn has_location(&self) -> bool {
        self.latitude != 0.0 && self.longitude != 0.0
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehiclesPayload {
    #[serde(default)]
    pub vehicles: Vec<VehicleRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatMetric {
    pub metric: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkStats {
    pub metrics: HashMap<String, f64>,
}

impl NetworkStats {
    pub fn from_metrics(metrics: Vec<StatMetric>) -> Self {
        NetworkStats {
            metrics: metrics.into_iter().map(|m| (m.metric, m.value)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn get(&self, metric: &str) -> f64 {
        self.metrics.get(metric).copied().unwrap_or(0.0)
    }

    pub fn performance_rate(&self) -> f64 {
        self.get("Performance Rate")
    }

    pub fn total_vehicles(&self) -> f64 {
        self.get("Total Vehicles")
    }

    pub fn on_time(&self) -> f64 {
        self.get("On Time")
    }

    pub fn delayed(&self) -> f64 {
        self.get("Delayed")
    }

    pub fn trains_active(&self) -> f64 {
        self.get("Trains Active")
    }

    pub fn buses_active(&self) -> f64 {
        self.get("Buses Active")
    }

    pub fn vehicles_in_motion(&self) -> f64 {
        self.get("Trains in Motion") + self.get("Buses in Motion")
    }

    pub fn train_lines(&self) -> f64 {
        self.get("Train Lines")
    }

    pub fn bus_routes(&self) -> f64 {
        self.get("Bus Routes")
    }

    /// On-time share of the fleet, rounded to a whole percent. A missing
    /// fleet total counts as 1, a reported total of 0 yields 0%.
    pub fn on_time_share(&self) -> f64 {
        let total = self.metrics.get("Total Vehicles").copied().unwrap_or(1.0);
        if total == 0.0 {
            return 0.0;
        }
        (self.on_time() / total * 100.0).round()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeSeries {
    pub target: String,
    /// Grafana-style `[value, epoch_millis]` pairs.
    #[serde(default, deserialize_with = "lenient_datapoints")]
    pub datapoints: Vec<(Option<f64>, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Trains,
    Buses,
}

impl LineKind {
    fn query_value(&self) -> &'static str {
        match self {
            LineKind::Trains => "trains",
            LineKind::Buses => "buses",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineRecord {
    #[serde(rename = "Code", deserialize_with = "string_or_number")]
    pub code: String,
    #[serde(rename = "Total", default, deserialize_with = "lenient_count")]
    pub total: u32,
    #[serde(rename = "OnTime", default, deserialize_with = "lenient_count")]
    pub on_time: u32,
    #[serde(rename = "Delayed", default, deserialize_with = "lenient_count")]
    pub delayed: u32,
}

pub type BoardRow = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Stats,
    Timeseries,
    Vehicles,
    Union,
    Lines(LineKind),
}

impl Endpoint {
    pub fn query(&self) -> String {
        match self {
            Endpoint::Stats => "type=stats".to_string(),
            Endpoint::Timeseries => "type=timeseries".to_string(),
            Endpoint::Vehicles => "type=vehicles".to_string(),
            Endpoint::Union => "type=union".to_string(),
            Endpoint::Lines(kind) => format!("type=lines&vehicleType={}", kind.query_value()),
        }
    }
}

// ============================================================================
// Lenient field decoding
// ============================================================================

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = lenient_f64(deserializer)?;
    Ok(if value.is_finite() && value > 0.0 { value.round() as u32 } else { 0 })
}

fn false_if_null<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Keeps `[value, epoch_millis, ..]` points with a numeric timestamp and
/// drops the rest. A non-numeric value is a gap.
fn lenient_datapoints<'de, D>(deserializer: D) -> std::result::Result<Vec<(Option<f64>, f64)>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = |value: &Value| match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };

    let points = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(points
        .iter()
        .filter_map(|point| match point.as_array().map(Vec::as_slice) {
            Some([value, millis, ..]) => number(millis).map(|millis| (number(value), millis)),
            _ => None,
        })
        .collect())
}

fn vehicle_kind<'de, D>(deserializer: D) -> std::result::Result<VehicleKind, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|label| VehicleKind::from_label(&label))
        .unwrap_or_default())
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, Error)]
pub enum GoApiError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("HTTP status {0}")]
    StatusError(u16),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Export error: {0}")]
    ExportError(String),
}

pub type Result<T> = std::result::Result<T, GoApiError>;

// ============================================================================
// Fetching
// ============================================================================

/// Source of raw JSON payloads for a URL.
pub trait JsonFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Value>;
}

pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub const REQUEST_TIMEOUT_SECS: u64 = 10;

    pub fn new() -> Self {
        HttpFetcher {
            timeout: Duration::from_secs(Self::REQUEST_TIMEOUT_SECS),
        }
    }

    fn create_http_client(&self) -> Result<blocking::Client> {
        blocking::Client::builder()
            .timeout(self.timeout)
            .https_only(true)
            .build()
            .map_err(|e| GoApiError::NetworkError(format!("Failed to create HTTP client: {}", e)))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Value> {
        let client = self.create_http_client()?;

        let response = client
            .get(url)
            .send()
            .map_err(|e| GoApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GoApiError::StatusError(status.as_u16()));
        }

        response
            .json::<Value>()
            .map_err(|e| GoApiError::ParseError(e.to_string()))
    }
}

// ============================================================================
// GO API client
// ============================================================================

pub struct GoApi {
    base_url: String,
    cache: ResponseCache,
}

impl GoApi {
    pub const DEFAULT_BASE_URL: &'static str = "https://ttc-alerts-api.vercel.app/api/go";

    pub fn new(base_url: impl Into<String>, fetcher: Arc<dyn JsonFetcher>) -> Self {
        GoApi {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: ResponseCache::new(fetcher),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        format!("{}?{}", self.base_url, endpoint.query())
    }

    /// Fetch boundary: failures become a notice and an empty result.
    pub fn fetch_data(&self, url: &str, notices: &mut Vec<String>) -> Option<Arc<Value>> {
        match self.cache.get_or_fetch(url) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("⚠️  Fetch failed for {}: {}", url, e);
                notices.push(format!("Error fetching data from {}: {}", url, e));
                None
            }
        }
    }

    fn fetch_typed<T: DeserializeOwned>(&self, endpoint: Endpoint, notices: &mut Vec<String>) -> Option<T> {
        let url = self.endpoint_url(endpoint);
        let payload = self.fetch_data(&url, notices)?;

        match T::deserialize(payload.as_ref()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                let e = GoApiError::ParseError(e.to_string());
                warn!("⚠️  Unexpected payload from {}: {}", url, e);
                notices.push(format!("Error fetching data from {}: {}", url, e));
                None
            }
        }
    }

    pub fn network_stats(&self, notices: &mut Vec<String>) -> NetworkStats {
        let metrics: Vec<StatMetric> = self.fetch_typed(Endpoint::Stats, notices).unwrap_or_default();
        debug!("Loaded {} network metrics", metrics.len());
        NetworkStats::from_metrics(metrics)
    }

    pub fn timeseries(&self, notices: &mut Vec<String>) -> Vec<TimeSeries> {
        self.fetch_typed(Endpoint::Timeseries, notices).unwrap_or_default()
    }

    pub fn vehicles(&self, notices: &mut Vec<String>) -> Vec<VehicleRecord> {
        let payload: VehiclesPayload = self.fetch_typed(Endpoint::Vehicles, notices).unwrap_or_default();
        debug!("Loaded {} vehicles", payload.vehicles.len());
        payload.vehicles
    }

    pub fn lines(&self, kind: LineKind, notices: &mut Vec<String>) -> Vec<LineRecord> {
        self.fetch_typed(Endpoint::Lines(kind), notices).unwrap_or_default()
    }

    pub fn union_station(&self, notices: &mut Vec<String>) -> Vec<BoardRow> {
        self.fetch_typed(Endpoint::Union, notices).unwrap_or_default()
    }
}
