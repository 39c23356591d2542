// Vehicle filtering, fleet statistics and tracker aggregations

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::go_api_models::{GoApiError, Result, ServiceStatus, VehicleKind, VehicleRecord};
use crate::route_data::get_route_name;

// ============================================================================
// Filtering
// ============================================================================

/// Inclusive latitude/longitude region; a missing bound is unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub min_lat: Option<f64>,
    pub max_lat: Option<f64>,
    pub min_lon: Option<f64>,
    pub max_lon: Option<f64>,
}

impl BoundingBox {
    pub fn is_unbounded(&self) -> bool {
        *self == BoundingBox::default()
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.min_lat.is_none_or(|min| latitude >= min)
            && self.max_lat.is_none_or(|max| latitude <= max)
            && self.min_lon.is_none_or(|min| longitude >= min)
            && self.max_lon.is_none_or(|max| longitude <= max)
    }
}

/// Conjunction of vehicle predicates. Empty values mean "no constraint".
#[derive(Debug, Clone, Default)]
pub struct VehicleFilter {
    route: String,
    trip: String,
    status: Option<ServiceStatus>,
    kinds: Vec<VehicleKind>,
    moving_only: bool,
    bounds: BoundingBox,
}

impl VehicleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, route: &str) -> Self {
        self.route = route.trim().to_uppercase();
        self
    }

    pub fn trip(mut self, trip: &str) -> Self {
        self.trip = trip.trim().to_lowercase();
        self
    }

    pub fn status(mut self, status: Option<ServiceStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn kinds(mut self, kinds: Vec<VehicleKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn moving_only(mut self, moving_only: bool) -> Self {
        self.moving_only = moving_only;
        self
    }

    pub fn bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.route.is_empty()
            && self.trip.is_empty()
            && self.status.is_none()
            && self.kinds.is_empty()
            && !self.moving_only
            && self.bounds.is_unbounded()
    }

    pub fn matches(&self, vehicle: &VehicleRecord) -> bool {
        (self.route.is_empty() || vehicle.route_code.trim().to_uppercase() == self.route)
            && (self.trip.is_empty() || vehicle.trip_number.to_lowercase().contains(&self.trip))
            && self.status.is_none_or(|status| vehicle.status() == status)
            && (self.kinds.is_empty() || self.kinds.contains(&vehicle.kind))
            && (!self.moving_only || vehicle.is_in_motion)
            && self.bounds.contains(vehicle.latitude, vehicle.longitude)
    }

    pub fn apply<'a>(&self, vehicles: &'a [VehicleRecord]) -> Vec<&'a VehicleRecord> {
        vehicles.iter().filter(|v| self.matches(v)).collect()
    }
}

/// Parses a comma-separated type list ("Train,Bus"). Blank entries are skipped.
pub fn parse_vehicle_kinds(value: &str) -> Result<Vec<VehicleKind>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(|label| match VehicleKind::from_label(label) {
            VehicleKind::Other => Err(GoApiError::InvalidQuery(format!("unknown vehicle type '{}'", label))),
            kind => Ok(kind),
        })
        .collect()
}

// ============================================================================
// Statistics
// ============================================================================

/// `part / total * 100`, defined as 0 for an empty total.
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total: usize,
    pub on_time: usize,
    pub delayed: usize,
    pub early: usize,
    pub unknown: usize,
    pub trains: usize,
    pub buses: usize,
    pub moving: usize,
    pub stopped: usize,
    pub on_time_pct: f64,
}

impl StatsSnapshot {
    pub fn from_vehicles<'a, I>(vehicles: I) -> Self
    where
        I: IntoIterator<Item = &'a VehicleRecord>,
    {
        let mut stats = StatsSnapshot::default();

        for vehicle in vehicles {
            stats.total += 1;
            match vehicle.status() {
                ServiceStatus::OnTime => stats.on_time += 1,
                ServiceStatus::Delayed => stats.delayed += 1,
                ServiceStatus::Early => stats.early += 1,
                ServiceStatus::Unknown => stats.unknown += 1,
            }
            match vehicle.kind {
                VehicleKind::Train => stats.trains += 1,
                VehicleKind::Bus => stats.buses += 1,
                VehicleKind::Other => {}
            }
            if vehicle.is_in_motion {
                stats.moving += 1;
            } else {
                stats.stopped += 1;
            }
        }

        stats.on_time_pct = percentage(stats.on_time, stats.total);
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountEntry {
    pub label: String,
    pub count: usize,
}

/// Value counts, largest first; ties ordered by label.
fn value_counts<I>(labels: I) -> Vec<CountEntry>
where
    I: IntoIterator<Item = String>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }

    let mut entries: Vec<CountEntry> = counts
        .into_iter()
        .map(|(label, count)| CountEntry { label, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    entries
}

/// Distribution of raw upstream status text.
pub fn status_distribution(vehicles: &[&VehicleRecord]) -> Vec<CountEntry> {
    value_counts(vehicles.iter().map(|v| v.status_text.clone()))
}

pub fn top_routes(vehicles: &[&VehicleRecord], limit: usize) -> Vec<CountEntry> {
    let mut routes = value_counts(vehicles.iter().map(|v| get_route_name(&v.route_code)));
    routes.truncate(limit);
    routes
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u8,
    pub located: usize,
}

impl MapView {
    /// Centers on located vehicles and zooms to their spread. `None` when
    /// no vehicle has a GPS fix.
    pub fn for_vehicles(vehicles: &[&VehicleRecord]) -> Option<Self> {
        let located: Vec<_> = vehicles.iter().filter(|v| v.has_location()).collect();
        if located.is_empty() {
            return None;
        }

        let count = located.len() as f64;
        let center_lat = located.iter().map(|v| v.latitude).sum::<f64>() / count;
        let center_lon = located.iter().map(|v| v.longitude).sum::<f64>() / count;

        let spread = |values: Vec<f64>| {
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            max - min
        };
        let max_range = spread(located.iter().map(|v| v.latitude).collect())
            .max(spread(located.iter().map(|v| v.longitude).collect()));

        let zoom = if max_range < 0.1 {
            12
        } else if max_range < 0.5 {
            10
        } else if max_range < 1.0 {
            9
        } else {
            8
        };

        Some(MapView {
            center_lat,
            center_lon,
            zoom,
            located: located.len(),
        })
    }
}

// ============================================================================
// Table rows, sorting and export
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRow {
    #[serde(rename = "Type")]
    pub kind: &'static str,
    #[serde(rename = "TripNumber")]
    pub trip_number: String,
    #[serde(rename = "Line")]
    pub route_code: String,
    #[serde(rename = "RouteName")]
    pub route_name: String,
    #[serde(rename = "Display")]
    pub display: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "IsInMotion")]
    pub is_in_motion: bool,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "VehicleId")]
    pub vehicle_id: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl From<&VehicleRecord> for VehicleRow {
    fn from(vehicle: &VehicleRecord) -> Self {
        VehicleRow {
            kind: vehicle.kind.label(),
            trip_number: vehicle.trip_number.clone(),
            route_code: vehicle.route_code.clone(),
            route_name: get_route_name(&vehicle.route_code),
            display: vehicle.display.clone(),
            status: vehicle.status_text.clone(),
            is_in_motion: vehicle.is_in_motion,
            latitude: vehicle.latitude,
            longitude: vehicle.longitude,
            vehicle_id: vehicle.id.clone(),
            timestamp: vehicle.timestamp.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    TripNumber,
    RouteName,
    Status,
    Type,
}

impl SortKey {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace(['_', ' '], "").as_str() {
            "" | "tripnumber" | "trip" => Ok(SortKey::TripNumber),
            "routename" | "route" => Ok(SortKey::RouteName),
            "status" => Ok(SortKey::Status),
            "type" => Ok(SortKey::Type),
            _ => Err(GoApiError::InvalidQuery(format!("unknown sort column '{}'", value.trim()))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            _ => Err(GoApiError::InvalidQuery(format!("unknown sort order '{}'", value.trim()))),
        }
    }
}

/// Numeric trip numbers compare as numbers, anything else as text.
fn compare_trip_numbers(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

pub fn sort_rows(rows: &mut [VehicleRow], key: SortKey, order: SortOrder) {
    rows.sort_by(|a, b| {
        let ordering = match key {
            SortKey::TripNumber => compare_trip_numbers(&a.trip_number, &b.trip_number),
            SortKey::RouteName => a.route_name.cmp(&b.route_name),
            SortKey::Status => a.status.cmp(&b.status),
            SortKey::Type => a.kind.cmp(b.kind),
        };
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}

pub fn rows_to_csv(rows: &[VehicleRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| GoApiError::ExportError(format!("Failed to write CSV row: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| GoApiError::ExportError(format!("Failed to flush CSV: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| GoApiError::ExportError(e.to_string()))
}
