// Page view-models: each call pulls through the response cache and degrades
// to empty sections (with notices) when upstream data is unavailable.

use chrono::{TimeZone, Utc};
use chrono_tz::America::Toronto;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::go_api_models::{BoardRow, GoApi, GoApiError, LineKind, Result, ServiceStatus, TimeSeries};
use crate::line_stats::{self, BusRouteSummary, LinePerformance};
use crate::vehicle_filter::{
    self, BoundingBox, CountEntry, MapView, SortKey, SortOrder, StatsSnapshot, VehicleFilter, VehicleRow,
};

pub const PERFORMANCE_TARGET: f64 = 95.0;
pub const TOP_BUS_ROUTES: usize = 10;
pub const TOP_TRACKER_ROUTES: usize = 5;

pub fn format_toronto_millis(epoch_millis: i64, pattern: &str) -> String {
    match Utc.timestamp_millis_opt(epoch_millis).single() {
        Some(dt) => dt.with_timezone(&Toronto).format(pattern).to_string(),
        None => format!("Invalid timestamp: {}", epoch_millis),
    }
}

pub fn generated_at() -> String {
    Utc::now()
        .with_timezone(&Toronto)
        .format("%B %d, %Y at %H:%M %Z")
        .to_string()
}

// ============================================================================
// Overview
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SeriesPoint {
    pub epoch_millis: i64,
    pub time: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesView {
    pub target: String,
    pub points: Vec<SeriesPoint>,
}

impl From<TimeSeries> for SeriesView {
    fn from(series: TimeSeries) -> Self {
        let points = series
            .datapoints
            .into_iter()
            .map(|(value, millis)| {
                let epoch_millis = millis as i64;
                SeriesPoint {
                    epoch_millis,
                    time: format_toronto_millis(epoch_millis, "%H:%M"),
                    value,
                }
            })
            .collect();

        SeriesView {
            target: series.target,
            points,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewPage {
    pub generated_at: String,
    pub performance_rate: f64,
    pub performance_target: f64,
    pub performance_delta: f64,
    pub on_target: bool,
    pub total_vehicles: f64,
    pub moving_vehicles: f64,
    pub on_time: f64,
    pub delayed: f64,
    pub on_time_share: f64,
    pub trains_active: f64,
    pub buses_active: f64,
    pub train_lines: f64,
    pub bus_routes: f64,
    pub timeseries: Vec<SeriesView>,
    pub union_station: Vec<BoardRow>,
    pub notices: Vec<String>,
}

pub fn overview_page(api: &GoApi) -> OverviewPage {
    let mut notices = Vec::new();

    let stats = api.network_stats(&mut notices);
    if stats.is_empty() {
        notices.push("Unable to load GO Transit statistics".to_string());
    }
    let timeseries = api.timeseries(&mut notices).into_iter().map(SeriesView::from).collect();
    let union_station = api.union_station(&mut notices);

    let performance_rate = stats.performance_rate();
    OverviewPage {
        generated_at: generated_at(),
        performance_rate,
        performance_target: PERFORMANCE_TARGET,
        performance_delta: performance_rate - PERFORMANCE_TARGET,
        on_target: performance_rate >= PERFORMANCE_TARGET,
        total_vehicles: stats.total_vehicles(),
        moving_vehicles: stats.vehicles_in_motion(),
        on_time: stats.on_time(),
        delayed: stats.delayed(),
        on_time_share: stats.on_time_share(),
        trains_active: stats.trains_active(),
        buses_active: stats.buses_active(),
        train_lines: stats.train_lines(),
        bus_routes: stats.bus_routes(),
        timeseries,
        union_station,
        notices,
    }
}

// ============================================================================
// Analytics
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsPage {
    pub generated_at: String,
    pub train_lines: Vec<LinePerformance>,
    pub top_bus_routes: Vec<LinePerformance>,
    pub bus_summary: BusRouteSummary,
    pub bus_routes: Vec<LinePerformance>,
    pub notices: Vec<String>,
}

pub fn analytics_page(api: &GoApi, route_search: &str) -> AnalyticsPage {
    let mut notices = Vec::new();

    let trains = line_stats::line_performance(&api.lines(LineKind::Trains, &mut notices));
    let buses = line_stats::line_performance(&api.lines(LineKind::Buses, &mut notices));

    AnalyticsPage {
        generated_at: generated_at(),
        train_lines: line_stats::rank_by_on_time_rate(trains),
        top_bus_routes: line_stats::busiest(&buses, TOP_BUS_ROUTES),
        bus_summary: BusRouteSummary::from_routes(&buses),
        bus_routes: line_stats::search_routes(&buses, route_search),
        notices,
    }
}

// ============================================================================
// Vehicle tracker
// ============================================================================

/// Raw query-string parameters of the tracker views.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerParams {
    pub route: Option<String>,
    pub trip: Option<String>,
    pub status: Option<String>,
    pub types: Option<String>,
    pub moving: Option<String>,
    pub min_lat: Option<String>,
    pub max_lat: Option<String>,
    pub min_lon: Option<String>,
    pub max_lon: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

/// Blank means unconstrained; anything else must be a finite number.
fn parse_bound(name: &str, value: Option<&str>) -> Result<Option<f64>> {
    match value.map(str::trim).unwrap_or("") {
        "" => Ok(None),
        text => match text.parse::<f64>() {
            Ok(bound) if bound.is_finite() => Ok(Some(bound)),
            _ => Err(GoApiError::InvalidQuery(format!("{} must be a number, got '{}'", name, text))),
        },
    }
}

fn parse_flag(name: &str, value: Option<&str>) -> Result<bool> {
    match value.map(|v| v.trim().to_ascii_lowercase()).unwrap_or_default().as_str() {
        "" | "false" | "0" | "off" | "no" => Ok(false),
        "true" | "1" | "on" | "yes" => Ok(true),
        other => Err(GoApiError::InvalidQuery(format!("{} must be true or false, got '{}'", name, other))),
    }
}

impl TrackerParams {
    pub fn to_filter(&self) -> Result<VehicleFilter> {
        let status = ServiceStatus::from_filter_value(self.status.as_deref().unwrap_or(""))?;
        let kinds = vehicle_filter::parse_vehicle_kinds(self.types.as_deref().unwrap_or(""))?;
        let bounds = BoundingBox {
            min_lat: parse_bound("min_lat", self.min_lat.as_deref())?,
            max_lat: parse_bound("max_lat", self.max_lat.as_deref())?,
            min_lon: parse_bound("min_lon", self.min_lon.as_deref())?,
            max_lon: parse_bound("max_lon", self.max_lon.as_deref())?,
        };

        Ok(VehicleFilter::new()
            .route(self.route.as_deref().unwrap_or(""))
            .trip(self.trip.as_deref().unwrap_or(""))
            .status(status)
            .kinds(kinds)
            .moving_only(parse_flag("moving", self.moving.as_deref())?)
            .bounds(bounds))
    }

    pub fn sorting(&self) -> Result<(SortKey, SortOrder)> {
        Ok((
            SortKey::parse(self.sort.as_deref().unwrap_or(""))?,
            SortOrder::parse(self.order.as_deref().unwrap_or(""))?,
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackerPage {
    pub generated_at: String,
    /// Whole fleet, ignoring filters.
    pub fleet: StatsSnapshot,
    /// Vehicles matching the filters.
    pub summary: StatsSnapshot,
    pub found: usize,
    pub filtered_out: usize,
    pub status_distribution: Vec<CountEntry>,
    pub top_routes: Vec<CountEntry>,
    pub map: Option<MapView>,
    pub vehicles: Vec<VehicleRow>,
    pub notices: Vec<String>,
}

pub fn tracker_page(api: &GoApi, params: &TrackerParams) -> Result<TrackerPage> {
    let filter = params.to_filter()?;
    let (sort_key, sort_order) = params.sorting()?;

    let mut notices = Vec::new();
    let vehicles = api.vehicles(&mut notices);
    if vehicles.is_empty() && notices.is_empty() {
        notices.push("No vehicle data reported by GO Transit".to_string());
    }

    let matched = filter.apply(&vehicles);
    if !filter.is_empty() {
        info!("🔍 Tracker filter kept {} of {} vehicles", matched.len(), vehicles.len());
    }

    let mut rows: Vec<VehicleRow> = matched.iter().map(|v| VehicleRow::from(*v)).collect();
    vehicle_filter::sort_rows(&mut rows, sort_key, sort_order);

    Ok(TrackerPage {
        generated_at: generated_at(),
        fleet: StatsSnapshot::from_vehicles(&vehicles),
        summary: StatsSnapshot::from_vehicles(matched.iter().copied()),
        found: matched.len(),
        filtered_out: vehicles.len() - matched.len(),
        status_distribution: vehicle_filter::status_distribution(&matched),
        top_routes: vehicle_filter::top_routes(&matched, TOP_TRACKER_ROUTES),
        map: MapView::for_vehicles(&matched),
        vehicles: rows,
        notices,
    })
}

pub fn tracker_csv(api: &GoApi, params: &TrackerParams) -> Result<String> {
    let page = tracker_page(api, params)?;
    vehicle_filter::rows_to_csv(&page.vehicles)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::go_api_models::Endpoint;
    use crate::go_api_models::tests::{FakeFetcher, url};
    use serde_json::{Value, json};

    pub(crate) fn upstream() -> Vec<(String, Value)> {
        vec![
            (
                url(Endpoint::Stats),
                json!([
                    {"metric": "Performance Rate", "value": 91.5},
                    {"metric": "Total Vehicles", "value": 4},
                    {"metric": "On Time", "value": 3},
                    {"metric": "Delayed", "value": 1},
                    {"metric": "Trains in Motion", "value": 1},
                    {"metric": "Buses in Motion", "value": 2},
                    {"metric": "Trains Active", "value": 2},
                    {"metric": "Buses Active", "value": 2}
                ]),
            ),
            (
                url(Endpoint::Timeseries),
                json!([{"target": "Vehicles", "datapoints": [[180, 1700000000000i64], [null, 1700000060000i64]]}]),
            ),
            (
                url(Endpoint::Vehicles),
                json!({"vehicles": [
                    {"Type": "Train", "TripNumber": "4521", "Line": "LW", "Display": "LW 4521", "Status": "Delayed", "IsInMotion": true, "Latitude": 43.40, "Longitude": -79.70},
                    {"Type": "Train", "TripNumber": 4533, "Line": "LW", "Display": "LW 4533", "Status": "On Time", "IsInMotion": false, "Latitude": 43.50, "Longitude": -79.60},
                    {"Type": "Bus", "TripNumber": "4145", "Line": 41, "Display": "41", "Status": "On Time", "IsInMotion": true, "Latitude": 43.25, "Longitude": -79.85},
                    {"Type": "Bus", "TripNumber": "5601", "Line": "56", "Display": "56", "Status": "Early", "IsInMotion": false, "Latitude": 0, "Longitude": 0}
                ]}),
            ),
            (
                url(Endpoint::Lines(LineKind::Trains)),
                json!([
                    {"Code": "LW", "Total": 2, "OnTime": 1, "Delayed": 1},
                    {"Code": "LE", "Total": 1, "OnTime": 1, "Delayed": 0}
                ]),
            ),
        ]
    }

    pub(crate) fn api() -> GoApi {
        GoApi::new(GoApi::DEFAULT_BASE_URL, FakeFetcher::new(upstream()))
    }

    #[test]
    fn overview_reads_metrics_and_series() {
        let page = overview_page(&api());

        assert_eq!(page.performance_rate, 91.5);
        assert_eq!(page.performance_delta, -3.5);
        assert!(!page.on_target);
        assert_eq!(page.moving_vehicles, 3.0);
        assert_eq!(page.on_time_share, 75.0);
        assert_eq!(page.timeseries[0].points.len(), 2);
        assert_eq!(page.timeseries[0].points[1].value, None);
        // union board is not served by the fake upstream
        assert!(page.union_station.is_empty());
        assert_eq!(page.notices.len(), 1);
        assert!(page.notices[0].contains("type=union"));
    }

    #[test]
    fn analytics_degrades_when_bus_lines_fail() {
        let page = analytics_page(&api(), "");

        assert_eq!(page.train_lines[0].code, "LE");
        assert_eq!(page.train_lines[1].on_time_rate, 50.0);
        assert!(page.top_bus_routes.is_empty());
        assert_eq!(page.bus_summary, BusRouteSummary::default());
        assert_eq!(page.notices.len(), 1);
    }

    #[test]
    fn tracker_filters_and_keeps_fleet_stats() {
        let params = TrackerParams {
            route: Some(" lw ".into()),
            status: Some("Delayed".into()),
            ..TrackerParams::default()
        };
        let page = tracker_page(&api(), &params).unwrap();

        assert_eq!(page.found, 1);
        assert_eq!(page.filtered_out, 3);
        assert_eq!(page.vehicles[0].trip_number, "4521");
        assert_eq!(page.fleet.total, 4);
        assert_eq!(page.fleet.on_time_pct, 50.0);
        assert_eq!(page.summary.delayed, 1);
        assert!(page.notices.is_empty());
    }

    #[test]
    fn tracker_sorts_and_maps() {
        let params = TrackerParams {
            types: Some("Bus,Train".into()),
            sort: Some("TripNumber".into()),
            order: Some("desc".into()),
            ..TrackerParams::default()
        };
        let page = tracker_page(&api(), &params).unwrap();

        let trips: Vec<_> = page.vehicles.iter().map(|v| v.trip_number.as_str()).collect();
        assert_eq!(trips, vec!["5601", "4533", "4521", "4145"]);
        assert_eq!(page.map.as_ref().map(|m| m.located), Some(3));
        assert_eq!(page.top_routes[0], CountEntry { label: "Lakeshore West".into(), count: 2 });
    }

    #[test]
    fn tracker_rejects_unknown_status() {
        let params = TrackerParams {
            status: Some("Cancelled".into()),
            ..TrackerParams::default()
        };
        assert!(tracker_page(&api(), &params).is_err());
    }

    #[test]
    fn blank_bounds_and_flags_are_unconstrained() {
        let params = TrackerParams {
            moving: Some("".into()),
            min_lat: Some(" ".into()),
            max_lon: Some("".into()),
            ..TrackerParams::default()
        };
        let page = tracker_page(&api(), &params).unwrap();
        assert_eq!(page.found, 4);

        let params = TrackerParams {
            moving: Some("true".into()),
            min_lat: Some("43.3".into()),
            ..TrackerParams::default()
        };
        let page = tracker_page(&api(), &params).unwrap();
        assert_eq!(page.found, 1);
        assert_eq!(page.vehicles[0].trip_number, "4521");
    }

    #[test]
    fn malformed_bounds_and_flags_are_rejected() {
        let params = TrackerParams {
            min_lat: Some("north".into()),
            ..TrackerParams::default()
        };
        assert!(matches!(tracker_page(&api(), &params), Err(GoApiError::InvalidQuery(_))));

        let params = TrackerParams {
            moving: Some("maybe".into()),
            ..TrackerParams::default()
        };
        assert!(matches!(tracker_page(&api(), &params), Err(GoApiError::InvalidQuery(_))));
    }

    #[test]
    fn tracker_without_upstream_is_empty_not_an_error() {
        let api = GoApi::new(GoApi::DEFAULT_BASE_URL, FakeFetcher::new(vec![]));
        let page = tracker_page(&api, &TrackerParams::default()).unwrap();

        assert_eq!(page.found, 0);
        assert_eq!(page.fleet.on_time_pct, 0.0);
        assert!(page.map.is_none());
        assert_eq!(page.notices.len(), 1);
    }

    #[test]
    fn csv_contains_filtered_rows() {
        let params = TrackerParams {
            route: Some("41".into()),
            ..TrackerParams::default()
        };
        let csv = tracker_csv(&api(), &params).unwrap();

        assert_eq!(csv.lines().count(), 2);
        assert!(csv.contains("Hamilton / Pickering"));
    }

    #[test]
    fn toronto_times() {
        // 2023-11-14T22:13:20Z
        assert_eq!(format_toronto_millis(1_700_000_000_000, "%H:%M"), "17:13");
    }
}
