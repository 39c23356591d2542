// Per-line on-time performance for train lines and bus routes

use serde::Serialize;

use crate::go_api_models::LineRecord;
use crate::route_data::get_route_name;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinePerformance {
    pub code: String,
    pub name: String,
    pub total: u32,
    pub on_time: u32,
    pub delayed: u32,
    /// Percent, one decimal place.
    pub on_time_rate: f64,
}

impl From<&LineRecord> for LinePerformance {
    fn from(line: &LineRecord) -> Self {
        let on_time_rate = if line.total == 0 {
            0.0
        } else {
            (line.on_time as f64 / line.total as f64 * 1000.0).round() / 10.0
        };

        LinePerformance {
            code: line.code.clone(),
            name: get_route_name(&line.code),
            total: line.total,
            on_time: line.on_time,
            delayed: line.delayed,
            on_time_rate,
        }
    }
}

pub fn line_performance(lines: &[LineRecord]) -> Vec<LinePerformance> {
    lines.iter().map(LinePerformance::from).collect()
}

/// Best on-time rate first.
pub fn rank_by_on_time_rate(mut lines: Vec<LinePerformance>) -> Vec<LinePerformance> {
    lines.sort_by(|a, b| b.on_time_rate.total_cmp(&a.on_time_rate));
    lines
}

/// The `limit` busiest lines by vehicle count, stable on ties.
pub fn busiest(lines: &[LinePerformance], limit: usize) -> Vec<LinePerformance> {
    let mut ranked = lines.to_vec();
    ranked.sort_by(|a, b| b.total.cmp(&a.total));
    ranked.truncate(limit);
    ranked
}

/// Case-insensitive match on route code or name; a blank query keeps all.
pub fn search_routes(lines: &[LinePerformance], query: &str) -> Vec<LinePerformance> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return lines.to_vec();
    }

    lines
        .iter()
        .filter(|l| l.code.to_lowercase().contains(&query) || l.name.to_lowercase().contains(&query))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BusRouteSummary {
    pub routes: usize,
    pub buses: u32,
    pub busiest_code: Option<String>,
    pub busiest_name: Option<String>,
    pub routes_without_delays: usize,
}

impl BusRouteSummary {
    pub fn from_routes(routes: &[LinePerformance]) -> Self {
        let busiest = busiest(routes, 1).into_iter().next();

        BusRouteSummary {
            routes: routes.len(),
            buses: routes.iter().map(|r| r.total).sum(),
            busiest_code: busiest.as_ref().map(|b| b.code.clone()),
            busiest_name: busiest.map(|b| b.name),
            routes_without_delays: routes.iter().filter(|r| r.delayed == 0).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, total: u32, on_time: u32, delayed: u32) -> LineRecord {
        LineRecord {
            code: code.to_string(),
            total,
            on_time,
            delayed,
        }
    }

    #[test]
    fn on_time_rate_is_rounded_and_safe_on_zero() {
        let lines = line_performance(&[record("LW", 3, 2, 1), record("BR", 0, 0, 0)]);
        assert_eq!(lines[0].on_time_rate, 66.7);
        assert_eq!(lines[0].name, "Lakeshore West");
        assert_eq!(lines[1].on_time_rate, 0.0);
    }

    #[test]
    fn ranking_and_busiest() {
        let lines = line_performance(&[
            record("LW", 10, 9, 1),
            record("LE", 8, 8, 0),
            record("KI", 12, 6, 6),
        ]);

        let ranked: Vec<_> = rank_by_on_time_rate(lines.clone()).into_iter().map(|l| l.code).collect();
        assert_eq!(ranked, vec!["LE", "LW", "KI"]);

        let top: Vec<_> = busiest(&lines, 2).into_iter().map(|l| l.code).collect();
        assert_eq!(top, vec!["KI", "LW"]);
    }

    #[test]
    fn bus_summary_and_search() {
        let routes = line_performance(&[
            record("41", 20, 18, 2),
            record("56", 7, 7, 0),
            record("19", 4, 4, 0),
        ]);
        let summary = BusRouteSummary::from_routes(&routes);

        assert_eq!(summary.routes, 3);
        assert_eq!(summary.buses, 31);
        assert_eq!(summary.busiest_code.as_deref(), Some("41"));
        assert_eq!(summary.busiest_name.as_deref(), Some("Hamilton / Pickering"));
        assert_eq!(summary.routes_without_delays, 2);

        let found: Vec<_> = search_routes(&routes, "oakville").into_iter().map(|l| l.code).collect();
        assert_eq!(found, vec!["56"]);
        assert_eq!(search_routes(&routes, "  ").len(), 3);
        assert_eq!(BusRouteSummary::from_routes(&[]), BusRouteSummary::default());
    }
}
