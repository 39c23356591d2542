// GO Transit live operations dashboard
// JSON API over the GO Transit feed with an embedded web UI

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod dashboard;
mod go_api_models;
mod line_stats;
mod response_cache;
mod route_data;
mod vehicle_filter;

use config::Config;
use dashboard::TrackerParams;
use go_api_models::{GoApi, GoApiError, HttpFetcher};

// Embed static files at compile time
const INDEX_HTML: &str = include_str!("../static/index.html");
const DASHBOARD_JS: &str = include_str!("../static/go-transit.js");

#[derive(Clone)]
struct AppState {
    api: Arc<GoApi>,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    timestamp: i64,
    sources: Vec<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
            sources: vec!["Metrolinx".to_string()],
        }
    }

    fn error(message: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().timestamp(),
            sources: vec![],
        }
    }
}

fn error_response(e: GoApiError) -> HttpResponse {
    match e {
        GoApiError::InvalidQuery(_) => {
            warn!("⚠️  Rejected request: {}", e);
            HttpResponse::BadRequest().json(ApiResponse::<String>::error(e.to_string()))
        }
        _ => {
            error!("❌ Request failed: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::<String>::error(e.to_string()))
        }
    }
}

fn task_failed(what: &str, e: actix_web::error::BlockingError) -> HttpResponse {
    error!("❌ {} task failed: {}", what, e);
    HttpResponse::InternalServerError().json(ApiResponse::<String>::error(format!("Failed to build {}", what)))
}

// ============================================================================
// Frontend Routes
// ============================================================================

async fn serve_index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

async fn serve_js() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/javascript; charset=utf-8")
        .body(DASHBOARD_JS)
}

// ============================================================================
// API Endpoints
// ============================================================================

#[derive(Deserialize)]
struct AnalyticsParams {
    search: Option<String>,
}

async fn get_overview(state: web::Data<AppState>) -> HttpResponse {
    let api = state.api.clone();
    match web::block(move || dashboard::overview_page(&api)).await {
        Ok(page) => {
            info!("📊 Overview requested: {} vehicles, {} notices", page.total_vehicles, page.notices.len());
            HttpResponse::Ok().json(ApiResponse::success(page))
        }
        Err(e) => task_failed("overview", e),
    }
}

async fn get_analytics(state: web::Data<AppState>, query: web::Query<AnalyticsParams>) -> HttpResponse {
    let api = state.api.clone();
    let search = query.into_inner().search.unwrap_or_default();
    match web::block(move || dashboard::analytics_page(&api, &search)).await {
        Ok(page) => {
            info!(
                "📈 Analytics requested: {} train lines, {} bus routes",
                page.train_lines.len(),
                page.bus_summary.routes
            );
            HttpResponse::Ok().json(ApiResponse::success(page))
        }
        Err(e) => task_failed("analytics", e),
    }
}

async fn get_vehicles(state: web::Data<AppState>, query: web::Query<TrackerParams>) -> HttpResponse {
    let api = state.api.clone();
    let params = query.into_inner();
    match web::block(move || dashboard::tracker_page(&api, &params)).await {
        Ok(Ok(page)) => {
            info!("🚆 Vehicles requested: {} of {} shown", page.found, page.fleet.total);
            HttpResponse::Ok().json(ApiResponse::success(page))
        }
        Ok(Err(e)) => error_response(e),
        Err(e) => task_failed("vehicle tracker", e),
    }
}

async fn get_vehicles_csv(state: web::Data<AppState>, query: web::Query<TrackerParams>) -> HttpResponse {
    let api = state.api.clone();
    let params = query.into_inner();
    match web::block(move || dashboard::tracker_csv(&api, &params)).await {
        Ok(Ok(csv)) => {
            let file_name = format!(
                "go_transit_vehicles_{}.csv",
                chrono::Utc::now()
                    .with_timezone(&chrono_tz::America::Toronto)
                    .format("%Y%m%d_%H%M%S")
            );
            info!("📥 CSV export requested: {}", file_name);
            HttpResponse::Ok()
                .content_type("text/csv; charset=utf-8")
                .insert_header((
                    "Content-Disposition",
                    format!("attachment; filename=\"{}\"", file_name),
                ))
                .body(csv)
        }
        Ok(Err(e)) => error_response(e),
        Err(e) => task_failed("CSV export", e),
    }
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "GO Transit Dashboard",
        "version": env!("CARGO_PKG_VERSION"),
        "sources": ["Metrolinx"],
        "timestamp": chrono::Utc::now().timestamp(),
        "cache": state.api.cache().stats(),
        "embedded_frontend": true
    }))
}

// ============================================================================
// Server Setup
// ============================================================================

fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Frontend routes
        .route("/", web::get().to(serve_index))
        .route("/go-transit.js", web::get().to(serve_js))
        // Health check
        .route("/health", web::get().to(health_check))
        // API routes
        .service(
            web::scope("/api/go")
                .route("/overview", web::get().to(get_overview))
                .route("/analytics", web::get().to(get_analytics))
                .route("/vehicles", web::get().to(get_vehicles))
                .route("/vehicles.csv", web::get().to(get_vehicles_csv)),
        );
}

async fn run_server(config: Config, state: AppState) -> std::io::Result<()> {
    info!("🚀 GO Transit Dashboard listening on http://{}:{}", config.bind, config.port);
    info!("📡 Upstream API: {}", config.api_base);
    info!("🔄 Upstream responses cached for {}s", response_cache::CACHE_TTL.as_secs());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(configure)
    })
    .bind((config.bind.as_str(), config.port))?
    .run()
    .await
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    let state = AppState {
        api: Arc::new(GoApi::new(config.api_base.clone(), Arc::new(HttpFetcher::new()))),
    };

    actix_web::rt::System::new().block_on(run_server(config, state))
}
