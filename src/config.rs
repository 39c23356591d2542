use clap::Parser;

use crate::go_api_models::GoApi;

/// GO Transit live operations dashboard
#[derive(Debug, Clone, Parser)]
#[command(name = "go-transit-dashboard", version, about)]
pub struct Config {
    /// Address the web server binds to
    #[arg(long, env = "GO_DASHBOARD_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port the web server listens on
    #[arg(long, env = "GO_DASHBOARD_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Base URL of the GO Transit JSON API
    #[arg(long, env = "GO_DASHBOARD_API_BASE", default_value = GoApi::DEFAULT_BASE_URL)]
    pub api_base: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "go-transit-dashboard",
            "--port",
            "9090",
            "--api-base",
            "https://example.org/api/go",
        ])
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.api_base, "https://example.org/api/go");
    }
}
