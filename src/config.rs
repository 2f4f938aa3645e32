use crate::fetcher::query::SearchQuery;
use crate::filter::ListingFilter;
use crate::model::{ConfigError, GroupKey, StabilityMetric, TrendKey, ValuationMetric};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: String,
}

fn default_base_url() -> String {
    "https://api.rentcast.io/v1".to_string()
}

/// Dashboard configuration. Every field has a default, so a partial file
/// (or none at all) still yields a runnable setup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: String,
    pub group_key: GroupKey,
    pub valuation_metric: ValuationMetric,
    pub stability_metric: StabilityMetric,
    pub trend_key: TrendKey,
    /// Minimum comparable-group membership; valuation needs real peers.
    pub min_comp_group: usize,
    /// How many undervaluation candidates to report.
    pub top_n: usize,
    pub horizon_years: f64,
    /// Deterministic annual growth rate; unset means "use the estimated
    /// global mu".
    pub growth_rate: Option<f64>,
    pub holding_cost_rate: f64,
    pub profit_threshold: f64,
    pub simulations: usize,
    /// Prefer per-postal return estimates in the Monte Carlo run.
    pub use_group_estimates: bool,
    pub bootstrap_seed: u64,
    pub simulation_seed: u64,
    pub max_bootstrap_replicates: usize,
    pub filter: ListingFilter,
    pub api: Option<ApiConfig>,
    pub search: Option<SearchQuery>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            group_key: GroupKey::PostalCode,
            valuation_metric: ValuationMetric::Price,
            stability_metric: StabilityMetric::Price,
            trend_key: TrendKey::PostalCode,
            min_comp_group: 5,
            top_n: 15,
            horizon_years: 5.0,
            growth_rate: None,
            holding_cost_rate: 0.01,
            profit_threshold: 0.0,
            simulations: 500,
            use_group_estimates: true,
            bootstrap_seed: 7,
            simulation_seed: 42,
            max_bootstrap_replicates: 400,
            filter: ListingFilter::default(),
            api: None,
            search: None,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_comp_group < 3 {
            return Err(ConfigError::Invalid(
                "min_comp_group must be at least 3".to_string(),
            ));
        }
        if self.simulations == 0 {
            return Err(ConfigError::Invalid(
                "simulations must be at least 1".to_string(),
            ));
        }
        if self.top_n == 0 {
            return Err(ConfigError::Invalid("top_n must be at least 1".to_string()));
        }
        if self.horizon_years <= 0.0 {
            return Err(ConfigError::Invalid(
                "horizon_years must be positive".to_string(),
            ));
        }
        if self.holding_cost_rate < 0.0 {
            return Err(ConfigError::Invalid(
                "holding_cost_rate cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    let config: AppConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads the configuration, falling back to defaults when the file does not
/// exist. A file that exists but fails to read, parse or validate is still
/// an error.
pub fn load_or_default(path: &str) -> Result<AppConfig, ConfigError> {
    if !Path::new(path).exists() {
        info!(path, "no configuration file, using defaults");
        return Ok(AppConfig::default());
    }
    load_config(path)
}
