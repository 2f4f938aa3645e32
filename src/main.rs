mod analyzer;
mod cache;
mod config;
mod fetcher;
mod filter;
mod model;
mod normalizer;
mod storage;
mod utils;

use analyzer::{
    MonteCarloOptions, ProjectionInputs, StabilityOptions, estimate_returns, group_listings,
    price_trends, project_deterministic, project_monte_carlo, rank_undervalued, stability_by_group,
};
use cache::AnalysisCache;
use config::{ApiConfig, AppConfig};
use fetcher::{ListingApiClient, ListingSource, SearchQuery, sort_by_centroid_proximity};
use model::ListingTable;
use std::path::PathBuf;
use storage::CsvStore;
use tracing::{error, info, warn};
use utils::fmt_money;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config = match config::load_or_default(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error: {e}");
            return;
        }
    };

    let store = CsvStore::new(&config.data_dir);

    // Optional dataset refresh; a failed fetch degrades to the existing CSV.
    let mut refreshed: Option<PathBuf> = None;
    if let (Some(api), Some(search)) = (&config.api, &config.search) {
        info!("Refreshing dataset from the listings API...");
        match refresh_dataset(api, search, &store).await {
            Ok(Some((path, count))) => {
                info!("Dataset refreshed with {count} listings");
                refreshed = Some(path);
            }
            Ok(None) => info!("Search returned no listings, keeping existing data"),
            Err(e) => warn!("Dataset refresh failed ({e}), continuing with existing data"),
        }
    }

    let loaded = match &refreshed {
        Some(path) => store.load(path).map(Some),
        None => store.load_first(),
    };
    let raw = match loaded {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            error!(
                "No dataset in {}; drop a CSV there or configure the listings API",
                config.data_dir
            );
            return;
        }
        Err(e) => {
            error!("Dataset load error: {e}");
            return;
        }
    };

    let mut cache = AnalysisCache::new(raw);
    info!("Dataset fingerprint: {:016x}", cache.fingerprint());
    log_dataset_overview(cache.table());

    // An active filter defines a different working set, so the per-dataset
    // memos only apply when it is a no-op.
    let use_cache = config.filter.is_noop();
    let table = if use_cache {
        cache.table().clone()
    } else {
        config.filter.apply(cache.table())
    };
    if table.is_empty() {
        warn!("No listings left after filtering, nothing to analyze");
        return;
    }

    run_opportunities(&config, &mut cache, &table, use_cache);
    run_stability(&config, &mut cache, &table, use_cache);
    run_roi(&config, &mut cache, &table, use_cache);
    run_trends(&config, &table);

    info!("Analysis complete");
}

/// Fetches listings for the configured search, orders them around their
/// coordinate centroid and saves them as the active dataset. Returns the
/// path written and the record count, or None for an empty search result.
async fn refresh_dataset(
    api: &ApiConfig,
    search: &SearchQuery,
    store: &CsvStore,
) -> Result<Option<(PathBuf, usize)>, Box<dyn std::error::Error>> {
    let client = ListingApiClient::new(&api.base_url, &api.api_key)?;
    let mut records = client.search(search).await?;
    if records.is_empty() {
        return Ok(None);
    }
    sort_by_centroid_proximity(&mut records);
    let path = store.save_records(&dataset_file_name(search), &records)?;
    Ok(Some((path, records.len())))
}

fn dataset_file_name(search: &SearchQuery) -> String {
    let tag = search
        .postal_code
        .as_deref()
        .or(search.city.as_deref())
        .map(|t| t.trim().to_lowercase().replace(' ', "_"))
        .filter(|t| !t.is_empty());
    match tag {
        Some(tag) => format!("listings_{tag}.csv"),
        None => "listings.csv".to_string(),
    }
}

/// Headline numbers for the loaded dataset, before any filtering.
fn log_dataset_overview(table: &ListingTable) {
    let mappable = table.listings.iter().filter(|l| l.is_map_eligible()).count();
    info!("Dataset: {} listings ({mappable} mappable)", table.len());

    let prices = analyzer::stats::sorted_finite(table.listings.iter().filter_map(|l| l.price));
    if let (Some(avg), Some(median)) = (
        analyzer::stats::mean(&prices),
        analyzer::stats::median(&prices),
    ) {
        info!(
            "Price: avg {}, median {}",
            fmt_money(avg),
            fmt_money(median)
        );
    }
    let beds = analyzer::stats::sorted_finite(
        table
            .listings
            .iter()
            .filter_map(|l| l.bedrooms.map(|b| b as f64)),
    );
    if let Some(median) = analyzer::stats::median(&beds) {
        info!("Median bedrooms: {median:.1}");
    }
    let ppsf =
        analyzer::stats::sorted_finite(table.listings.iter().filter_map(|l| l.price_per_sqft));
    if let Some(avg) = analyzer::stats::mean(&ppsf) {
        info!("Avg price/sqft: {avg:.0}");
    }
}

fn run_opportunities(
    config: &AppConfig,
    cache: &mut AnalysisCache,
    table: &ListingTable,
    use_cache: bool,
) {
    let groups = if use_cache {
        cache.groups(config.group_key, config.min_comp_group)
    } else {
        group_listings(table, config.group_key, config.min_comp_group)
    };
    let groups = match groups {
        Ok(groups) => groups,
        Err(e) => {
            warn!("Opportunities view skipped: {e}");
            return;
        }
    };
    if groups.is_empty() {
        warn!(
            "Opportunities view skipped: no {} group reaches {} members",
            config.group_key, config.min_comp_group
        );
        return;
    }

    let rows = match rank_undervalued(table, &groups, config.valuation_metric, config.top_n) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Opportunities view skipped: {e}");
            return;
        }
    };
    info!(
        "Opportunities: top {} by {} across {} groups",
        rows.len(),
        config.valuation_metric,
        groups.len()
    );
    for row in &rows {
        let listing = &table.listings[row.index];
        let name = if listing.label.is_empty() {
            format!("listing #{}", row.index)
        } else {
            listing.label.clone()
        };
        let beds = listing
            .bedrooms
            .map(|b| b.to_string())
            .unwrap_or_else(|| "?".to_string());
        info!(
            "  {name} [{}, {beds} bd]: {} vs median {} | discount {}%, z {}, pctl {:.0}%, dom {}, {}",
            row.group,
            fmt_money(row.metric),
            fmt_money(row.group_median),
            fmt_or_na(row.discount_pct, 1),
            fmt_or_na(row.robust_z, 2),
            row.below_median_pct(),
            fmt_or_na(listing.days_on_market, 0),
            listing.status.as_deref().unwrap_or("n/a"),
        );
    }
}

fn run_stability(
    config: &AppConfig,
    cache: &mut AnalysisCache,
    table: &ListingTable,
    use_cache: bool,
) {
    // Every group participates here; the comparable minimum only guards
    // valuation ranking.
    let groups = if use_cache {
        cache.groups(config.group_key, 1)
    } else {
        group_listings(table, config.group_key, 1)
    };
    let groups = match groups {
        Ok(groups) => groups,
        Err(e) => {
            warn!("Stability view skipped: {e}");
            return;
        }
    };

    let options = StabilityOptions {
        seed: config.bootstrap_seed,
        max_replicates: config.max_bootstrap_replicates,
    };
    match stability_by_group(table, &groups, config.stability_metric, &options) {
        Ok(rows) => {
            info!(
                "Stability: {} groups scored on {}",
                rows.len(),
                config.stability_metric
            );
            for row in rows.iter().take(10) {
                let ci = row
                    .confidence
                    .map(|(lo, hi)| format!("[{lo:.1}, {hi:.1}]"))
                    .unwrap_or_else(|| "n/a".to_string());
                info!(
                    "  {}: n = {}, median {}, score {} ci {ci}, outliers {}%",
                    row.group,
                    row.observations,
                    fmt_or_na(row.median, 0),
                    fmt_or_na(row.score, 1),
                    fmt_or_na(row.outlier_share.map(|s| s * 100.0), 1),
                );
            }
        }
        Err(e) => warn!("Stability view skipped: {e}"),
    }
}

fn run_roi(config: &AppConfig, cache: &mut AnalysisCache, table: &ListingTable, use_cache: bool) {
    let estimates = if use_cache {
        cache.return_estimates()
    } else {
        estimate_returns(table)
    };
    info!(
        "Return estimates: mu {:.4}, sigma {:.4}, {} postal codes with own history",
        estimates.global.mu,
        estimates.global.sigma,
        estimates.by_postal.len()
    );

    let growth = config.growth_rate.unwrap_or(estimates.global.mu);
    let projection = project_deterministic(
        table,
        &ProjectionInputs {
            growth_rate: growth,
            holding_cost_rate: config.holding_cost_rate,
            horizon_years: config.horizon_years,
            profit_threshold: config.profit_threshold,
        },
    );
    match (projection.median_net_gain, projection.share_profitable) {
        (Some(median), Some(share)) => {
            info!(
                "Deterministic {}y at g {:.4}: median net gain {}, {:.1}% profitable",
                config.horizon_years,
                growth,
                fmt_money(median),
                share * 100.0
            );
            for (zip, net) in projection.by_postal.iter().take(5) {
                info!("  {zip}: median net {}", fmt_money(*net));
            }
        }
        _ => warn!("Deterministic projection skipped: no priced listings"),
    }

    let options = MonteCarloOptions {
        simulations: config.simulations,
        horizon_years: config.horizon_years,
        holding_cost_rate: config.holding_cost_rate,
        profit_threshold: config.profit_threshold,
        annual_mu: estimates.global.mu,
        annual_sigma: estimates.global.sigma,
        use_group_estimates: config.use_group_estimates,
        seed: config.simulation_seed,
    };
    match project_monte_carlo(table, &estimates, &options) {
        Some(mc) => info!(
            "Monte Carlo ({} sims, {} listings): P(profit) {:.1}%, VaR(5%) {}, mean {}",
            mc.simulations,
            mc.listings,
            mc.prob_profit * 100.0,
            fmt_money(mc.value_at_risk),
            fmt_money(mc.mean_net_gain)
        ),
        None => warn!("Monte Carlo skipped: no priced listings"),
    }
}

fn run_trends(config: &AppConfig, table: &ListingTable) {
    match price_trends(table, config.trend_key) {
        Ok(rows) => {
            info!("Trends by {}: {} segments", config.trend_key, rows.len());
            for row in rows.iter().take(10) {
                info!(
                    "  {}: n = {}, mean {}, median {}",
                    row.key,
                    row.count,
                    fmt_money(row.mean_price),
                    fmt_money(row.median_price)
                );
            }
        }
        Err(e) => warn!("Trends view skipped: {e}"),
    }
}

fn fmt_or_na(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{v:.precision$}"))
        .unwrap_or_else(|| "n/a".to_string())
}
