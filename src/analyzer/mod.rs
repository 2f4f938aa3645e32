// Analyzer module: aggregates the statistical views over a listing table.

pub mod comparables;
pub mod projection;
pub mod stability;
pub mod stats;
pub mod trends;
pub mod valuation;

// Re-export the entry points the dashboard flow drives.
pub use comparables::{ComparableGroups, group_listings};
pub use projection::{
    MonteCarloOptions, ProjectionInputs, ReturnEstimates, estimate_returns, project_deterministic,
    project_monte_carlo,
};
pub use stability::{StabilityOptions, stability_by_group};
pub use trends::price_trends;
pub use valuation::rank_undervalued;
