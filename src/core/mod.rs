mod aggregate;
mod engine;
mod error;
mod types;

pub use aggregate::aggregate_by_year;
pub use engine::{evaluate_cell, run_simulation};
pub use error::SimError;
pub use types::{
    CellResult, DEFAULT_RATIO, GlobalParameters, ProfitabilityMatrix, SimulationResult,
    YearSummary,
};
