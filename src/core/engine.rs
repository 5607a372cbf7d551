use tracing::debug;

use super::aggregate::aggregate_by_year;
use super::error::SimError;
use super::types::{CellResult, GlobalParameters, ProfitabilityMatrix, SimulationResult};

const MONEY_DECIMALS: i32 = 2;
const FACTOR_DECIMALS: i32 = 3;

pub fn run_simulation(
    params: &GlobalParameters,
    matrix: &ProfitabilityMatrix,
) -> Result<SimulationResult, SimError> {
    params.validate()?;
    if matrix.agent_count() != params.agent_count || matrix.year_count() != params.year_count {
        return Err(SimError::invalid(
            "profitability",
            format!(
                "matrix is {} x {} but parameters declare {} agents x {} years",
                matrix.agent_count(),
                matrix.year_count(),
                params.agent_count,
                params.year_count
            ),
        ));
    }

    let cells: Vec<CellResult> = matrix
        .cells()
        .map(|(agent_id, year, ratio)| evaluate_cell(agent_id, year, ratio, params))
        .collect();
    let year_summaries = aggregate_by_year(&cells);

    debug!(
        matrix_version = matrix.version(),
        cells = cells.len(),
        years = year_summaries.len(),
        "recomputed AGA simulation"
    );

    Ok(SimulationResult {
        matrix_version: matrix.version(),
        cells,
        year_summaries,
    })
}

// Each output is rounded on its own from un-rounded intermediates.
pub fn evaluate_cell(
    agent_id: u32,
    year: u32,
    ratio: f64,
    params: &GlobalParameters,
) -> CellResult {
    let foregone = params.gross_foregone_amount;
    let net_of_tax = 1.0 - params.corporate_tax_rate;

    let factor = grant_multiplier(ratio, params.profitability_threshold);
    let grant_value = foregone * factor;
    let grant_shares = if params.share_price > 0.0 {
        grant_value / params.share_price
    } else {
        0.0
    };
    // Straight-line over the vesting period, independently per cell, so grants
    // whose vesting windows overlap are each charged in full.
    let amortized_cost_per_year = grant_value / f64::from(params.vesting_years);

    let cash_saving_gross = foregone * (1.0 + params.employer_charge_rate_on_cash);
    let cash_saving_net_of_tax = cash_saving_gross * net_of_tax;

    // Falls due when the shares vest, but stays booked against the grant year.
    let future_charge_cost = grant_value * params.employer_charge_rate_on_grant;
    let future_charge_cost_net_of_tax = future_charge_cost * net_of_tax;

    CellResult {
        agent_id,
        year,
        ratio,
        factor: round_to(factor, FACTOR_DECIMALS),
        grant_value: round_money(grant_value),
        grant_shares: round_money(grant_shares),
        amortized_cost_per_year: round_money(amortized_cost_per_year),
        cash_saving_gross: round_money(cash_saving_gross),
        cash_saving_net_of_tax: round_money(cash_saving_net_of_tax),
        future_charge_cost: round_money(future_charge_cost),
        future_charge_cost_net_of_tax: round_money(future_charge_cost_net_of_tax),
    }
}

fn grant_multiplier(ratio: f64, threshold: f64) -> f64 {
    if ratio <= threshold { 1.0 } else { 1.0 + ratio }
}

fn round_money(value: f64) -> f64 {
    round_to(value, MONEY_DECIMALS)
}

// Half-to-even on the exact binary value. When scaling lands on a .5 only
// because the product was inexact, the product's residue decides the side.
fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    let scaled = value * scale;
    let residue = value.mul_add(scale, -scaled);
    let rounded = if (scaled - scaled.trunc()).abs() == 0.5 && residue != 0.0 {
        if residue > 0.0 {
            scaled.ceil()
        } else {
            scaled.floor()
        }
    } else {
        scaled.round_ties_even()
    };
    rounded / scale
}
