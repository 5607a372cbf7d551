use serde::Serialize;

use super::error::SimError;

pub const DEFAULT_RATIO: f64 = 0.35;
pub const MAX_CELLS: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalParameters {
    pub agent_count: u32,
    pub year_count: u32,
    pub gross_foregone_amount: f64,
    pub profitability_threshold: f64,
    pub share_price: f64,
    pub employer_charge_rate_on_cash: f64,
    pub employer_charge_rate_on_grant: f64,
    pub corporate_tax_rate: f64,
    // Range checked only; no formula reads it.
    pub personal_tax_rate: f64,
    pub vesting_years: u32,
}

impl Default for GlobalParameters {
    fn default() -> Self {
        Self {
            agent_count: 6,
            year_count: 5,
            gross_foregone_amount: 100_000.0,
            profitability_threshold: 0.3,
            share_price: 10.0,
            employer_charge_rate_on_cash: 0.40,
            employer_charge_rate_on_grant: 0.30,
            corporate_tax_rate: 0.25,
            personal_tax_rate: 0.45,
            vesting_years: 2,
        }
    }
}

impl GlobalParameters {
    pub fn validate(&self) -> Result<(), SimError> {
        for (name, value) in [
            ("agent_count", self.agent_count),
            ("year_count", self.year_count),
            ("vesting_years", self.vesting_years),
        ] {
            if value == 0 {
                return Err(SimError::invalid(name, "must be > 0"));
            }
        }
        check_cell_count(self.agent_count, self.year_count)?;

        for (name, value) in [
            ("gross_foregone_amount", self.gross_foregone_amount),
            ("share_price", self.share_price),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::invalid(
                    name,
                    format!("must be a finite amount >= 0, got {value}"),
                ));
            }
        }

        for (name, value) in [
            ("profitability_threshold", self.profitability_threshold),
            (
                "employer_charge_rate_on_cash",
                self.employer_charge_rate_on_cash,
            ),
            (
                "employer_charge_rate_on_grant",
                self.employer_charge_rate_on_grant,
            ),
            ("corporate_tax_rate", self.corporate_tax_rate),
            ("personal_tax_rate", self.personal_tax_rate),
        ] {
            check_fraction(name, value)?;
        }

        Ok(())
    }
}

fn check_cell_count(agent_count: u32, year_count: u32) -> Result<(), SimError> {
    let cells = u64::from(agent_count) * u64::from(year_count);
    if cells > MAX_CELLS {
        return Err(SimError::invalid(
            "grid",
            format!(
                "{agent_count} agents x {year_count} years is {cells} cells, limit is {MAX_CELLS}"
            ),
        ));
    }
    Ok(())
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), SimError> {
    // NaN fails the range check as well.
    if !(0.0..=1.0).contains(&value) {
        return Err(SimError::invalid(
            name,
            format!("must be between 0 and 1, got {value}"),
        ));
    }
    Ok(())
}

// Row-major by agent, 1-based ids. Every successful edit bumps `version`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitabilityMatrix {
    agent_count: u32,
    year_count: u32,
    ratios: Vec<f64>,
    version: u64,
}

impl ProfitabilityMatrix {
    pub fn filled(agent_count: u32, year_count: u32, ratio: f64) -> Result<Self, SimError> {
        if agent_count == 0 {
            return Err(SimError::invalid("agent_count", "must be > 0"));
        }
        if year_count == 0 {
            return Err(SimError::invalid("year_count", "must be > 0"));
        }
        check_cell_count(agent_count, year_count)?;
        check_fraction("ratio", ratio)?;

        Ok(Self {
            agent_count,
            year_count,
            ratios: vec![ratio; agent_count as usize * year_count as usize],
            version: 0,
        })
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, SimError> {
        let year_count = rows.first().map_or(0, Vec::len);
        if rows.is_empty() || year_count == 0 {
            return Err(SimError::invalid(
                "profitability",
                "needs at least one agent row with at least one year",
            ));
        }
        if let Some(idx) = rows.iter().position(|row| row.len() != year_count) {
            return Err(SimError::invalid(
                "profitability",
                format!(
                    "row for agent {} has {} years, expected {year_count}",
                    idx + 1,
                    rows[idx].len()
                ),
            ));
        }

        let agent_count = u32::try_from(rows.len()).unwrap_or(u32::MAX);
        let year_count = u32::try_from(year_count).unwrap_or(u32::MAX);
        check_cell_count(agent_count, year_count)?;

        let ratios: Vec<f64> = rows.iter().flatten().copied().collect();
        for ratio in &ratios {
            check_fraction("ratio", *ratio)?;
        }

        Ok(Self {
            agent_count,
            year_count,
            ratios,
            version: 0,
        })
    }

    pub fn agent_count(&self) -> u32 {
        self.agent_count
    }

    pub fn year_count(&self) -> u32 {
        self.year_count
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, agent_id: u32, year: u32) -> Result<f64, SimError> {
        let idx = self.index(agent_id, year)?;
        Ok(self.ratios[idx])
    }

    pub fn set(&mut self, agent_id: u32, year: u32, ratio: f64) -> Result<(), SimError> {
        let idx = self.index(agent_id, year)?;
        check_fraction("ratio", ratio)?;
        self.ratios[idx] = ratio;
        self.version += 1;
        Ok(())
    }

    pub fn cells(&self) -> impl Iterator<Item = (u32, u32, f64)> + '_ {
        let year_count = self.year_count as usize;
        self.ratios.iter().enumerate().map(move |(idx, ratio)| {
            (
                (idx / year_count) as u32 + 1,
                (idx % year_count) as u32 + 1,
                *ratio,
            )
        })
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.ratios
            .chunks(self.year_count as usize)
            .map(<[f64]>::to_vec)
            .collect()
    }

    fn index(&self, agent_id: u32, year: u32) -> Result<usize, SimError> {
        if !(1..=self.agent_count).contains(&agent_id) || !(1..=self.year_count).contains(&year) {
            return Err(SimError::OutOfRange {
                agent_id,
                year,
                agent_count: self.agent_count,
                year_count: self.year_count,
            });
        }
        Ok((agent_id - 1) as usize * self.year_count as usize + (year - 1) as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellResult {
    pub agent_id: u32,
    pub year: u32,
    pub ratio: f64,
    pub factor: f64,
    pub grant_value: f64,
    pub grant_shares: f64,
    pub amortized_cost_per_year: f64,
    pub cash_saving_gross: f64,
    pub cash_saving_net_of_tax: f64,
    pub future_charge_cost: f64,
    pub future_charge_cost_net_of_tax: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    pub year: u32,
    pub grant_value: f64,
    pub grant_shares: f64,
    pub amortized_cost_per_year: f64,
    pub cash_saving_gross: f64,
    pub cash_saving_net_of_tax: f64,
    pub future_charge_cost: f64,
    pub future_charge_cost_net_of_tax: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub matrix_version: u64,
    pub cells: Vec<CellResult>,
    pub year_summaries: Vec<YearSummary>,
}
