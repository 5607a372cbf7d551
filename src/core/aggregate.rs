use std::collections::BTreeMap;

use super::types::{CellResult, YearSummary};

pub fn aggregate_by_year(cells: &[CellResult]) -> Vec<YearSummary> {
    let mut by_year: BTreeMap<u32, YearSummary> = BTreeMap::new();
    for cell in cells {
        let summary = by_year.entry(cell.year).or_insert_with(|| YearSummary {
            year: cell.year,
            ..YearSummary::default()
        });
        summary.add(cell);
    }
    by_year.into_values().collect()
}

impl YearSummary {
    fn add(&mut self, cell: &CellResult) {
        self.grant_value += cell.grant_value;
        self.grant_shares += cell.grant_shares;
        self.amortized_cost_per_year += cell.amortized_cost_per_year;
        self.cash_saving_gross += cell.cash_saving_gross;
        self.cash_saving_net_of_tax += cell.cash_saving_net_of_tax;
        self.future_charge_cost += cell.future_charge_cost;
        self.future_charge_cost_net_of_tax += cell.future_charge_cost_net_of_tax;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::{evaluate_cell, run_simulation};
    use crate::core::types::{GlobalParameters, ProfitabilityMatrix};
    use proptest::prelude::*;

    fn assert_close(actual: f64, expected: f64, label: &str) {
        assert!(
            (actual - expected).abs() <= 1e-6,
            "{label}: expected {expected}, got {actual}"
        );
    }

    #[test]
    fn empty_input_has_no_summaries() {
        assert!(aggregate_by_year(&[]).is_empty());
    }

    #[test]
    fn sums_each_column_per_year() {
        let params = GlobalParameters::default();
        let cells = vec![
            evaluate_cell(1, 1, 0.35, &params),
            evaluate_cell(2, 1, 0.10, &params),
            evaluate_cell(1, 2, 0.50, &params),
        ];

        let summaries = aggregate_by_year(&cells);
        assert_eq!(summaries.len(), 2);

        let year_one = &summaries[0];
        assert_eq!(year_one.year, 1);
        assert_close(year_one.grant_value, 235_000.0, "grant_value");
        assert_close(year_one.grant_shares, 23_500.0, "grant_shares");
        assert_close(year_one.amortized_cost_per_year, 117_500.0, "amortized");
        assert_close(year_one.cash_saving_gross, 280_000.0, "cash_saving_gross");
        assert_close(year_one.cash_saving_net_of_tax, 210_000.0, "cash_saving_net");
        assert_close(year_one.future_charge_cost, 70_500.0, "future_charge_cost");
        assert_close(
            year_one.future_charge_cost_net_of_tax,
            52_875.0,
            "future_charge_cost_net",
        );

        let year_two = &summaries[1];
        assert_eq!(year_two.year, 2);
        assert_close(year_two.grant_value, 150_000.0, "grant_value");
    }

    #[test]
    fn years_come_out_ascending_even_when_input_is_shuffled() {
        let params = GlobalParameters::default();
        let cells = vec![
            evaluate_cell(1, 3, 0.2, &params),
            evaluate_cell(2, 1, 0.2, &params),
            evaluate_cell(1, 2, 0.2, &params),
            evaluate_cell(2, 3, 0.2, &params),
        ];
        let years: Vec<u32> = aggregate_by_year(&cells).iter().map(|s| s.year).collect();
        assert_eq!(years, vec![1, 2, 3]);
    }

    #[test]
    fn a_missing_agent_still_yields_its_year() {
        let params = GlobalParameters::default();
        let cells = vec![evaluate_cell(4, 7, 0.2, &params)];
        let summaries = aggregate_by_year(&cells);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].year, 7);
        assert_close(summaries[0].grant_value, 100_000.0, "grant_value");
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_aggregation_conserves_totals_and_ignores_order(
            agent_count in 1u32..7,
            year_count in 1u32..7,
            ratios in proptest::collection::vec(0u32..=10_000, 36),
            rotate_by in 0usize..36,
        ) {
            let mut params = GlobalParameters::default();
            params.agent_count = agent_count;
            params.year_count = year_count;
            let mut matrix = ProfitabilityMatrix::filled(agent_count, year_count, 0.0)
                .expect("valid matrix");
            for agent_id in 1..=agent_count {
                for year in 1..=year_count {
                    let idx = ((agent_id - 1) * year_count + (year - 1)) as usize;
                    matrix
                        .set(agent_id, year, ratios[idx] as f64 / 10_000.0)
                        .expect("in range");
                }
            }

            let result = run_simulation(&params, &matrix).expect("valid simulation");
            prop_assert_eq!(result.year_summaries.len(), year_count as usize);

            let cell_total: f64 = result.cells.iter().map(|c| c.grant_value).sum();
            let summary_total: f64 = result.year_summaries.iter().map(|s| s.grant_value).sum();
            prop_assert!((cell_total - summary_total).abs() <= 1e-4);

            let mut shuffled = result.cells.clone();
            let len = shuffled.len();
            shuffled.rotate_left(rotate_by % len);
            let reordered = aggregate_by_year(&shuffled);
            prop_assert_eq!(reordered.len(), result.year_summaries.len());
            for (a, b) in reordered.iter().zip(result.year_summaries.iter()) {
                prop_assert_eq!(a.year, b.year);
                prop_assert!((a.grant_value - b.grant_value).abs() <= 1e-4);
                prop_assert!((a.future_charge_cost_net_of_tax - b.future_charge_cost_net_of_tax).abs() <= 1e-4);
            }
        }
    }
}
