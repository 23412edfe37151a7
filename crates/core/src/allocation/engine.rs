use crate::allocation::error::ValidationError;
use crate::domain::allocation::{
    AllocationPlan, InvestmentAmount, PortfolioSnapshot, PriceTable, TargetAllocation,
};
use std::collections::BTreeMap;

// Relative slack absorbing binary rounding on exact multiples, e.g. 300.0 / 0.1 landing at
// 2999.9999999999995. Small enough that the overspend it can cause is below a cent.
const SHARE_EPSILON: f64 = 1e-12;

/// Whole shares to buy per target symbol so that new cash moves the portfolio toward `target`.
///
/// Cash goes only to underweight symbols, in proportion to their dollar gap against the
/// post-investment total, scaled down when the gaps exceed `amount`. Nothing is ever sold.
/// Each symbol's funded dollars are floored to whole shares independently; the fractional
/// remainder stays as unused cash and is not redistributed to other symbols.
pub fn compute_allocation(
    target: &TargetAllocation,
    amount: InvestmentAmount,
    current_portfolio: &PortfolioSnapshot,
    prices: &PriceTable,
) -> Result<AllocationPlan, ValidationError> {
    let missing: Vec<String> = target
        .symbols()
        .filter(|symbol| !prices.contains(symbol))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingPrices { symbols: missing });
    }

    let amount = amount.value();
    let future_total = current_portfolio.total_value() + amount;

    let gaps: BTreeMap<&str, f64> = target
        .iter()
        .map(|(symbol, weight)| {
            let desired = weight * future_total;
            let gap = (desired - current_portfolio.value_of(symbol)).max(0.0);
            (symbol, gap)
        })
        .collect();
    let total_gap: f64 = gaps.values().sum();

    let scale = if total_gap > 0.0 {
        (amount / total_gap).min(1.0)
    } else {
        0.0
    };

    let mut shares = BTreeMap::new();
    for (symbol, gap) in gaps {
        let count = match prices.get(symbol) {
            Some(price) if scale > 0.0 => whole_shares(gap * scale, price),
            _ => 0,
        };
        shares.insert(symbol.to_string(), count);
    }

    Ok(AllocationPlan::from_shares(shares))
}

fn whole_shares(dollars: f64, price: f64) -> u64 {
    let quotient = dollars / price;
    let raw = (quotient + quotient * SHARE_EPSILON).floor();
    if raw.is_finite() && raw > 0.0 {
        raw as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(pairs: &[(&str, f64)]) -> TargetAllocation {
        TargetAllocation::from_pairs(pairs.iter().copied()).unwrap()
    }

    fn snapshot(pairs: &[(&str, f64)]) -> PortfolioSnapshot {
        PortfolioSnapshot::new(pairs.iter().map(|(s, v)| (s.to_string(), *v)).collect()).unwrap()
    }

    fn prices(pairs: &[(&str, f64)]) -> PriceTable {
        PriceTable::new(pairs.iter().map(|(s, v)| (s.to_string(), *v)).collect()).unwrap()
    }

    fn amount(v: f64) -> InvestmentAmount {
        InvestmentAmount::new(v).unwrap()
    }

    #[test]
    fn fills_gaps_without_scaling_when_cash_covers_them() {
        let plan = compute_allocation(
            &target(&[("AAPL", 0.6), ("GOOGL", 0.4)]),
            amount(1000.0),
            &snapshot(&[("AAPL", 500.0), ("GOOGL", 500.0)]),
            &prices(&[("AAPL", 150.0), ("GOOGL", 200.0)]),
        )
        .unwrap();

        // gaps 400 / 100, both affordable; floor(400/150)=2, floor(100/200)=0
        assert_eq!(plan.shares("AAPL"), Some(2));
        assert_eq!(plan.shares("GOOGL"), Some(0));
        assert_eq!(plan.iter().count(), 2);
    }

    #[test]
    fn floors_each_symbol_independently() {
        let plan = compute_allocation(
            &target(&[("AAPL", 0.5), ("GOOGL", 0.5)]),
            amount(100.0),
            &PortfolioSnapshot::empty(),
            &prices(&[("AAPL", 100.0), ("GOOGL", 50.0)]),
        )
        .unwrap();

        assert_eq!(plan.shares("AAPL"), Some(0));
        assert_eq!(plan.shares("GOOGL"), Some(1));
    }

    #[test]
    fn scales_gaps_down_to_the_budget() {
        // T = 2000; gaps: AAPL 1400 - 100 = 1300, GOOGL 600 - 900 -> 0
        // Budget covers the whole gap only partially: 1000 / 1300.
        let plan = compute_allocation(
            &target(&[("AAPL", 0.7), ("GOOGL", 0.3)]),
            amount(1000.0),
            &snapshot(&[("AAPL", 100.0), ("GOOGL", 900.0)]),
            &prices(&[("AAPL", 150.0), ("GOOGL", 200.0)]),
        )
        .unwrap();

        assert_eq!(plan.shares("AAPL"), Some(6));
        assert_eq!(plan.shares("GOOGL"), Some(0));
    }

    #[test]
    fn proportional_split_on_empty_portfolio() {
        let plan = compute_allocation(
            &target(&[("AAPL", 0.6), ("GOOGL", 0.4)]),
            amount(1000.0),
            &PortfolioSnapshot::empty(),
            &prices(&[("AAPL", 150.0), ("GOOGL", 200.0)]),
        )
        .unwrap();

        assert_eq!(plan.shares("AAPL"), Some(4));
        assert_eq!(plan.shares("GOOGL"), Some(2));
    }

    #[test]
    fn exact_multiples_are_not_lost_to_rounding() {
        let plan = compute_allocation(
            &target(&[("A", 0.1), ("B", 0.2), ("C", 0.7)]),
            amount(3000.0),
            &PortfolioSnapshot::empty(),
            &prices(&[("A", 0.1), ("B", 0.2), ("C", 0.7)]),
        )
        .unwrap();

        assert_eq!(plan.shares("A"), Some(3000));
        assert_eq!(plan.shares("B"), Some(3000));
        assert_eq!(plan.shares("C"), Some(3000));
    }

    #[test]
    fn zero_amount_buys_nothing() {
        let plan = compute_allocation(
            &target(&[("AAPL", 0.6), ("GOOGL", 0.4)]),
            amount(0.0),
            &snapshot(&[("AAPL", 100.0), ("GOOGL", 900.0)]),
            &prices(&[("AAPL", 150.0), ("GOOGL", 200.0)]),
        )
        .unwrap();

        assert_eq!(plan.total_shares(), 0);
        assert_eq!(plan.iter().count(), 2);
    }

    #[test]
    fn never_buys_symbols_already_above_target() {
        // Holdings outside the target still count toward the total value.
        let plan = compute_allocation(
            &target(&[("AAPL", 0.5), ("GOOGL", 0.5)]),
            amount(100.0),
            &snapshot(&[("AAPL", 5000.0), ("GOOGL", 100.0), ("VTI", 4000.0)]),
            &prices(&[("AAPL", 10.0), ("GOOGL", 10.0)]),
        )
        .unwrap();

        assert_eq!(plan.shares("AAPL"), Some(0));
        assert_eq!(plan.shares("GOOGL"), Some(10));
    }

    #[test]
    fn rejects_target_symbols_without_prices() {
        let err = compute_allocation(
            &target(&[("AAPL", 0.5), ("GOOGL", 0.3), ("MSFT", 0.2)]),
            amount(1000.0),
            &PortfolioSnapshot::empty(),
            &prices(&[("AAPL", 150.0)]),
        )
        .unwrap_err();

        assert_eq!(
            err,
            ValidationError::MissingPrices {
                symbols: vec!["GOOGL".to_string(), "MSFT".to_string()]
            }
        );
    }

    #[test]
    fn identical_inputs_give_identical_plans() {
        let t = target(&[("AAPL", 0.25), ("GOOGL", 0.25), ("MSFT", 0.5)]);
        let s = snapshot(&[("AAPL", 1234.5), ("MSFT", 10.0)]);
        let p = prices(&[("AAPL", 187.3), ("GOOGL", 141.9), ("MSFT", 402.2)]);

        let first = compute_allocation(&t, amount(5321.0), &s, &p).unwrap();
        let second = compute_allocation(&t, amount(5321.0), &s, &p).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn spend_stays_within_budget_across_inputs() {
        let p = prices(&[("A", 13.37), ("B", 0.99), ("C", 250.0), ("D", 71.5)]);
        let t = target(&[("A", 0.1), ("B", 0.2), ("C", 0.3), ("D", 0.4)]);
        let holdings = [
            snapshot(&[]),
            snapshot(&[("A", 9000.0)]),
            snapshot(&[("B", 12.0), ("C", 780.0), ("Z", 55.0)]),
            snapshot(&[("A", 100.0), ("B", 200.0), ("C", 300.0), ("D", 400.0)]),
        ];

        for current in &holdings {
            for cash in [0.0, 0.5, 10.0, 99.99, 1000.0, 123_456.78] {
                let plan = compute_allocation(&t, amount(cash), current, &p).unwrap();
                let spend: f64 = plan
                    .iter()
                    .map(|(s, n)| n as f64 * p.get(s).unwrap())
                    .sum();
                assert!(spend <= cash + 1e-6, "spent {spend} of {cash}");
            }
        }
    }
}
