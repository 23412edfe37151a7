use crate::allocation::error::InternalConsistencyError;
use crate::domain::allocation::{
    AllocationPlan, AllocationReport, BreakdownEntry, InvestmentAmount, PortfolioSnapshot,
    PriceTable, ProjectedHolding, TargetAllocation,
};
use std::collections::BTreeMap;

// Summing share costs can leave float dust on either side of zero.
const CASH_TOLERANCE: f64 = 1e-6;

/// Turns a plan into per-symbol costs and aggregate totals.
///
/// Trusts the plan; the only failures are violated invariants (spend above the amount, a
/// planned symbol with no price), which indicate an engine defect.
pub fn build_report(
    plan: &AllocationPlan,
    prices: &PriceTable,
    amount: InvestmentAmount,
    target: &TargetAllocation,
    current_portfolio: &PortfolioSnapshot,
) -> Result<AllocationReport, InternalConsistencyError> {
    let investment_amount = amount.value();

    let mut breakdown = BTreeMap::new();
    for (symbol, shares) in plan.purchases() {
        let price = prices
            .get(symbol)
            .ok_or_else(|| InternalConsistencyError::UnpricedPlanEntry {
                symbol: symbol.to_string(),
            })?;
        let investment_value = shares as f64 * price;
        let percentage_of_investment = if amount.is_zero() {
            0.0
        } else {
            investment_value / investment_amount * 100.0
        };

        breakdown.insert(
            symbol.to_string(),
            BreakdownEntry {
                shares,
                price_per_share: price,
                investment_value,
                percentage_of_investment,
            },
        );
    }

    let total_investment_value: f64 = breakdown.values().map(|e| e.investment_value).sum();
    let tolerance = CASH_TOLERANCE.max(investment_amount * 1e-12);

    let unused_cash = investment_amount - total_investment_value;
    if unused_cash < -tolerance {
        tracing::error!(
            unused_cash,
            total_investment_value,
            investment_amount,
            "allocation plan overspends the investment amount"
        );
        return Err(InternalConsistencyError::NegativeUnusedCash {
            unused_cash,
            total_investment_value,
            investment_amount,
        });
    }
    let unused_cash = unused_cash.max(0.0);

    let projection = project_holdings(&breakdown, target, current_portfolio, total_investment_value);

    Ok(AllocationReport {
        allocation_recommendations: plan.clone(),
        allocation_breakdown: breakdown,
        total_investment_value,
        unused_cash,
        investment_amount: amount,
        target_allocation: target.clone(),
        current_allocation: current_portfolio.clone(),
        current_prices: prices.clone(),
        projection,
    })
}

fn project_holdings(
    breakdown: &BTreeMap<String, BreakdownEntry>,
    target: &TargetAllocation,
    current_portfolio: &PortfolioSnapshot,
    total_investment_value: f64,
) -> BTreeMap<String, ProjectedHolding> {
    // Cash left unused is not part of the projected holdings.
    let projected_total = current_portfolio.total_value() + total_investment_value;

    target
        .iter()
        .map(|(symbol, target_weight)| {
            let current_value = current_portfolio.value_of(symbol);
            let purchased_value = breakdown
                .get(symbol)
                .map(|e| e.investment_value)
                .unwrap_or(0.0);
            let projected_value = current_value + purchased_value;
            let projected_weight = if projected_total > 0.0 {
                projected_value / projected_total
            } else {
                0.0
            };

            (
                symbol.to_string(),
                ProjectedHolding {
                    current_value,
                    purchased_value,
                    projected_value,
                    projected_weight,
                    target_weight,
                },
            )
        })
        .collect()
}
