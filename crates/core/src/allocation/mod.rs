pub mod engine;
pub mod error;
pub mod report;

pub use engine::compute_allocation;
pub use error::{AllocationError, InternalConsistencyError, ValidationError};
pub use report::build_report;

use crate::domain::allocation::{
    AllocationReport, InvestmentAmount, PortfolioSnapshot, PriceTable, TargetAllocation,
};
use crate::domain::contract::{AllocationRequest, ValidatedAllocationRequest};

/// Plan then report, for already validated inputs.
pub fn allocate(
    target: &TargetAllocation,
    amount: InvestmentAmount,
    current_portfolio: &PortfolioSnapshot,
    prices: &PriceTable,
) -> Result<AllocationReport, AllocationError> {
    let plan = compute_allocation(target, amount, current_portfolio, prices)?;
    let report = build_report(&plan, prices, amount, target, current_portfolio)?;

    tracing::debug!(
        symbols = target.len(),
        shares = plan.total_shares(),
        investment_amount = amount.value(),
        total_investment_value = report.total_investment_value,
        unused_cash = report.unused_cash,
        "allocation computed"
    );

    Ok(report)
}

/// Validate a raw request, then plan and report.
pub fn allocate_request(request: AllocationRequest) -> Result<AllocationReport, AllocationError> {
    let ValidatedAllocationRequest {
        target,
        amount,
        current_portfolio,
        prices,
    } = request.validate()?;
    allocate(&target, amount, &current_portfolio, &prices)
}
