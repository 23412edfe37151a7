use crate::allocation::error::ValidationError;
use crate::domain::allocation::{InvestmentAmount, PortfolioSnapshot, PriceTable, TargetAllocation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw allocation request as it arrives over the wire or from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub target_allocation: BTreeMap<String, f64>,
    pub investment_amount: f64,
    #[serde(default)]
    pub current_allocation: BTreeMap<String, f64>,
    pub current_prices: BTreeMap<String, f64>,
}

/// Raw request for a brokerage-backed calculation; holdings and prices are fetched. Without
/// an amount the account's investable cash is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountAllocationRequest {
    pub target_allocation: BTreeMap<String, f64>,
    #[serde(default)]
    pub investment_amount: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ValidatedAllocationRequest {
    pub target: TargetAllocation,
    pub amount: InvestmentAmount,
    pub current_portfolio: PortfolioSnapshot,
    pub prices: PriceTable,
}

impl AllocationRequest {
    pub fn validate(self) -> Result<ValidatedAllocationRequest, ValidationError> {
        let target = TargetAllocation::new(self.target_allocation)?;
        let amount = InvestmentAmount::new(self.investment_amount)?;
        let current_portfolio = PortfolioSnapshot::new(self.current_allocation)?;
        let prices = PriceTable::new(self.current_prices)?;

        Ok(ValidatedAllocationRequest {
            target,
            amount,
            current_portfolio,
            prices,
        })
    }
}

impl AccountAllocationRequest {
    pub fn validate(
        self,
    ) -> Result<(TargetAllocation, Option<InvestmentAmount>), ValidationError> {
        let target = TargetAllocation::new(self.target_allocation)?;
        let amount = self.investment_amount.map(InvestmentAmount::new).transpose()?;
        Ok((target, amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_request_without_current_allocation() {
        let v = json!({
            "target_allocation": {"AAPL": 0.5, "GOOGL": 0.5},
            "investment_amount": 100.0,
            "current_prices": {"AAPL": 100.0, "GOOGL": 50.0}
        });

        let req: AllocationRequest = serde_json::from_value(v).unwrap();
        let validated = req.validate().unwrap();
        assert!(validated.current_portfolio.is_empty());
        assert_eq!(validated.amount.value(), 100.0);
        assert_eq!(validated.target.len(), 2);
    }

    #[test]
    fn validation_names_the_failing_field() {
        let v = json!({
            "target_allocation": {"AAPL": 0.6, "GOOGL": 0.4},
            "investment_amount": -5.0,
            "current_prices": {"AAPL": 150.0, "GOOGL": 200.0}
        });
        let req: AllocationRequest = serde_json::from_value(v).unwrap();
        assert_eq!(req.validate().unwrap_err().field(), "investment_amount");

        let v = json!({
            "target_allocation": {"AAPL": 0.6, "GOOGL": 0.4},
            "investment_amount": 1000.0,
            "current_allocation": {"AAPL": 500.0},
            "current_prices": {"AAPL": 150.0, "GOOGL": -1.0}
        });
        let req: AllocationRequest = serde_json::from_value(v).unwrap();
        assert_eq!(req.validate().unwrap_err().field(), "current_prices.GOOGL");
    }

    #[test]
    fn account_request_amount_is_optional() {
        let req: AccountAllocationRequest =
            serde_json::from_value(json!({"target_allocation": {"aapl": 1.0}})).unwrap();
        let (target, amount) = req.validate().unwrap();
        assert_eq!(target.weight("AAPL"), Some(1.0));
        assert_eq!(amount, None);

        let req: AccountAllocationRequest = serde_json::from_value(json!({
            "target_allocation": {"AAPL": 1.0},
            "investment_amount": -1.0
        }))
        .unwrap();
        assert_eq!(req.validate().unwrap_err().field(), "investment_amount");
    }

    #[test]
    fn rejects_non_numeric_weights_via_deserialize() {
        let v = json!({
            "target_allocation": {"AAPL": "0.6"},
            "investment_amount": 1000.0,
            "current_prices": {"AAPL": 150.0}
        });
        assert!(serde_json::from_value::<AllocationRequest>(v).is_err());
    }
}
