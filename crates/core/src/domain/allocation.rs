use crate::allocation::error::ValidationError;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Weights may deviate from 1.0 by at most this much.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

// Summing decimal weights lands just outside the bound, e.g. 0.5 + 0.499 - 1.0 = -0.0010000000000000009.
const WEIGHT_SUM_SLACK: f64 = 1e-9;

/// Canonical spelling of a ticker: trimmed and ASCII upper-cased.
///
/// Every symbol-keyed type stores keys in this form and looks them up the same way, so `aapl`
/// from a caller and `AAPL` from the brokerage name the same security.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn lookup_key(symbol: &str) -> Cow<'_, str> {
    let trimmed = symbol.trim();
    if trimmed.bytes().any(|b| b.is_ascii_lowercase()) {
        Cow::Owned(trimmed.to_ascii_uppercase())
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// Desired fraction of total portfolio value per security.
///
/// Symbols are normalized with [`normalize_symbol`], non-empty and unique; every weight lies in
/// `[0, 1]` and the weights sum to 1.0 within [`WEIGHT_SUM_TOLERANCE`]. Out-of-tolerance input
/// is rejected, never normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TargetAllocation {
    weights: BTreeMap<String, f64>,
}

impl TargetAllocation {
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self, ValidationError> {
        Self::from_pairs(weights)
    }

    /// Like [`TargetAllocation::new`] but rejects a symbol that appears twice.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let weights = collect_symbols("target_allocation", pairs)?;
        if weights.is_empty() {
            return Err(ValidationError::EmptyTarget);
        }

        for (symbol, &weight) in &weights {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ValidationError::WeightOutOfRange {
                    symbol: symbol.clone(),
                    weight,
                });
            }
        }

        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE + WEIGHT_SUM_SLACK {
            return Err(ValidationError::WeightSum { sum });
        }

        Ok(Self { weights })
    }

    pub fn weight(&self, symbol: &str) -> Option<f64> {
        self.weights.get(lookup_key(symbol).as_ref()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.weights.iter().map(|(s, w)| (s.as_str(), *w))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> + '_ {
        self.weights.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Current dollar value held per symbol. Absent symbols hold nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PortfolioSnapshot {
    values: BTreeMap<String, f64>,
}

impl PortfolioSnapshot {
    pub fn new(values: BTreeMap<String, f64>) -> Result<Self, ValidationError> {
        let values = collect_symbols("current_allocation", values)?;
        for (symbol, &value) in &values {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidHolding {
                    symbol: symbol.clone(),
                    value,
                });
            }
        }
        Ok(Self { values })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn value_of(&self, symbol: &str) -> f64 {
        self.values
            .get(lookup_key(symbol).as_ref())
            .copied()
            .unwrap_or(0.0)
    }

    pub fn total_value(&self) -> f64 {
        self.values.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Current price per share. Every entry is finite and strictly positive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PriceTable {
    prices: BTreeMap<String, f64>,
}

impl PriceTable {
    pub fn new(prices: BTreeMap<String, f64>) -> Result<Self, ValidationError> {
        let prices = collect_symbols("current_prices", prices)?;
        for (symbol, &price) in &prices {
            if !price.is_finite() || price <= 0.0 {
                return Err(ValidationError::InvalidPrice {
                    symbol: symbol.clone(),
                    price,
                });
            }
        }
        Ok(Self { prices })
    }

    /// `None` when the symbol is not priced; there is no zero sentinel.
    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.prices.get(lookup_key(symbol).as_ref()).copied()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.prices.contains_key(lookup_key(symbol).as_ref())
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// New cash to deploy in one calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct InvestmentAmount(f64);

impl InvestmentAmount {
    pub fn new(amount: f64) -> Result<Self, ValidationError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ValidationError::InvalidAmount { amount });
        }
        Ok(Self(amount))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

/// Whole shares to buy per target symbol. Zero-share symbols are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AllocationPlan {
    shares: BTreeMap<String, u64>,
}

impl AllocationPlan {
    pub(crate) fn from_shares(shares: BTreeMap<String, u64>) -> Self {
        Self { shares }
    }

    pub fn shares(&self, symbol: &str) -> Option<u64> {
        self.shares.get(lookup_key(symbol).as_ref()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.shares.iter().map(|(s, n)| (s.as_str(), *n))
    }

    /// Entries with at least one share.
    pub fn purchases(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.iter().filter(|(_, n)| *n > 0)
    }

    pub fn total_shares(&self) -> u64 {
        self.shares.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownEntry {
    pub shares: u64,
    pub price_per_share: f64,
    pub investment_value: f64,
    pub percentage_of_investment: f64,
}

/// Where a target symbol ends up once the plan is executed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedHolding {
    pub current_value: f64,
    pub purchased_value: f64,
    pub projected_value: f64,
    pub projected_weight: f64,
    pub target_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationReport {
    pub allocation_recommendations: AllocationPlan,
    pub allocation_breakdown: BTreeMap<String, BreakdownEntry>,
    pub total_investment_value: f64,
    pub unused_cash: f64,
    pub investment_amount: InvestmentAmount,
    pub target_allocation: TargetAllocation,
    pub current_allocation: PortfolioSnapshot,
    pub current_prices: PriceTable,
    pub projection: BTreeMap<String, ProjectedHolding>,
}

fn collect_symbols<I, S>(
    field: &'static str,
    pairs: I,
) -> Result<BTreeMap<String, f64>, ValidationError>
where
    I: IntoIterator<Item = (S, f64)>,
    S: AsRef<str>,
{
    let mut out = BTreeMap::new();
    for (symbol, value) in pairs {
        let symbol = normalize_symbol(symbol.as_ref());
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol { field });
        }
        if out.insert(symbol.clone(), value).is_some() {
            return Err(ValidationError::DuplicateSymbol { field, symbol });
        }
    }
    Ok(out)
}
