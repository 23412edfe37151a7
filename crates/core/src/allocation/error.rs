use std::fmt;

/// Malformed input. Raised before any computation and never corrected silently.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyTarget,
    EmptySymbol { field: &'static str },
    DuplicateSymbol { field: &'static str, symbol: String },
    WeightOutOfRange { symbol: String, weight: f64 },
    WeightSum { sum: f64 },
    InvalidAmount { amount: f64 },
    /// The amount is above the account's cash available for investment.
    ExceedsAvailableCash { amount: f64, available: f64 },
    /// No amount was given and the account does not report investable cash.
    AmountRequired,
    InvalidHolding { symbol: String, value: f64 },
    InvalidPrice { symbol: String, price: f64 },
    MissingPrices { symbols: Vec<String> },
}

impl ValidationError {
    /// Dotted path of the offending input field, e.g. `target_allocation.AAPL`.
    pub fn field(&self) -> String {
        match self {
            Self::EmptyTarget | Self::WeightSum { .. } => "target_allocation".to_string(),
            Self::EmptySymbol { field } | Self::DuplicateSymbol { field, .. } => {
                (*field).to_string()
            }
            Self::WeightOutOfRange { symbol, .. } => format!("target_allocation.{symbol}"),
            Self::InvalidAmount { .. }
            | Self::ExceedsAvailableCash { .. }
            | Self::AmountRequired => "investment_amount".to_string(),
            Self::InvalidHolding { symbol, .. } => format!("current_allocation.{symbol}"),
            Self::InvalidPrice { symbol, .. } => format!("current_prices.{symbol}"),
            Self::MissingPrices { symbols } => match symbols.as_slice() {
                [only] => format!("current_prices.{only}"),
                _ => "current_prices".to_string(),
            },
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTarget => write!(f, "target allocation must not be empty"),
            Self::EmptySymbol { field } => write!(f, "{field}: symbol must be non-empty"),
            Self::DuplicateSymbol { field, symbol } => {
                write!(f, "{field}: duplicate symbol {symbol}")
            }
            Self::WeightOutOfRange { symbol, weight } => {
                write!(f, "target weight for {symbol} must be within [0, 1] (got {weight})")
            }
            Self::WeightSum { sum } => write!(
                f,
                "target allocation must sum to 100% within 0.1% (got {:.4}%)",
                sum * 100.0
            ),
            Self::InvalidAmount { amount } => {
                write!(f, "investment amount must be a non-negative number (got {amount})")
            }
            Self::ExceedsAvailableCash { amount, available } => write!(
                f,
                "investment amount {amount} exceeds cash available for investment {available}"
            ),
            Self::AmountRequired => write!(
                f,
                "investment amount is required: the account reports no cash available for investment"
            ),
            Self::InvalidHolding { symbol, value } => write!(
                f,
                "current value for {symbol} must be a non-negative number (got {value})"
            ),
            Self::InvalidPrice { symbol, price } => {
                write!(f, "price for {symbol} must be a positive number (got {price})")
            }
            Self::MissingPrices { symbols } => {
                write!(f, "Missing current prices for: {}", symbols.join(", "))
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// A computed invariant did not hold. This is an engine defect, not bad input.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalConsistencyError {
    /// Planned spend exceeds the investment amount.
    NegativeUnusedCash {
        unused_cash: f64,
        total_investment_value: f64,
        investment_amount: f64,
    },
    UnpricedPlanEntry { symbol: String },
}

impl fmt::Display for InternalConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeUnusedCash {
                unused_cash,
                total_investment_value,
                investment_amount,
            } => write!(
                f,
                "internal consistency: planned spend {total_investment_value} exceeds investment amount {investment_amount} (unused cash {unused_cash})"
            ),
            Self::UnpricedPlanEntry { symbol } => {
                write!(f, "internal consistency: plan contains {symbol} without a price")
            }
        }
    }
}

impl std::error::Error for InternalConsistencyError {}

#[derive(Debug, Clone, PartialEq)]
pub enum AllocationError {
    Validation(ValidationError),
    InternalConsistency(InternalConsistencyError),
}

impl AllocationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InternalConsistency(_) => "internal_consistency",
        }
    }
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::InternalConsistency(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AllocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InternalConsistency(err) => Some(err),
        }
    }
}

impl From<ValidationError> for AllocationError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<InternalConsistencyError> for AllocationError {
    fn from(err: InternalConsistencyError) -> Self {
        Self::InternalConsistency(err)
    }
}
