use anyhow::{Context, Result};
use portfolio_insight_core::domain::allocation::TargetAllocation;

/// Parses `SYM=WEIGHT[,SYM=WEIGHT...]`. A weight is a fraction (`0.6`) or a percentage (`60%`).
///
/// Weights are checked by `TargetAllocation`, never rescaled here.
pub fn parse_target(raw: &str) -> Result<TargetAllocation> {
    let mut pairs = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (symbol, weight) = part
            .split_once('=')
            .with_context(|| format!("target entry {part:?} must look like SYM=WEIGHT"))?;
        pairs.push((symbol.trim().to_string(), parse_weight(weight.trim())?));
    }
    anyhow::ensure!(!pairs.is_empty(), "target allocation must not be empty");

    Ok(TargetAllocation::from_pairs(pairs)?)
}

fn parse_weight(raw: &str) -> Result<f64> {
    match raw.strip_suffix('%') {
        Some(pct) => {
            let pct = pct
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid percentage {raw:?}"))?;
            Ok(pct / 100.0)
        }
        None => raw
            .parse::<f64>()
            .with_context(|| format!("invalid weight {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_insight_core::allocation::ValidationError;

    #[test]
    fn parses_fractions_and_percentages() {
        let target = parse_target("AAPL=0.6, GOOGL=40%").unwrap();
        assert_eq!(target.weight("AAPL"), Some(0.6));
        assert_eq!(target.weight("GOOGL"), Some(0.4));
    }

    #[test]
    fn rejects_duplicates() {
        let err = parse_target("AAPL=0.5,AAPL=0.5").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::DuplicateSymbol { .. })
        ));
    }

    #[test]
    fn rejects_weights_that_do_not_sum_to_one() {
        let err = parse_target("AAPL=0.5,GOOGL=0.6").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::WeightSum { .. })
        ));
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(parse_target("").is_err());
        assert!(parse_target("AAPL").is_err());
        assert!(parse_target("AAPL=abc").is_err());
        assert!(parse_target("AAPL=x%").is_err());
    }
}
