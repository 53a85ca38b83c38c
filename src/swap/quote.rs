use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::oracle::Rate;
use super::units::unit;
use crate::error::{QuestError, Result};

pub const MAX_BPS: u32 = 10_000;
/// Largest fee tier a uint24 can carry.
pub const MAX_FEE: u32 = 0x00ff_ffff;

/// One swap attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out_minimum: U256,
    pub fee: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Address>,
}

impl SwapRequest {
    pub fn validate(&self) -> Result<()> {
        if self.amount_in.is_zero() {
            return Err(QuestError::InvalidInput("amount must be positive".to_string()));
        }
        if self.token_in == self.token_out {
            return Err(QuestError::InvalidInput(
                "input and output token are the same".to_string(),
            ));
        }
        if self.fee > MAX_FEE {
            return Err(QuestError::InvalidInput(format!(
                "fee tier {} does not fit uint24",
                self.fee
            )));
        }
        Ok(())
    }

    pub fn key(&self) -> QuoteKey {
        QuoteKey {
            token_in: self.token_in,
            token_out: self.token_out,
            amount_in: self.amount_in,
        }
    }
}

/// The exact input tuple a quote was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuoteKey {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    pub minimum_amount_out: U256,
    pub slippage_bps: u32,
    pub price_impact_bps: u32,
    pub gas_estimate: u64,
    /// Router path, native input already replaced by its wrapped form
    pub path: Vec<Address>,
    pub quoted_at: DateTime<Utc>,
}

impl SwapQuote {
    pub fn key(&self) -> QuoteKey {
        QuoteKey {
            token_in: self.token_in,
            token_out: self.token_out,
            amount_in: self.amount_in,
        }
    }

    /// A quote only ever answers for the exact tuple it was computed from.
    pub fn is_valid_for(&self, key: &QuoteKey) -> bool {
        self.key() == *key
    }
}

/// `amount_in * rate`, rescaled from the input token's decimals to the output's.
pub fn compute_amount_out(
    amount_in: U256,
    rate: Rate,
    decimals_in: u8,
    decimals_out: u8,
) -> Result<U256> {
    let overflow = || QuestError::InvalidInput("amount too large to quote".to_string());

    let numerator = amount_in
        .checked_mul(rate.fixed())
        .and_then(|v| unit(decimals_out).and_then(|u| v.checked_mul(u)))
        .ok_or_else(overflow)?;
    let denominator = unit(Rate::DECIMALS)
        .zip(unit(decimals_in))
        .and_then(|(rate_unit, in_unit)| rate_unit.checked_mul(in_unit))
        .ok_or_else(overflow)?;
    Ok(numerator / denominator)
}

/// `amount_out * (1 - slippage_bps / 10000)`, rounded down.
pub fn minimum_amount_out(amount_out: U256, slippage_bps: u32) -> Result<U256> {
    if slippage_bps > MAX_BPS {
        return Err(QuestError::InvalidInput(format!(
            "slippage {} bps exceeds 100%",
            slippage_bps
        )));
    }
    let keep = U256::from(MAX_BPS - slippage_bps);
    let scaled = amount_out
        .checked_mul(keep)
        .ok_or_else(|| QuestError::InvalidInput("amount too large to quote".to_string()))?;
    Ok(scaled / U256::from(MAX_BPS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::units::parse_units;
    use proptest::prelude::*;

    #[test]
    fn test_scenario_one_eth_at_2000() {
        let amount_in = parse_units("1.0", 18).unwrap();
        let rate = Rate::parse("2000").unwrap();
        let amount_out = compute_amount_out(amount_in, rate, 18, 18).unwrap();
        assert_eq!(amount_out, parse_units("2000", 18).unwrap());
        assert_eq!(
            minimum_amount_out(amount_out, 300).unwrap(),
            parse_units("1940", 18).unwrap()
        );
    }

    #[test]
    fn test_decimal_rescaling() {
        // 2 WLD at 1.5 USDC each, USDC has 6 decimals
        let amount_out = compute_amount_out(
            parse_units("2", 18).unwrap(),
            Rate::parse("1.5").unwrap(),
            18,
            6,
        )
        .unwrap();
        assert_eq!(amount_out, U256::from(3_000_000u64));

        // and back: 3 USDC at 0.67 WLD each
        let amount_out = compute_amount_out(
            U256::from(3_000_000u64),
            Rate::parse("0.67").unwrap(),
            6,
            18,
        )
        .unwrap();
        assert_eq!(amount_out, parse_units("2.01", 18).unwrap());
    }

    #[test]
    fn test_slippage_bounds() {
        let amount = U256::from(1_000u64);
        assert_eq!(minimum_amount_out(amount, 0).unwrap(), amount);
        assert_eq!(minimum_amount_out(amount, MAX_BPS).unwrap(), U256::ZERO);
        assert!(minimum_amount_out(amount, MAX_BPS + 1).is_err());
    }

    #[test]
    fn test_overflow_is_invalid_input() {
        let err = compute_amount_out(U256::MAX, Rate::parse("2").unwrap(), 18, 18).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_out_of_range_decimals_are_refused() {
        let rate = Rate::parse("1").unwrap();
        assert!(compute_amount_out(U256::from(1u64), rate, 18, 80).is_err());
        assert!(compute_amount_out(U256::from(1u64), rate, 80, 18).is_err());
        assert!(compute_amount_out(U256::from(1u64), rate, 18, 77).is_ok());
    }

    #[test]
    fn test_request_validation() {
        let request = SwapRequest {
            token_in: Address::ZERO,
            token_out: Address::repeat_byte(1),
            amount_in: U256::from(1u64),
            amount_out_minimum: U256::ZERO,
            fee: 3000,
            recipient: None,
        };
        assert!(request.validate().is_ok());

        let mut bad = request.clone();
        bad.fee = MAX_FEE + 1;
        assert!(bad.validate().is_err());

        let mut bad = request.clone();
        bad.amount_in = U256::ZERO;
        assert!(bad.validate().is_err());

        let mut bad = request;
        bad.token_out = bad.token_in;
        assert!(bad.validate().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_minimum_never_exceeds_amount_out(
            amount_out in any::<u128>(),
            bps in 0u32..=MAX_BPS,
        ) {
            let amount_out = U256::from(amount_out);
            let minimum = minimum_amount_out(amount_out, bps).unwrap();
            prop_assert!(minimum <= amount_out);
        }

        #[test]
        fn prop_more_slippage_lowers_minimum(
            amount_out in any::<u128>(),
            low in 0u32..MAX_BPS,
            step in 1u32..=MAX_BPS,
        ) {
            let high = (low + step).min(MAX_BPS);
            prop_assume!(high > low);
            let amount_out = U256::from(amount_out);
            let at_low = minimum_amount_out(amount_out, low).unwrap();
            let at_high = minimum_amount_out(amount_out, high).unwrap();

            prop_assert!(at_high <= at_low);
            // With at least one unit per basis point the decrease is strict
            if amount_out >= U256::from(MAX_BPS) {
                prop_assert!(at_high < at_low);
            }
        }
    }
}
