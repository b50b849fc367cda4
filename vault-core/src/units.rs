//! Exact conversion between decimal ether strings and wei.

use crate::errors::{WalletError, WalletResult};

pub const ETHER_DECIMALS: usize = 18;
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// `"1.5"` -> `1_500_000_000_000_000_000`. Rejects signs, exponents and more
/// than 18 fractional digits instead of rounding.
pub fn parse_ether(amount: &str) -> WalletResult<u128> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(WalletError::InvalidAmount(
            "Amount cannot be empty".to_string(),
        ));
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(WalletError::InvalidAmount(
            "Amount has no digits".to_string(),
        ));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(WalletError::InvalidAmount(format!(
            "'{}' is not a decimal number",
            amount
        )));
    }
    if fraction.len() > ETHER_DECIMALS {
        return Err(WalletError::InvalidAmount(format!(
            "At most {} fractional digits are supported",
            ETHER_DECIMALS
        )));
    }

    let too_large = || WalletError::InvalidAmount("Amount too large".to_string());

    let whole_wei = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| too_large())?
            .checked_mul(WEI_PER_ETHER)
            .ok_or_else(too_large)?
    };

    let fraction_wei = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", fraction, width = ETHER_DECIMALS);
        padded.parse::<u128>().map_err(|_| too_large())?
    };

    whole_wei.checked_add(fraction_wei).ok_or_else(too_large)
}

/// `1_500_000_000_000_000_000` -> `"1.5"`; whole amounts keep one `.0`.
pub fn format_ether(wei: u128) -> String {
    let whole = wei / WEI_PER_ETHER;
    let fraction = wei % WEI_PER_ETHER;
    if fraction == 0 {
        return format!("{}.0", whole);
    }

    let digits = format!("{:0>width$}", fraction, width = ETHER_DECIMALS);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_amounts() {
        assert_eq!(parse_ether("1").unwrap(), WEI_PER_ETHER);
        assert_eq!(parse_ether("1.5").unwrap(), 1_500_000_000_000_000_000);
        assert_eq!(parse_ether("0.000000000000000001").unwrap(), 1);
        assert_eq!(parse_ether(".25").unwrap(), 250_000_000_000_000_000);
        assert_eq!(parse_ether(" 2. ").unwrap(), 2 * WEI_PER_ETHER);
        assert_eq!(parse_ether("0").unwrap(), 0);
    }

    #[test]
    fn rejects_malformed_amounts() {
        for input in ["", ".", "-1", "1e18", "1.2.3", "abc", "0.0000000000000000001"] {
            assert!(
                matches!(parse_ether(input), Err(WalletError::InvalidAmount(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overflow() {
        let huge = format!("{}", u128::MAX);
        assert!(matches!(
            parse_ether(&huge),
            Err(WalletError::InvalidAmount(_))
        ));
    }

    #[test]
    fn formats_wei() {
        assert_eq!(format_ether(0), "0.0");
        assert_eq!(format_ether(WEI_PER_ETHER), "1.0");
        assert_eq!(format_ether(1_500_000_000_000_000_000), "1.5");
        assert_eq!(format_ether(1), "0.000000000000000001");
        assert_eq!(format_ether(parse_ether("123.456").unwrap()), "123.456");
    }
}
