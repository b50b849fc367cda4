use std::str::FromStr;

use alloy_primitives::Address;
use regex::Regex;

use crate::errors::{WalletError, WalletResult};
use crate::units;

const MAX_INPUT_LEN: usize = 1000;
const MAX_PASSWORD_CHARS: usize = 256;

/// Input validation utilities for the wallet
pub struct InputValidator {
    address_pattern: Regex,
    amount_pattern: Regex,
}

impl InputValidator {
    pub fn new() -> WalletResult<Self> {
        let address_pattern = Regex::new(r"^0x[a-fA-F0-9]{40}$")
            .map_err(|e| WalletError::ValidationError(format!("Invalid address regex: {}", e)))?;

        let amount_pattern = Regex::new(r"^\d*(\.\d{0,18})?$")
            .map_err(|e| WalletError::ValidationError(format!("Invalid amount regex: {}", e)))?;

        Ok(InputValidator {
            address_pattern,
            amount_pattern,
        })
    }

    /// Validate an EVM address. Mixed-case input must carry a valid EIP-55
    /// checksum; all-lower or all-upper input is accepted as-is.
    pub fn validate_address(&self, address: &str) -> WalletResult<()> {
        self.parse_address(address).map(|_| ())
    }

    pub fn parse_address(&self, address: &str) -> WalletResult<Address> {
        check_length(address)?;

        if address.is_empty() {
            return Err(WalletError::ValidationError(
                "Address cannot be empty".to_string(),
            ));
        }

        if !self.address_pattern.is_match(address) {
            return Err(WalletError::InvalidAddress(
                "Address format is invalid".to_string(),
            ));
        }

        let parsed = Address::from_str(address)
            .map_err(|e| WalletError::InvalidAddress(format!("Unparseable address: {}", e)))?;

        let body = &address[2..];
        let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && parsed.to_checksum(None) != address {
            return Err(WalletError::InvalidAddress(
                "Address checksum mismatch".to_string(),
            ));
        }

        Ok(parsed)
    }

    /// Validate a decimal ether amount; it must be strictly positive.
    pub fn validate_amount(&self, amount: &str) -> WalletResult<()> {
        self.parse_amount(amount).map(|_| ())
    }

    /// Amount in wei.
    pub fn parse_amount(&self, amount: &str) -> WalletResult<u128> {
        check_length(amount)?;

        if amount.is_empty() {
            return Err(WalletError::ValidationError(
                "Amount cannot be empty".to_string(),
            ));
        }

        if !self.amount_pattern.is_match(amount) {
            return Err(WalletError::InvalidAmount(
                "Amount format is invalid".to_string(),
            ));
        }

        let wei = units::parse_ether(amount)?;
        if wei == 0 {
            return Err(WalletError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        Ok(wei)
    }

    /// Non-empty, at most 256 characters, no control characters.
    pub fn validate_password(&self, password: &str) -> WalletResult<()> {
        if password.is_empty() {
            return Err(WalletError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }

        if password.chars().count() > MAX_PASSWORD_CHARS {
            return Err(WalletError::ValidationError(
                "Password too long".to_string(),
            ));
        }

        if password.chars().any(char::is_control) {
            return Err(WalletError::ValidationError(
                "Password contains control characters".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_length(input: &str) -> WalletResult<()> {
    if input.len() > MAX_INPUT_LEN {
        return Err(WalletError::ValidationError("Input too long".to_string()));
    }
    Ok(())
}
