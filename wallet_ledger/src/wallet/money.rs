//! Fixed-point money helpers matching the `NUMERIC(15,2)` storage columns.

use super::{
    errors::{LedgerError, LedgerResult},
    models::UserId,
};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Fractional digits kept for every amount and balance
pub const MONEY_SCALE: u32 = 2;

/// Largest value a `NUMERIC(15,2)` column can hold
pub const MAX_BALANCE: Decimal = Decimal::from_parts(2_764_472_319, 232_830, 0, false, 2);

/// Validate a caller-supplied amount and normalize it to scale 2.
///
/// # Errors
///
/// * `LedgerError::InvalidAmount` - zero, negative, more than two fractional
///   digits, or larger than [`MAX_BALANCE`]
pub fn validate_amount(amount: Decimal) -> LedgerResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "{amount} (must be positive)"
        )));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(LedgerError::InvalidAmount(format!(
            "{amount} (at most {MONEY_SCALE} decimal places)"
        )));
    }
    if amount > MAX_BALANCE {
        return Err(LedgerError::InvalidAmount(format!(
            "{amount} (exceeds {MAX_BALANCE})"
        )));
    }

    let mut normalized = amount;
    normalized.rescale(MONEY_SCALE);
    Ok(normalized)
}

/// Parse textual input (e.g. from the command line) into a validated amount
pub fn parse_amount(input: &str) -> LedgerResult<Decimal> {
    let amount = Decimal::from_str(input.trim())
        .map_err(|_| LedgerError::InvalidAmount(format!("'{input}' is not a decimal amount")))?;
    validate_amount(amount)
}

/// Add `amount` to `balance`, refusing results the storage column can't hold
pub fn checked_credit(user_id: UserId, balance: Decimal, amount: Decimal) -> LedgerResult<Decimal> {
    balance
        .checked_add(amount)
        .filter(|sum| *sum <= MAX_BALANCE)
        .ok_or(LedgerError::BalanceOverflow(user_id))
}
