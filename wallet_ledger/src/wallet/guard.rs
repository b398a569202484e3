//! Balance guard: pre-mutation checks run while the sender row is locked.

use super::{
    errors::{LedgerError, LedgerResult},
    models::UserId,
};
use rust_decimal::Decimal;

/// Reject a debit that would take `balance` below zero.
///
/// `amount` is expected to be validated already.
pub fn check_funds(user_id: UserId, balance: Decimal, amount: Decimal) -> LedgerResult<()> {
    if balance < amount {
        return Err(LedgerError::InsufficientFunds {
            user_id,
            available: balance,
            required: amount,
        });
    }
    Ok(())
}

/// Reject a transfer whose sender and receiver are the same user
pub fn check_distinct(sender_id: UserId, receiver_id: UserId) -> LedgerResult<()> {
    if sender_id == receiver_id {
        return Err(LedgerError::SelfTransfer(sender_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_exact_balance_is_sufficient() {
        assert!(check_funds(1, dec("60.00"), dec("60.00")).is_ok());
    }

    #[test]
    fn test_short_by_one_cent() {
        let err = check_funds(1, dec("59.99"), dec("60.00")).unwrap_err();
        match err {
            LedgerError::InsufficientFunds {
                user_id,
                available,
                required,
            } => {
                assert_eq!(user_id, 1);
                assert_eq!(available, dec("59.99"));
                assert_eq!(required, dec("60.00"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_self_transfer_rejected() {
        assert!(matches!(
            check_distinct(4, 4),
            Err(LedgerError::SelfTransfer(4))
        ));
        assert!(check_distinct(4, 5).is_ok());
    }
}
