//! Moving delivered funds from pending credit into project accounting.

use crate::backend::AccountingBackend;
use crate::errors::BridgeError;
use crate::state::TokenState;
use ferry_core::{types::short_hex, Balance, TokenId};
use tracing::{debug, error};

/// Takes `amount` out of the pending credit of a token.
pub fn take_pending(state: &mut TokenState, amount: Balance) -> Result<Balance, BridgeError> {
    let remaining = state
        .pending_credit
        .checked_sub(amount)
        .ok_or(BridgeError::InsufficientResource {
            resource: "pending credit",
            required: amount,
            available: state.pending_credit,
        })?;
    state.pending_credit = remaining;
    Ok(remaining)
}

/// Credits `amount` of `token` to accounting and checks that the project's surplus
/// grew by exactly that amount.
pub fn forward(accounting: &dyn AccountingBackend, token: &TokenId, amount: Balance) -> Result<(), BridgeError> {
    if amount == 0 {
        return Ok(());
    }

    let before = accounting.current_surplus(token);
    accounting.credit(token, amount)?;
    let after = accounting.current_surplus(token);

    let observed = after.saturating_sub(before);
    if observed != amount {
        error!(
            "Accounting for {} moved by {} after a credit of {}",
            short_hex(token),
            observed,
            amount
        );
        return Err(BridgeError::BalanceMismatch {
            token: *token,
            expected: amount,
            observed,
        });
    }

    debug!("Credited {} of {} to accounting", amount, short_hex(token));
    Ok(())
}
