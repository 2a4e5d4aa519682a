//! # Domain Invariants
//!
//! Acceptance and spending rules of the token protocol.

use std::collections::HashSet;

use super::entities::Token;
use super::errors::TokenLedgerError;
use super::value_objects::{CompressedKey, LockingScript, Outpoint};

/// Invariant: send amount never exceeds the balance.
///
/// Checked before any network call.
pub fn invariant_sufficient_balance(requested: u64, available: u64) -> Result<(), TokenLedgerError> {
    if requested > available {
        return Err(TokenLedgerError::InsufficientBalance {
            requested,
            available,
        });
    }
    Ok(())
}

/// Invariant: a token is accepted only if its owning key is the key this
/// holder derives for the claimed sender.
pub fn invariant_owning_key(
    outpoint: Outpoint,
    owning_key: &CompressedKey,
    expected: &CompressedKey,
) -> Result<(), TokenLedgerError> {
    if owning_key != expected {
        return Err(TokenLedgerError::NotMine(outpoint));
    }
    Ok(())
}

/// Invariant: a token is accepted only once the overlay indexes it.
pub fn invariant_indexed(outpoint: Outpoint, matches: usize) -> Result<(), TokenLedgerError> {
    if matches == 0 {
        return Err(TokenLedgerError::Unverified(outpoint));
    }
    Ok(())
}

/// Invariant: an outpoint is never held twice.
pub fn invariant_not_held(tokens: &[Token], outpoint: Outpoint) -> Result<(), TokenLedgerError> {
    if tokens.iter().any(|t| t.outpoint == outpoint) {
        return Err(TokenLedgerError::DuplicateToken(outpoint));
    }
    Ok(())
}

/// Invariant: a credited token never pushes the balance past `u64::MAX`.
pub fn invariant_balance_fits(
    balance: u64,
    outpoint: Outpoint,
    points: u64,
) -> Result<(), TokenLedgerError> {
    balance
        .checked_add(points)
        .map(|_| ())
        .ok_or(TokenLedgerError::BalanceOverflow(outpoint))
}

/// Invariant: outpoints in a token set are unique.
pub fn invariant_unique_outpoints(tokens: &[Token]) -> bool {
    let mut seen = HashSet::with_capacity(tokens.len());
    tokens.iter().all(|t| seen.insert(t.outpoint))
}

/// Invariant: every token's points equal what its script decodes to.
pub fn invariant_points_match_scripts<F>(tokens: &[Token], decode_points: F) -> bool
where
    F: Fn(&LockingScript) -> Result<u64, TokenLedgerError>,
{
    tokens
        .iter()
        .all(|t| matches!(decode_points(&t.locking_script), Ok(points) if points == t.points))
}

/// Change left after sending `points` out of `balance`, if any.
pub fn change_amount(balance: u64, points: u64) -> Option<u64> {
    balance.checked_sub(points).filter(|change| *change > 0)
}
