use anchor_lang::prelude::*;

#[error_code]
pub enum EscrowError {
    #[msg("Invalid amount: amount must be greater than zero")]
    InvalidAmount,
    #[msg("Insufficient funds: balance is lower than the required amount")]
    InsufficientFunds,
    #[msg("Duplicate offer: an escrow already exists for this maker and seed")]
    DuplicateOffer,
    #[msg("Not found: no open escrow at this address")]
    NotFound,
    #[msg("Unauthorized: signer does not match escrow maker")]
    Unauthorized,
    #[msg("Asset mismatch: mint does not match escrow terms")]
    AssetMismatch,
    #[msg("Arithmetic overflow")]
    ArithmeticOverflow,
    #[msg("Ledger failure")]
    LedgerFailure,
}
