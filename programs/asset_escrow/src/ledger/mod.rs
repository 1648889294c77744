//! Custody ledger boundary for the host-side escrow engine.
//!
//! On-chain the Solana runtime plays this role through token-program CPIs.
//! Off-chain, [`EscrowEngine`](crate::engine::EscrowEngine) drives any type
//! implementing [`CustodyLedger`].

use anchor_lang::prelude::*;

use crate::{errors::EscrowError, state::Escrow};

mod memory;

pub use memory::MemoryLedger;

/// SPL Token account size
pub const TOKEN_ACCOUNT_SIZE: usize = 165;

/// Balance of one fungible asset held under an address
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenAccount {
    pub mint: Pubkey,
    /// Transfer and close authority
    pub owner: Pubkey,
    pub amount: u64,
}

pub trait CustodyLedger {
    fn token_account(&self, address: &Pubkey) -> Option<TokenAccount>;

    fn escrow(&self, address: &Pubkey) -> Option<Escrow>;

    fn lamports(&self, address: &Pubkey) -> u64;

    /// Rent-exempt minimum for an account of `space` bytes
    fn minimum_balance(&self, space: usize) -> u64;

    /// Allocate `escrow` at `address`. Fails with `DuplicateOffer` if occupied.
    fn create_escrow(&mut self, address: Pubkey, escrow: Escrow, payer: &Pubkey) -> Result<()>;

    fn close_escrow(&mut self, address: &Pubkey, rent_recipient: &Pubkey) -> Result<()>;

    fn create_token_account(
        &mut self,
        address: Pubkey,
        mint: &Pubkey,
        owner: &Pubkey,
        payer: &Pubkey,
    ) -> Result<()>;

    /// Close an empty token account, sending its rent to `rent_recipient`
    fn close_token_account(
        &mut self,
        address: &Pubkey,
        rent_recipient: &Pubkey,
        authority: &Pubkey,
    ) -> Result<()>;

    fn transfer(&mut self, from: &Pubkey, to: &Pubkey, amount: u64, authority: &Pubkey)
        -> Result<()>;

    fn balance(&self, account: &Pubkey) -> Result<u64> {
        self.token_account(account)
            .map(|account| account.amount)
            .ok_or_else(|| error!(EscrowError::LedgerFailure))
    }

    /// Run `f` as a single unit. Hosts that commit atomically on their own
    /// keep the default; others must discard every effect of a failed `f`.
    fn commit<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        f(self)
    }
}
