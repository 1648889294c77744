use std::collections::HashMap;

use anchor_lang::prelude::*;
use anchor_spl::associated_token::get_associated_token_address;

use super::{CustodyLedger, TokenAccount, TOKEN_ACCOUNT_SIZE};
use crate::{errors::EscrowError, state::Escrow};

/// In-process ledger with the same custody rules as the SPL token program.
///
/// Mutations inside [`CustodyLedger::commit`] run against the live state and a
/// snapshot taken beforehand is restored if the closure fails, so a failed
/// operation leaves no trace.
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    rent: Rent,
    mints: HashMap<Pubkey, u8>,
    token_accounts: HashMap<Pubkey, TokenAccount>,
    escrows: HashMap<Pubkey, Escrow>,
    lamports: HashMap<Pubkey, u64>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn airdrop(&mut self, to: &Pubkey, lamports: u64) -> Result<()> {
        credit(&mut self.lamports, to, lamports)
    }

    pub fn create_mint(&mut self, mint: Pubkey, decimals: u8) -> Result<()> {
        require!(!self.mints.contains_key(&mint), EscrowError::LedgerFailure);
        self.mints.insert(mint, decimals);
        Ok(())
    }

    pub fn mint_decimals(&self, mint: &Pubkey) -> Option<u8> {
        self.mints.get(mint).copied()
    }

    /// Create the associated token account of `(owner, mint)`, or return it if
    /// it already exists
    pub fn create_associated_token_account(
        &mut self,
        owner: &Pubkey,
        mint: &Pubkey,
        payer: &Pubkey,
    ) -> Result<Pubkey> {
        let address = get_associated_token_address(owner, mint);
        if !self.token_accounts.contains_key(&address) {
            self.create_token_account(address, mint, owner, payer)?;
        }
        Ok(address)
    }

    /// Mint `amount` into the owner's associated token account, creating it
    /// rent-free if needed
    pub fn mint_to(&mut self, mint: &Pubkey, owner: &Pubkey, amount: u64) -> Result<Pubkey> {
        require!(self.mints.contains_key(mint), EscrowError::LedgerFailure);

        let address = get_associated_token_address(owner, mint);
        let account = self.token_accounts.entry(address).or_insert(TokenAccount {
            mint: *mint,
            owner: *owner,
            amount: 0,
        });
        require_keys_eq!(account.mint, *mint, EscrowError::AssetMismatch);
        account.amount = account
            .amount
            .checked_add(amount)
            .ok_or(EscrowError::ArithmeticOverflow)?;
        Ok(address)
    }

    fn pay_rent(&mut self, payer: &Pubkey, space: usize) -> Result<u64> {
        let rent = self.rent.minimum_balance(space);
        debit(&mut self.lamports, payer, rent)?;
        Ok(rent)
    }
}

impl CustodyLedger for MemoryLedger {
    fn token_account(&self, address: &Pubkey) -> Option<TokenAccount> {
        self.token_accounts.get(address).copied()
    }

    fn escrow(&self, address: &Pubkey) -> Option<Escrow> {
        self.escrows.get(address).cloned()
    }

    fn lamports(&self, address: &Pubkey) -> u64 {
        self.lamports.get(address).copied().unwrap_or(0)
    }

    fn minimum_balance(&self, space: usize) -> u64 {
        self.rent.minimum_balance(space)
    }

    fn create_escrow(&mut self, address: Pubkey, escrow: Escrow, payer: &Pubkey) -> Result<()> {
        require!(
            !self.escrows.contains_key(&address),
            EscrowError::DuplicateOffer
        );

        let rent = self.pay_rent(payer, Escrow::LEN)?;
        credit(&mut self.lamports, &address, rent)?;
        self.escrows.insert(address, escrow);
        Ok(())
    }

    fn close_escrow(&mut self, address: &Pubkey, rent_recipient: &Pubkey) -> Result<()> {
        self.escrows
            .remove(address)
            .ok_or(EscrowError::NotFound)?;

        let rent = self.lamports.remove(address).unwrap_or(0);
        credit(&mut self.lamports, rent_recipient, rent)
    }

    fn create_token_account(
        &mut self,
        address: Pubkey,
        mint: &Pubkey,
        owner: &Pubkey,
        payer: &Pubkey,
    ) -> Result<()> {
        require!(self.mints.contains_key(mint), EscrowError::LedgerFailure);
        require!(
            !self.token_accounts.contains_key(&address),
            EscrowError::LedgerFailure
        );

        let rent = self.pay_rent(payer, TOKEN_ACCOUNT_SIZE)?;
        credit(&mut self.lamports, &address, rent)?;
        self.token_accounts.insert(
            address,
            TokenAccount {
                mint: *mint,
                owner: *owner,
                amount: 0,
            },
        );
        Ok(())
    }

    fn close_token_account(
        &mut self,
        address: &Pubkey,
        rent_recipient: &Pubkey,
        authority: &Pubkey,
    ) -> Result<()> {
        let account = self
            .token_accounts
            .get(address)
            .ok_or(EscrowError::LedgerFailure)?;
        require_keys_eq!(account.owner, *authority, EscrowError::Unauthorized);
        // Non-empty token accounts cannot be closed
        require_eq!(account.amount, 0, EscrowError::LedgerFailure);

        self.token_accounts.remove(address);
        let rent = self.lamports.remove(address).unwrap_or(0);
        credit(&mut self.lamports, rent_recipient, rent)
    }

    fn transfer(
        &mut self,
        from: &Pubkey,
        to: &Pubkey,
        amount: u64,
        authority: &Pubkey,
    ) -> Result<()> {
        let source = self
            .token_accounts
            .get(from)
            .copied()
            .ok_or(EscrowError::LedgerFailure)?;
        let destination = self
            .token_accounts
            .get(to)
            .copied()
            .ok_or(EscrowError::LedgerFailure)?;

        require_keys_eq!(source.owner, *authority, EscrowError::Unauthorized);
        require_keys_eq!(source.mint, destination.mint, EscrowError::AssetMismatch);
        require_gte!(source.amount, amount, EscrowError::InsufficientFunds);

        if from == to {
            return Ok(());
        }
        let credited = destination
            .amount
            .checked_add(amount)
            .ok_or(EscrowError::ArithmeticOverflow)?;

        if let Some(account) = self.token_accounts.get_mut(from) {
            account.amount -= amount;
        }
        if let Some(account) = self.token_accounts.get_mut(to) {
            account.amount = credited;
        }
        Ok(())
    }

    fn commit<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }
}

fn credit(lamports: &mut HashMap<Pubkey, u64>, to: &Pubkey, amount: u64) -> Result<()> {
    let balance = lamports.entry(*to).or_insert(0);
    *balance = balance
        .checked_add(amount)
        .ok_or(EscrowError::ArithmeticOverflow)?;
    Ok(())
}

fn debit(lamports: &mut HashMap<Pubkey, u64>, from: &Pubkey, amount: u64) -> Result<()> {
    let balance = lamports.entry(*from).or_insert(0);
    *balance = balance
        .checked_sub(amount)
        .ok_or(EscrowError::InsufficientFunds)?;
    Ok(())
}
