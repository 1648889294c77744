//! Host-side escrow state machine.
//!
//! Runs the same `make` / `take` / `refund` transitions as the on-chain
//! program against any [`CustodyLedger`]. Every precondition is checked
//! before the first mutation and the mutations themselves run inside
//! [`CustodyLedger::commit`].

use anchor_lang::prelude::*;
use anchor_spl::associated_token::get_associated_token_address;

use crate::{
    errors::EscrowError,
    ledger::{CustodyLedger, TokenAccount, TOKEN_ACCOUNT_SIZE},
    state::Escrow,
};

/// Identities supplied to `make`
#[derive(Clone, Copy, Debug)]
pub struct MakeOffer {
    pub maker: Pubkey,
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
}

/// Identities supplied to `take`. The maker is read from the escrow itself.
#[derive(Clone, Copy, Debug)]
pub struct TakeOffer {
    pub taker: Pubkey,
    pub escrow: Pubkey,
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
}

/// Identities supplied to `refund`
#[derive(Clone, Copy, Debug)]
pub struct RefundOffer {
    pub maker: Pubkey,
    pub escrow: Pubkey,
    pub mint_a: Pubkey,
}

pub struct EscrowEngine<L> {
    ledger: L,
}

impl<L: CustodyLedger> EscrowEngine<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn into_ledger(self) -> L {
        self.ledger
    }

    /// Lock `amount` of mint A from the maker and ask `receive` of mint B.
    /// Returns the escrow address.
    pub fn make(
        &mut self,
        offer: &MakeOffer,
        seed: u64,
        receive: u64,
        amount: u64,
    ) -> Result<Pubkey> {
        Escrow::validate_terms(receive, amount)?;
        require_keys_neq!(offer.mint_a, offer.mint_b, EscrowError::AssetMismatch);

        let (escrow, bump) = Escrow::find_address(&offer.maker, seed);
        let vault = Escrow::vault_address(&escrow, &offer.mint_a);
        require!(
            self.ledger.escrow(&escrow).is_none(),
            EscrowError::DuplicateOffer
        );
        // Anyone may create the escrow's ATA ahead of time; an empty one is reused
        let create_vault = match self.ledger.token_account(&vault) {
            Some(existing) => {
                require!(
                    existing.owner == escrow && existing.mint == offer.mint_a && existing.amount == 0,
                    EscrowError::DuplicateOffer
                );
                false
            }
            None => true,
        };

        let source = get_associated_token_address(&offer.maker, &offer.mint_a);
        let holding = self
            .ledger
            .token_account(&source)
            .ok_or(EscrowError::InsufficientFunds)?;
        require_keys_eq!(holding.mint, offer.mint_a, EscrowError::AssetMismatch);
        require_gte!(holding.amount, amount, EscrowError::InsufficientFunds);

        let vault_rent = if create_vault {
            self.ledger.minimum_balance(TOKEN_ACCOUNT_SIZE)
        } else {
            0
        };
        let rent = self
            .ledger
            .minimum_balance(Escrow::LEN)
            .checked_add(vault_rent)
            .ok_or(EscrowError::ArithmeticOverflow)?;
        require_gte!(
            self.ledger.lamports(&offer.maker),
            rent,
            EscrowError::InsufficientFunds
        );

        let record = Escrow {
            seed,
            maker: offer.maker,
            mint_a: offer.mint_a,
            mint_b: offer.mint_b,
            amount,
            receive,
            bump,
        };
        self.ledger.commit(|ledger| {
            ledger.create_escrow(escrow, record, &offer.maker)?;
            if create_vault {
                ledger.create_token_account(vault, &offer.mint_a, &escrow, &offer.maker)?;
            }
            ledger.transfer(&source, &vault, amount, &offer.maker)
        })?;

        msg!("Escrow {} opened: {} of A for {} of B", escrow, amount, receive);
        Ok(escrow)
    }

    /// Pay the escrow's price in mint B and receive the locked mint A
    pub fn take(&mut self, offer: &TakeOffer) -> Result<()> {
        let escrow = self.open_escrow(&offer.escrow)?;
        escrow.check_mint_a(&offer.mint_a)?;
        escrow.check_mint_b(&offer.mint_b)?;
        let (vault, locked) = self.locked_vault(&offer.escrow, &escrow)?;

        let taker_ata_b = get_associated_token_address(&offer.taker, &escrow.mint_b);
        let payment = self
            .ledger
            .token_account(&taker_ata_b)
            .ok_or(EscrowError::InsufficientFunds)?;
        require_gte!(payment.amount, escrow.receive, EscrowError::InsufficientFunds);

        let taker_ata_a = get_associated_token_address(&offer.taker, &escrow.mint_a);
        let maker_ata_b = get_associated_token_address(&escrow.maker, &escrow.mint_b);
        let create_taker_ata_a = self.can_credit(&taker_ata_a, locked)?;
        let create_maker_ata_b = self.can_credit(&maker_ata_b, escrow.receive)?;

        let accounts_to_create = u64::from(create_taker_ata_a) + u64::from(create_maker_ata_b);
        let rent = self
            .ledger
            .minimum_balance(TOKEN_ACCOUNT_SIZE)
            .checked_mul(accounts_to_create)
            .ok_or(EscrowError::ArithmeticOverflow)?;
        require_gte!(
            self.ledger.lamports(&offer.taker),
            rent,
            EscrowError::InsufficientFunds
        );

        self.ledger.commit(|ledger| {
            if create_taker_ata_a {
                ledger.create_token_account(
                    taker_ata_a,
                    &escrow.mint_a,
                    &offer.taker,
                    &offer.taker,
                )?;
            }
            if create_maker_ata_b {
                ledger.create_token_account(
                    maker_ata_b,
                    &escrow.mint_b,
                    &escrow.maker,
                    &offer.taker,
                )?;
            }
            ledger.transfer(&taker_ata_b, &maker_ata_b, escrow.receive, &offer.taker)?;
            ledger.transfer(&vault, &taker_ata_a, locked, &offer.escrow)?;
            ledger.close_token_account(&vault, &escrow.maker, &offer.escrow)?;
            ledger.close_escrow(&offer.escrow, &escrow.maker)
        })?;

        msg!("Escrow {} taken by {}", offer.escrow, offer.taker);
        Ok(())
    }

    /// Cancel the escrow and return the locked mint A to its maker
    pub fn refund(&mut self, offer: &RefundOffer) -> Result<()> {
        let escrow = self.open_escrow(&offer.escrow)?;
        escrow.check_maker(&offer.maker)?;
        escrow.check_mint_a(&offer.mint_a)?;
        let (vault, locked) = self.locked_vault(&offer.escrow, &escrow)?;

        let maker_ata_a = get_associated_token_address(&escrow.maker, &escrow.mint_a);
        let create_maker_ata_a = self.can_credit(&maker_ata_a, locked)?;
        if create_maker_ata_a {
            require_gte!(
                self.ledger.lamports(&escrow.maker),
                self.ledger.minimum_balance(TOKEN_ACCOUNT_SIZE),
                EscrowError::InsufficientFunds
            );
        }

        self.ledger.commit(|ledger| {
            if create_maker_ata_a {
                ledger.create_token_account(
                    maker_ata_a,
                    &escrow.mint_a,
                    &escrow.maker,
                    &escrow.maker,
                )?;
            }
            ledger.transfer(&vault, &maker_ata_a, locked, &offer.escrow)?;
            ledger.close_token_account(&vault, &escrow.maker, &offer.escrow)?;
            ledger.close_escrow(&offer.escrow, &escrow.maker)
        })?;

        msg!("Escrow {} refunded {} of A", offer.escrow, locked);
        Ok(())
    }

    fn open_escrow(&self, address: &Pubkey) -> Result<Escrow> {
        let escrow = self
            .ledger
            .escrow(address)
            .ok_or(EscrowError::NotFound)?;
        escrow.verify_address(address)?;
        Ok(escrow)
    }

    /// Vault address and balance; the vault must still hold the full deposit
    fn locked_vault(&self, address: &Pubkey, escrow: &Escrow) -> Result<(Pubkey, u64)> {
        let vault = Escrow::vault_address(address, &escrow.mint_a);
        let TokenAccount { mint, owner, amount } = self
            .ledger
            .token_account(&vault)
            .ok_or(EscrowError::NotFound)?;
        require_keys_eq!(mint, escrow.mint_a, EscrowError::LedgerFailure);
        require_keys_eq!(owner, *address, EscrowError::LedgerFailure);
        require_gte!(amount, escrow.amount, EscrowError::LedgerFailure);
        Ok((vault, amount))
    }

    /// Whether `destination` can take `amount` more. Returns `true` when the
    /// account is absent and has to be created first.
    fn can_credit(&self, destination: &Pubkey, amount: u64) -> Result<bool> {
        match self.ledger.token_account(destination) {
            Some(account) => {
                account
                    .amount
                    .checked_add(amount)
                    .ok_or(EscrowError::ArithmeticOverflow)?;
                Ok(false)
            }
            None => Ok(true),
        }
    }
}
