use anchor_lang::prelude::*;
use anchor_spl::{
    associated_token::AssociatedToken,
    token_interface::{
        close_account, transfer_checked, CloseAccount, Mint, TokenAccount, TokenInterface,
        TransferChecked,
    },
};

use crate::{
    errors::EscrowError,
    events::EscrowTaken,
    helpers::{EscrowAccount, VaultAccount},
    state::{Escrow, ESCROW_SEED},
};

#[derive(Accounts)]
pub struct Take<'info> {
    /// The taker who accepts the exchange terms
    #[account(mut)]
    pub taker: Signer<'info>,

    /// The original maker who created the escrow
    #[account(mut)]
    pub maker: SystemAccount<'info>,

    /// CHECK: escrow record, loaded and verified by the handler so a closed
    /// or unknown offer is reported as `NotFound` (will be closed)
    #[account(mut)]
    pub escrow: UncheckedAccount<'info>,

    /// Token A mint
    #[account(mint::token_program = token_program)]
    pub mint_a: Box<InterfaceAccount<'info, Mint>>,

    /// Token B mint
    #[account(mint::token_program = token_program)]
    pub mint_b: Box<InterfaceAccount<'info, Mint>>,

    /// CHECK: vault holding Token A, checked against the escrow by the handler
    #[account(mut)]
    pub vault: UncheckedAccount<'info>,

    /// Taker's associated token account for Token A (receives Token A)
    #[account(
        init_if_needed,
        payer = taker,
        associated_token::mint = mint_a,
        associated_token::authority = taker,
        associated_token::token_program = token_program,
    )]
    pub taker_ata_a: Box<InterfaceAccount<'info, TokenAccount>>,

    /// Taker's associated token account for Token B (source of Token B)
    #[account(
        mut,
        associated_token::mint = mint_b,
        associated_token::authority = taker,
        associated_token::token_program = token_program,
    )]
    pub taker_ata_b: Box<InterfaceAccount<'info, TokenAccount>>,

    /// Maker's associated token account for Token B (receives Token B)
    #[account(
        init_if_needed,
        payer = taker,
        associated_token::mint = mint_b,
        associated_token::authority = maker,
        associated_token::token_program = token_program,
    )]
    pub maker_ata_b: Box<InterfaceAccount<'info, TokenAccount>>,

    pub associated_token_program: Program<'info, AssociatedToken>,
    pub token_program: Interface<'info, TokenInterface>,
    pub system_program: Program<'info, System>,
}

impl<'info> Take<'info> {
    /// Load the escrow and make sure the passed accounts match its terms
    pub fn load_escrow(&self) -> Result<(Escrow, u64)> {
        let escrow = EscrowAccount::load(&self.escrow)?;
        // The record's address is derived from its maker, so a different maker
        // account points at an offer that does not exist
        require_keys_eq!(escrow.maker, self.maker.key(), EscrowError::NotFound);
        escrow.check_mint_a(&self.mint_a.key())?;
        escrow.check_mint_b(&self.mint_b.key())?;

        let locked = VaultAccount::load(
            &self.vault,
            self.escrow.key,
            &escrow,
            self.token_program.key,
        )?;
        require_gte!(
            self.taker_ata_b.amount,
            escrow.receive,
            EscrowError::InsufficientFunds
        );
        Ok((escrow, locked))
    }

    /// Transfer Token B from taker to maker
    pub fn transfer_to_maker(&mut self, escrow: &Escrow) -> Result<()> {
        let cpi_accounts = TransferChecked {
            from: self.taker_ata_b.to_account_info(),
            mint: self.mint_b.to_account_info(),
            to: self.maker_ata_b.to_account_info(),
            authority: self.taker.to_account_info(),
        };
        let cpi_program = self.token_program.to_account_info();
        let cpi_ctx = CpiContext::new(cpi_program, cpi_accounts);

        transfer_checked(cpi_ctx, escrow.receive, self.mint_b.decimals)
    }

    /// Withdraw Token A from vault to taker, then close the vault and escrow
    pub fn withdraw_and_close(&mut self, escrow: &Escrow, released: u64) -> Result<()> {
        let seed = escrow.seed.to_le_bytes();
        let signer_seeds: &[&[&[u8]]] = &[&[
            ESCROW_SEED,
            self.maker.key.as_ref(),
            seed.as_ref(),
            &[escrow.bump],
        ]];

        let cpi_accounts = TransferChecked {
            from: self.vault.to_account_info(),
            mint: self.mint_a.to_account_info(),
            to: self.taker_ata_a.to_account_info(),
            authority: self.escrow.to_account_info(),
        };
        let cpi_program = self.token_program.to_account_info();
        let cpi_ctx = CpiContext::new_with_signer(cpi_program, cpi_accounts, signer_seeds);

        transfer_checked(cpi_ctx, released, self.mint_a.decimals)?;

        // Vault rent goes back to the maker
        let cpi_accounts = CloseAccount {
            account: self.vault.to_account_info(),
            destination: self.maker.to_account_info(),
            authority: self.escrow.to_account_info(),
        };
        let cpi_program = self.token_program.to_account_info();
        let cpi_ctx = CpiContext::new_with_signer(cpi_program, cpi_accounts, signer_seeds);

        close_account(cpi_ctx)?;

        EscrowAccount::close(&self.escrow.to_account_info(), &self.maker.to_account_info())
    }
}

/// Handler for the take instruction
pub fn handler(ctx: Context<Take>) -> Result<()> {
    let (escrow, released) = ctx.accounts.load_escrow()?;
    ctx.accounts.transfer_to_maker(&escrow)?;
    ctx.accounts.withdraw_and_close(&escrow, released)?;

    msg!(
        "Escrow {} taken by {}",
        ctx.accounts.escrow.key(),
        ctx.accounts.taker.key()
    );
    emit!(EscrowTaken {
        escrow: ctx.accounts.escrow.key(),
        maker: ctx.accounts.maker.key(),
        taker: ctx.accounts.taker.key(),
        amount: released,
        receive: escrow.receive,
    });

    Ok(())
}
