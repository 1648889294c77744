use anchor_lang::prelude::*;
use anchor_spl::{
    associated_token::AssociatedToken,
    token_interface::{
        close_account, transfer_checked, CloseAccount, Mint, TokenAccount, TokenInterface,
        TransferChecked,
    },
};

use crate::{
    events::EscrowRefunded,
    helpers::{EscrowAccount, VaultAccount},
    state::{Escrow, ESCROW_SEED},
};

#[derive(Accounts)]
pub struct Refund<'info> {
    /// The maker who originally created the escrow (can refund)
    #[account(mut)]
    pub maker: Signer<'info>,

    /// CHECK: escrow record, loaded and verified by the handler (will be closed)
    #[account(mut)]
    pub escrow: UncheckedAccount<'info>,

    /// Token A mint
    #[account(mint::token_program = token_program)]
    pub mint_a: InterfaceAccount<'info, Mint>,

    /// CHECK: vault holding Token A, checked against the escrow by the handler
    #[account(mut)]
    pub vault: UncheckedAccount<'info>,

    /// Maker's associated token account for Token A (receives refund)
    #[account(
        init_if_needed,
        payer = maker,
        associated_token::mint = mint_a,
        associated_token::authority = maker,
        associated_token::token_program = token_program,
    )]
    pub maker_ata_a: InterfaceAccount<'info, TokenAccount>,

    pub associated_token_program: Program<'info, AssociatedToken>,
    pub token_program: Interface<'info, TokenInterface>,
    pub system_program: Program<'info, System>,
}

impl<'info> Refund<'info> {
    /// Load the escrow; only its maker may cancel it
    pub fn load_escrow(&self) -> Result<(Escrow, u64)> {
        let escrow = EscrowAccount::load(&self.escrow)?;
        escrow.check_maker(self.maker.key)?;
        escrow.check_mint_a(&self.mint_a.key())?;

        let locked = VaultAccount::load(
            &self.vault,
            self.escrow.key,
            &escrow,
            self.token_program.key,
        )?;
        Ok((escrow, locked))
    }

    /// Withdraw all Token A from vault back to maker, then close the vault and escrow
    pub fn refund_and_close(&mut self, escrow: &Escrow, refunded: u64) -> Result<()> {
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
            to: self.maker_ata_a.to_account_info(),
            authority: self.escrow.to_account_info(),
        };
        let cpi_program = self.token_program.to_account_info();
        let cpi_ctx = CpiContext::new_with_signer(cpi_program, cpi_accounts, signer_seeds);

        transfer_checked(cpi_ctx, refunded, self.mint_a.decimals)?;

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

/// Handler for the refund instruction
pub fn handler(ctx: Context<Refund>) -> Result<()> {
    let (escrow, refunded) = ctx.accounts.load_escrow()?;
    ctx.accounts.refund_and_close(&escrow, refunded)?;

    msg!("Escrow {} refunded {} of A", ctx.accounts.escrow.key(), refunded);
    emit!(EscrowRefunded {
        escrow: ctx.accounts.escrow.key(),
        maker: ctx.accounts.maker.key(),
        amount: refunded,
    });

    Ok(())
}
