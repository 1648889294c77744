use anchor_lang::prelude::*;
use anchor_spl::{
    associated_token::AssociatedToken,
    token_interface::{transfer_checked, Mint, TokenAccount, TokenInterface, TransferChecked},
};

use crate::{
    errors::EscrowError,
    events::EscrowMade,
    helpers::EscrowAccount,
    state::{Escrow, ESCROW_SEED},
};

#[derive(Accounts)]
#[instruction(seed: u64)]
pub struct Make<'info> {
    /// The maker who sets exchange terms and deposits Token A
    #[account(mut)]
    pub maker: Signer<'info>,

    /// CHECK: escrow PDA, allocated by the handler so an occupied
    /// (maker, seed) address is reported as `DuplicateOffer`
    #[account(
        mut,
        seeds = [ESCROW_SEED, maker.key().as_ref(), seed.to_le_bytes().as_ref()],
        bump,
    )]
    pub escrow: UncheckedAccount<'info>,

    /// Token A mint (the token the maker will deposit)
    #[account(mint::token_program = token_program)]
    pub mint_a: InterfaceAccount<'info, Mint>,

    /// Token B mint (the token the maker wants to receive)
    #[account(
        mint::token_program = token_program,
        constraint = mint_b.key() != mint_a.key() @ EscrowError::AssetMismatch,
    )]
    pub mint_b: InterfaceAccount<'info, Mint>,

    /// Maker's associated token account for Token A (source of deposit)
    #[account(
        mut,
        associated_token::mint = mint_a,
        associated_token::authority = maker,
        associated_token::token_program = token_program,
    )]
    pub maker_ata_a: InterfaceAccount<'info, TokenAccount>,

    /// Vault account owned by escrow to hold Token A. Anyone can create an
    /// ATA, so an empty one that already exists is reused.
    #[account(
        init_if_needed,
        payer = maker,
        associated_token::mint = mint_a,
        associated_token::authority = escrow,
        associated_token::token_program = token_program,
    )]
    pub vault: InterfaceAccount<'info, TokenAccount>,

    pub associated_token_program: Program<'info, AssociatedToken>,
    pub token_program: Interface<'info, TokenInterface>,
    pub system_program: Program<'info, System>,
}

impl<'info> Make<'info> {
    /// Initialize the escrow account with exchange terms
    pub fn init_escrow(
        &mut self,
        seed: u64,
        receive: u64,
        amount: u64,
        bumps: &MakeBumps,
    ) -> Result<()> {
        let record = Escrow {
            seed,
            maker: self.maker.key(),
            mint_a: self.mint_a.key(),
            mint_b: self.mint_b.key(),
            amount,
            receive,
            bump: bumps.escrow,
        };

        let maker_key = self.maker.key();
        let seed_bytes = seed.to_le_bytes();
        let signer_seeds: &[&[&[u8]]] = &[&[
            ESCROW_SEED,
            maker_key.as_ref(),
            seed_bytes.as_ref(),
            &[bumps.escrow],
        ]];

        EscrowAccount::create(
            &self.escrow.to_account_info(),
            &self.maker.to_account_info(),
            &self.system_program.to_account_info(),
            signer_seeds,
            &record,
        )?;

        // A pre-created vault must not carry someone else's tokens into the offer
        require_eq!(self.vault.amount, 0, EscrowError::DuplicateOffer);
        Ok(())
    }

    /// Transfer Token A from maker to vault
    pub fn deposit(&mut self, amount: u64) -> Result<()> {
        require_gte!(
            self.maker_ata_a.amount,
            amount,
            EscrowError::InsufficientFunds
        );

        let cpi_accounts = TransferChecked {
            from: self.maker_ata_a.to_account_info(),
            mint: self.mint_a.to_account_info(),
            to: self.vault.to_account_info(),
            authority: self.maker.to_account_info(),
        };
        let cpi_program = self.token_program.to_account_info();
        let cpi_ctx = CpiContext::new(cpi_program, cpi_accounts);

        transfer_checked(cpi_ctx, amount, self.mint_a.decimals)
    }
}

/// Handler for the make instruction
pub fn handler(ctx: Context<Make>, seed: u64, receive: u64, amount: u64) -> Result<()> {
    Escrow::validate_terms(receive, amount)?;

    ctx.accounts.init_escrow(seed, receive, amount, &ctx.bumps)?;
    ctx.accounts.deposit(amount)?;

    msg!(
        "Escrow {} opened: {} of A for {} of B",
        ctx.accounts.escrow.key(),
        amount,
        receive
    );
    emit!(EscrowMade {
        escrow: ctx.accounts.escrow.key(),
        maker: ctx.accounts.maker.key(),
        mint_a: ctx.accounts.mint_a.key(),
        mint_b: ctx.accounts.mint_b.key(),
        seed,
        amount,
        receive,
    });

    Ok(())
}
