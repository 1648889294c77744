use anchor_lang::prelude::*;
use anchor_spl::associated_token::get_associated_token_address;

use crate::errors::EscrowError;

/// Escrow PDA seed prefix
#[constant]
pub const ESCROW_SEED: &[u8] = b"escrow";

/// Escrow account that stores all the exchange terms
#[account(discriminator = 1)]
#[derive(InitSpace, Debug, PartialEq, Eq)]
pub struct Escrow {
    /// Seed used for PDA derivation
    pub seed: u64,
    /// The maker's wallet address (creator of the escrow)
    pub maker: Pubkey,
    /// Token A mint address (the token maker deposits)
    pub mint_a: Pubkey,
    /// Token B mint address (the token maker wants to receive)
    pub mint_b: Pubkey,
    /// Amount of Token A locked in the vault
    pub amount: u64,
    /// Amount of Token B the maker wants to receive
    pub receive: u64,
    /// Bump seed for PDA derivation (cached for efficiency)
    pub bump: u8,
}

impl Escrow {
    /// Allocated size of the escrow account, discriminator included
    pub const LEN: usize = Escrow::DISCRIMINATOR.len() + Escrow::INIT_SPACE;

    /// Derive the escrow PDA for a maker and seed
    pub fn find_address(maker: &Pubkey, seed: u64) -> (Pubkey, u8) {
        Pubkey::find_program_address(
            &[ESCROW_SEED, maker.as_ref(), seed.to_le_bytes().as_ref()],
            &crate::ID,
        )
    }

    /// Vault is the escrow's associated token account for Token A
    pub fn vault_address(escrow: &Pubkey, mint_a: &Pubkey) -> Pubkey {
        get_associated_token_address(escrow, mint_a)
    }

    /// Both sides of the exchange must be non-zero
    pub fn validate_terms(receive: u64, amount: u64) -> Result<()> {
        require_gt!(receive, 0, EscrowError::InvalidAmount);
        require_gt!(amount, 0, EscrowError::InvalidAmount);
        Ok(())
    }

    /// Re-derive the PDA from the stored bump and compare it to `address`
    pub fn verify_address(&self, address: &Pubkey) -> Result<()> {
        let derived = Pubkey::create_program_address(
            &[
                ESCROW_SEED,
                self.maker.as_ref(),
                self.seed.to_le_bytes().as_ref(),
                &[self.bump],
            ],
            &crate::ID,
        )
        .map_err(|_| error!(EscrowError::NotFound))?;
        require_keys_eq!(derived, *address, EscrowError::NotFound);
        Ok(())
    }

    pub fn check_maker(&self, maker: &Pubkey) -> Result<()> {
        require_keys_eq!(self.maker, *maker, EscrowError::Unauthorized);
        Ok(())
    }

    pub fn check_mint_a(&self, mint_a: &Pubkey) -> Result<()> {
        require_keys_eq!(self.mint_a, *mint_a, EscrowError::AssetMismatch);
        Ok(())
    }

    pub fn check_mint_b(&self, mint_b: &Pubkey) -> Result<()> {
        require_keys_eq!(self.mint_b, *mint_b, EscrowError::AssetMismatch);
        Ok(())
    }
}
