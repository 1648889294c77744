use anchor_lang::prelude::*;

mod errors;
mod events;
mod helpers;
mod instructions;
mod state;

#[cfg(not(target_os = "solana"))]
pub mod engine;
#[cfg(not(target_os = "solana"))]
pub mod ledger;

#[cfg(test)]
mod tests;

pub use errors::EscrowError;
pub use events::*;
pub use state::{Escrow, ESCROW_SEED};

use instructions::*;

declare_id!("22222222222222222222222222222222222222222222");

#[program]
pub mod asset_escrow {
    use super::*;

    /// Create a new escrow: maker deposits Token A and sets exchange terms
    #[instruction(discriminator = 0)]
    pub fn make(ctx: Context<Make>, seed: u64, receive: u64, amount: u64) -> Result<()> {
        instructions::make::handler(ctx, seed, receive, amount)
    }

    /// Accept the escrow: taker sends Token B, receives Token A
    #[instruction(discriminator = 1)]
    pub fn take(ctx: Context<Take>) -> Result<()> {
        instructions::take::handler(ctx)
    }

    /// Refund the escrow: maker cancels and reclaims Token A
    #[instruction(discriminator = 2)]
    pub fn refund(ctx: Context<Refund>) -> Result<()> {
        instructions::refund::handler(ctx)
    }
}
