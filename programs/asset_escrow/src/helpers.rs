use anchor_lang::{
    prelude::*,
    system_program::{self, Allocate, Assign, CreateAccount, Transfer},
};
use anchor_spl::{
    associated_token::get_associated_token_address_with_program_id,
    token_interface::TokenAccount,
};

use crate::{errors::EscrowError, state::Escrow};

/// Escrow PDA helper. The escrow is passed unchecked so that a missing or
/// occupied record surfaces as `NotFound` / `DuplicateOffer` instead of an
/// account deserialization error.
pub struct EscrowAccount;

impl EscrowAccount {
    /// Allocate the escrow PDA and write `record` into it
    pub fn create<'info>(
        escrow: &AccountInfo<'info>,
        payer: &AccountInfo<'info>,
        system_program: &AccountInfo<'info>,
        signer_seeds: &[&[&[u8]]],
        record: &Escrow,
    ) -> Result<()> {
        require!(
            escrow.data_is_empty() && escrow.owner == &system_program::ID,
            EscrowError::DuplicateOffer
        );

        let space = Escrow::LEN as u64;
        let rent = Rent::get()?.minimum_balance(Escrow::LEN);
        let current = escrow.lamports();

        if current == 0 {
            let cpi_accounts = CreateAccount {
                from: payer.clone(),
                to: escrow.clone(),
            };
            let cpi_ctx =
                CpiContext::new_with_signer(system_program.clone(), cpi_accounts, signer_seeds);
            system_program::create_account(cpi_ctx, rent, space, &crate::ID)?;
        } else {
            // Someone pre-funded the address: top up, then allocate and assign
            if rent > current {
                let cpi_accounts = Transfer {
                    from: payer.clone(),
                    to: escrow.clone(),
                };
                let cpi_ctx = CpiContext::new(system_program.clone(), cpi_accounts);
                system_program::transfer(cpi_ctx, rent - current)?;
            }

            let cpi_accounts = Allocate {
                account_to_allocate: escrow.clone(),
            };
            let cpi_ctx =
                CpiContext::new_with_signer(system_program.clone(), cpi_accounts, signer_seeds);
            system_program::allocate(cpi_ctx, space)?;

            let cpi_accounts = Assign {
                account_to_assign: escrow.clone(),
            };
            let cpi_ctx =
                CpiContext::new_with_signer(system_program.clone(), cpi_accounts, signer_seeds);
            system_program::assign(cpi_ctx, &crate::ID)?;
        }

        let mut data = escrow.try_borrow_mut_data()?;
        record.try_serialize(&mut &mut data[..])?;
        Ok(())
    }

    /// Load an open escrow, verifying owner, discriminator and stored bump
    pub fn load(escrow: &AccountInfo) -> Result<Escrow> {
        require_keys_eq!(*escrow.owner, crate::ID, EscrowError::NotFound);

        let data = escrow.try_borrow_data()?;
        let record = Escrow::try_deserialize(&mut &data[..])
            .map_err(|_| error!(EscrowError::NotFound))?;
        record.verify_address(escrow.key)?;
        Ok(record)
    }

    /// Close the escrow and send its rent to `destination`
    pub fn close<'info>(
        escrow: &AccountInfo<'info>,
        destination: &AccountInfo<'info>,
    ) -> Result<()> {
        let total = destination
            .lamports()
            .checked_add(escrow.lamports())
            .ok_or(EscrowError::ArithmeticOverflow)?;

        **destination.try_borrow_mut_lamports()? = total;
        **escrow.try_borrow_mut_lamports()? = 0;

        escrow.assign(&system_program::ID);
        escrow.resize(0)?;
        Ok(())
    }
}

/// Vault helper for take and refund, where the vault is passed unchecked
pub struct VaultAccount;

impl VaultAccount {
    /// Check the vault is the escrow's Token A ATA and still holds the
    /// deposit. Returns its balance.
    pub fn load(
        vault: &AccountInfo,
        escrow: &Pubkey,
        record: &Escrow,
        token_program: &Pubkey,
    ) -> Result<u64> {
        let expected =
            get_associated_token_address_with_program_id(escrow, &record.mint_a, token_program);
        require_keys_eq!(*vault.key, expected, EscrowError::NotFound);
        require_keys_eq!(*vault.owner, *token_program, EscrowError::NotFound);

        let data = vault.try_borrow_data()?;
        let account = TokenAccount::try_deserialize(&mut &data[..])
            .map_err(|_| error!(EscrowError::NotFound))?;
        require_keys_eq!(account.mint, record.mint_a, EscrowError::LedgerFailure);
        require_keys_eq!(account.owner, *escrow, EscrowError::LedgerFailure);
        require_gte!(account.amount, record.amount, EscrowError::LedgerFailure);
        Ok(account.amount)
    }
}
