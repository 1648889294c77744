use anchor_lang::prelude::*;
use anchor_spl::associated_token::get_associated_token_address;

use crate::{
    engine::{EscrowEngine, MakeOffer, RefundOffer, TakeOffer},
    ledger::{CustodyLedger, MemoryLedger},
    Escrow, EscrowError,
};

const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

struct Market {
    engine: EscrowEngine<MemoryLedger>,
    maker: Pubkey,
    taker: Pubkey,
    mint_a: Pubkey,
    mint_b: Pubkey,
}

impl Market {
    /// Two mints with 6 decimals, both parties funded with SOL
    fn new() -> Self {
        let maker = Pubkey::new_from_array([1; 32]);
        let taker = Pubkey::new_from_array([2; 32]);
        let mint_a = Pubkey::new_from_array([10; 32]);
        let mint_b = Pubkey::new_from_array([11; 32]);

        let mut ledger = MemoryLedger::new();
        ledger.create_mint(mint_a, 6).unwrap();
        ledger.create_mint(mint_b, 6).unwrap();
        ledger.airdrop(&maker, 10 * LAMPORTS_PER_SOL).unwrap();
        ledger.airdrop(&taker, 10 * LAMPORTS_PER_SOL).unwrap();

        Self {
            engine: EscrowEngine::new(ledger),
            maker,
            taker,
            mint_a,
            mint_b,
        }
    }

    fn fund(&mut self, owner: Pubkey, mint: Pubkey, amount: u64) {
        self.engine
            .ledger_mut()
            .mint_to(&mint, &owner, amount)
            .unwrap();
    }

    /// Balance of the owner's associated token account, zero if it does not exist
    fn balance(&self, owner: Pubkey, mint: Pubkey) -> u64 {
        let address = get_associated_token_address(&owner, &mint);
        self.engine
            .ledger()
            .token_account(&address)
            .map_or(0, |account| account.amount)
    }

    fn lamports(&self, owner: Pubkey) -> u64 {
        self.engine.ledger().lamports(&owner)
    }

    fn make_offer(&self) -> MakeOffer {
        MakeOffer {
            maker: self.maker,
            mint_a: self.mint_a,
            mint_b: self.mint_b,
        }
    }

    fn make(&mut self, seed: u64, receive: u64, amount: u64) -> Result<Pubkey> {
        let offer = self.make_offer();
        self.engine.make(&offer, seed, receive, amount)
    }

    fn take(&mut self, escrow: Pubkey) -> Result<()> {
        let offer = TakeOffer {
            taker: self.taker,
            escrow,
            mint_a: self.mint_a,
            mint_b: self.mint_b,
        };
        self.engine.take(&offer)
    }

    fn refund(&mut self, escrow: Pubkey) -> Result<()> {
        let offer = RefundOffer {
            maker: self.maker,
            escrow,
            mint_a: self.mint_a,
        };
        self.engine.refund(&offer)
    }

    fn is_closed(&self, escrow: Pubkey) -> bool {
        let vault = Escrow::vault_address(&escrow, &self.mint_a);
        let ledger = self.engine.ledger();
        ledger.escrow(&escrow).is_none()
            && ledger.token_account(&vault).is_none()
            && ledger.lamports(&escrow) == 0
            && ledger.lamports(&vault) == 0
    }
}

#[test]
fn make_locks_deposit_in_vault() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);

    let escrow = market.make(42, 250_000, 500_000).unwrap();

    let (expected, bump) = Escrow::find_address(&market.maker, 42);
    assert_eq!(escrow, expected);

    let record = market.engine.ledger().escrow(&escrow).unwrap();
    assert_eq!(
        record,
        Escrow {
            seed: 42,
            maker: market.maker,
            mint_a: market.mint_a,
            mint_b: market.mint_b,
            amount: 500_000,
            receive: 250_000,
            bump,
        }
    );

    let vault = Escrow::vault_address(&escrow, &market.mint_a);
    let vault = market.engine.ledger().token_account(&vault).unwrap();
    assert_eq!(vault.owner, escrow);
    assert_eq!(vault.mint, market.mint_a);
    assert_eq!(vault.amount, 500_000);
    assert_eq!(market.balance(market.maker, market.mint_a), 0);
}

#[test]
fn make_then_take_exchanges_assets() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    market.fund(market.taker, market.mint_b, 250_000);

    let escrow = market.make(42, 250_000, 500_000).unwrap();
    market.take(escrow).unwrap();

    assert_eq!(market.balance(market.maker, market.mint_b), 250_000);
    assert_eq!(market.balance(market.taker, market.mint_a), 500_000);
    assert_eq!(market.balance(market.maker, market.mint_a), 0);
    assert_eq!(market.balance(market.taker, market.mint_b), 0);
    assert!(market.is_closed(escrow));
}

#[test]
fn take_conserves_existing_balances() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 700_000);
    market.fund(market.maker, market.mint_b, 1_000);
    market.fund(market.taker, market.mint_a, 3_000);
    market.fund(market.taker, market.mint_b, 300_000);

    let escrow = market.make(1, 250_000, 500_000).unwrap();
    market.take(escrow).unwrap();

    assert_eq!(market.balance(market.maker, market.mint_a), 200_000);
    assert_eq!(market.balance(market.maker, market.mint_b), 251_000);
    assert_eq!(market.balance(market.taker, market.mint_a), 503_000);
    assert_eq!(market.balance(market.taker, market.mint_b), 50_000);
}

#[test]
fn make_then_refund_restores_maker() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 400_000);
    let before = market.balance(market.maker, market.mint_a);

    let escrow = market.make(77, 200_000, 400_000).unwrap();
    market.refund(escrow).unwrap();

    assert_eq!(market.balance(market.maker, market.mint_a), before);
    assert!(market.is_closed(escrow));
}

#[test]
fn rent_returns_to_maker() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 900_000);
    market.fund(market.taker, market.mint_b, 250_000);
    let maker_lamports = market.lamports(market.maker);

    let escrow = market.make(1, 250_000, 500_000).unwrap();
    assert!(market.lamports(market.maker) < maker_lamports);
    market.refund(escrow).unwrap();
    assert_eq!(market.lamports(market.maker), maker_lamports);

    let escrow = market.make(2, 250_000, 500_000).unwrap();
    market.take(escrow).unwrap();
    assert_eq!(market.lamports(market.maker), maker_lamports);
}

#[test]
fn taker_pays_for_missing_destination_accounts() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    market.fund(market.taker, market.mint_b, 250_000);
    let taker_lamports = market.lamports(market.taker);
    let account_rent = market
        .engine
        .ledger()
        .minimum_balance(crate::ledger::TOKEN_ACCOUNT_SIZE);

    let escrow = market.make(42, 250_000, 500_000).unwrap();
    market.take(escrow).unwrap();

    assert_eq!(market.lamports(market.taker), taker_lamports - 2 * account_rent);
}

#[test]
fn taker_without_rent_cannot_take() {
    let mut market = Market::new();
    let broke = Pubkey::new_from_array([3; 32]);
    market.fund(market.maker, market.mint_a, 500_000);
    market.fund(broke, market.mint_b, 250_000);
    market.taker = broke;

    let escrow = market.make(42, 250_000, 500_000).unwrap();

    assert_eq!(
        market.take(escrow).unwrap_err(),
        EscrowError::InsufficientFunds.into()
    );
    assert_eq!(market.balance(broke, market.mint_b), 250_000);
    assert!(market.engine.ledger().escrow(&escrow).is_some());
}

#[test]
fn settled_escrow_cannot_be_taken_or_refunded() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    market.fund(market.taker, market.mint_b, 500_000);

    let escrow = market.make(42, 250_000, 500_000).unwrap();
    market.take(escrow).unwrap();

    assert_eq!(
        market.take(escrow).unwrap_err(),
        EscrowError::NotFound.into()
    );
    assert_eq!(
        market.refund(escrow).unwrap_err(),
        EscrowError::NotFound.into()
    );
    assert_eq!(market.balance(market.taker, market.mint_b), 250_000);
}

#[test]
fn refunded_escrow_cannot_be_taken_or_refunded() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 400_000);
    market.fund(market.taker, market.mint_b, 200_000);

    let escrow = market.make(77, 200_000, 400_000).unwrap();
    market.refund(escrow).unwrap();

    assert_eq!(
        market.take(escrow).unwrap_err(),
        EscrowError::NotFound.into()
    );
    assert_eq!(
        market.refund(escrow).unwrap_err(),
        EscrowError::NotFound.into()
    );
    assert_eq!(market.balance(market.taker, market.mint_b), 200_000);
    assert_eq!(market.balance(market.taker, market.mint_a), 0);
}

#[test]
fn unknown_escrow_is_not_found() {
    let mut market = Market::new();
    let (escrow, _) = Escrow::find_address(&market.maker, 5);

    assert_eq!(
        market.take(escrow).unwrap_err(),
        EscrowError::NotFound.into()
    );
    assert_eq!(
        market.refund(escrow).unwrap_err(),
        EscrowError::NotFound.into()
    );
}

#[test]
fn same_seed_is_a_duplicate_offer() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 1_000_000);

    let first = market.make(42, 250_000, 500_000).unwrap();

    assert_eq!(
        market.make(42, 100, 100).unwrap_err(),
        EscrowError::DuplicateOffer.into()
    );
    assert_eq!(market.balance(market.maker, market.mint_a), 500_000);

    let second = market.make(43, 250_000, 500_000).unwrap();
    assert_ne!(first, second);
    assert_eq!(market.balance(market.maker, market.mint_a), 0);
}

#[test]
fn seed_can_be_reused_after_close() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);

    let escrow = market.make(42, 250_000, 500_000).unwrap();
    market.refund(escrow).unwrap();

    assert_eq!(market.make(42, 250_000, 500_000).unwrap(), escrow);
}

#[test]
fn zero_amounts_are_rejected() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    let (escrow, _) = Escrow::find_address(&market.maker, 42);

    assert_eq!(
        market.make(42, 0, 500_000).unwrap_err(),
        EscrowError::InvalidAmount.into()
    );
    assert_eq!(
        market.make(42, 250_000, 0).unwrap_err(),
        EscrowError::InvalidAmount.into()
    );
    assert!(market.is_closed(escrow));
    assert_eq!(market.balance(market.maker, market.mint_a), 500_000);
}

#[test]
fn maker_needs_the_deposit() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 499_999);
    let (escrow, _) = Escrow::find_address(&market.maker, 42);

    assert_eq!(
        market.make(42, 250_000, 500_000).unwrap_err(),
        EscrowError::InsufficientFunds.into()
    );
    assert!(market.is_closed(escrow));
    assert_eq!(market.balance(market.maker, market.mint_a), 499_999);
}

#[test]
fn maker_without_token_account_has_insufficient_funds() {
    let mut market = Market::new();

    assert_eq!(
        market.make(42, 250_000, 500_000).unwrap_err(),
        EscrowError::InsufficientFunds.into()
    );
}

#[test]
fn maker_needs_rent() {
    let mut market = Market::new();
    let broke = Pubkey::new_from_array([3; 32]);
    market.fund(broke, market.mint_a, 500_000);
    market.maker = broke;

    assert_eq!(
        market.make(42, 250_000, 500_000).unwrap_err(),
        EscrowError::InsufficientFunds.into()
    );
    assert_eq!(market.balance(broke, market.mint_a), 500_000);
}

#[test]
fn identical_mints_are_rejected() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    market.mint_b = market.mint_a;

    assert_eq!(
        market.make(42, 250_000, 500_000).unwrap_err(),
        EscrowError::AssetMismatch.into()
    );
}

#[test]
fn taker_needs_the_price() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    market.fund(market.taker, market.mint_b, 249_999);

    let escrow = market.make(42, 250_000, 500_000).unwrap();

    assert_eq!(
        market.take(escrow).unwrap_err(),
        EscrowError::InsufficientFunds.into()
    );
    assert_eq!(market.balance(market.taker, market.mint_b), 249_999);
    assert_eq!(market.balance(market.taker, market.mint_a), 0);
    assert_eq!(market.balance(market.maker, market.mint_b), 0);

    // The offer stays open and can still be cancelled
    market.refund(escrow).unwrap();
    assert_eq!(market.balance(market.maker, market.mint_a), 500_000);
}

#[test]
fn take_rejects_mismatched_mints() {
    let mut market = Market::new();
    let other = Pubkey::new_from_array([12; 32]);
    market.engine.ledger_mut().create_mint(other, 6).unwrap();
    market.fund(market.maker, market.mint_a, 500_000);
    market.fund(market.taker, market.mint_b, 250_000);
    let escrow = market.make(42, 250_000, 500_000).unwrap();

    let wrong_b = TakeOffer {
        taker: market.taker,
        escrow,
        mint_a: market.mint_a,
        mint_b: other,
    };
    assert_eq!(
        market.engine.take(&wrong_b).unwrap_err(),
        EscrowError::AssetMismatch.into()
    );

    let swapped = TakeOffer {
        taker: market.taker,
        escrow,
        mint_a: market.mint_b,
        mint_b: market.mint_a,
    };
    assert_eq!(
        market.engine.take(&swapped).unwrap_err(),
        EscrowError::AssetMismatch.into()
    );

    assert_eq!(market.balance(market.taker, market.mint_b), 250_000);
    market.take(escrow).unwrap();
}

#[test]
fn only_the_maker_can_refund() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    let escrow = market.make(42, 250_000, 500_000).unwrap();

    let stranger = RefundOffer {
        maker: market.taker,
        escrow,
        mint_a: market.mint_a,
    };
    assert_eq!(
        market.engine.refund(&stranger).unwrap_err(),
        EscrowError::Unauthorized.into()
    );
    assert_eq!(market.balance(market.taker, market.mint_a), 0);
    assert!(!market.is_closed(escrow));
}

#[test]
fn refund_rejects_mismatched_mint() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    let escrow = market.make(42, 250_000, 500_000).unwrap();

    let wrong = RefundOffer {
        maker: market.maker,
        escrow,
        mint_a: market.mint_b,
    };
    assert_eq!(
        market.engine.refund(&wrong).unwrap_err(),
        EscrowError::AssetMismatch.into()
    );
    assert!(!market.is_closed(escrow));
}

#[test]
fn take_that_would_overflow_changes_nothing() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    market.fund(market.taker, market.mint_a, u64::MAX - 100_000);
    market.fund(market.taker, market.mint_b, 250_000);
    let escrow = market.make(42, 250_000, 500_000).unwrap();

    assert_eq!(
        market.take(escrow).unwrap_err(),
        EscrowError::ArithmeticOverflow.into()
    );
    assert_eq!(market.balance(market.taker, market.mint_a), u64::MAX - 100_000);
    assert_eq!(market.balance(market.taker, market.mint_b), 250_000);
    assert_eq!(market.balance(market.maker, market.mint_b), 0);
    assert!(!market.is_closed(escrow));
}

#[test]
fn refund_recreates_closed_maker_account() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    let escrow = market.make(42, 250_000, 500_000).unwrap();

    let maker_ata_a = get_associated_token_address(&market.maker, &market.mint_a);
    let maker = market.maker;
    market
        .engine
        .ledger_mut()
        .close_token_account(&maker_ata_a, &maker, &maker)
        .unwrap();

    market.refund(escrow).unwrap();
    assert_eq!(market.balance(market.maker, market.mint_a), 500_000);
    assert!(market.is_closed(escrow));
}

#[test]
fn offers_from_one_maker_are_independent() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 300_000);
    market.fund(market.taker, market.mint_b, 100_000);

    let first = market.make(1, 100_000, 100_000).unwrap();
    let second = market.make(2, 100_000, 200_000).unwrap();

    market.refund(first).unwrap();
    assert!(market.is_closed(first));
    assert!(!market.is_closed(second));

    market.take(second).unwrap();
    assert_eq!(market.balance(market.maker, market.mint_a), 100_000);
    assert_eq!(market.balance(market.taker, market.mint_a), 200_000);
    assert_eq!(market.balance(market.maker, market.mint_b), 100_000);
}

#[test]
fn make_reuses_empty_vault_created_by_someone_else() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    market.fund(market.taker, market.mint_b, 250_000);
    let (escrow, _) = Escrow::find_address(&market.maker, 42);
    let (mint_a, taker) = (market.mint_a, market.taker);
    market
        .engine
        .ledger_mut()
        .create_associated_token_account(&escrow, &mint_a, &taker)
        .unwrap();
    let maker_lamports = market.lamports(market.maker);
    let ledger = market.engine.ledger();
    let record_rent = ledger.minimum_balance(Escrow::LEN);
    let account_rent = ledger.minimum_balance(crate::ledger::TOKEN_ACCOUNT_SIZE);

    assert_eq!(market.make(42, 250_000, 500_000).unwrap(), escrow);
    assert_eq!(market.lamports(market.maker), maker_lamports - record_rent);

    market.take(escrow).unwrap();
    assert_eq!(market.balance(market.taker, market.mint_a), 500_000);
    assert_eq!(market.balance(market.maker, market.mint_b), 250_000);
    assert!(market.is_closed(escrow));
    // The vault's rent goes to the maker whoever paid for it
    assert_eq!(market.lamports(market.maker), maker_lamports + account_rent);
}

#[test]
fn make_rejects_funded_vault() {
    let mut market = Market::new();
    market.fund(market.maker, market.mint_a, 500_000);
    let (escrow, _) = Escrow::find_address(&market.maker, 42);
    market.fund(escrow, market.mint_a, 1);

    assert_eq!(
        market.make(42, 250_000, 500_000).unwrap_err(),
        EscrowError::DuplicateOffer.into()
    );
    assert_eq!(market.balance(market.maker, market.mint_a), 500_000);
    assert!(market.engine.ledger().escrow(&escrow).is_none());
}
