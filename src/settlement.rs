//! Fund movement
//!
//! The raffle never touches balances directly. Entry fees go through
//! `Treasury::collect` into escrow, and the prize leaves escrow through
//! `Treasury::pay_out`. Either call failing leaves no partial effect.

use crate::common::types::{Address, Amount};
use crate::errors::PaymentError;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tracing::debug;

#[async_trait]
pub trait Treasury: Send + Sync {
    /// Move `amount` from `from` into escrow
    async fn collect(&self, from: Address, amount: Amount) -> Result<(), PaymentError>;

    /// Move `amount` from escrow to `to`, all or nothing
    async fn pay_out(&self, to: Address, amount: Amount) -> Result<(), PaymentError>;
}

/// Account ledger held in memory, with one escrow account for the raffle pot
pub struct InMemoryBank {
    escrow: Address,
    balances: DashMap<Address, Amount>,
    rejecting: DashSet<Address>,
}

impl InMemoryBank {
    pub fn new(escrow: Address) -> Self {
        Self {
            escrow,
            balances: DashMap::new(),
            rejecting: DashSet::new(),
        }
    }

    pub fn escrow(&self) -> Address {
        self.escrow
    }

    /// Credit an account out of thin air (faucet). Returns the new balance.
    pub fn fund(&self, account: Address, amount: Amount) -> Amount {
        self.credit(account, amount)
    }

    /// Faucet credit that refuses to lift `account` above `cap`
    pub fn fund_up_to(&self, account: Address, amount: Amount, cap: Amount) -> Result<Amount, PaymentError> {
        let mut balance = self.balances.entry(account).or_insert(0);
        match balance.checked_add(amount) {
            Some(next) if next <= cap => {
                *balance = next;
                Ok(next)
            }
            _ => Err(PaymentError::CapExceeded {
                balance: *balance,
                requested: amount,
                cap,
            }),
        }
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).map(|b| *b).unwrap_or(0)
    }

    pub fn escrow_balance(&self) -> Amount {
        self.balance_of(&self.escrow)
    }

    /// Make payouts to `account` fail, like a contract without a receive hook
    pub fn reject_payouts_to(&self, account: Address) {
        self.rejecting.insert(account);
    }

    pub fn accept_payouts_to(&self, account: &Address) {
        self.rejecting.remove(account);
    }

    fn credit(&self, account: Address, amount: Amount) -> Amount {
        let mut balance = self.balances.entry(account).or_insert(0);
        *balance = balance.saturating_add(amount);
        *balance
    }

    fn debit(&self, account: &Address, amount: Amount) -> Result<(), PaymentError> {
        match self.balances.get_mut(account) {
            Some(mut balance) if *balance >= amount => {
                *balance -= amount;
                Ok(())
            }
            Some(balance) => Err(PaymentError::InsufficientBalance {
                available: *balance,
                needed: amount,
            }),
            None => Err(PaymentError::InsufficientBalance {
                available: 0,
                needed: amount,
            }),
        }
    }
}

#[async_trait]
impl Treasury for InMemoryBank {
    async fn collect(&self, from: Address, amount: Amount) -> Result<(), PaymentError> {
        self.debit(&from, amount)?;
        self.credit(self.escrow, amount);
        debug!("Collected {} wei from {}", amount, from);
        Ok(())
    }

    async fn pay_out(&self, to: Address, amount: Amount) -> Result<(), PaymentError> {
        if self.rejecting.contains(&to) {
            return Err(PaymentError::RecipientRejected(to));
        }
        self.debit(&self.escrow, amount).map_err(|_| PaymentError::EscrowUnderfunded {
            held: self.escrow_balance(),
            owed: amount,
        })?;
        self.credit(to, amount);
        debug!("Paid {} wei to {}", amount, to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> InMemoryBank {
        InMemoryBank::new(Address::from_label("raffle"))
    }

    #[tokio::test]
    async fn test_collect_moves_funds_into_escrow() {
        let bank = bank();
        let alice = Address::from_label("alice");
        bank.fund(alice, 100);

        bank.collect(alice, 40).await.unwrap();
        assert_eq!(bank.balance_of(&alice), 60);
        assert_eq!(bank.escrow_balance(), 40);
    }

    #[tokio::test]
    async fn test_collect_fails_without_funds() {
        let bank = bank();
        let bob = Address::from_label("bob");
        bank.fund(bob, 5);

        let err = bank.collect(bob, 10).await.unwrap_err();
        assert_eq!(err, PaymentError::InsufficientBalance { available: 5, needed: 10 });
        assert_eq!(bank.balance_of(&bob), 5);
        assert_eq!(bank.escrow_balance(), 0);

        let stranger = Address::from_label("stranger");
        assert!(bank.collect(stranger, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_pay_out_is_all_or_nothing() {
        let bank = bank();
        let alice = Address::from_label("alice");
        bank.fund(bank.escrow(), 50);

        assert_eq!(
            bank.pay_out(alice, 80).await.unwrap_err(),
            PaymentError::EscrowUnderfunded { held: 50, owed: 80 }
        );
        assert_eq!(bank.escrow_balance(), 50);

        bank.pay_out(alice, 50).await.unwrap();
        assert_eq!(bank.balance_of(&alice), 50);
        assert_eq!(bank.escrow_balance(), 0);
    }

    #[test]
    fn test_fund_up_to_respects_cap() {
        let bank = bank();
        let alice = Address::from_label("alice");

        assert_eq!(bank.fund_up_to(alice, 60, 100).unwrap(), 60);
        assert_eq!(
            bank.fund_up_to(alice, 50, 100).unwrap_err(),
            PaymentError::CapExceeded {
                balance: 60,
                requested: 50,
                cap: 100
            }
        );
        assert_eq!(bank.balance_of(&alice), 60);
        assert_eq!(bank.fund_up_to(alice, 40, 100).unwrap(), 100);
    }

    #[tokio::test]
    async fn test_rejecting_recipient() {
        let bank = bank();
        let contract = Address::from_label("contract");
        bank.fund(bank.escrow(), 10);
        bank.reject_payouts_to(contract);

        assert_eq!(
            bank.pay_out(contract, 10).await.unwrap_err(),
            PaymentError::RecipientRejected(contract)
        );
        assert_eq!(bank.escrow_balance(), 10);

        bank.accept_payouts_to(&contract);
        bank.pay_out(contract, 10).await.unwrap();
        assert_eq!(bank.balance_of(&contract), 10);
    }
}
