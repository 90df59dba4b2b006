//! Token transfer capability
//!
//! `transfer(from, to, amount)` either moves the full amount or fails with
//! `InsufficientFunds` and moves nothing.

use crate::common::types::Address;
use crate::errors::{ArithmeticError, FairroundResult, StorageError, TransferError};
use std::collections::HashMap;
use std::sync::Mutex;

pub trait TokenTransfer: Send + Sync {
    fn transfer(&self, from: &Address, to: &Address, amount: u64) -> FairroundResult<()>;

    fn balance(&self, account: &Address) -> FairroundResult<u64>;
}

/// Balances held in memory. Used by tests and the CLI simulation.
#[derive(Default)]
pub struct MemoryBank {
    balances: Mutex<HashMap<Address, u64>>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` to `account` out of thin air.
    pub fn mint(&self, account: &Address, amount: u64) -> FairroundResult<()> {
        let mut balances = self.lock()?;
        let balance = balances.entry(*account).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| ArithmeticError::AmountOverflow(format!("mint {} to {}", amount, account)))?;
        Ok(())
    }

    fn lock(&self) -> FairroundResult<std::sync::MutexGuard<'_, HashMap<Address, u64>>> {
        self.balances
            .lock()
            .map_err(|_| StorageError::WriteFailed("bank lock poisoned".to_string()).into())
    }
}

impl TokenTransfer for MemoryBank {
    fn transfer(&self, from: &Address, to: &Address, amount: u64) -> FairroundResult<()> {
        if amount == 0 || from == to {
            return Ok(());
        }

        let mut balances = self.lock()?;
        let source = balances.get(from).copied().unwrap_or(0);
        if source < amount {
            return Err(TransferError::InsufficientFunds {
                account: *from,
                balance: source,
                requested: amount,
            }
            .into());
        }
        let target = balances.get(to).copied().unwrap_or(0);
        let credited = target
            .checked_add(amount)
            .ok_or_else(|| ArithmeticError::AmountOverflow(format!("credit {} to {}", amount, to)))?;

        balances.insert(*from, source - amount);
        balances.insert(*to, credited);

        tracing::debug!(from = %from, to = %to, amount, "Transferred");
        Ok(())
    }

    fn balance(&self, account: &Address) -> FairroundResult<u64> {
        Ok(self.lock()?.get(account).copied().unwrap_or(0))
    }
}
