//! Pool accounting for one game
//!
//! `liquidity` is what the pool can still promise, `reserve` is what open
//! bets may still claim, and `stake` is the sum of open stakes (already
//! counted inside `liquidity`). LP shares are minted pro-rata to
//! `liquidity + reserve - stake`.

use crate::common::types::Address;
use crate::errors::{ArithmeticError, FairroundResult, TransferError};
use crate::ledger::Entity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub game: Address,
    pub liquidity: u64,
    pub stake: u64,
    pub reserve: u64,
    pub minted_shares: u64,
    pub shares: BTreeMap<Address, u64>,
}

impl Entity for Vault {
    const KIND: &'static str = "vault";
}

fn overflow(what: &str) -> ArithmeticError {
    ArithmeticError::AmountOverflow(format!("vault {}", what))
}

fn underflow(what: &str) -> ArithmeticError {
    ArithmeticError::AmountUnderflow(format!("vault {}", what))
}

impl Vault {
    pub fn new(game: Address) -> Self {
        Self {
            game,
            liquidity: 0,
            stake: 0,
            reserve: 0,
            minted_shares: 0,
            shares: BTreeMap::new(),
        }
    }

    /// Value backing the LP shares.
    pub fn supply(&self) -> u64 {
        (self.liquidity as u128 + self.reserve as u128).saturating_sub(self.stake as u128) as u64
    }

    pub fn shares_of(&self, provider: &Address) -> u64 {
        self.shares.get(provider).copied().unwrap_or(0)
    }

    /// Adds liquidity and returns the LP shares minted for it.
    pub fn deposit(&mut self, provider: &Address, amount: u64) -> FairroundResult<u64> {
        if amount == 0 {
            return Err(TransferError::InvalidAmount("deposit must be non-zero".to_string()).into());
        }

        let supply = self.supply();
        let minted = if supply > 0 && self.minted_shares > 0 {
            (self.minted_shares as u128 * amount as u128 / supply as u128) as u64
        } else {
            amount
        };

        self.liquidity = self.liquidity.checked_add(amount).ok_or_else(|| overflow("liquidity"))?;
        self.minted_shares = self.minted_shares.checked_add(minted).ok_or_else(|| overflow("shares"))?;
        let held = self.shares.entry(*provider).or_insert(0);
        *held = held.checked_add(minted).ok_or_else(|| overflow("provider shares"))?;

        Ok(minted)
    }

    /// Burns `shares` and returns the amount released. Never dips into what
    /// is reserved for open bets.
    pub fn withdraw(&mut self, provider: &Address, shares: u64) -> FairroundResult<u64> {
        if shares == 0 {
            return Err(TransferError::InvalidAmount("withdrawal must be non-zero".to_string()).into());
        }
        let held = self.shares_of(provider);
        if held < shares {
            return Err(TransferError::InsufficientShares {
                provider: *provider,
                held,
                requested: shares,
            }
            .into());
        }

        let amount = (self.supply() as u128 * shares as u128 / self.minted_shares as u128) as u64;
        if amount > self.liquidity {
            return Err(TransferError::InsufficientLiquidity {
                game: self.game,
                free: self.liquidity,
                required: amount,
            }
            .into());
        }

        self.liquidity -= amount;
        self.minted_shares -= shares;
        if held == shares {
            self.shares.remove(provider);
        } else {
            self.shares.insert(*provider, held - shares);
        }

        Ok(amount)
    }

    /// Takes in a stake and reserves its reward ceiling.
    pub fn bet(&mut self, stake: u64, ceiling: u64) -> FairroundResult<()> {
        let liquidity = self.liquidity.checked_add(stake).ok_or_else(|| overflow("liquidity"))?;
        if ceiling > liquidity {
            return Err(TransferError::InsufficientLiquidity {
                game: self.game,
                free: liquidity,
                required: ceiling,
            }
            .into());
        }

        self.stake = self.stake.checked_add(stake).ok_or_else(|| overflow("stake"))?;
        self.reserve = self.reserve.checked_add(ceiling).ok_or_else(|| overflow("reserve"))?;
        self.liquidity = liquidity - ceiling;
        Ok(())
    }

    /// Releases a bet's reservation after paying out `payout` of it.
    pub fn settle(&mut self, stake: u64, ceiling: u64, payout: u64) -> FairroundResult<()> {
        let returned = ceiling.checked_sub(payout).ok_or_else(|| underflow("payout above ceiling"))?;
        self.stake = self.stake.checked_sub(stake).ok_or_else(|| underflow("stake"))?;
        self.reserve = self.reserve.checked_sub(ceiling).ok_or_else(|| underflow("reserve"))?;
        self.liquidity = self.liquidity.checked_add(returned).ok_or_else(|| overflow("liquidity"))?;
        Ok(())
    }
}
