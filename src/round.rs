//! Round lifecycle: Open → Locked → Fulfilled → Settling → Closed
//!
//! A round is Open while no Lock exists for it. Sealing writes the Lock with
//! its randomness seed and advances `next_round`, so a bet aimed at the old
//! round index is rejected from then on. Fulfillment writes the revealed
//! randomness into the Lock exactly once. Each bet is then settled on its own
//! against two operator attestations.
//!
//! Every mutation of a game (its Lock, Bets and Vault included) runs under
//! that game's writer guard and lands in the ledger as one write set.

use crate::addressing::{bet_address, game_address, lock_address, pool_address};
use crate::attestation::{authorize_settlement, RoundView, SettlementProof};
use crate::common::config::{validate_max_odd, validate_win_rate};
use crate::common::types::{Address, Randomness, Seed};
use crate::crash::{resolve, BetOutcome, CashOut};
use crate::errors::{
    ArithmeticError, AuthorizationError, FairroundError, FairroundResult, IntegrityError,
    OracleError, SequencingError, StorageError,
};
use crate::ledger::{Entity, Ledger, LedgerExt, WriteSet};
use crate::math::Fraction;
use crate::metrics::EngineMetrics;
use crate::randomness::{derive_seed, Durability, RandomnessCommitment, RandomnessOracle, RequestHandle};
use crate::transfer::TokenTransfer;
use crate::vault::Vault;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Per-market configuration and round counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub owner: Address,
    pub operator: Address,
    pub game_index: u64,
    pub pool: Address,
    pub win_rate: Fraction,
    pub max_odd: Fraction,
    /// Index of the round currently accepting bets.
    pub next_round: u64,
    pub last_randomness: Randomness,
    /// Bets admitted to `next_round` so far.
    pub open_bets: u64,
}

impl Entity for Game {
    const KIND: &'static str = "game";
}

/// Commit record of one sealed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub game: Address,
    pub round: u64,
    pub seed: Seed,
    pub prev_randomness: Randomness,
    pub randomness: Option<Randomness>,
    /// Game parameters in force when the round was sealed.
    pub win_rate: Fraction,
    pub max_odd: Fraction,
    pub bets: u64,
    pub unsettled_bets: u64,
}

impl Entity for Lock {
    const KIND: &'static str = "lock";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetSettlement {
    pub outcome: BetOutcome,
    pub crash_point: Fraction,
    pub payout: u64,
}

/// One player's wager in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub game: Address,
    pub round: u64,
    pub player: Address,
    pub stake: u64,
    pub cash_out: CashOut,
    pub reward_ceiling: u64,
    pub settlement: Option<BetSettlement>,
}

impl Entity for Bet {
    const KIND: &'static str = "bet";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Open,
    Locked,
    Fulfilled,
    Settling,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SealedRound {
    pub game: Address,
    pub round: u64,
    pub lock: Address,
    pub seed: Seed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fulfillment {
    Written,
    AlreadyFulfilled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementReceipt {
    pub game: Address,
    pub round: u64,
    pub bet: Address,
    pub player: Address,
    pub crash_point: Fraction,
    pub outcome: BetOutcome,
    pub payout: u64,
    pub clamped: bool,
}

/// Parameters of a new game.
#[derive(Debug, Clone)]
pub struct GameParams {
    pub game_index: u64,
    pub operator: Address,
    pub win_rate: Fraction,
    pub max_odd: Fraction,
}

pub struct CrashEngine<L: Ledger, T: TokenTransfer> {
    ledger: Arc<L>,
    bank: Arc<T>,
    writers: DashMap<Address, Arc<Mutex<()>>>,
    metrics: Arc<EngineMetrics>,
}

fn wrong_signer(action: &'static str, entity: Address, expected: Address, actual: Address) -> FairroundError {
    AuthorizationError::WrongSigner {
        action,
        entity,
        expected,
        actual,
    }
    .into()
}

impl<L: Ledger, T: TokenTransfer> CrashEngine<L, T> {
    pub fn new(ledger: Arc<L>, bank: Arc<T>) -> Self {
        Self {
            ledger,
            bank,
            writers: DashMap::new(),
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn bank(&self) -> &Arc<T> {
        &self.bank
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn game(&self, game: &Address) -> FairroundResult<Game> {
        self.ledger
            .read::<Game>(game)?
            .ok_or_else(|| IntegrityError::UnknownGame(*game).into())
    }

    pub fn vault(&self, game: &Address) -> FairroundResult<Vault> {
        self.ledger
            .read::<Vault>(game)?
            .ok_or_else(|| IntegrityError::UnknownGame(*game).into())
    }

    pub fn lock(&self, game: &Address, round: u64) -> FairroundResult<Option<Lock>> {
        self.ledger.read::<Lock>(&lock_address(game, round))
    }

    pub fn bet(&self, game: &Address, round: u64, player: &Address) -> FairroundResult<Option<Bet>> {
        let bet = bet_address(&lock_address(game, round), player);
        self.ledger.read::<Bet>(&bet)
    }

    pub fn round_phase(&self, game: &Address, round: u64) -> FairroundResult<RoundPhase> {
        let state = self.game(game)?;
        if round == state.next_round {
            return Ok(RoundPhase::Open);
        }
        let lock = self
            .lock(game, round)?
            .ok_or(IntegrityError::UnknownRound { game: *game, round })?;

        Ok(match (&lock.randomness, lock.unsettled_bets) {
            (None, _) => RoundPhase::Locked,
            (Some(_), 0) => RoundPhase::Closed,
            (Some(_), unsettled) if unsettled == lock.bets => RoundPhase::Fulfilled,
            (Some(_), _) => RoundPhase::Settling,
        })
    }

    // ------------------------------------------------------------------
    // Game administration
    // ------------------------------------------------------------------

    pub fn create_game(&self, owner: &Address, params: GameParams) -> FairroundResult<Address> {
        validate_win_rate(params.win_rate)?;
        validate_max_odd(params.max_odd)?;

        let address = game_address(owner, params.game_index);
        let writer = self.writer(&address);
        let _guard = lock_writer(&writer)?;

        if self.ledger.exists::<Game>(&address)? {
            return Err(IntegrityError::GameExists { game: address }.into());
        }

        let game = Game {
            owner: *owner,
            operator: params.operator,
            game_index: params.game_index,
            pool: pool_address(&address),
            win_rate: params.win_rate,
            max_odd: params.max_odd,
            next_round: 0,
            last_randomness: Randomness::zero(),
            open_bets: 0,
        };

        let mut writes = WriteSet::new();
        writes.put(&address, &game)?;
        writes.put(&address, &Vault::new(address))?;
        self.ledger.commit(writes)?;

        tracing::info!(
            game = %address,
            owner = %owner,
            operator = %params.operator,
            win_rate = %params.win_rate,
            max_odd = %params.max_odd,
            "Game created"
        );
        Ok(address)
    }

    pub fn set_operator(&self, owner: &Address, game: &Address, operator: Address) -> FairroundResult<()> {
        self.update_game(owner, game, "set_operator", |state| {
            state.operator = operator;
            Ok(())
        })
    }

    /// Takes effect from the next sealed round.
    pub fn set_win_rate(&self, owner: &Address, game: &Address, win_rate: Fraction) -> FairroundResult<()> {
        validate_win_rate(win_rate)?;
        self.update_game(owner, game, "set_win_rate", |state| {
            state.win_rate = win_rate;
            Ok(())
        })
    }

    /// Bets already placed keep the reward ceiling reserved under the old value.
    pub fn set_max_odd(&self, owner: &Address, game: &Address, max_odd: Fraction) -> FairroundResult<()> {
        validate_max_odd(max_odd)?;
        self.update_game(owner, game, "set_max_odd", |state| {
            state.max_odd = max_odd;
            Ok(())
        })
    }

    fn update_game<F>(&self, owner: &Address, game: &Address, action: &'static str, apply: F) -> FairroundResult<()>
    where
        F: FnOnce(&mut Game) -> FairroundResult<()>,
    {
        let writer = self.writer(game);
        let _guard = lock_writer(&writer)?;

        let mut state = self.game(game)?;
        if state.owner != *owner {
            return Err(wrong_signer(action, *game, state.owner, *owner));
        }
        apply(&mut state)?;

        let mut writes = WriteSet::new();
        writes.put(game, &state)?;
        self.ledger.commit(writes)?;

        tracing::info!(game = %game, action, "Game updated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Liquidity
    // ------------------------------------------------------------------

    /// Moves `amount` from `provider` into the pool and returns the LP shares minted.
    pub fn deposit(&self, provider: &Address, game: &Address, amount: u64) -> FairroundResult<u64> {
        let writer = self.writer(game);
        let _guard = lock_writer(&writer)?;

        let state = self.game(game)?;
        let mut vault = self.vault(game)?;
        let minted = vault.deposit(provider, amount)?;

        let mut writes = WriteSet::new();
        writes.put(game, &vault)?;
        self.commit_with_transfer(writes, provider, &state.pool, amount)?;

        tracing::info!(game = %game, provider = %provider, amount, shares = minted, "Liquidity deposited");
        Ok(minted)
    }

    /// Burns `shares` of `provider` and pays out their value from the pool.
    pub fn withdraw(&self, provider: &Address, game: &Address, shares: u64) -> FairroundResult<u64> {
        let writer = self.writer(game);
        let _guard = lock_writer(&writer)?;

        let state = self.game(game)?;
        let mut vault = self.vault(game)?;
        let amount = vault.withdraw(provider, shares)?;

        let mut writes = WriteSet::new();
        writes.put(game, &vault)?;
        self.commit_with_transfer(writes, &state.pool, provider, amount)?;

        tracing::info!(game = %game, provider = %provider, amount, shares, "Liquidity withdrawn");
        Ok(amount)
    }

    // ------------------------------------------------------------------
    // Betting
    // ------------------------------------------------------------------

    /// Admits a bet into `round`, which must still be the game's open round.
    pub fn place_bet(
        &self,
        player: &Address,
        game: &Address,
        round: u64,
        stake: u64,
        cash_out: CashOut,
    ) -> FairroundResult<Address> {
        if stake == 0 {
            return Err(IntegrityError::InvalidBet("stake must be greater than zero".to_string()).into());
        }

        let writer = self.writer(game);
        let _guard = lock_writer(&writer)?;

        let mut state = self.game(game)?;
        if let CashOut::PresetPoint(point) = cash_out {
            if point.is_zero() || point > state.max_odd {
                return Err(IntegrityError::InvalidBet(format!(
                    "cash-out point {} must be in (0, {}]",
                    point, state.max_odd
                ))
                .into());
            }
        }

        let lock = lock_address(game, round);
        if round != state.next_round || self.ledger.exists::<Lock>(&lock)? {
            tracing::warn!(game = %game, round, next_round = state.next_round, player = %player, "Bet rejected: round closed");
            return Err(SequencingError::BettingClosed { game: *game, round }.into());
        }

        let address = bet_address(&lock, player);
        if self.ledger.exists::<Bet>(&address)? {
            return Err(SequencingError::DuplicateBet {
                game: *game,
                round,
                player: *player,
            }
            .into());
        }

        let reward_ceiling = state.max_odd.mul_u64(stake)?;
        let mut vault = self.vault(game)?;
        vault.bet(stake, reward_ceiling)?;
        state.open_bets = state
            .open_bets
            .checked_add(1)
            .ok_or_else(|| ArithmeticError::AmountOverflow("open bet count".to_string()))?;

        let bet = Bet {
            game: *game,
            round,
            player: *player,
            stake,
            cash_out,
            reward_ceiling,
            settlement: None,
        };

        let mut writes = WriteSet::new();
        writes.put(game, &state)?;
        writes.put(game, &vault)?;
        writes.put(&address, &bet)?;
        self.commit_with_transfer(writes, player, &state.pool, stake)?;

        self.metrics.record_bet(stake);
        tracing::info!(
            game = %game,
            round,
            bet = %address,
            player = %player,
            stake,
            reward_ceiling,
            "Bet placed"
        );
        Ok(address)
    }

    /// Deletes a settled bet. Only its player may close it.
    pub fn close_bet(&self, player: &Address, game: &Address, round: u64) -> FairroundResult<()> {
        let writer = self.writer(game);
        let _guard = lock_writer(&writer)?;

        let address = bet_address(&lock_address(game, round), player);
        let bet = self
            .ledger
            .read::<Bet>(&address)?
            .ok_or(IntegrityError::UnknownBet { bet: address, player: *player })?;
        if bet.player != *player {
            return Err(wrong_signer("close_bet", address, bet.player, *player));
        }
        if bet.settlement.is_none() {
            return Err(SequencingError::BetNotSettled { bet: address }.into());
        }

        let mut writes = WriteSet::new();
        writes.delete::<Bet>(&address);
        self.ledger.commit(writes)?;

        tracing::info!(game = %game, round, bet = %address, "Bet closed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commit / reveal
    // ------------------------------------------------------------------

    /// Open → Locked. Writes the Lock with its seed and advances `next_round`.
    ///
    /// The previous round must be fulfilled with every bet settled, so the
    /// operator can never strand funds by moving on.
    pub fn seal_round(&self, operator: &Address, game: &Address, round: u64) -> FairroundResult<SealedRound> {
        let writer = self.writer(game);
        let _guard = lock_writer(&writer)?;

        let mut state = self.game(game)?;
        if state.operator != *operator {
            return Err(wrong_signer("seal_round", *game, state.operator, *operator));
        }
        if round < state.next_round {
            return Err(SequencingError::AlreadySealed { game: *game, round }.into());
        }
        if round > state.next_round {
            return Err(IntegrityError::UnknownRound { game: *game, round }.into());
        }

        if let Some(prev) = round.checked_sub(1) {
            let prior = self
                .lock(game, prev)?
                .ok_or(IntegrityError::UnknownRound { game: *game, round: prev })?;
            if prior.randomness.is_none() {
                return Err(SequencingError::RoundNotFulfilled { game: *game, round: prev }.into());
            }
            if prior.unsettled_bets > 0 {
                tracing::warn!(game = %game, round = prev, unsettled = prior.unsettled_bets, "Seal refused: prior round unsettled");
                return Err(SequencingError::PriorRoundUnsettled {
                    game: *game,
                    round: prev,
                    unsettled: prior.unsettled_bets,
                }
                .into());
            }
        }

        let lock_addr = lock_address(game, round);
        if self.ledger.exists::<Lock>(&lock_addr)? {
            return Err(SequencingError::AlreadySealed { game: *game, round }.into());
        }

        let seed = derive_seed(&lock_addr, &state.last_randomness);
        let lock = Lock {
            game: *game,
            round,
            seed,
            prev_randomness: state.last_randomness,
            randomness: None,
            win_rate: state.win_rate,
            max_odd: state.max_odd,
            bets: state.open_bets,
            unsettled_bets: state.open_bets,
        };
        state.next_round = round
            .checked_add(1)
            .ok_or_else(|| ArithmeticError::AmountOverflow("round counter".to_string()))?;
        state.open_bets = 0;

        let mut writes = WriteSet::new();
        writes.put(game, &state)?;
        writes.put(&lock_addr, &lock)?;
        self.ledger.commit(writes)?;

        self.metrics.record_seal();
        tracing::info!(game = %game, round, lock = %lock_addr, bets = lock.bets, seed = %hex::encode(seed), "Round sealed");

        Ok(SealedRound {
            game: *game,
            round,
            lock: lock_addr,
            seed,
        })
    }

    /// Seals the round and submits its seed to the oracle.
    ///
    /// If the request fails after the seal committed, the round stays Locked;
    /// call [`Self::request_round_randomness`] to resubmit the same seed.
    pub async fn seal_and_request<O>(
        &self,
        operator: &Address,
        game: &Address,
        round: u64,
        commitment: &RandomnessCommitment<O>,
    ) -> FairroundResult<SealedRound>
    where
        O: RandomnessOracle + ?Sized,
    {
        let sealed = self.seal_round(operator, game, round)?;
        commitment.request_randomness(&sealed.seed).await?;
        Ok(sealed)
    }

    /// Submits (or resubmits) the stored seed of a Locked round.
    pub async fn request_round_randomness<O>(
        &self,
        game: &Address,
        round: u64,
        commitment: &RandomnessCommitment<O>,
    ) -> FairroundResult<RequestHandle>
    where
        O: RandomnessOracle + ?Sized,
    {
        let lock = self
            .lock(game, round)?
            .ok_or(SequencingError::RoundNotSealed { game: *game, round })?;
        commitment.request_randomness(&lock.seed).await
    }

    /// Locked → Fulfilled. Writing the same bytes twice is a no-op; writing
    /// different bytes over existing randomness is rejected.
    pub fn fulfill_round(&self, game: &Address, round: u64, randomness: Randomness) -> FairroundResult<Fulfillment> {
        let writer = self.writer(game);
        let _guard = lock_writer(&writer)?;

        let mut state = self.game(game)?;
        let lock_addr = lock_address(game, round);
        let mut lock = self
            .ledger
            .read::<Lock>(&lock_addr)?
            .ok_or(SequencingError::RoundNotSealed { game: *game, round })?;

        match lock.randomness {
            Some(existing) if existing == randomness => {
                tracing::debug!(game = %game, round, "Round already fulfilled");
                return Ok(Fulfillment::AlreadyFulfilled);
            }
            Some(_) => {
                tracing::warn!(game = %game, round, "Conflicting randomness for fulfilled round");
                return Err(IntegrityError::RandomnessAlreadyWritten { game: *game, round }.into());
            }
            None => {}
        }

        lock.randomness = Some(randomness);
        let mut writes = WriteSet::new();
        if round.checked_add(1) == Some(state.next_round) {
            state.last_randomness = randomness;
            writes.put(game, &state)?;
        }
        writes.put(&lock_addr, &lock)?;
        self.ledger.commit(writes)?;

        self.metrics.record_fulfillment();
        tracing::info!(game = %game, round, lock = %lock_addr, "Randomness fulfilled");
        Ok(Fulfillment::Written)
    }

    /// Waits for the oracle to fulfill a Locked round and records it.
    /// Already-fulfilled rounds return their stored randomness at once.
    pub async fn await_and_fulfill<O>(
        &self,
        game: &Address,
        round: u64,
        commitment: &RandomnessCommitment<O>,
        durability: Option<Durability>,
    ) -> FairroundResult<Randomness>
    where
        O: RandomnessOracle + ?Sized,
    {
        let lock = self
            .lock(game, round)?
            .ok_or(SequencingError::RoundNotSealed { game: *game, round })?;
        if let Some(randomness) = lock.randomness {
            return Ok(randomness);
        }

        let durability = durability.unwrap_or_else(|| commitment.default_durability());
        let randomness = match commitment.await_fulfillment(&lock.seed, durability).await {
            Ok(randomness) => randomness,
            Err(e @ FairroundError::Oracle(OracleError::RandomnessTimeout { .. })) => {
                self.metrics.record_oracle_timeout();
                tracing::warn!(game = %game, round, "Round stuck waiting for randomness");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.fulfill_round(game, round, randomness)?;
        Ok(randomness)
    }

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    /// Settles one bet against the operator's attestations. Anyone may
    /// submit the proof; the payout always goes to the bet's player.
    pub fn settle_bet(
        &self,
        game: &Address,
        round: u64,
        player: &Address,
        proof: &SettlementProof,
    ) -> FairroundResult<SettlementReceipt> {
        let writer = self.writer(game);
        let _guard = lock_writer(&writer)?;

        let state = self.game(game)?;
        let lock_addr = lock_address(game, round);
        let address = bet_address(&lock_addr, player);

        let mut bet = self
            .ledger
            .read::<Bet>(&address)?
            .ok_or(IntegrityError::UnknownBet { bet: address, player: *player })?;
        if bet.settlement.is_some() {
            return Err(SequencingError::AlreadySettled { bet: address }.into());
        }

        let mut lock = self
            .ledger
            .read::<Lock>(&lock_addr)?
            .ok_or(SequencingError::RoundNotSealed { game: *game, round })?;

        let view = RoundView {
            game: *game,
            round,
            operator: state.operator,
            win_rate: lock.win_rate,
            stored_randomness: lock.randomness.as_ref(),
        };
        let crash_point = match authorize_settlement(&view, &address, proof) {
            Ok(point) => point,
            Err(e) => {
                if e.is_permanent_rejection() {
                    self.metrics.record_rejected_settlement();
                }
                tracing::warn!(game = %game, round, bet = %address, error = %e, "Settlement rejected");
                return Err(e);
            }
        };

        let resolution = resolve(bet.stake, bet.cash_out, crash_point, lock.max_odd, bet.reward_ceiling)?;

        let mut vault = self.vault(game)?;
        vault.settle(bet.stake, bet.reward_ceiling, resolution.payout)?;
        lock.unsettled_bets = lock
            .unsettled_bets
            .checked_sub(1)
            .ok_or_else(|| ArithmeticError::AmountUnderflow(format!("unsettled bets of round {}", round)))?;
        bet.settlement = Some(BetSettlement {
            outcome: resolution.outcome,
            crash_point,
            payout: resolution.payout,
        });

        let mut writes = WriteSet::new();
        writes.put(game, &vault)?;
        writes.put(&lock_addr, &lock)?;
        writes.put(&address, &bet)?;
        self.commit_with_transfer(writes, &state.pool, player, resolution.payout)?;

        self.metrics.record_settlement(resolution.payout);
        if resolution.clamped {
            tracing::warn!(game = %game, round, bet = %address, ceiling = bet.reward_ceiling, "Payout clamped to reward ceiling");
        }
        tracing::info!(
            game = %game,
            round,
            bet = %address,
            crash_point = %crash_point,
            outcome = ?resolution.outcome,
            payout = resolution.payout,
            "Bet settled"
        );

        Ok(SettlementReceipt {
            game: *game,
            round,
            bet: address,
            player: *player,
            crash_point,
            outcome: resolution.outcome,
            payout: resolution.payout,
            clamped: resolution.clamped,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn writer(&self, game: &Address) -> Arc<Mutex<()>> {
        self.writers
            .entry(*game)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Moves tokens and commits the write set as one unit: if the commit
    /// fails the transfer is reversed.
    fn commit_with_transfer(&self, writes: WriteSet, from: &Address, to: &Address, amount: u64) -> FairroundResult<()> {
        self.bank.transfer(from, to, amount)?;
        if let Err(e) = self.ledger.commit(writes) {
            if let Err(refund) = self.bank.transfer(to, from, amount) {
                tracing::error!(from = %from, to = %to, amount, error = %refund, "Failed to reverse transfer after commit failure");
            }
            return Err(e);
        }
        Ok(())
    }
}

fn lock_writer(writer: &Mutex<()>) -> FairroundResult<std::sync::MutexGuard<'_, ()>> {
    writer
        .lock()
        .map_err(|_| StorageError::WriteFailed("game writer guard poisoned".to_string()).into())
}
