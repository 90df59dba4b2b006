//! Full round lifecycle against the in-memory ledger and bank

use fairround::addressing::{bet_address, lock_address};
use fairround::common::config::OracleConfig;
use fairround::crash::{self, BetOutcome, CashOut};
use fairround::errors::{
    AttestationKind, AuthorizationError, FairroundError, IntegrityError, SequencingError,
};
use fairround::round::{GameParams, RoundPhase};
use fairround::{
    Address, CrashEngine, Durability, Fraction, LocalOracle, MemoryBank, MemoryLedger,
    OperatorSigner, Randomness, RandomnessCommitment, SignatureBytes, TokenTransfer,
};
use std::sync::Arc;

const STAKE: u64 = 1_000_000;
const LIQUIDITY: u64 = 10_000_000_000;

struct Harness {
    engine: Arc<CrashEngine<MemoryLedger, MemoryBank>>,
    owner: Address,
    signer: OperatorSigner,
    game: Address,
}

impl Harness {
    fn new() -> Self {
        let engine = Arc::new(CrashEngine::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(MemoryBank::new()),
        ));
        let owner = Address::new([0xaa; 32]);
        let signer = OperatorSigner::from_secret_bytes(&[0x42; 32]);
        let game = engine
            .create_game(
                &owner,
                GameParams {
                    game_index: 1,
                    operator: signer.identity(),
                    win_rate: win_rate(),
                    max_odd: Fraction::from_integer(10),
                },
            )
            .expect("create game");
        engine.bank().mint(&owner, LIQUIDITY).unwrap();
        engine.deposit(&owner, &game, LIQUIDITY).unwrap();
        Self { engine, owner, signer, game }
    }

    fn operator(&self) -> Address {
        self.signer.identity()
    }

    fn funded_player(&self, tag: u8) -> Address {
        let player = Address::new([tag; 32]);
        self.engine.bank().mint(&player, 100 * STAKE).unwrap();
        player
    }

    fn balance(&self, account: &Address) -> u64 {
        self.engine.bank().balance(account).unwrap()
    }

    fn bet_of(&self, round: u64, player: &Address) -> Address {
        bet_address(&lock_address(&self.game, round), player)
    }

    /// Seals and fulfills `round` with the first candidate randomness whose
    /// crash point satisfies `accept`.
    fn seal_and_fulfill_where<F>(&self, round: u64, accept: F) -> (Randomness, Fraction)
    where
        F: Fn(Fraction) -> bool,
    {
        let (randomness, point) = find_randomness(&self.signer, accept);
        self.engine.seal_round(&self.operator(), &self.game, round).unwrap();
        self.engine.fulfill_round(&self.game, round, randomness).unwrap();
        (randomness, point)
    }

    fn settle(&self, round: u64, player: &Address, randomness: &Randomness) -> Result<fairround::SettlementReceipt, FairroundError> {
        let proof = self
            .signer
            .settlement_proof(randomness, &self.bet_of(round, player), win_rate())
            .unwrap();
        self.engine.settle_bet(&self.game, round, player, &proof)
    }
}

fn win_rate() -> Fraction {
    Fraction::new(95, 100).unwrap()
}

fn find_randomness<F>(signer: &OperatorSigner, accept: F) -> (Randomness, Fraction)
where
    F: Fn(Fraction) -> bool,
{
    for i in 0..=u16::MAX {
        let mut bytes = [0u8; 64];
        bytes[..2].copy_from_slice(&i.to_le_bytes());
        let randomness = Randomness::new(bytes);
        let sig = signer.attest_randomness(&randomness);
        let point = crash::crash_point(sig.as_ref(), win_rate()).unwrap();
        if accept(point) {
            return (randomness, point);
        }
    }
    panic!("no candidate randomness matched");
}

#[test]
fn test_bet_rejected_once_round_is_sealed() {
    let h = Harness::new();
    let early = h.funded_player(1);
    let late = h.funded_player(2);

    h.engine.place_bet(&early, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();
    h.engine.seal_round(&h.operator(), &h.game, 0).unwrap();

    let err = h.engine.place_bet(&late, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap_err();
    assert!(matches!(err, FairroundError::Sequencing(SequencingError::BettingClosed { round: 0, .. })));

    h.engine.fulfill_round(&h.game, 0, Randomness::new([1u8; 64])).unwrap();
    let err = h.engine.place_bet(&late, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap_err();
    assert!(matches!(err, FairroundError::Sequencing(SequencingError::BettingClosed { .. })));
    assert_eq!(h.balance(&late), 100 * STAKE);
}

#[test]
fn test_bet_validation() {
    let h = Harness::new();
    let player = h.funded_player(1);

    assert!(h.engine.place_bet(&player, &h.game, 0, 0, CashOut::NoPresetPoint).is_err());
    let too_high = CashOut::PresetPoint(Fraction::from_integer(11));
    assert!(h.engine.place_bet(&player, &h.game, 0, STAKE, too_high).is_err());
    let zero = CashOut::PresetPoint(Fraction::zero());
    assert!(h.engine.place_bet(&player, &h.game, 0, STAKE, zero).is_err());

    h.engine.place_bet(&player, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();
    let err = h.engine.place_bet(&player, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap_err();
    assert!(matches!(err, FairroundError::Sequencing(SequencingError::DuplicateBet { .. })));
    assert_eq!(h.balance(&player), 99 * STAKE);
}

#[test]
fn test_preset_point_at_or_below_crash_pays_floor() {
    let h = Harness::new();
    let player = h.funded_player(1);
    let point = Fraction::new(3, 2).unwrap();
    h.engine.place_bet(&player, &h.game, 0, STAKE, CashOut::PresetPoint(point)).unwrap();

    let (randomness, crash_point) = h.seal_and_fulfill_where(0, |p| p >= Fraction::new(3, 2).unwrap());
    let receipt = h.settle(0, &player, &randomness).unwrap();

    assert_eq!(receipt.crash_point, crash_point);
    assert_eq!(receipt.outcome, BetOutcome::Won);
    assert_eq!(receipt.payout, 1_500_000);
    assert_eq!(h.balance(&player), 99 * STAKE + 1_500_000);
}

#[test]
fn test_preset_point_above_crash_forfeits_stake() {
    let h = Harness::new();
    let player = h.funded_player(1);
    h.engine
        .place_bet(&player, &h.game, 0, STAKE, CashOut::PresetPoint(Fraction::from_integer(3)))
        .unwrap();

    let (randomness, _) = h.seal_and_fulfill_where(0, |p| p < Fraction::from_integer(3));
    let receipt = h.settle(0, &player, &randomness).unwrap();

    assert_eq!(receipt.outcome, BetOutcome::Lost);
    assert_eq!(receipt.payout, 0);
    assert_eq!(h.balance(&player), 99 * STAKE);

    let vault = h.engine.vault(&h.game).unwrap();
    assert_eq!(vault.reserve, 0);
    assert_eq!(vault.liquidity, LIQUIDITY + STAKE);
}

#[test]
fn test_no_preset_point_is_capped_at_max_odd() {
    let h = Harness::new();
    let player = h.funded_player(1);
    h.engine.place_bet(&player, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();

    let (randomness, _) = h.seal_and_fulfill_where(0, |p| p > Fraction::from_integer(10));
    let receipt = h.settle(0, &player, &randomness).unwrap();

    assert_eq!(receipt.payout, 10_000_000);
    assert!(!receipt.clamped);
}

#[test]
fn test_payout_never_exceeds_reward_ceiling() {
    let h = Harness::new();
    let player = h.funded_player(1);
    // Ceiling reserved at 10x, then the owner raises max-odd before the seal.
    h.engine.place_bet(&player, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();
    h.engine.set_max_odd(&h.owner, &h.game, Fraction::from_integer(1_000)).unwrap();

    let (randomness, _) = h.seal_and_fulfill_where(0, |p| p > Fraction::from_integer(20));
    let receipt = h.settle(0, &player, &randomness).unwrap();

    assert_eq!(receipt.payout, 10_000_000);
    assert!(receipt.clamped);
}

#[test]
fn test_altered_signatures_are_rejected() {
    let h = Harness::new();
    let player = h.funded_player(1);
    h.engine.place_bet(&player, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();
    let (randomness, _) = h.seal_and_fulfill_where(0, |_| true);

    let proof = h
        .signer
        .settlement_proof(&randomness, &h.bet_of(0, &player), win_rate())
        .unwrap();

    let mut bad = proof.clone();
    let mut sig = bad.randomness_signature.to_bytes();
    sig[0] ^= 0x01;
    bad.randomness_signature = SignatureBytes::new(sig);
    let err = h.engine.settle_bet(&h.game, 0, &player, &bad).unwrap_err();
    assert!(matches!(
        err,
        FairroundError::Authorization(AuthorizationError::InvalidAttestation { kind: AttestationKind::Randomness, .. })
    ));

    let mut bad = proof.clone();
    let mut sig = bad.bet_signature.to_bytes();
    sig[31] ^= 0x10;
    bad.bet_signature = SignatureBytes::new(sig);
    let err = h.engine.settle_bet(&h.game, 0, &player, &bad).unwrap_err();
    assert!(err.is_permanent_rejection());

    let mut stale = proof.clone();
    stale.randomness = Randomness::new([0xfe; 64]);
    let err = h.engine.settle_bet(&h.game, 0, &player, &stale).unwrap_err();
    assert!(matches!(err, FairroundError::Integrity(IntegrityError::StaleRandomness { .. })));

    // Rejections leave the bet payable with the genuine proof.
    assert_eq!(h.balance(&player), 99 * STAKE);
    h.engine.settle_bet(&h.game, 0, &player, &proof).unwrap();
    assert_eq!(h.engine.metrics().snapshot().rejected_settlements, 3);
}

#[test]
fn test_proof_signed_by_another_key_is_rejected() {
    let h = Harness::new();
    let player = h.funded_player(1);
    h.engine.place_bet(&player, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();
    let (randomness, _) = h.seal_and_fulfill_where(0, |_| true);

    let impostor = OperatorSigner::from_secret_bytes(&[0x13; 32]);
    let proof = impostor
        .settlement_proof(&randomness, &h.bet_of(0, &player), win_rate())
        .unwrap();
    let err = h.engine.settle_bet(&h.game, 0, &player, &proof).unwrap_err();
    assert!(err.is_permanent_rejection());
}

#[test]
fn test_double_settlement_has_no_balance_effect() {
    let h = Harness::new();
    let player = h.funded_player(1);
    h.engine.place_bet(&player, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();
    let (randomness, _) = h.seal_and_fulfill_where(0, |p| p >= Fraction::one());

    let first = h.settle(0, &player, &randomness).unwrap();
    let player_after = h.balance(&player);
    let vault_after = h.engine.vault(&h.game).unwrap();

    let err = h.settle(0, &player, &randomness).unwrap_err();
    assert!(err.is_already_settled());
    assert_eq!(h.balance(&player), player_after);
    assert_eq!(h.engine.vault(&h.game).unwrap(), vault_after);
    assert!(first.payout > 0);
}

#[test]
fn test_settlement_before_fulfillment_is_retryable() {
    let h = Harness::new();
    let player = h.funded_player(1);
    h.engine.place_bet(&player, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();
    h.engine.seal_round(&h.operator(), &h.game, 0).unwrap();

    let (randomness, _) = find_randomness(&h.signer, |_| true);
    let err = h.settle(0, &player, &randomness).unwrap_err();
    assert!(matches!(err, FairroundError::Sequencing(SequencingError::RoundNotFulfilled { .. })));
    assert!(err.is_retryable());

    h.engine.fulfill_round(&h.game, 0, randomness).unwrap();
    h.settle(0, &player, &randomness).unwrap();
}

#[test]
fn test_cannot_advance_past_unsettled_round() {
    let h = Harness::new();
    let a = h.funded_player(1);
    let b = h.funded_player(2);
    h.engine.place_bet(&a, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();
    h.engine.place_bet(&b, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();
    let (randomness, _) = h.seal_and_fulfill_where(0, |_| true);

    h.settle(0, &a, &randomness).unwrap();
    assert_eq!(h.engine.round_phase(&h.game, 0).unwrap(), RoundPhase::Settling);

    let err = h.engine.seal_round(&h.operator(), &h.game, 1).unwrap_err();
    assert!(matches!(
        err,
        FairroundError::Sequencing(SequencingError::PriorRoundUnsettled { round: 0, unsettled: 1, .. })
    ));

    h.settle(0, &b, &randomness).unwrap();
    assert_eq!(h.engine.round_phase(&h.game, 0).unwrap(), RoundPhase::Closed);
    h.engine.seal_round(&h.operator(), &h.game, 1).unwrap();
}

#[test]
fn test_settled_bet_can_be_closed() {
    let h = Harness::new();
    let player = h.funded_player(1);
    h.engine.place_bet(&player, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();
    let (randomness, _) = h.seal_and_fulfill_where(0, |_| true);
    h.settle(0, &player, &randomness).unwrap();

    h.engine.close_bet(&player, &h.game, 0).unwrap();
    assert!(h.engine.bet(&h.game, 0, &player).unwrap().is_none());
    let err = h.settle(0, &player, &randomness).unwrap_err();
    assert!(matches!(err, FairroundError::Integrity(IntegrityError::UnknownBet { .. })));
}

#[test]
fn test_withdraw_cannot_touch_reserved_liquidity() {
    let h = Harness::new();
    let player = h.funded_player(1);
    h.engine.place_bet(&player, &h.game, 0, STAKE, CashOut::NoPresetPoint).unwrap();

    let shares = h.engine.vault(&h.game).unwrap().shares_of(&h.owner);
    assert!(h.engine.withdraw(&h.owner, &h.game, shares).is_err());

    let (randomness, _) = h.seal_and_fulfill_where(0, |p| p < Fraction::one());
    let receipt = h.settle(0, &player, &randomness).unwrap();
    let paid = h.engine.withdraw(&h.owner, &h.game, shares).unwrap();
    assert_eq!(paid, LIQUIDITY + STAKE - receipt.payout);
    assert_eq!(h.balance(&h.owner), paid);
}

#[test]
fn test_concurrent_bets_and_seal_are_consistent() {
    let h = Harness::new();
    let players: Vec<Address> = (1..=32u8).map(|i| h.funded_player(i)).collect();

    let mut handles = Vec::new();
    for (i, player) in players.iter().copied().enumerate() {
        let engine = h.engine.clone();
        let game = h.game;
        let operator = h.operator();
        handles.push(std::thread::spawn(move || {
            if i == 16 {
                engine.seal_round(&operator, &game, 0).map(|_| None)
            } else {
                engine
                    .place_bet(&player, &game, 0, STAKE, CashOut::NoPresetPoint)
                    .map(|_| Some(player))
            }
        }));
    }

    let mut admitted = 0u64;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(Some(_)) => admitted += 1,
            Ok(None) => {}
            Err(FairroundError::Sequencing(SequencingError::BettingClosed { .. })) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let lock = h.engine.lock(&h.game, 0).unwrap().unwrap();
    assert_eq!(lock.bets, admitted);
    assert_eq!(h.engine.game(&h.game).unwrap().open_bets, 0);
    assert_eq!(h.engine.metrics().snapshot().bets_placed, admitted);
}

fn fast_oracle_config() -> OracleConfig {
    OracleConfig {
        timeout_ms: 300,
        poll_interval_ms: 5,
        request_retries: 2,
        durability: Durability::Confirmed,
    }
}

#[tokio::test]
async fn test_end_to_end_with_local_oracle() {
    let h = Harness::new();
    let oracle = Arc::new(LocalOracle::from_seed_bytes(&[9u8; 32]).unwrap().with_auto_fulfill(Durability::Finalized));
    let commitment = RandomnessCommitment::new(oracle.clone(), fast_oracle_config());
    let players: Vec<Address> = (1..=4u8).map(|i| h.funded_player(i)).collect();

    for round in 0..3u64 {
        for player in &players {
            h.engine.place_bet(player, &h.game, round, STAKE, CashOut::NoPresetPoint).unwrap();
        }
        let sealed = h
            .engine
            .seal_and_request(&h.operator(), &h.game, round, &commitment)
            .await
            .unwrap();
        let randomness = h
            .engine
            .await_and_fulfill(&h.game, round, &commitment, None)
            .await
            .unwrap();
        assert!(LocalOracle::verify(&oracle.public_key(), &sealed.seed, &randomness));

        for player in &players {
            let receipt = h.settle(round, player, &randomness).unwrap();
            assert!(receipt.payout <= 10 * STAKE);
        }
        assert_eq!(h.engine.round_phase(&h.game, round).unwrap(), RoundPhase::Closed);
        assert_eq!(h.engine.game(&h.game).unwrap().last_randomness, randomness);
    }

    let vault = h.engine.vault(&h.game).unwrap();
    assert_eq!(vault.reserve, 0);
    assert_eq!(vault.stake, 0);
    assert_eq!(oracle.request_count(), 3);
}

#[tokio::test]
async fn test_oracle_timeout_leaves_round_locked() {
    let h = Harness::new();
    let oracle = Arc::new(LocalOracle::from_seed_bytes(&[9u8; 32]).unwrap());
    let commitment = RandomnessCommitment::new(oracle.clone(), fast_oracle_config());

    let sealed = h
        .engine
        .seal_and_request(&h.operator(), &h.game, 0, &commitment)
        .await
        .unwrap();
    let err = h
        .engine
        .await_and_fulfill(&h.game, 0, &commitment, None)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.engine.round_phase(&h.game, 0).unwrap(), RoundPhase::Locked);
    assert_eq!(h.engine.metrics().snapshot().oracle_timeouts, 1);

    // Re-polling the same seed succeeds once the oracle catches up.
    let handle = h.engine.request_round_randomness(&h.game, 0, &commitment).await.unwrap();
    assert!(!handle.newly_accepted);
    oracle.fulfill(&sealed.seed, Durability::Finalized).unwrap();
    h.engine
        .await_and_fulfill(&h.game, 0, &commitment, Some(Durability::Finalized))
        .await
        .unwrap();
    assert_eq!(h.engine.round_phase(&h.game, 0).unwrap(), RoundPhase::Closed);
    assert_eq!(oracle.request_count(), 1);
}
