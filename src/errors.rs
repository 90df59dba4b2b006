//! Error taxonomy for the fairround settlement protocol
//!
//! Every failure is terminal for the operation that raised it. Variants carry
//! the game address and round index (or bet address) so a rejected call can
//! be diagnosed from the error alone.

use crate::common::types::Address;

/// Root error type for all fairround operations
#[derive(Debug, thiserror::Error)]
pub enum FairroundError {
    /// Bad game parameters or configuration file
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Operation issued in the wrong round phase
    #[error("Sequencing error: {0}")]
    Sequencing(#[from] SequencingError),

    /// Wrong signer or forged attestation
    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    /// Stored or supplied data does not match what the protocol expects
    #[error("Data integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// Randomness oracle failures
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Overflow in money-bearing arithmetic
    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    /// Ledger backend failures
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Token movement failures
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),
}

/// Game creation and configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Invalid fraction {numerator}/{denominator}: denominator must be non-zero")]
    InvalidFraction { numerator: u64, denominator: u64 },

    #[error("Invalid win rate {0}: must satisfy 0 < win_rate <= 1 with lowest terms below 2^32")]
    InvalidWinRate(String),

    #[error("Invalid max odd {0}: must be greater than 1")]
    InvalidMaxOdd(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Round lifecycle ordering violations
#[derive(Debug, thiserror::Error)]
pub enum SequencingError {
    #[error("Round {round} of game {game} is already sealed; bets are closed")]
    BettingClosed { game: Address, round: u64 },

    #[error("Player {player} already has a bet in round {round} of game {game}")]
    DuplicateBet {
        game: Address,
        round: u64,
        player: Address,
    },

    #[error("Round {round} of game {game} is already sealed")]
    AlreadySealed { game: Address, round: u64 },

    #[error("Round {round} of game {game} has not been sealed")]
    RoundNotSealed { game: Address, round: u64 },

    #[error("Round {round} of game {game} has no fulfilled randomness yet")]
    RoundNotFulfilled { game: Address, round: u64 },

    #[error("Round {round} of game {game} still has {unsettled} unsettled bets")]
    PriorRoundUnsettled {
        game: Address,
        round: u64,
        unsettled: u64,
    },

    #[error("Bet {bet} has already been settled")]
    AlreadySettled { bet: Address },

    #[error("Bet {bet} cannot be closed before it is settled")]
    BetNotSettled { bet: Address },
}

/// Signer and attestation failures
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("{action} on {entity} requires signer {expected}, got {actual}")]
    WrongSigner {
        action: &'static str,
        entity: Address,
        expected: Address,
        actual: Address,
    },

    #[error("Invalid {kind} attestation for round {round} of game {game}")]
    InvalidAttestation {
        kind: AttestationKind,
        game: Address,
        round: u64,
    },
}

/// Which of the two settlement signatures failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationKind {
    Randomness,
    Bet,
}

impl std::fmt::Display for AttestationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttestationKind::Randomness => write!(f, "randomness"),
            AttestationKind::Bet => write!(f, "bet"),
        }
    }
}

/// Mismatched or malformed data
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("Supplied randomness does not match the stored randomness of round {round} of game {game}")]
    StaleRandomness { game: Address, round: u64 },

    #[error("Round {round} of game {game} already holds different randomness")]
    RandomnessAlreadyWritten { game: Address, round: u64 },

    #[error("Malformed {field}: expected {expected} bytes, got {actual}")]
    MalformedField {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Corrupted {kind} entity at {address}: {reason}")]
    CorruptedEntity {
        kind: &'static str,
        address: Address,
        reason: String,
    },

    #[error("Unknown game {0}")]
    UnknownGame(Address),

    #[error("Game {game} already exists")]
    GameExists { game: Address },

    #[error("Unknown round {round} of game {game}")]
    UnknownRound { game: Address, round: u64 },

    #[error("Unknown bet {bet} for player {player}")]
    UnknownBet { bet: Address, player: Address },

    #[error("Invalid bet: {0}")]
    InvalidBet(String),
}

/// Randomness oracle failures
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Randomness for seed {seed} not fulfilled within {timeout_ms}ms; round is stuck")]
    RandomnessTimeout { seed: String, timeout_ms: u64 },

    #[error("Oracle transport failure: {0}")]
    Transport(String),

    #[error("Oracle rejected request for seed {seed}: {reason}")]
    Rejected { seed: String, reason: String },
}

/// Overflow in fraction or amount arithmetic
#[derive(Debug, thiserror::Error)]
pub enum ArithmeticError {
    #[error("Fraction overflow multiplying {left} by {right}")]
    FractionOverflow { left: String, right: String },

    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    #[error("Amount underflow: {0}")]
    AmountUnderflow(String),
}

/// Ledger backend errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Token transfer capability errors
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Insufficient funds in {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: Address,
        balance: u64,
        requested: u64,
    },

    #[error("Insufficient pool liquidity for game {game}: free {free}, required {required}")]
    InsufficientLiquidity {
        game: Address,
        free: u64,
        required: u64,
    },

    #[error("Insufficient LP shares for {provider}: held {held}, requested {requested}")]
    InsufficientShares {
        provider: Address,
        held: u64,
        requested: u64,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl FairroundError {
    /// Errors that may succeed if the same call is repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FairroundError::Oracle(OracleError::RandomnessTimeout { .. })
                | FairroundError::Oracle(OracleError::Transport(_))
                | FairroundError::Sequencing(SequencingError::RoundNotFulfilled { .. })
        )
    }

    /// Errors that will never succeed with the same inputs.
    pub fn is_permanent_rejection(&self) -> bool {
        matches!(
            self,
            FairroundError::Authorization(AuthorizationError::InvalidAttestation { .. })
                | FairroundError::Integrity(IntegrityError::StaleRandomness { .. })
        )
    }

    pub fn is_already_settled(&self) -> bool {
        matches!(
            self,
            FairroundError::Sequencing(SequencingError::AlreadySettled { .. })
        )
    }
}

impl From<std::io::Error> for FairroundError {
    fn from(e: std::io::Error) -> Self {
        FairroundError::Storage(StorageError::Io(e.to_string()))
    }
}

// Convenience type alias for Results
pub type FairroundResult<T> = Result<T, FairroundError>;
