//! fairround operator CLI
//!
//! Offline tools for deriving crash points, producing and checking operator
//! attestations, and running a full round against the in-process oracle.

use clap::{Parser, Subcommand};
use fairround::addressing::{bet_address, lock_address};
use fairround::common::config::StorageBackend;
use fairround::crash::{self, CashOut};
use fairround::logging::init_tracing;
use fairround::round::GameParams;
use fairround::{
    attestation, Address, ConfigLoader, CrashEngine, Durability, FairroundConfig, Fraction, Ledger,
    LocalOracle, MemoryBank, MemoryLedger, OperatorSigner, Randomness, RandomnessCommitment,
    RocksLedger, SignatureBytes,
};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "fairround")]
#[command(about = "Provably-fair crash round tooling", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive the crash point from a randomness signature
    Derive {
        /// 64-byte operator signature over the randomness (hex)
        #[arg(long)]
        signature: String,

        /// Win rate as n/d (defaults to the configured value)
        #[arg(long)]
        win_rate: Option<String>,
    },

    /// Sign randomness or a bet message with an operator key
    Attest {
        /// 32-byte ed25519 secret key (hex)
        #[arg(long)]
        secret: String,

        #[command(subcommand)]
        what: AttestTarget,
    },

    /// Check an ed25519 signature
    Verify {
        /// 32-byte public key (hex)
        #[arg(long)]
        public_key: String,

        /// Signed message (hex)
        #[arg(long)]
        message: String,

        /// 64-byte signature (hex)
        #[arg(long)]
        signature: String,
    },

    /// Run rounds end to end against the in-process oracle
    Simulate {
        #[arg(long, default_value = "1")]
        rounds: u64,

        #[arg(long, default_value = "4")]
        players: u8,

        #[arg(long, default_value = "1000000")]
        stake: u64,

        /// Preset cash-out point for odd-numbered players (n/d)
        #[arg(long, default_value = "3/2")]
        cash_out: String,

        /// Pool liquidity seeded by the owner
        #[arg(long, default_value = "1000000000")]
        liquidity: u64,
    },

    /// Print or write the effective configuration
    Config {
        /// Write the configuration to this path instead of printing it
        #[arg(long)]
        write: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum AttestTarget {
    /// Sign the raw randomness bytes
    Randomness {
        #[arg(long)]
        randomness: String,
    },
    /// Sign the bet message for a bet address and crash point
    Bet {
        #[arg(long)]
        bet: String,

        #[arg(long)]
        crash_point: String,
    },
    /// Build the full settlement proof for one bet (JSON)
    Proof {
        #[arg(long)]
        randomness: String,

        #[arg(long)]
        bet: String,

        #[arg(long)]
        win_rate: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(ref path) = cli.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;
    init_tracing(&config.logging.filter);

    match cli.command {
        Command::Derive { signature, win_rate } => {
            let signature = SignatureBytes::from_hex(&signature)?;
            let win_rate = parse_or(win_rate, config.game.win_rate)?;
            let r = crash::sample(signature.as_ref());
            let point = crash::crash_point(signature.as_ref(), win_rate)?;
            println!("sample:      {}", r);
            println!("crash point: {}", point);
            println!("at 1e6:      {}", point.mul_u64(1_000_000).unwrap_or(u64::MAX));
        }
        Command::Attest { secret, what } => {
            let signer = OperatorSigner::from_secret_hex(&secret)?;
            match what {
                AttestTarget::Randomness { randomness } => {
                    let randomness = Randomness::from_hex(&randomness)?;
                    println!("{}", signer.attest_randomness(&randomness));
                }
                AttestTarget::Bet { bet, crash_point } => {
                    let bet = Address::from_hex(&bet)?;
                    let point = Fraction::parse(&crash_point)?;
                    println!("{}", signer.attest_bet(&bet, point));
                }
                AttestTarget::Proof { randomness, bet, win_rate } => {
                    let randomness = Randomness::from_hex(&randomness)?;
                    let bet = Address::from_hex(&bet)?;
                    let win_rate = parse_or(win_rate, config.game.win_rate)?;
                    let proof = signer.settlement_proof(&randomness, &bet, win_rate)?;
                    println!("{}", serde_json::to_string_pretty(&proof)?);
                }
            }
        }
        Command::Verify { public_key, message, signature } => {
            let public_key = Address::from_hex(&public_key)?;
            let message = hex::decode(message.trim_start_matches("0x"))?;
            let signature = SignatureBytes::from_hex(&signature)?;
            if attestation::verify(&public_key, &message, &signature) {
                println!("valid");
            } else {
                println!("invalid");
                std::process::exit(1);
            }
        }
        Command::Simulate { rounds, players, stake, cash_out, liquidity } => {
            let cash_out = Fraction::parse(&cash_out)?;
            let plan = SimulationPlan { rounds, players, stake, cash_out, liquidity };
            match config.storage.backend {
                StorageBackend::Memory => simulate(Arc::new(MemoryLedger::new()), &config, plan).await?,
                StorageBackend::Rocksdb => {
                    let ledger = RocksLedger::open(&config.storage.data_directory)?;
                    simulate(Arc::new(ledger), &config, plan).await?
                }
            }
        }
        Command::Config { write } => match write {
            Some(path) => {
                loader.save(&config, &path)?;
                println!("Configuration written to {}", path);
            }
            None => print!("{}", toml::to_string_pretty(&config)?),
        },
    }

    Ok(())
}

fn parse_or(value: Option<String>, default: Fraction) -> Result<Fraction, Box<dyn std::error::Error>> {
    match value {
        Some(v) => Ok(Fraction::parse(&v)?),
        None => Ok(default),
    }
}

struct SimulationPlan {
    rounds: u64,
    players: u8,
    stake: u64,
    cash_out: Fraction,
    liquidity: u64,
}

async fn simulate<L: Ledger>(
    ledger: Arc<L>,
    config: &FairroundConfig,
    plan: SimulationPlan,
) -> Result<(), Box<dyn std::error::Error>> {
    let bank = Arc::new(MemoryBank::new());
    let engine = CrashEngine::new(ledger, bank.clone());

    let oracle = Arc::new(LocalOracle::new_random().with_auto_fulfill(Durability::Finalized));
    let commitment = RandomnessCommitment::new(oracle, config.oracle.clone());

    let operator = OperatorSigner::generate();
    let owner = Address::new([0xee; 32]);
    let game_index = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let game = engine.create_game(
        &owner,
        GameParams {
            game_index,
            operator: operator.identity(),
            win_rate: config.game.win_rate,
            max_odd: config.game.max_odd,
        },
    )?;
    bank.mint(&owner, plan.liquidity)?;
    engine.deposit(&owner, &game, plan.liquidity)?;

    let players: Vec<Address> = (1..=plan.players).map(|i| Address::new([i; 32])).collect();

    for round in 0..plan.rounds {
        for (i, player) in players.iter().enumerate() {
            let cash_out = if i % 2 == 1 {
                CashOut::PresetPoint(plan.cash_out)
            } else {
                CashOut::NoPresetPoint
            };
            bank.mint(player, plan.stake)?;
            engine.place_bet(player, &game, round, plan.stake, cash_out)?;
        }

        engine.seal_and_request(&operator.identity(), &game, round, &commitment).await?;
        let randomness = engine.await_and_fulfill(&game, round, &commitment, None).await?;
        let lock = engine
            .lock(&game, round)?
            .ok_or("sealed round has no lock")?;

        for player in &players {
            let bet = bet_address(&lock_address(&game, round), player);
            let proof = operator.settlement_proof(&randomness, &bet, lock.win_rate)?;
            let receipt = engine.settle_bet(&game, round, player, &proof)?;
            println!("{}", serde_json::to_string(&receipt)?);
            engine.close_bet(player, &game, round)?;
        }
    }

    let vault = engine.vault(&game)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "game": game,
            "metrics": engine.metrics().snapshot(),
            "elapsed_ms": engine.metrics().uptime().as_millis() as u64,
            "pool_liquidity": vault.liquidity,
            "pool_reserve": vault.reserve,
        }))?
    );
    Ok(())
}
