//! Ledger Inspection Tool
//!
//! Read-only CLI to check wallets, rounds, bet stakes and pending wagers in
//! a wagerbank database without going through the engine.
//!
//! Usage:
//!   cargo run --bin ledger-inspect -- wallets
//!   cargo run --bin ledger-inspect -- --db-path ./wagerbank.db round
//!   cargo run --bin ledger-inspect -- bet --bet-id 3
//!   cargo run --bin ledger-inspect -- pending --user-id 7

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use wagerbank::Config;

#[derive(Parser, Debug)]
#[command(name = "ledger-inspect")]
#[command(about = "Inspect a wagerbank ledger database")]
struct Cli {
    /// Path to the SQLite database; defaults to DATABASE_PATH
    #[arg(short, long)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List all wallets with their balances
    Wallets,

    /// Show the active round and its bankroll entries
    Round,

    /// List all recorded rounds
    Rounds,

    /// Show a bet with its options and stake totals
    Bet {
        #[arg(short, long)]
        bet_id: i64,
    },

    /// List a user's pending wagers
    Pending {
        #[arg(short, long)]
        user_id: i64,
    },

    /// Dump wallets and rounds as a JSON snapshot
    Export,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wagerbank=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let db_path = cli.db_path.unwrap_or(config.database_path);

    let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open database: {}", db_path))?;

    if !matches!(cli.command, Commands::Export) {
        println!("Database: {}", db_path);
        println!();
    }

    match cli.command {
        Commands::Wallets => list_wallets(&conn)?,
        Commands::Round => show_active_round(&conn)?,
        Commands::Rounds => list_rounds(&conn)?,
        Commands::Bet { bet_id } => show_bet(&conn, bet_id)?,
        Commands::Pending { user_id } => list_pending(&conn, user_id)?,
        Commands::Export => export_snapshot(&conn)?,
    }

    Ok(())
}

fn export_snapshot(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT w.user_id, COALESCE(u.display_name, '?'), w.balance
         FROM wallets w LEFT JOIN users u ON u.id = w.user_id ORDER BY w.user_id",
    )?;
    let wallets = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "user_id": row.get::<_, i64>(0)?,
                "display_name": row.get::<_, String>(1)?,
                "balance": row.get::<_, i64>(2)?,
            }))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut stmt =
        conn.prepare("SELECT id, status, created_at FROM rounds ORDER BY id")?;
    let rounds = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, i64>(0)?,
                "status": row.get::<_, String>(1)?,
                "created_at": row.get::<_, String>(2)?,
            }))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let snapshot = serde_json::json!({
        "wallets": wallets,
        "rounds": rounds,
    });
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn list_wallets(conn: &Connection) -> Result<()> {
    println!("=== Wallets ===\n");

    let mut stmt = conn.prepare(
        "SELECT w.user_id, COALESCE(u.display_name, '?'), w.balance
         FROM wallets w LEFT JOIN users u ON u.id = w.user_id
         ORDER BY w.balance DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut total = 0;
    let mut count = 0;
    for row in rows {
        let (user_id, name, balance) = row?;
        println!("  user {:<6} {:<20} {:>8}", user_id, name, balance);
        total += balance;
        count += 1;
    }
    println!("\n{} wallets, {} credits total", count, total);
    Ok(())
}

fn show_active_round(conn: &Connection) -> Result<()> {
    println!("=== Active Round ===\n");

    let active: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, created_at FROM rounds WHERE status = 'active'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((round_id, created_at)) = active else {
        println!("No active round.");
        return Ok(());
    };
    println!("Round {} (started {})\n", round_id, created_at);

    let mut stmt = conn.prepare(
        "SELECT user_id, balance, from_wallet FROM bankroll_entries
         WHERE round_id = ?1 ORDER BY balance DESC, user_id ASC",
    )?;
    let rows = stmt.query_map(params![round_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    for row in rows {
        let (user_id, balance, from_wallet) = row?;
        let marker = if from_wallet != 0 { "wallet-seeded" } else { "" };
        println!("  user {:<6} {:>8} {}", user_id, balance, marker);
    }
    Ok(())
}

fn list_rounds(conn: &Connection) -> Result<()> {
    println!("=== Rounds ===\n");

    let mut stmt =
        conn.prepare("SELECT id, status, created_at FROM rounds ORDER BY id DESC")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    for row in rows {
        let (id, status, created_at) = row?;
        println!("  round {:<6} {:<8} {}", id, status, created_at);
    }
    Ok(())
}

fn show_bet(conn: &Connection, bet_id: i64) -> Result<()> {
    let bet: Option<(Option<i64>, String, String, String)> = conn
        .query_row(
            "SELECT round_id, question, kind, status FROM bets WHERE id = ?1",
            params![bet_id],
            |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            },
        )
        .optional()?;

    let Some((round_id, question, kind, status)) = bet else {
        println!("Bet {} not found.", bet_id);
        return Ok(());
    };

    println!("=== Bet {} ===\n", bet_id);
    println!("Question: {}", question);
    println!("Kind: {}  Status: {}", kind, status);
    match round_id {
        Some(r) => println!("Round: {}", r),
        None => println!("Round: none"),
    }
    println!();

    let mut stmt = conn.prepare(
        "SELECT o.id, o.label, o.is_winner, COALESCE(SUM(w.amount), 0), COUNT(w.id)
         FROM bet_options o
         LEFT JOIN wagers w ON w.option_id = o.id
         WHERE o.bet_id = ?1
         GROUP BY o.id, o.label, o.is_winner
         ORDER BY o.id",
    )?;
    let rows = stmt.query_map(params![bet_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
        ))
    })?;

    for row in rows {
        let (option_id, label, is_winner, staked, wagers) = row?;
        let marker = if is_winner != 0 { "WINNER" } else { "" };
        println!(
            "  option {:<4} {:<24} {:>8} staked across {} wagers {}",
            option_id, label, staked, wagers, marker
        );
    }
    Ok(())
}

fn list_pending(conn: &Connection, user_id: i64) -> Result<()> {
    println!("=== Pending wagers for user {} ===\n", user_id);

    let mut stmt = conn.prepare(
        "SELECT id, bet_id, option_id, amount, pool, placed_at
         FROM wagers WHERE user_id = ?1 AND result = 'pending' ORDER BY id",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut count = 0;
    for row in rows {
        let (id, bet_id, option_id, amount, pool, placed_at) = row?;
        println!(
            "  wager {:<5} bet {:<5} option {:<5} {:>8} from {:<8} at {}",
            id, bet_id, option_id, amount, pool, placed_at
        );
        count += 1;
    }
    if count == 0 {
        println!("  none");
    }
    Ok(())
}
