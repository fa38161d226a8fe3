//! # Demo Ledger Seeder
//!
//! Populates a ledger database with a day of pawnshop activity for
//! development.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in ledger.toml (or the platform default)
//! cargo run -p pawn-db --bin seed
//!
//! # Seed a specific file with more loans
//! cargo run -p pawn-db --bin seed -- --db ./data/ledger.db --loans 25
//! ```
//!
//! ## Generated Activity
//! - One cash session on `register-1` opened with 5,000.00
//! - Loans across both payment plans and all disbursement methods
//! - Partial payments on every other loan, a payoff on every fifth
//! - The session closed against its expected balance
//!
//! Logging follows `RUST_LOG` (default `info`).

use std::env;
use std::path::PathBuf;

use pawn_core::loan::NewLoan;
use pawn_core::{Money, PaymentMethod, PaymentPlanType, Rate};
use pawn_db::{migrations, Collaborators, Database, Ledger, LedgerConfig, NewPayment, OpenSession};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const OPERATOR: &str = "seed-operator";
const REGISTER: &str = "register-1";

/// Principal amounts in cents, cycled through.
const PRINCIPALS: &[i64] = &[15_000, 42_500, 80_000, 125_000, 9_900, 230_000, 61_000];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let mut loans: usize = 10;
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--loans" | "-n" => {
                if i + 1 < args.len() {
                    loans = args[i + 1].parse().unwrap_or(10);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Pawn Ledger Demo Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -n, --loans <N>      Number of loans to originate (default: 10)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("  -c, --config <PATH>  ledger.toml to load");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = LedgerConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = Some(path);
    }
    info!(path = ?config.database_path(), loans, "Seeding ledger");

    let db = Database::new(config.db_config()).await?;
    let missing = migrations::missing_accounts(db.pool(), &config.accounts).await?;
    if !missing.is_empty() {
        return Err(format!("accounts missing from the chart: {}", missing.join(", ")).into());
    }
    let ledger = Ledger::new(db, config.ledger_settings(), Collaborators::default());

    if ledger.cash().current_session_for_user(OPERATOR).await?.is_some() {
        warn!("Seed operator already has an open session; skipping to avoid duplicates");
        return Ok(());
    }

    let session = ledger
        .cash()
        .open_session(OpenSession {
            register_id: REGISTER.to_string(),
            user_id: OPERATOR.to_string(),
            opening_amount: Money::from_cents(500_000),
            notes: Some("Seeded session".to_string()),
        })
        .await?;

    let branch_id = ledger.settings().branch_id.clone();
    let mut created = 0;
    for index in 0..loans {
        let request = demo_loan(&branch_id, index);
        let loan = match ledger.loans().create_loan(request).await {
            Ok(loan) => loan,
            Err(err) => {
                warn!(index, error = %err, "Skipping loan");
                continue;
            }
        };
        created += 1;

        if index % 5 == 4 {
            let quote = ledger.loans().payoff_quote(&loan.id).await?;
            ledger
                .payments()
                .create_payment(demo_payment(&loan.id, quote.total, PaymentMethod::Cash))
                .await?;
        } else if index % 2 == 1 {
            let part = Money::from_cents(loan.interest_amount_cents + loan.loan_amount_cents / 10);
            ledger
                .payments()
                .create_payment(demo_payment(&loan.id, part, PaymentMethod::Card))
                .await?;
        }
    }

    let summary = ledger.cash().summary(&session.id).await?;
    let closed = ledger
        .cash()
        .close_session(&session.id, summary.current_balance, None, OPERATOR)
        .await?;

    let trial = ledger.accounting().trial_balance(chrono::Utc::now()).await?;
    println!();
    println!("Loans created:   {}", created);
    println!(
        "Session {}: closed with {} after {} movements",
        closed.session_number,
        summary.current_balance,
        summary.totals.income_count + summary.totals.expense_count
    );
    println!();
    println!("{:<6} {:<32} {:>14} {:>14}", "Code", "Account", "Debit", "Credit");
    for row in &trial.rows {
        if row.debit.is_zero() && row.credit.is_zero() {
            continue;
        }
        println!("{:<6} {:<32} {:>14} {:>14}", row.code, row.name, row.debit, row.credit);
    }
    println!(
        "{:<6} {:<32} {:>14} {:>14}",
        "", "Total", trial.total_debit, trial.total_credit
    );
    println!();
    println!("Balanced: {}", trial.is_balanced());

    Ok(())
}

fn demo_loan(branch_id: &str, index: usize) -> NewLoan {
    let installments = index % 3 == 2;
    let method = match index % 4 {
        3 => PaymentMethod::Transfer,
        _ => PaymentMethod::Cash,
    };
    NewLoan {
        branch_id: branch_id.to_string(),
        customer_id: format!("customer-{:03}", index % 6 + 1),
        item_id: format!("item-{:04}", index + 1),
        loan_amount: Money::from_cents(PRINCIPALS[index % PRINCIPALS.len()]),
        interest_rate: Rate::from_bps(350 + (index as u32 % 4) * 50),
        late_fee_rate: Rate::from_bps(200),
        term_days: if installments { 90 } else { 30 },
        payment_plan_type: if installments {
            PaymentPlanType::Installments
        } else {
            PaymentPlanType::SinglePayment
        },
        number_of_installments: if installments { 3 } else { 0 },
        requires_minimum_payment: installments,
        disbursement_method: method,
        start_date: None,
        category_limits: None,
        defer_disbursement: false,
        notes: None,
        created_by: OPERATOR.to_string(),
    }
}

fn demo_payment(loan_id: &str, amount: Money, method: PaymentMethod) -> NewPayment {
    NewPayment {
        loan_id: loan_id.to_string(),
        amount,
        payment_method: method,
        session_id: None,
        reference: None,
        notes: Some("Seeded payment".to_string()),
        created_by: OPERATOR.to_string(),
    }
}
