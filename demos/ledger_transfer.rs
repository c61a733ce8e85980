//! Ledger Transfer
//!
//! This example moves funds between accounts behind a balance guard.
//!
//! Key concepts:
//! - One named guard reused by several transitions
//! - Rejections as ordinary outcomes, not errors
//! - Dry-run checks that neither mutate nor record
//! - The audit trail, and verifying it against the engine manifest
//!
//! Run with: cargo run --example ledger_transfer

use serde_json::Value;
use warrant::args;
use warrant::audit::{ExecutionFilter, OutcomeKind};
use warrant::core::{Guard, KeyValueState};
use warrant::engine::{Engine, Outcome};

type Ledger = KeyValueState<String, u64>;

// Pure guard: reads state and arguments, never writes.
fn at_least() -> Guard<Ledger> {
    Guard::<Ledger>::try_new("atLeast", |ledger, args| {
        let from: String = args.get("from")?;
        let amount: u64 = args.get("amount")?;
        Ok(ledger.get_or_default(&from) >= amount)
    })
}

fn build_bank() -> Engine<Ledger> {
    let initial = Ledger::new()
        .with("alice".to_string(), 100)
        .with("bob".to_string(), 20);

    let mut builder = Engine::builder(initial);
    builder.register_guard("atLeast", at_least()).unwrap();

    builder
        .define(
            builder
                .transition("transfer")
                .require("atLeast")
                .doc("Move `amount` from `from` to `dest`")
                .mutate(|ledger, args| {
                    let from: String = args.get("from")?;
                    let dest: String = args.get("dest")?;
                    let amount: u64 = args.get("amount")?;
                    ledger.update(from, |balance| *balance -= amount);
                    ledger.update(dest, |balance| *balance += amount);
                    Ok(Value::Null)
                }),
        )
        .unwrap();
    builder
        .define(
            builder
                .transition("withdraw")
                .require("atLeast")
                .mutate(|ledger, args| {
                    let from: String = args.get("from")?;
                    let amount: u64 = args.get("amount")?;
                    ledger.update(from, |balance| *balance -= amount);
                    Ok(Value::from(amount))
                }),
        )
        .unwrap();

    builder.build()
}

fn print_balances(engine: &Engine<Ledger>) {
    engine.read(|ledger| {
        for (account, balance) in ledger {
            println!("    {account}: {balance}");
        }
    });
}

fn main() {
    println!("=== Ledger Transfer Example ===\n");

    let engine = build_bank();
    println!("Opening balances:");
    print_balances(&engine);
    println!();

    // Scenario 1: covered transfer
    println!("Scenario 1: alice sends bob 50");
    let outcome = engine
        .execute("transfer", args! { "from" => "alice", "dest" => "bob", "amount" => 50 })
        .unwrap();
    println!("  Outcome: applied = {}", outcome.is_applied());
    print_balances(&engine);
    println!();

    // Scenario 2: uncovered transfer is rejected and nothing changes
    println!("Scenario 2: bob sends alice 500");
    match engine
        .execute("transfer", args! { "from" => "bob", "dest" => "alice", "amount" => 500 })
        .unwrap()
    {
        Outcome::Applied(_) => println!("  Unexpectedly applied"),
        Outcome::Rejected(rejection) => println!("  ✗ {rejection}"),
    }
    print_balances(&engine);
    println!();

    // Scenario 3: ask first, without touching state or the trail
    println!("Scenario 3: dry-run a withdrawal");
    let report = engine
        .check("withdraw", &args! { "from" => "bob", "amount" => 60 })
        .unwrap();
    println!("  Would apply: {}", report.would_apply());
    println!("  Trail length is still {}\n", engine.audit_trail().len());

    // Scenario 4: a guard fault fails closed
    println!("Scenario 4: withdrawal without an amount");
    let outcome = engine
        .execute("withdraw", args! { "from" => "alice" })
        .unwrap();
    if let Some(rejection) = outcome.rejection() {
        println!("  ✗ {rejection}\n");
    }

    println!("Audit trail:");
    for record in engine.audit_trail().records() {
        println!(
            "  #{} {} -> {}",
            record.sequence,
            record.transition,
            record.kind()
        );
    }

    let rejected = engine.list_executions(&ExecutionFilter::new().outcome(OutcomeKind::Rejected));
    println!("\nRejected attempts: {}", rejected.len());
    println!("Trail verifies: {}", engine.verify_audit().is_success());

    println!("\nKey Takeaways:");
    println!("- Preconditions live in guards, mutations only mutate");
    println!("- A rejected call leaves state exactly as it was");
    println!("- Every attempt is recorded, whatever its outcome");

    println!("\n=== Example Complete ===");
}
