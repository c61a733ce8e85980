//! Voting With Nested Transitions
//!
//! This example gates votes on a minimum balance and clears votes that are
//! no longer deserved when the balance drops.
//!
//! Key concepts:
//! - Parameterized guards ("balance at least 1000")
//! - Composite guards registered under their own names
//! - A mutation attempting a nested transition whose rejection is fine
//! - Parent/child records in the audit trail
//!
//! Run with: cargo run --example voting

use serde_json::Value;
use warrant::args;
use warrant::audit::ExecutionFilter;
use warrant::config::EngineConfig;
use warrant::core::{not, parameterize, Bindings, Guard, KeyValueState};
use warrant::engine::Engine;

// Balances live under "balance:<name>", votes under "vote:<name>".
type Board = KeyValueState<String, u64>;

const VOTING_THRESHOLD: u64 = 1000;

fn balance_key(account: &str) -> String {
    format!("balance:{account}")
}

fn vote_key(account: &str) -> String {
    format!("vote:{account}")
}

fn build_board() -> Engine<Board> {
    let initial = Board::new()
        .with(balance_key("ana"), 1500)
        .with(balance_key("bo"), 400);

    let mut builder = Engine::builder(initial);
    builder.config(EngineConfig::default().with_max_nesting_depth(2));

    let at_least = builder
        .register_guard(
            "atLeast",
            Guard::<Board>::try_new("atLeast", |board, args| {
                let account: String = args.get("account")?;
                let threshold: u64 = args.get("threshold")?;
                Ok(board.get_or_default(&balance_key(&account)) >= threshold)
            }),
        )
        .unwrap();
    let has_voted = builder
        .register_guard(
            "hasVoted",
            Guard::<Board>::try_new("hasVoted", |board, args| {
                let voter: String = args.get("voter")?;
                Ok(board.contains_key(&vote_key(&voter)))
            }),
        )
        .unwrap();

    let rich_enough = parameterize(
        at_least,
        Bindings::new()
            .literal("threshold", VOTING_THRESHOLD)
            .from_arg("account", "voter"),
    );
    builder
        .register_guard("canVote", rich_enough.clone().and(not(has_voted.clone())))
        .unwrap();
    builder
        .register_guard("undeserved", has_voted.and(not(rich_enough)))
        .unwrap();

    builder
        .define(
            builder
                .transition("vote")
                .require("canVote")
                .mutate(|board, args| {
                    let voter: String = args.get("voter")?;
                    board.insert(vote_key(&voter), 1);
                    Ok(Value::Null)
                }),
        )
        .unwrap();
    builder
        .define(
            builder
                .transition("clearUndeservedVote")
                .require("undeserved")
                .mutate(|board, args| {
                    let voter: String = args.get("voter")?;
                    board.remove(vote_key(&voter).as_str());
                    Ok(Value::Null)
                }),
        )
        .unwrap();
    builder
        .define(
            builder
                .transition("spend")
                .doc("Spend funds, then drop the spender's vote if it is no longer backed")
                .mutate(|board, args| {
                    let account: String = args.get("account")?;
                    let amount: u64 = args.get("amount")?;
                    board.update(balance_key(&account), |balance| {
                        *balance = balance.saturating_sub(amount)
                    });
                    let cleared = board.attempt("clearUndeservedVote", args! { "voter" => account })?;
                    Ok(Value::from(cleared.is_applied()))
                }),
        )
        .unwrap();

    builder.build()
}

fn main() {
    println!("=== Voting Example ===\n");

    let engine = build_board();

    println!("Scenario 1: ana (1500) and bo (400) try to vote");
    for voter in ["ana", "bo"] {
        let outcome = engine.execute("vote", args! { "voter" => voter }).unwrap();
        match outcome.rejection() {
            None => println!("  ✓ {voter} voted"),
            Some(rejection) => println!("  ✗ {voter}: {rejection}"),
        }
    }
    println!();

    println!("Scenario 2: ana votes twice");
    let outcome = engine.execute("vote", args! { "voter" => "ana" }).unwrap();
    println!("  Second vote applied: {}\n", outcome.is_applied());

    println!("Scenario 3: ana spends 100, still above the threshold");
    let outcome = engine
        .execute("spend", args! { "account" => "ana", "amount" => 100 })
        .unwrap();
    println!("  Vote cleared: {:?}\n", outcome.value());

    println!("Scenario 4: ana spends 900 more, dropping to 500");
    let outcome = engine
        .execute("spend", args! { "account" => "ana", "amount" => 900 })
        .unwrap();
    println!("  Vote cleared: {:?}", outcome.value());
    let still_voted = engine.read(|board| board.contains_key(&vote_key("ana")));
    println!("  ana still has a vote: {still_voted}\n");

    println!("Audit trail for the last spend:");
    if let Some(spend) = engine.audit_trail().last() {
        println!("  #{} {} -> {}", spend.sequence, spend.transition, spend.kind());
        for child in engine.list_executions(&ExecutionFilter::new().children_of(spend.id)) {
            let guards: Vec<&str> = child.evaluated_guards().collect();
            println!(
                "    #{} {} -> {} (guards: {guards:?})",
                child.sequence,
                child.transition,
                child.kind()
            );
        }
    }

    println!("\nKey Takeaways:");
    println!("- \"vote ≥ 1000\" is written once and bound with parameterize");
    println!("- Composite guards keep their leaf names for the audit trail");
    println!("- attempt() lets a nested rejection pass without failing the caller");

    println!("\n=== Example Complete ===");
}
