//! Concurrent execution against one shared engine.

use serde_json::Value;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use warrant::args;
use warrant::audit::{ExecutionFilter, OutcomeKind};
use warrant::config::EngineConfig;
use warrant::core::{Guard, KeyValueState};
use warrant::engine::Engine;

type Ledger = KeyValueState<String, u64>;

const ACCOUNTS: [&str; 4] = ["a", "b", "c", "d"];

fn shared_bank() -> Arc<Engine<Ledger>> {
    let initial: Ledger = ACCOUNTS
        .iter()
        .map(|name| (name.to_string(), 100))
        .collect();
    let mut builder = Engine::builder(initial);
    builder
        .register_guard(
            "atLeast",
            Guard::<Ledger>::try_new("atLeast", |ledger, args| {
                let from: String = args.get("from")?;
                let amount: u64 = args.get("amount")?;
                Ok(ledger.get_or_default(&from) >= amount)
            }),
        )
        .unwrap();
    builder
        .define(
            builder
                .transition("transfer")
                .require("atLeast")
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
    Arc::new(builder.build())
}

fn total(ledger: &Ledger) -> u64 {
    ledger.iter().map(|(_, balance)| balance).sum()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_transfers_serialize() {
    let engine = shared_bank();

    let mut tasks = Vec::new();
    for worker in 0..8usize {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::task::spawn_blocking(move || {
            for i in 0..50usize {
                let from = ACCOUNTS[(worker + i) % ACCOUNTS.len()];
                let dest = ACCOUNTS[(worker + i + 1) % ACCOUNTS.len()];
                let amount = ((worker * 7 + i * 13) % 60) as u64;
                engine
                    .execute("transfer", args! { "from" => from, "dest" => dest, "amount" => amount })
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(engine.read(total), 400);
    assert_eq!(engine.audit_trail().len(), 400);

    let sequences: Vec<u64> = engine.audit_trail().records().iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, (1..=400).collect::<Vec<u64>>());
    assert!(engine.verify_audit().is_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn double_spend_is_rejected() {
    let engine = shared_bank();

    // Every task tries to move the whole balance of `a`; only one can.
    let tasks: Vec<_> = ACCOUNTS[1..]
        .iter()
        .map(|dest| {
            let dest = *dest;
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || {
                engine
                    .execute("transfer", args! { "from" => "a", "dest" => dest, "amount" => 100 })
                    .unwrap()
            })
        })
        .collect();

    let mut applied = 0;
    for task in tasks {
        if task.await.unwrap().is_applied() {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(engine.read(|ledger| ledger.get_or_default("a")), 0);
    let rejected = engine.list_executions(
        &ExecutionFilter::new()
            .outcome(OutcomeKind::Rejected)
            .rejected_by("atLeast"),
    );
    assert_eq!(rejected.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn readers_never_see_partial_transfers() {
    let engine = shared_bank();

    let writer = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || {
            for i in 0..200usize {
                let from = ACCOUNTS[i % ACCOUNTS.len()];
                let dest = ACCOUNTS[(i + 2) % ACCOUNTS.len()];
                engine
                    .execute("transfer", args! { "from" => from, "dest" => dest, "amount" => 5 })
                    .unwrap();
            }
        })
    };
    let reader = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || {
            for _ in 0..200 {
                assert_eq!(total(&engine.snapshot()), 400);
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_for_the_lock_does_not_spend_guard_budget() {
    let started = Arc::new(Barrier::new(2));

    let mut builder = Engine::builder(Ledger::new());
    builder.config(EngineConfig::default().with_guard_timeout(Duration::from_millis(50)));
    builder
        .register_guard("open", Guard::<Ledger>::new("open", |_, _| true))
        .unwrap();
    let in_mutation = Arc::clone(&started);
    builder
        .define(builder.transition("slow").mutate(move |ledger, _| {
            in_mutation.wait();
            thread::sleep(Duration::from_millis(300));
            ledger.insert("slow".to_string(), 1);
            Ok(Value::Null)
        }))
        .unwrap();
    builder
        .define(builder.transition("fast").require("open").mutate(|ledger, _| {
            ledger.insert("fast".to_string(), 1);
            Ok(Value::Null)
        }))
        .unwrap();
    let engine = Arc::new(builder.build());

    let slow = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || engine.execute("slow", args! {}).unwrap())
    };
    let fast = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || {
            // Only call once the slow mutation holds the write lock.
            started.wait();
            engine.execute("fast", args! {})
        })
    };

    assert!(slow.await.unwrap().is_applied());
    let outcome = fast.await.unwrap().unwrap();
    assert!(outcome.is_applied());

    let fast_record = engine
        .list_executions(&ExecutionFilter::new().transition("fast"))
        .pop()
        .unwrap();
    assert_eq!(fast_record.kind(), OutcomeKind::Applied);
    // The record still covers the whole call, lock wait included.
    assert!(fast_record.elapsed >= Duration::from_millis(200));
    assert_eq!(engine.read(|ledger| ledger.len()), 2);
}
