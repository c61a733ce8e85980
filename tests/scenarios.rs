//! End-to-end scenarios: ledgers, guard ordering, faults, nesting, sinks.

use parking_lot::Mutex;
use serde_json::Value;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warrant::args;
use warrant::audit::{
    AuditSink, ExecutionFilter, ExecutionRecord, JsonLinesSink, OutcomeKind, RecordedOutcome,
};
use warrant::config::EngineConfig;
use warrant::core::{not, parameterize, ArgError, Bindings, Guard, GuardError, KeyValueState, Verdict};
use warrant::engine::{Engine, ExecuteError, MutationError, Outcome};
use warrant::registry::RegistryError;
use warrant::EngineBuilder;

type Ledger = KeyValueState<String, u64>;

fn ledger(entries: &[(&str, u64)]) -> Ledger {
    entries
        .iter()
        .map(|(name, balance)| (name.to_string(), *balance))
        .collect()
}

fn at_least() -> Guard<Ledger> {
    Guard::<Ledger>::try_new("atLeast", |ledger, args| {
        let from: String = args.get("from")?;
        let amount: u64 = args.get("amount")?;
        Ok(ledger.get_or_default(&from) >= amount)
    })
}

/// Builder with `atLeast`, `deposit`, `withdraw` and `transfer`.
fn bank(initial: Ledger) -> EngineBuilder<Ledger> {
    let mut builder = Engine::builder(initial);
    builder.register_guard("atLeast", at_least()).unwrap();

    builder
        .define(builder.transition("deposit").mutate(|ledger, args| {
            let dest: String = args.get("dest")?;
            let amount: u64 = args.get("amount")?;
            ledger.update(dest, |balance| *balance += amount);
            Ok(Value::Null)
        }))
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
    builder
        .define(
            builder
                .transition("transfer")
                .require("atLeast")
                .doc("Move funds between accounts")
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
}

fn balances(engine: &Engine<Ledger>) -> (u64, u64) {
    engine.read(|ledger| (ledger.get_or_default("a"), ledger.get_or_default("b")))
}

#[test]
fn insufficient_balance_is_rejected_by_at_least() {
    let engine = bank(ledger(&[("a", 30), ("b", 0)])).build();

    let outcome = engine
        .execute("transfer", args! { "from" => "a", "dest" => "b", "amount" => 50 })
        .unwrap();

    let rejection = outcome.rejection().unwrap();
    assert_eq!(rejection.guard, "atLeast");
    assert_eq!(rejection.position, 0);
    assert!(rejection.fault.is_none());
    assert_eq!(balances(&engine), (30, 0));

    let record = engine.audit_trail().last().unwrap();
    assert_eq!(record.rejected_by(), Some("atLeast"));
    assert!(!record.outcome.mutation_ran());
}

#[test]
fn sufficient_balance_is_applied_once() {
    let engine = bank(ledger(&[("a", 100), ("b", 7)])).build();

    let outcome = engine
        .execute("transfer", args! { "from" => "a", "dest" => "b", "amount" => 50 })
        .unwrap();

    assert!(outcome.is_applied());
    assert_eq!(balances(&engine), (50, 57));

    let applied = engine.list_executions(&ExecutionFilter::new().outcome(OutcomeKind::Applied));
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].transition, "transfer");
    assert_eq!(applied[0].guards[0].verdict, Verdict::Pass);
    assert_eq!(applied[0].args.as_ref().unwrap().get::<u64>("amount").unwrap(), 50);
}

#[test]
fn failing_guard_stops_evaluation_and_mutation() {
    let counts: Vec<Arc<AtomicUsize>> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let counting = |name: &str, count: &Arc<AtomicUsize>, result: bool| {
        let count = Arc::clone(count);
        Guard::<Ledger>::new(name, move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
            result
        })
    };

    let mut builder = Engine::builder(Ledger::new());
    builder.register_guard("g1", counting("g1", &counts[0], true)).unwrap();
    builder.register_guard("g2", counting("g2", &counts[1], false)).unwrap();
    builder.register_guard("g3", counting("g3", &counts[2], true)).unwrap();
    let mutations = Arc::clone(&counts[3]);
    builder
        .define(
            builder
                .transition("guarded")
                .require("g1")
                .require("g2")
                .require("g3")
                .mutate(move |_, _| {
                    mutations.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }),
        )
        .unwrap();
    let engine = builder.build();

    let outcome = engine.execute("guarded", args! {}).unwrap();

    assert_eq!(outcome.rejection().unwrap().guard, "g2");
    assert_eq!(outcome.rejection().unwrap().position, 1);
    let evaluated: Vec<usize> = counts.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(evaluated, vec![1, 1, 0, 0]);

    let record = engine.audit_trail().last().unwrap();
    assert_eq!(record.evaluated_guards().collect::<Vec<_>>(), vec!["g1", "g2"]);
    assert_eq!(record.rejected_by(), Some("g2"));
    assert!(engine.verify_audit().is_success());
}

#[test]
fn duplicate_guard_registration_keeps_first() {
    let mut builder = Engine::builder(ledger(&[("a", 10)]));
    builder.register_guard("atLeast", at_least()).unwrap();

    let error = builder
        .register_guard("atLeast", Guard::new("atLeast", |_, _| true))
        .unwrap_err();
    assert_eq!(
        error,
        RegistryError::DuplicateGuard {
            name: "atLeast".to_string()
        }
    );

    let kept = builder.guard("atLeast").unwrap();
    assert!(!kept.check(&ledger(&[("a", 10)]), &args! { "from" => "a", "amount" => 11 }));
}

#[test]
fn unconditional_transition_always_applies() {
    let engine = bank(Ledger::new()).build();

    for _ in 0..3 {
        let outcome = engine
            .execute("deposit", args! { "dest" => "a", "amount" => 5 })
            .unwrap();
        assert!(outcome.is_applied());
    }

    assert_eq!(balances(&engine), (15, 0));
    let record = engine.audit_trail().last().unwrap();
    assert!(record.guards.is_empty());
    assert!(record.is_applied());
}

#[test]
fn faulting_guard_fails_closed() {
    let mut builder = bank(ledger(&[("a", 100)]));
    let at_least = builder.guard("atLeast").unwrap();
    builder
        .register_guard(
            "explodes",
            Guard::<Ledger>::new("explodes", |_, _| panic!("predicate bug")),
        )
        .unwrap();
    builder
        .define(
            builder
                .transition("inverted")
                .guard(not(at_least))
                .mutate(|_, _| Ok(Value::Null)),
        )
        .unwrap();
    builder
        .define(
            builder
                .transition("fragile")
                .require("explodes")
                .mutate(|_, _| Ok(Value::Null)),
        )
        .unwrap();
    let engine = builder.build();

    // Missing argument: a fault, not a pass, and `not` does not invert it.
    let outcome = engine.execute("transfer", args! { "from" => "a", "dest" => "b" }).unwrap();
    let rejection = outcome.rejection().unwrap();
    assert_eq!(
        rejection.fault,
        Some(GuardError::Argument(ArgError::Missing {
            name: "amount".to_string()
        }))
    );

    let outcome = engine.execute("inverted", args! { "from" => "a" }).unwrap();
    assert_eq!(outcome.rejection().unwrap().guard, "not(atLeast)");
    assert!(outcome.rejection().unwrap().fault.is_some());

    let outcome = engine.execute("fragile", args! {}).unwrap();
    assert!(matches!(
        outcome.rejection().unwrap().fault,
        Some(GuardError::Panicked { ref message, .. }) if message == "predicate bug"
    ));

    assert_eq!(engine.read(|ledger| ledger.get_or_default("a")), 100);
    let faults = engine
        .audit_trail()
        .records()
        .iter()
        .filter(|r| r.guards.last().is_some_and(|g| g.verdict == Verdict::Fault))
        .count();
    assert_eq!(faults, 3);
}

#[test]
fn parameterized_guard_reports_registered_name() {
    let mut builder = bank(ledger(&[("a", 8), ("treasury", 0)]));
    let at_least = builder.guard("atLeast").unwrap();
    builder
        .register_guard(
            "canPayFee",
            parameterize(
                at_least,
                Bindings::new().from_arg("from", "payer").literal("amount", 10),
            ),
        )
        .unwrap();
    builder
        .define(
            builder
                .transition("payFee")
                .require("canPayFee")
                .mutate(|ledger, args| {
                    let payer: String = args.get("payer")?;
                    ledger.update(payer, |balance| *balance -= 10);
                    ledger.update("treasury".to_string(), |balance| *balance += 10);
                    Ok(Value::Null)
                }),
        )
        .unwrap();
    let engine = builder.build();

    let outcome = engine.execute("payFee", args! { "payer" => "a" }).unwrap();
    assert_eq!(outcome.rejection().unwrap().guard, "canPayFee");

    engine
        .execute("deposit", args! { "dest" => "a", "amount" => 2 })
        .unwrap();
    assert!(engine.execute("payFee", args! { "payer" => "a" }).unwrap().is_applied());
    assert_eq!(engine.read(|ledger| ledger.get_or_default("treasury")), 10);

    let manifest = engine.manifest();
    let declared = &manifest.transition("payFee").unwrap().guards[0];
    assert_eq!(declared.name, "canPayFee");
    assert_eq!(declared.description.leaves(), vec!["atLeast"]);
}

fn nested_bank() -> Engine<Ledger> {
    let mut builder = bank(Ledger::new());
    builder
        .define(builder.transition("relay").mutate(|ledger, args| {
            let from: String = args.get("from")?;
            let dest: String = args.get("dest")?;
            let amount: u64 = args.get("amount")?;
            ledger.require("withdraw", args! { "from" => from, "amount" => amount })?;
            ledger.require("deposit", args! { "dest" => dest, "amount" => amount })?;
            Ok(Value::Null)
        }))
        .unwrap();
    builder
        .define(builder.transition("sweep").mutate(|ledger, args| {
            let accounts: Vec<String> = args.get("accounts")?;
            let mut swept = 0;
            for account in accounts {
                let outcome =
                    ledger.attempt("withdraw", args! { "from" => account, "amount" => 10 })?;
                if outcome.is_applied() {
                    swept += 1;
                }
            }
            Ok(Value::from(swept))
        }))
        .unwrap();
    builder.build()
}

#[test]
fn required_nested_rejection_aborts_outer_transition() {
    let engine = nested_bank();
    engine
        .execute("deposit", args! { "dest" => "a", "amount" => 5 })
        .unwrap();

    let error = engine
        .execute("relay", args! { "from" => "a", "dest" => "b", "amount" => 20 })
        .unwrap_err();

    assert!(matches!(
        error,
        ExecuteError::Mutation {
            source: MutationError::NestedRejected { ref guard, .. },
            ..
        } if guard == "atLeast"
    ));
    assert_eq!(balances(&engine), (5, 0));

    let outer = engine.audit_trail().last().unwrap();
    assert_eq!(outer.kind(), OutcomeKind::MutationFailed);
    let children = engine.list_executions(&ExecutionFilter::new().children_of(outer.id));
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].rejected_by(), Some("atLeast"));
    assert!(children[0].sequence < outer.sequence);
    assert!(engine.verify_audit().is_success());
}

#[test]
fn nested_effects_commit_with_outer_transition() {
    let engine = nested_bank();
    engine
        .execute("deposit", args! { "dest" => "a", "amount" => 30 })
        .unwrap();

    let outcome = engine
        .execute("relay", args! { "from" => "a", "dest" => "b", "amount" => 20 })
        .unwrap();

    assert!(outcome.is_applied());
    assert_eq!(balances(&engine), (10, 20));
    let top_level = engine.list_executions(&ExecutionFilter::new().top_level());
    assert_eq!(top_level.len(), 2);
    assert_eq!(engine.audit_trail().len(), 4);
}

#[test]
fn nested_effects_roll_back_with_failed_outer_transition() {
    let mut builder = bank(ledger(&[("a", 30), ("b", 0)]));
    builder
        .define(builder.transition("withdrawThenFail").mutate(|ledger, _| {
            ledger.require("withdraw", args! { "from" => "a", "amount" => 20 })?;
            Err(MutationError::failed("settlement refused"))
        }))
        .unwrap();
    let engine = builder.build();

    let error = engine.execute("withdrawThenFail", args! {}).unwrap_err();

    assert!(matches!(error, ExecuteError::Mutation { .. }));
    assert_eq!(balances(&engine), (30, 0));

    let outer = engine.audit_trail().last().unwrap();
    let children = engine.list_executions(&ExecutionFilter::new().children_of(outer.id));
    assert_eq!(children.len(), 1);
    assert!(children[0].is_applied());
    assert!(children[0].rolled_back);
    assert!(!children[0].is_committed());
    assert!(!outer.is_committed());
    assert!(engine.verify_audit().is_success());
}

#[test]
fn attempted_nested_rejection_is_skipped() {
    let engine = nested_bank();
    engine
        .execute("deposit", args! { "dest" => "a", "amount" => 30 })
        .unwrap();
    engine
        .execute("deposit", args! { "dest" => "b", "amount" => 5 })
        .unwrap();

    let outcome = engine
        .execute("sweep", args! { "accounts" => ["a", "b"] })
        .unwrap();

    assert_eq!(outcome, Outcome::Applied(Value::from(1)));
    assert_eq!(balances(&engine), (20, 5));

    let outer = engine.audit_trail().last().unwrap();
    let children = engine.list_executions(&ExecutionFilter::new().children_of(outer.id));
    let kinds: Vec<OutcomeKind> = children.iter().map(|r| r.kind()).collect();
    assert_eq!(kinds, vec![OutcomeKind::Applied, OutcomeKind::Rejected]);
    assert!(children.iter().all(|r| !r.rolled_back));
}

#[test]
fn nesting_is_bounded() {
    let mut builder = Engine::builder(ledger(&[("a", 0)]));
    builder.config(EngineConfig::default().with_max_nesting_depth(3));
    builder
        .define(builder.transition("recurse").mutate(|ledger, _| {
            ledger.update("a".to_string(), |n| *n += 1);
            ledger.require("recurse", args! {})
        }))
        .unwrap();
    let engine = builder.build();

    let error = engine.execute("recurse", args! {}).unwrap_err();

    let ExecuteError::Mutation { source, .. } = error else {
        panic!("expected a mutation error");
    };
    let mut cause = &source;
    let mut depth = 0;
    while let MutationError::Nested { source, .. } = cause {
        cause = source.as_ref();
        depth += 1;
    }
    assert_eq!(depth, 3);
    assert!(matches!(cause, MutationError::NestingTooDeep { limit: 3, .. }));
    assert_eq!(engine.read(|ledger| ledger.get_or_default("a")), 0);

    // Innermost first: the call refused at the limit, then each level out.
    let records = engine.audit_trail().records();
    let kinds: Vec<OutcomeKind> = records.iter().map(|r| r.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            OutcomeKind::DepthExceeded,
            OutcomeKind::MutationFailed,
            OutcomeKind::MutationFailed,
            OutcomeKind::MutationFailed,
            OutcomeKind::MutationFailed,
        ]
    );
    assert_eq!(records[0].outcome, RecordedOutcome::DepthExceeded { limit: 3 });
    assert_eq!(records[0].parent, Some(records[1].id));
    assert!(records[0].guards.is_empty());
    assert!(engine.verify_audit().is_success());
}

#[test]
fn unknown_nested_transition_is_an_error() {
    let mut builder = Engine::builder(Ledger::new());
    builder
        .define(
            builder
                .transition("outer")
                .mutate(|ledger, _| ledger.require("missing", args! {})),
        )
        .unwrap();
    let engine = builder.build();

    let error = engine.execute("outer", args! {}).unwrap_err();

    assert!(matches!(
        error,
        ExecuteError::Mutation {
            source: MutationError::UnknownNested { .. },
            ..
        }
    ));
    let records = engine.audit_trail().records();
    assert_eq!(records[0].outcome, RecordedOutcome::UnknownTransition);
    assert_eq!(records[0].parent, Some(records[1].id));
}

#[test]
fn slow_guards_are_abandoned() {
    let mut builder = Engine::builder(ledger(&[("a", 1)]));
    builder.config(EngineConfig::default().with_guard_timeout(Duration::from_millis(5)));
    builder
        .register_guard(
            "slow",
            Guard::<Ledger>::new("slow", |_, _| {
                std::thread::sleep(Duration::from_millis(30));
                true
            }),
        )
        .unwrap();
    builder
        .define(
            builder
                .transition("drain")
                .require("slow")
                .mutate(|ledger, _| {
                    ledger.insert("a".to_string(), 0);
                    Ok(Value::Null)
                }),
        )
        .unwrap();
    let engine = builder.build();

    let error = engine.execute("drain", args! {}).unwrap_err();

    assert!(matches!(error, ExecuteError::Abandoned { .. }));
    assert_eq!(engine.read(|ledger| ledger.get_or_default("a")), 1);
    let record = engine.audit_trail().last().unwrap();
    assert_eq!(record.kind(), OutcomeKind::Abandoned);
    assert!(engine.verify_audit().is_success());
}

#[derive(Default)]
struct Collected(Mutex<Vec<ExecutionRecord>>);

impl AuditSink for Collected {
    fn append(&self, record: &ExecutionRecord) -> io::Result<()> {
        self.0.lock().push(record.clone());
        Ok(())
    }
}

struct Broken;

impl AuditSink for Broken {
    fn append(&self, _: &ExecutionRecord) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }
}

#[test]
fn sinks_receive_every_record() {
    let collected = Arc::new(Collected::default());
    let lines = Arc::new(JsonLinesSink::new(Vec::<u8>::new()));
    let mut builder = bank(ledger(&[("a", 10)]));
    builder
        .sink(collected.clone())
        .sink(Arc::new(Broken))
        .sink(lines.clone());
    let engine = builder.build();

    engine
        .execute("transfer", args! { "from" => "a", "dest" => "b", "amount" => 4 })
        .unwrap();
    engine
        .execute("transfer", args! { "from" => "a", "dest" => "b", "amount" => 40 })
        .unwrap();
    engine.execute("mint", args! {}).unwrap_err();

    assert_eq!(balances(&engine), (6, 4));
    let received: Vec<u64> = collected.0.lock().iter().map(|r| r.sequence).collect();
    assert_eq!(received, vec![1, 2, 3]);

    drop(engine);
    let bytes = Arc::try_unwrap(lines)
        .ok()
        .expect("engine dropped its handle")
        .into_inner()
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let restored: Vec<ExecutionRecord> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(restored.len(), 3);
    assert_eq!(restored[2].outcome, RecordedOutcome::UnknownTransition);
}

#[test]
fn manifest_round_trips_and_verifies_exported_trail() {
    let engine = bank(ledger(&[("a", 10)])).build();
    engine
        .execute("withdraw", args! { "from" => "a", "amount" => 3 })
        .unwrap();
    engine
        .execute("withdraw", args! { "from" => "a", "amount" => 30 })
        .unwrap();

    let manifest = engine.manifest();
    assert_eq!(
        manifest.transition("transfer").unwrap().doc.as_deref(),
        Some("Move funds between accounts")
    );

    let exported: Vec<String> = engine
        .audit_trail()
        .records()
        .iter()
        .map(|r| r.to_json().unwrap())
        .collect();
    let imported: Vec<ExecutionRecord> = exported
        .iter()
        .map(|json| serde_json::from_str(json).unwrap())
        .collect();
    let manifest = warrant::engine::EngineManifest::from_json(&manifest.to_json().unwrap()).unwrap();

    assert!(warrant::audit::verify_trail(&imported, &manifest).is_success());
}
