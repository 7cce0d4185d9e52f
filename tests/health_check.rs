//! Integration tests for the health check system

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use serde_json::Value;
use startup_diagnose::health::{
    self, CheckStatus, Ctx, HealthCheckRunner, Session, Sink, SystemCheck, spot_ok, spot_warn,
    test, with_timeout,
};

fn storage_and_listener(skip: &[&str]) -> health::HealthCheckReport {
    let session = Session::new(Sink::discard());
    session.set_skip_list(skip);
    let ctx = session.ctx();
    let _ = test(&ctx, "storage", |_| Err(anyhow!("disk full")));
    let _ = test(&ctx, "listener", |_| Ok(()));
    session.finalize()
}

#[test]
fn test_failed_storage_fails_the_run() {
    let report = storage_and_listener(&[]);
    assert_eq!(report.status(), CheckStatus::Fail);
    assert_eq!(report.exit_code(), 1);

    let json: Value = serde_json::from_str(&health::to_json(&report).unwrap()).unwrap();
    assert_eq!(json["name"], "initialization");
    assert_eq!(json["status"], "fail");
    assert_eq!(json["children"][0]["name"], "storage");
    assert_eq!(json["children"][0]["status"], "fail");
    assert_eq!(json["children"][0]["messages"][0], "disk full");
    assert_eq!(json["children"][1]["name"], "listener");
    assert_eq!(json["children"][1]["status"], "ok");
}

#[test]
fn test_skipped_listener_does_not_mask_failure() {
    let report = storage_and_listener(&["listener"]);
    let listener = report.find(&["listener"]).unwrap();
    assert_eq!(listener.status, CheckStatus::Skipped);
    assert_eq!(listener.messages, [health::SKIPPED_BY_REQUEST]);
    assert!(listener.started_at.is_none());
    assert!(listener.duration.is_none());

    assert_eq!(report.status(), CheckStatus::Fail);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_single_warning_exits_two() {
    let session = Session::new(Sink::discard());
    let ctx = session.ctx();
    let _ = test(&ctx, "storage", |ctx| {
        spot_ok(ctx, "create-storage-backend", "");
        spot_warn(ctx, "test-access-storage", "slow");
        Ok(())
    });
    let _ = test(&ctx, "listener", |_| Ok(()));

    let report = session.finalize();
    assert_eq!(report.status(), CheckStatus::Warn);
    assert_eq!(report.exit_code(), 2);
    assert!(report.is_healthy());
    assert!(report.has_warnings());
}

#[test]
fn test_skip_is_silent_and_total() {
    let calls = AtomicUsize::new(0);
    let session = Session::new(Sink::discard());
    session.set_skip_list(["Create-Seal", "access"]);
    let ctx = session.ctx();

    let _ = test(&ctx, "create-seal", |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let _ = test(&ctx, "storage", |ctx| {
        calls.fetch_add(1, Ordering::SeqCst);
        test(ctx, "access", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("never runs"))
        })
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let report = session.finalize();
    assert_eq!(
        report.find(&["create-seal"]).unwrap().status,
        CheckStatus::Skipped
    );
    let storage = report.find(&["storage"]).unwrap();
    assert_eq!(storage.status, CheckStatus::Skipped);
    assert_eq!(storage.children.len(), 1);
    assert!(storage.children[0].children.is_empty());
    assert_eq!(report.status(), CheckStatus::Skipped);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_rollup_over_nested_tree() {
    let session = Session::new(Sink::discard());
    let ctx = session.ctx();
    let _ = test(&ctx, "outer", |ctx| {
        let _ = test(ctx, "inner", |ctx| {
            health::spot_skipped(ctx, "a", "not configured");
            spot_warn(ctx, "b", "careful");
            Ok(())
        });
        health::spot_skipped(ctx, "c", "not configured");
        Ok(())
    });
    let _ = test(&ctx, "explicit-fail", |ctx| {
        health::fail(ctx, "broken");
        spot_ok(ctx, "fine", "");
        Ok(())
    });

    let report = session.finalize();
    assert_eq!(report.find(&["outer", "inner"]).unwrap().status, CheckStatus::Warn);
    assert_eq!(report.find(&["outer"]).unwrap().status, CheckStatus::Warn);
    assert_eq!(
        report.find(&["explicit-fail"]).unwrap().status,
        CheckStatus::Fail
    );
    assert_eq!(report.status(), CheckStatus::Fail);
    assert!(report.root().walk().all(|r| r.status != CheckStatus::Unknown));
}

#[test]
fn test_timeout_returns_promptly() {
    let session = Session::new(Sink::discard());
    let ctx = session.ctx();

    let start = Instant::now();
    let result = test(
        &ctx,
        "slow",
        with_timeout(Duration::from_millis(50), |_| {
            thread::sleep(Duration::from_millis(200));
            Ok(())
        }),
    );
    let elapsed = start.elapsed();

    assert!(result.is_err());
    assert!(elapsed < Duration::from_millis(180), "took {elapsed:?}");
    let report = session.finalize();
    let slow = report.find(&["slow"]).unwrap();
    assert_eq!(slow.status, CheckStatus::Fail);
    assert!(slow.messages[0].contains("deadline"), "{:?}", slow.messages);
}

#[test]
fn test_abandoned_worker_cannot_change_finalized_report() {
    let session = Session::new(Sink::discard());
    let ctx = session.ctx();
    let _ = test(
        &ctx,
        "slow",
        with_timeout(Duration::from_millis(10), |ctx: &Ctx| {
            thread::sleep(Duration::from_millis(100));
            spot_ok(ctx, "late", "");
            Ok(())
        }),
    );

    let report = session.finalize();
    drop(session);
    thread::sleep(Duration::from_millis(150));
    assert!(report.find(&["slow", "late"]).is_none());
}

#[test]
fn test_json_round_trip_preserves_structure() {
    let report = storage_and_listener(&["listener"]);
    let json = health::to_json(&report).unwrap();
    let parsed = health::from_json(&json).unwrap();

    let shape = |r: &health::HealthCheckReport| -> Vec<(String, CheckStatus, usize)> {
        r.root()
            .walk()
            .map(|n| (n.name.clone(), n.status, n.children.len()))
            .collect()
    };
    assert_eq!(shape(&parsed), shape(&report));
    assert_eq!(
        parsed.find(&["storage"]).unwrap().messages,
        report.find(&["storage"]).unwrap().messages
    );
}

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_live_output_overwrites_only_when_interactive() {
    colored::control::set_override(false);

    for interactive in [false, true] {
        let buffer = Buffer::default();
        let session = Session::new(Sink::writer(buffer.clone(), interactive));
        let _ = test(&session.ctx(), "storage", |_| Ok(()));
        session.finalize();

        let output = buffer.contents();
        assert!(output.contains("[      ] storage"));
        assert!(output.contains("[  ok  ] storage"));
        assert_eq!(output.contains("\x1b[2K"), interactive, "{output:?}");
    }
}

struct Passing(&'static str);

impl SystemCheck for Passing {
    fn name(&self) -> &'static str {
        self.0
    }

    fn check(&self, ctx: &Ctx) -> anyhow::Result<()> {
        spot_ok(ctx, "self-test", "");
        Ok(())
    }
}

struct Failing;

impl SystemCheck for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn check(&self, _ctx: &Ctx) -> anyhow::Result<()> {
        Err(anyhow!("unreachable"))
    }
}

#[test]
fn test_runner_collects_all_checks() {
    let report = HealthCheckRunner::new()
        .add_check(Passing("first"))
        .add_check(Failing)
        .add_check(Passing("skipped-one"))
        .skip("skipped-one")
        .run();

    let names: Vec<_> = report
        .root()
        .children
        .iter()
        .map(|c| (c.name.as_str(), c.status))
        .collect();
    assert_eq!(
        names,
        [
            ("first", CheckStatus::Ok),
            ("failing", CheckStatus::Fail),
            ("skipped-one", CheckStatus::Skipped),
        ]
    );
    assert_eq!(report.count(CheckStatus::Fail), 1);

    if !report.is_healthy() {
        eprintln!("\n{}", health::format_report(&report, 0, false));
    }
}
