//! End-to-end tests of the failure pipeline: predicate, flush handlers,
//! report, termination.
//!
//! Every test builds its own `Diagnostics` with an `UnwindTerminator` and an
//! in-memory sink, so failures can be observed without exiting the test
//! process.

mod common;

use std::{
    ptr,
    rc::Rc,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};

use common::diagnostics;
use tripwire::{
    FAILURE_EXIT_CODE, LatchState, check, fields, never, nil, no_error, not_nil,
    stack::StackFilter,
    terminate::Terminated,
};

#[derive(Debug, thiserror::Error)]
enum StoreError {
    #[error("disk quota exceeded on {volume}")]
    Quota { volume: String },
}

#[test]
fn test_satisfied_predicates_are_silent() {
    let (diagnostics, capture) = diagnostics();
    let flushes = Arc::new(AtomicUsize::new(0));
    let counter = flushes.clone();
    diagnostics.add_flush_handler(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let value = 17;
    let ok: Result<u32, StoreError> = Ok(1);
    let terminated = Terminated::catch(|| {
        check!(in &diagnostics; value > 10, "value too small", "value" => value);
        no_error!(in &diagnostics; ok, "store failed");
        nil!(in &diagnostics; None::<Box<u32>>, "expected nothing");
        not_nil!(in &diagnostics; Some(&value as *const i32), "expected a pointer");
    });

    assert_eq!(terminated, None);
    assert_eq!(flushes.load(Ordering::SeqCst), 0);
    assert!(capture.text().is_empty());
    assert_eq!(diagnostics.latch_state(), LatchState::Clear);
}

#[test]
fn test_fields_are_not_rendered_when_satisfied() {
    struct Loud;

    impl std::fmt::Display for Loud {
        fn fmt(&self, _: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            panic!("rendered a field of a passing check")
        }
    }

    let (diagnostics, _capture) = diagnostics();
    check!(in &diagnostics; true, "unused", "loud" => Loud);
    not_nil!(in &diagnostics; Some(Box::new(1)), "unused", "loud" => Loud);
}

#[test]
fn test_violation_reports_once_and_terminates_once() {
    let (diagnostics, capture) = diagnostics();

    let terminated = Terminated::catch(|| {
        check!(in &diagnostics; 2 + 2 == 5, "arithmetic", "lhs" => 4);
        unreachable!("a failed check must not return");
    });

    assert_eq!(
        terminated,
        Some(Terminated {
            code: FAILURE_EXIT_CODE
        })
    );
    assert_eq!(capture.report_count(), 1);
    assert!(diagnostics.is_reporting());
}

#[test]
fn test_flush_handlers_run_in_order_exactly_once() {
    let (diagnostics, _capture) = diagnostics();
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["H1", "H2", "H3"] {
        let order = order.clone();
        diagnostics.add_flush_handler(move || order.lock().unwrap().push(name));
    }

    Terminated::catch(|| never!(in &diagnostics; "boom"));

    assert_eq!(*order.lock().unwrap(), ["H1", "H2", "H3"]);
}

#[test]
fn test_nested_failure_does_not_flush_again() {
    let (diagnostics, capture) = diagnostics();
    let runs = Arc::new(AtomicUsize::new(0));

    let inner = diagnostics.clone();
    let counter = runs.clone();
    diagnostics.add_flush_handler(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        check!(in &inner; false, "failed while flushing");
    });

    let terminated = Terminated::catch(|| never!(in &diagnostics; "first failure"));

    assert!(terminated.is_some());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(capture.report_count(), 1);
    assert!(capture.text().contains("   msg=failed while flushing\n"));
}

#[test]
fn test_caller_fields_precede_registry_dumps() {
    let (diagnostics, capture) = diagnostics();
    diagnostics.add_diagnostic("d", || "pool=4 busy=4".to_string());

    Terminated::catch(|| check!(in &diagnostics; false, "m", "a" => 1));

    let text = capture.text();
    assert!(text.starts_with("ARGS: [a 1]\nASSERT\n   msg=m\n   area=Assert\n"));
    let a = text.find("   a=1\n").unwrap();
    let d = text.find("   d=pool=4 busy=4\n").unwrap();
    assert!(a < d);
}

#[test]
fn test_registry_changes_are_reflected() {
    let (diagnostics, capture) = diagnostics();
    diagnostics.add_diagnostic("cache", || "entries=10".to_string());
    diagnostics.add_diagnostic("cache", || "entries=11".to_string());
    diagnostics.add_diagnostic("stale", || "gone".to_string());
    diagnostics.remove_diagnostic("stale");
    diagnostics.remove_diagnostic("never-added");

    Terminated::catch(|| never!(in &diagnostics; "m"));

    let text = capture.text();
    assert!(text.contains("   cache=entries=11\n"));
    assert!(!text.contains("entries=10"));
    assert!(!text.contains("stale"));
}

#[test]
fn test_not_nil_rejects_wrapped_null_pointer() {
    let (diagnostics, capture) = diagnostics();
    let wrapped = Some(ptr::null::<u8>());

    let terminated =
        Terminated::catch(|| not_nil!(in &diagnostics; wrapped, "pointer required", "slot" => 3));

    assert!(terminated.is_some());
    assert!(capture.text().contains("   msg=pointer required\n   area=Assert\n"));
    assert!(capture.text().contains("   slot=3\n"));
}

#[test]
fn test_not_nil_rejects_dropped_weak() {
    let (diagnostics, _capture) = diagnostics();
    let owner = Rc::new("session");
    let handle = Some(Rc::downgrade(&owner));

    let live = Terminated::catch(|| not_nil!(in &diagnostics; handle, "session gone"));
    assert_eq!(live, None);

    drop(owner);
    let dropped = Terminated::catch(|| not_nil!(in &diagnostics; handle, "session gone"));
    assert!(dropped.is_some());
}

#[test]
fn test_nil_accepts_any_option() {
    let (diagnostics, _capture) = diagnostics();
    let timeout: Option<std::time::Duration> = None;
    nil!(in &diagnostics; timeout, "no timeout expected");

    let present = Some(std::time::Duration::from_secs(1));
    let terminated = Terminated::catch(|| nil!(in &diagnostics; present, "no timeout expected"));
    assert!(terminated.is_some());
}

#[test]
fn test_no_error_reports_description() {
    let (diagnostics, capture) = diagnostics();
    let result: Result<(), StoreError> = Err(StoreError::Quota {
        volume: "/data".to_string(),
    });

    Terminated::catch(|| no_error!(in &diagnostics; result, "write failed", "key" => "user:1"));

    let text = capture.text();
    assert!(text.contains("   key=user:1\n   error=disk quota exceeded on /data\n"));
}

#[test]
fn test_no_error_accepts_optional_error() {
    let (diagnostics, capture) = diagnostics();
    let error = StoreError::Quota {
        volume: "/tmp".to_string(),
    };

    Terminated::catch(|| no_error!(in &diagnostics; Some(&error), "cleanup failed"));

    assert!(capture.text().contains("   error=disk quota exceeded on /tmp\n"));
}

#[test]
fn test_panicking_flush_handler_is_noted() {
    fn broken_flush() {
        panic!("log buffer poisoned")
    }

    let (diagnostics, capture) = diagnostics();
    let ran_after = Arc::new(AtomicUsize::new(0));
    let counter = ran_after.clone();
    diagnostics.add_flush_handler(broken_flush);
    diagnostics.add_flush_handler(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let terminated = Terminated::catch(|| never!(in &diagnostics; "m"));

    assert!(terminated.is_some());
    assert_eq!(ran_after.load(Ordering::SeqCst), 1);
    let text = capture.text();
    let note = text
        .lines()
        .find(|line| line.starts_with("   flush_panic="))
        .unwrap();
    assert!(note.ends_with(": log buffer poisoned"));
}

#[test]
fn test_report_names_the_failing_line() {
    let (diagnostics, capture) = diagnostics();
    let line = line!() + 1;
    Terminated::catch(|| check!(in &diagnostics; false, "m"));

    let expected = format!("   location={}:{line}:", file!());
    assert!(capture.text().contains(&expected));
}

#[test]
fn test_stack_is_the_last_section() {
    let (diagnostics, capture) = diagnostics();
    diagnostics.set_stack_filter(StackFilter::FULL);
    diagnostics.add_diagnostic("d", || "x".to_string());

    Terminated::catch(|| never!(in &diagnostics; "m"));

    let text = capture.text();
    let after_pairs = text.split("   d=x\n").nth(1).unwrap();
    assert!(!after_pairs.is_empty());
    assert!(!after_pairs.starts_with("   "));
}

#[test]
fn test_method_and_macro_forms_agree() {
    let (by_macro, macro_capture) = diagnostics();
    let (by_method, method_capture) = diagnostics();

    Terminated::catch(|| check!(in &by_macro; false, "m", "k" => "v"));
    Terminated::catch(|| by_method.check(false, "m", fields!["k" => "v"]));

    let strip_location = |text: String| {
        text.lines()
            .filter(|line| !line.starts_with("   location="))
            .collect::<Vec<_>>()
            .join("\n")
    };
    assert_eq!(
        strip_location(macro_capture.text()),
        strip_location(method_capture.text())
    );
}

#[test]
fn test_stack_starts_at_the_failing_caller() {
    let (diagnostics, capture) = diagnostics();
    diagnostics.set_stack_filter(StackFilter::DEFAULT);

    Terminated::catch(|| check!(in &diagnostics; false, "m"));

    let stack = capture.stack_lines();
    let first = stack.first().expect("stack section is present");
    assert!(
        first.starts_with("test_stack_starts_at_the_failing_caller"),
        "unexpected first frame: {first}"
    );
    assert!(!stack.iter().any(|line| line.starts_with("report ")));
}

// Other threads keep registering and removing state while one thread
// reports. The report must complete with a consistent snapshot.
#[test]
fn test_report_while_other_threads_mutate_state() {
    let (diagnostics, capture) = diagnostics();
    diagnostics.add_diagnostic("stable", || "present".to_string());
    let stop = AtomicBool::new(false);
    let churn = AtomicUsize::new(0);

    let terminated = thread::scope(|scope| {
        for worker in 0..4 {
            let (diagnostics, stop, churn) = (&diagnostics, &stop, &churn);
            scope.spawn(move || {
                let key = format!("worker-{worker}");
                while !stop.load(Ordering::SeqCst) {
                    diagnostics.add_diagnostic(key.clone(), move || format!("id={worker}"));
                    diagnostics.remove_diagnostic(&key);
                    churn.fetch_add(1, Ordering::SeqCst);
                }
                diagnostics.add_flush_handler(|| {});
            });
        }

        while churn.load(Ordering::SeqCst) < 100 {
            thread::yield_now();
        }
        let terminated = Terminated::catch(|| {
            check!(in &diagnostics; false, "failed under contention", "workers" => 4)
        });
        stop.store(true, Ordering::SeqCst);
        terminated
    });

    assert_eq!(terminated, Some(Terminated { code: FAILURE_EXIT_CODE }));
    assert_eq!(capture.report_count(), 1);
    let text = capture.text();
    assert!(text.contains("   workers=4\n   stable=present\n"));
    for line in text.lines().filter(|line| line.starts_with("   worker-")) {
        let (key, value) = line.trim_start().split_once('=').unwrap();
        assert_eq!(format!("worker-{}", &value["id=".len()..]), key);
    }
    assert_eq!(diagnostics.flush_handler_count(), 4);
    assert_eq!(diagnostics.diagnostic_count(), 1);
}

#[test]
fn test_failures_on_many_threads_flush_once() {
    let (diagnostics, capture) = diagnostics();
    let flushes = Arc::new(AtomicUsize::new(0));
    let counter = flushes.clone();
    diagnostics.add_flush_handler(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let terminations = thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|id| {
                let diagnostics = &diagnostics;
                scope.spawn(move || {
                    Terminated::catch(|| never!(in diagnostics; "worker failed", "id" => id))
                })
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .count()
    });

    assert_eq!(terminations, 6);
    assert_eq!(flushes.load(Ordering::SeqCst), 1);
    assert_eq!(capture.report_count(), 6);
    assert!(!capture.text().contains("note="));
}
