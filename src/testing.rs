//! On-device test harness with TAP output.
//!
//! Functions marked `#[tap_test]` register themselves through `inventory`
//! and are run by the `device-tests` binary, on the host or on an ESP32
//! over its serial console. Output follows TAP version 14 so any TAP
//! consumer can parse it.
//!
//! Only compiled with the `tap-tests` feature.
//!
//! ```ignore
//! #[cfg(feature = "tap-tests")]
//! mod tap_tests {
//!     use super::*;
//!     use protopixel_net_macros::tap_test;
//!
//!     #[tap_test]
//!     fn frame_is_eight_bytes() {
//!         assert_eq!(encode(&CommandFrame::toggle(0)).len(), 8);
//!     }
//! }
//! ```

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub use inventory;

/// Return type for fallible tests.
pub type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A registered test: its name and how to hand it to a runner.
pub struct TapTestEntry {
    pub name: &'static str,
    pub run: fn(&mut TestRunner),
}

impl TapTestEntry {
    pub const fn new(name: &'static str, run: fn(&mut TestRunner)) -> Self {
        Self { name, run }
    }
}

inventory::collect!(TapTestEntry);

/// Run every registered test whose name contains `filter`.
///
/// Returns true if none failed.
pub fn run_matching(filter: Option<&str>) -> bool {
    let selected: Vec<&TapTestEntry> = inventory::iter::<TapTestEntry>
        .into_iter()
        .filter(|entry| filter.map_or(true, |f| entry.name.contains(f)))
        .collect();

    let mut runner = TestRunner::new();
    runner.plan(selected.len());
    for entry in selected {
        (entry.run)(&mut runner);
    }
    runner.finish()
}

/// Run every registered test.
pub fn run_all_tests() -> bool {
    run_matching(None)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Passed,
    Failed(String),
}

/// Runs tests one at a time and prints a TAP line for each.
#[derive(Default)]
pub struct TestRunner {
    outcomes: Vec<Outcome>,
    quiet: bool,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

impl TestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner that records outcomes without printing.
    pub fn quiet() -> Self {
        Self {
            outcomes: Vec::new(),
            quiet: true,
        }
    }

    fn emit(&self, line: &str) {
        if !self.quiet {
            println!("{}", line);
        }
    }

    /// Print the TAP version and plan line.
    pub fn plan(&self, count: usize) {
        self.emit("TAP version 14");
        self.emit(&format!("1..{}", count));
    }

    /// Run a fallible test. An `Err` or a panic is a failure.
    pub fn run<F>(&mut self, name: &str, test_fn: F)
    where
        F: FnOnce() -> TestResult,
    {
        let outcome = match catch_unwind(AssertUnwindSafe(test_fn)) {
            Ok(Ok(())) => Outcome::Passed,
            Ok(Err(e)) => Outcome::Failed(format!("error: {}", e)),
            Err(payload) => Outcome::Failed(format!("panic: {}", panic_message(payload.as_ref()))),
        };

        let number = self.outcomes.len() + 1;
        match &outcome {
            Outcome::Passed => self.emit(&format!("ok {} - {}", number, name)),
            Outcome::Failed(reason) => {
                self.emit(&format!("not ok {} - {}", number, name));
                self.emit(&format!("# {}", reason));
            }
        }
        self.outcomes.push(outcome);
    }

    /// Run a test that signals failure by panicking.
    pub fn run_assert<F>(&mut self, name: &str, test_fn: F)
    where
        F: FnOnce(),
    {
        self.run(name, || {
            test_fn();
            Ok(())
        });
    }

    pub fn passed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| **o == Outcome::Passed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    /// Print the summary comments. Returns true if nothing failed.
    pub fn finish(&self) -> bool {
        self.emit(&format!(
            "# {} passed, {} failed",
            self.passed(),
            self.failed()
        ));
        self.failed() == 0
    }
}

mod tap_tests {
    use super::*;
    use protopixel_net_macros::tap_test;

    #[tap_test]
    fn runner_counts_pass_and_error() {
        let mut runner = TestRunner::quiet();
        runner.run("passes", || Ok(()));
        runner.run("errors", || Err("boom".into()));
        assert_eq!(runner.passed(), 1);
        assert_eq!(runner.failed(), 1);
        assert!(!runner.finish());
    }

    #[tap_test]
    fn runner_records_panic_as_failure() {
        let mut runner = TestRunner::quiet();
        runner.run_assert("panics", || panic!("on purpose"));
        assert_eq!(
            runner.outcomes,
            vec![Outcome::Failed("panic: on purpose".to_string())]
        );
    }

    #[tap_test]
    fn entries_are_collected() -> TestResult {
        let found = inventory::iter::<TapTestEntry>
            .into_iter()
            .any(|e| e.name == "entries_are_collected");
        if found {
            Ok(())
        } else {
            Err("own entry missing from registry".into())
        }
    }
}
