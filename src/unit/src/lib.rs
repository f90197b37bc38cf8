//! A test runner for suites that report through a layer of their own
//! rather than through plain panics.
//!
//! Tests are registered with `declare_tests!` and run one at a time by
//! a `TestDriver`. A `TestContext` turns each run into a `Verdict`; the
//! driver applies the test's attributes to get an `Outcome` and hands
//! the result to a `TestReporter`.
use std::time::{Duration, Instant};

use enum_map::{Enum, EnumMap};
use log::debug;

mod cli;
mod context;
mod failure;
mod filter;
#[macro_use]
mod macros;
mod reporter;

pub use cli::*;
pub use context::*;
pub use failure::*;
pub use filter::*;
pub use reporter::*;

/// Provides the environment in which tests are run.
pub trait TestContext<T>: std::fmt::Debug {
    fn run(&mut self, test: &T) -> Verdict;
}

/// The interpretation of the results of an executed test.
#[derive(Clone, Copy, Debug, Enum, Eq, PartialEq)]
pub enum Outcome {
    Passed,
    Failed,
    Xpassed,
    Xfailed,
    Skipped,
    Ignored,
    Filtered,
}

impl Outcome {
    /// Outcomes that make the run fail.
    pub fn is_critical(&self) -> bool {
        matches!(self, Outcome::Failed | Outcome::Xpassed)
    }

    /// False for tests that were never started.
    pub fn was_run(&self) -> bool {
        !matches!(self, Outcome::Ignored | Outcome::Filtered)
    }
}

#[derive(Clone, Debug)]
pub struct TestResult {
    outcome: Outcome,
    skip_reason: Option<String>,
    failures: Vec<String>,
    elapsed: Duration,
}

impl TestResult {
    fn not_run(outcome: Outcome) -> Self {
        TestResult {
            outcome,
            skip_reason: None,
            failures: Vec::new(),
            elapsed: Duration::default(),
        }
    }

    fn judge<D>(test: &Test<D>, verdict: Verdict, elapsed: Duration) -> Self {
        let Verdict { skip_reason, failures } = verdict;
        let outcome = if skip_reason.is_some() {
            Outcome::Skipped
        } else {
            let ok = failures.is_empty() != test.should_err();
            match (test.xfail(), ok) {
                (false, true) => Outcome::Passed,
                (false, false) => Outcome::Failed,
                (true, true) => Outcome::Xpassed,
                (true, false) => Outcome::Xfailed,
            }
        };
        TestResult { outcome, skip_reason, failures, elapsed }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }

    /// Every failure the test produced, including expected ones.
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Exports or displays test results.
pub trait TestReporter<T>: std::fmt::Debug {
    /// Called at the beginning of testing.
    fn before_all(&mut self, tests: &[T]);

    /// Called in real time before each test that is actually run.
    fn before_each(&mut self, test: &T);

    /// Called in real time after each test that was run.
    fn after_each(&mut self, test: &T, result: &TestResult);

    /// Called once all tests are finished.
    fn after_all(&mut self, tests: &[T], results: &[TestResult]);
}

#[derive(Clone, Debug, Default)]
pub struct TestAttrs {
    ignore: bool,
    xfail: bool,
    should_err: bool,
    requires_device_profile: bool,
}

impl TestAttrs {
    pub fn new() -> Self {
        Default::default()
    }

    /// Not run unless the runner includes ignored tests.
    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }

    /// Known to fail; passing is reported as a regression.
    pub fn xfail(mut self) -> Self {
        self.xfail = true;
        self
    }

    /// Passes only if the body fails.
    pub fn should_err(mut self) -> Self {
        self.should_err = true;
        self
    }

    /// Only meaningful when the device profile layer is loaded.
    pub fn requires_device_profile(mut self) -> Self {
        self.requires_device_profile = true;
        self
    }

    pub fn build_test<D>(self, name: String, data: D) -> Test<D> {
        Test { name, attrs: self, data }
    }
}

/// A registered test. Names follow the `<Suite>.<Case>` convention.
#[derive(Clone, Debug)]
pub struct Test<D> {
    name: String,
    attrs: TestAttrs,
    data: D,
}

impl<D> Test<D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The part of the name before the first `.`.
    pub fn suite(&self) -> &str {
        self.name.split('.').next().unwrap_or("")
    }

    pub fn ignore(&self) -> bool {
        self.attrs.ignore
    }

    pub fn xfail(&self) -> bool {
        self.attrs.xfail
    }

    pub fn should_err(&self) -> bool {
        self.attrs.should_err
    }

    pub fn requires_device_profile(&self) -> bool {
        self.attrs.requires_device_profile
    }

    pub fn data(&self) -> &D {
        &self.data
    }
}

/// Collects tests and runner options.
#[derive(Debug, Default)]
pub struct TestDriverBuilder<T> {
    tests: Vec<T>,
    reporter: Option<Box<dyn TestReporter<T>>>,
    config: RunnerConfig,
}

impl<T> TestDriverBuilder<T> {
    pub fn new() -> Self {
        TestDriverBuilder {
            tests: Vec::new(),
            reporter: None,
            config: Default::default(),
        }
    }

    pub fn add_test(&mut self, test: T) -> &mut Self {
        self.tests.push(test);
        self
    }

    pub fn add_tests(&mut self, tests: impl IntoIterator<Item = T>) ->
        &mut Self
    {
        self.tests.extend(tests);
        self
    }

    pub fn set_reporter(&mut self, reporter: Box<dyn TestReporter<T>>) ->
        &mut Self
    {
        self.reporter = Some(reporter);
        self
    }

    pub fn set_config(&mut self, config: RunnerConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn tests(&self) -> &[T] {
        &self.tests
    }
}

impl<D> TestDriverBuilder<Test<D>> {
    pub fn build(self, context: Box<dyn TestContext<Test<D>>>) ->
        TestDriver<D>
    {
        let reporter = self.reporter
            .unwrap_or_else(|| Box::new(ConsoleReporter::stdout()));
        TestDriver {
            tests: self.tests,
            results: Vec::new(),
            reporter,
            context,
            config: self.config,
        }
    }
}

impl TestDriverBuilder<PlainTest> {
    /// Builds a driver for plain functions which fail by panicking.
    pub fn build_basic(self) -> TestDriver<fn()> {
        self.build(Box::new(PanicTestContext::new(PlainTestInvoker)))
    }
}

/// Executes tests and reports results.
#[derive(Debug)]
pub struct TestDriver<D> {
    tests: Vec<Test<D>>,
    results: Vec<TestResult>,
    reporter: Box<dyn TestReporter<Test<D>>>,
    context: Box<dyn TestContext<Test<D>>>,
    config: RunnerConfig,
}

impl<D> TestDriver<D> {
    /// Runs every test in registration order. Results from an earlier
    /// call are replaced.
    pub fn run(&mut self) {
        if self.config.list {
            for test in self.tests.iter() {
                println!("{}: test", test.name());
            }
            return;
        }

        let tests = std::mem::take(&mut self.tests);
        self.reporter.before_all(&tests);
        let results: Vec<_> = tests.iter().map(|test| self.run_one(test)).collect();
        self.reporter.after_all(&tests, &results);
        self.tests = tests;
        self.results = results;
    }

    fn run_one(&mut self, test: &Test<D>) -> TestResult {
        if !self.config.filter.is_match(test) {
            return TestResult::not_run(Outcome::Filtered);
        }
        if test.ignore() && !self.config.include_ignored {
            return TestResult::not_run(Outcome::Ignored);
        }

        debug!("running {}", test.name());
        self.reporter.before_each(test);
        let start = Instant::now();
        let verdict = self.context.run(test);
        let result = TestResult::judge(test, verdict, start.elapsed());
        self.reporter.after_each(test, &result);
        result
    }

    pub fn tests(&self) -> &[Test<D>] {
        &self.tests
    }

    /// One result per test, in the order of `tests`.
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn counts(&self) -> EnumMap<Outcome, usize> {
        count_outcomes(&self.results)
    }

    /// Process exit code summarizing the run.
    pub fn exit_code(&self) -> i32 {
        self.results.iter().any(|res| res.outcome.is_critical()) as i32
    }
}

pub fn count_outcomes(results: &[TestResult]) -> EnumMap<Outcome, usize> {
    let mut counts = EnumMap::default();
    for result in results.iter() {
        counts[result.outcome] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(failures: &[&str]) -> Verdict {
        Verdict::failed(failures.iter().map(|&s| s.to_owned()).collect())
    }

    fn judge(attrs: TestAttrs, verdict: Verdict) -> Outcome {
        let test = attrs.build_test("Judge.case".to_owned(), ());
        TestResult::judge(&test, verdict, Duration::default()).outcome()
    }

    #[test]
    fn attributes_decide_outcome() {
        let new = TestAttrs::new;
        assert_eq!(judge(new(), verdict(&[])), Outcome::Passed);
        assert_eq!(judge(new(), verdict(&["x"])), Outcome::Failed);
        assert_eq!(judge(new().should_err(), verdict(&["x"])), Outcome::Passed);
        assert_eq!(judge(new().should_err(), verdict(&[])), Outcome::Failed);
        assert_eq!(judge(new().xfail(), verdict(&["x"])), Outcome::Xfailed);
        assert_eq!(judge(new().xfail(), verdict(&[])), Outcome::Xpassed);
        assert_eq!(judge(new().xfail(), Verdict::skipped("n/a")), Outcome::Skipped);
    }

    #[test]
    fn skip_reason_is_kept() {
        let test = TestAttrs::new().build_test("Judge.skip".to_owned(), ());
        let result = TestResult::judge(
            &test, Verdict::skipped("no widget"), Duration::default());
        assert_eq!(result.skip_reason(), Some("no widget"));
        assert!(result.failures().is_empty());
        assert!(!result.outcome().is_critical());
    }
}
