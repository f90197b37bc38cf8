//! Console output in the layout of the layer's C++ test binaries, so
//! logs from either runner can be compared line by line.
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::time::Instant;

use crate::*;

const RULE: &str = "[==========]";

fn plural(n: usize, word: &str) -> String {
    if n == 1 { format!("{} {}", n, word) } else { format!("{} {}s", n, word) }
}

fn millis(result: &TestResult) -> u128 {
    result.elapsed().as_millis()
}

fn status_tag(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Passed => "[       OK ]",
        Outcome::Failed => "[  FAILED  ]",
        Outcome::Xpassed => "[ XPASSED  ]",
        Outcome::Xfailed => "[ XFAILED  ]",
        Outcome::Skipped => "[  SKIPPED ]",
        Outcome::Ignored => "[ DISABLED ]",
        Outcome::Filtered => "[ FILTERED ]",
    }
}

/// Writes progress and a closing summary to any `io::Write`.
#[derive(Debug)]
pub struct ConsoleReporter<W: Write + std::fmt::Debug> {
    out: W,
    start: Instant,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        ConsoleReporter::with_output(io::stdout())
    }
}

impl<W: Write + std::fmt::Debug> ConsoleReporter<W> {
    pub fn with_output(out: W) -> Self {
        ConsoleReporter { out, start: Instant::now() }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, f: impl FnOnce(&mut W) -> io::Result<()>) {
        if let Err(e) = f(&mut self.out).and_then(|()| self.out.flush()) {
            log::warn!("failed to write test report: {}", e);
        }
    }
}

fn write_result(
    out: &mut impl Write,
    name: &str,
    result: &TestResult,
) -> io::Result<()> {
    match result.outcome() {
        Outcome::Skipped => {
            let reason = result.skip_reason().unwrap_or("");
            writeln!(out, "{} {}", SKIP_PREFIX, reason)?;
        },
        Outcome::Failed | Outcome::Xfailed => {
            for failure in result.failures() {
                writeln!(out, "{}", failure)?;
            }
        },
        Outcome::Xpassed => writeln!(out, "expected to fail, but passed")?,
        _ => {},
    }
    writeln!(out, "{} {} ({} ms)", status_tag(result.outcome()), name, millis(result))
}

fn write_listing<'a>(
    out: &mut impl Write,
    outcome: Outcome,
    names: impl Iterator<Item = &'a str> + Clone,
) -> io::Result<()> {
    let count = names.clone().count();
    if count == 0 {
        return Ok(());
    }
    let tag = status_tag(outcome);
    writeln!(out, "{} {}, listed below:", tag, plural(count, "test"))?;
    for name in names {
        writeln!(out, "{} {}", tag, name)?;
    }
    Ok(())
}

impl<D, W: Write + std::fmt::Debug> TestReporter<Test<D>> for ConsoleReporter<W> {
    fn before_all(&mut self, tests: &[Test<D>]) {
        self.start = Instant::now();
        let suites: BTreeSet<_> = tests.iter().map(|test| test.suite()).collect();
        self.emit(|out| writeln!(
            out, "{} Running {} from {}.", RULE,
            plural(tests.len(), "test"), plural(suites.len(), "test suite"),
        ));
    }

    fn before_each(&mut self, test: &Test<D>) {
        self.emit(|out| writeln!(out, "[ RUN      ] {}", test.name()));
    }

    fn after_each(&mut self, test: &Test<D>, result: &TestResult) {
        self.emit(|out| write_result(out, test.name(), result));
    }

    fn after_all(&mut self, tests: &[Test<D>], results: &[TestResult]) {
        let counts = count_outcomes(results);
        let ran = results.iter().filter(|res| res.outcome().was_run()).count();
        let elapsed = self.start.elapsed().as_millis();
        let with = |outcome: Outcome| tests.iter().zip(results.iter())
            .filter(move |(_, res)| res.outcome() == outcome)
            .map(|(test, _)| test.name());
        self.emit(|out| {
            writeln!(out, "{} {} ran. ({} ms total)", RULE, plural(ran, "test"), elapsed)?;
            writeln!(out, "[  PASSED  ] {}.", plural(counts[Outcome::Passed], "test"))?;
            for &outcome in [Outcome::Skipped, Outcome::Xfailed].iter() {
                write_listing(out, outcome, with(outcome))?;
            }
            for &outcome in [Outcome::Failed, Outcome::Xpassed].iter() {
                write_listing(out, outcome, with(outcome))?;
            }
            let unrun = counts[Outcome::Ignored] + counts[Outcome::Filtered];
            if unrun > 0 {
                writeln!(out, "  {} not run ({} disabled, {} filtered)",
                    plural(unrun, "test"),
                    counts[Outcome::Ignored], counts[Outcome::Filtered])?;
            }
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Clone, Debug, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    /// Hands out verdicts in order, one per test that actually runs.
    #[derive(Debug)]
    struct Canned(Vec<Verdict>);

    impl TestContext<Test<()>> for Canned {
        fn run(&mut self, _test: &Test<()>) -> Verdict {
            self.0.remove(0)
        }
    }

    fn test(name: &str) -> Test<()> {
        TestAttrs::new().build_test(name.to_owned(), ())
    }

    fn driver(
        tests: Vec<Test<()>>,
        verdicts: Vec<Verdict>,
        reporter: Box<dyn TestReporter<Test<()>>>,
    ) -> TestDriver<()> {
        let mut builder = TestDriverBuilder::new();
        builder.add_tests(tests).set_reporter(reporter);
        builder.build(Box::new(Canned(verdicts)))
    }

    #[test]
    fn reports_each_test_and_summary() {
        let buf = SharedBuf::default();
        let tests = vec![
            test("PositiveLayerTest.good"),
            test("LayerTest.bad"),
            test("LayerTest.unsupported"),
            TestAttrs::new().ignore().build_test("LayerTest.later".to_owned(), ()),
        ];
        let verdicts = vec![
            Verdict::default(),
            Verdict::failed(vec![
                "expected VUID-B-0002 not seen.".to_owned(),
                "unexpected VUID-C-0003.".to_owned(),
            ]),
            Verdict::skipped("no widget"),
        ];
        let reporter = ConsoleReporter::with_output(buf.clone());
        let mut driver = driver(tests, verdicts, Box::new(reporter));
        driver.run();

        let out = String::from_utf8(buf.0.borrow().clone()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "[==========] Running 4 tests from 2 test suites.");
        assert_eq!(&lines[1..3], [
            "[ RUN      ] PositiveLayerTest.good",
            "[       OK ] PositiveLayerTest.good (0 ms)",
        ]);
        assert_eq!(&lines[3..7], [
            "[ RUN      ] LayerTest.bad",
            "expected VUID-B-0002 not seen.",
            "unexpected VUID-C-0003.",
            "[  FAILED  ] LayerTest.bad (0 ms)",
        ]);
        assert_eq!(&lines[7..10], [
            "[ RUN      ] LayerTest.unsupported",
            "             TEST SKIPPED: no widget",
            "[  SKIPPED ] LayerTest.unsupported (0 ms)",
        ]);
        assert!(lines[10].starts_with("[==========] 3 tests ran."));
        assert_eq!(&lines[11..], [
            "[  PASSED  ] 1 test.",
            "[  SKIPPED ] 1 test, listed below:",
            "[  SKIPPED ] LayerTest.unsupported",
            "[  FAILED  ] 1 test, listed below:",
            "[  FAILED  ] LayerTest.bad",
            "  1 test not run (1 disabled, 0 filtered)",
        ]);
        assert_eq!(out.matches("TEST SKIPPED").count(), 1);
        assert_eq!(driver.exit_code(), 1);
    }

    #[test]
    fn write_errors_do_not_stop_the_run() {
        let tests = vec![test("LayerTest.a"), test("LayerTest.b")];
        let verdicts = vec![Verdict::default(), Verdict::skipped("gone")];
        let mut driver = driver(tests, verdicts, Box::new(
            ConsoleReporter::with_output(BrokenPipe)));
        driver.run();
        let counts = driver.counts();
        assert_eq!(counts[Outcome::Passed], 1);
        assert_eq!(counts[Outcome::Skipped], 1);
        assert_eq!(driver.exit_code(), 0);
    }
}
