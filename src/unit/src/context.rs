use std::any::Any;
use std::panic::{self, AssertUnwindSafe, RefUnwindSafe};

use derive_more::*;

use crate::*;

/// Implementors of this trait are responsible for running individual
/// tests which may be caught panicking. It is automatically implemented
/// for most types that implement `Fn(&D) -> TestStatus`. If this type
/// uses internal mutability, it must be marked as `RefUnwindSafe`, as it
/// will be referenced from inside `catch_unwind`.
pub trait PanicTestInvoker<D>: RefUnwindSafe + std::fmt::Debug {
    /// Checked before `invoke`. A skip here means the test never runs.
    fn precondition(&self, _test: &Test<D>) -> TestStatus {
        Ok(())
    }

    /// Runs the test.
    fn invoke(&self, test: &Test<D>) -> TestStatus;
}

impl<D, F> PanicTestInvoker<D> for F
    where F: Fn(&D) -> TestStatus + RefUnwindSafe + std::fmt::Debug
{
    fn invoke(&self, test: &Test<D>) -> TestStatus {
        self(test.data())
    }
}

/// The test type of the vanilla Rust test runner.
pub type PlainTest = Test<fn()>;

#[derive(Debug, Default)]
pub struct PlainTestInvoker;

impl PanicTestInvoker<fn()> for PlainTestInvoker {
    fn invoke(&self, test: &PlainTest) -> TestStatus {
        (test.data())();
        Ok(())
    }
}

/// What a context observed while running one test, before the test's
/// attributes are taken into account.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Verdict {
    pub skip_reason: Option<String>,
    /// Failure messages in the order they happened.
    pub failures: Vec<String>,
}

impl Verdict {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Verdict { skip_reason: Some(reason.into()), failures: Vec::new() }
    }

    pub fn failed(failures: Vec<String>) -> Self {
        Verdict { skip_reason: None, failures }
    }

    pub fn is_failure(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Combines a body's return value with the failures it recorded. A
    /// skip only counts as one if nothing failed first.
    pub fn from_status(status: TestStatus, recorded: Vec<Failure>) -> Self {
        let mut failures: Vec<_> =
            recorded.into_iter().map(|failure| failure.message).collect();
        match status {
            Ok(()) => {},
            Err(Abort::Skip(reason)) if failures.is_empty() =>
                return Self::skipped(reason),
            Err(Abort::Skip(reason)) =>
                failures.push(format!("skipped after failing: {}", reason)),
            Err(Abort::Fatal(msg)) => failures.push(msg),
        }
        Self::failed(failures)
    }
}

/// Runs tests where failure is signaled by panicking, by returning
/// `Err`, or by recording failures through `add_failure`. This type
/// wraps a "test invocation helper", which is at minimum responsible for
/// running the test, but may optionally do things such as
/// setup/teardown or observing the test's side effects.
///
/// The invocation helper is borrowed immutably from inside
/// `catch_unwind`, so stateful setup/teardown must go through internal
/// mutability.
#[derive(Constructor, Debug, Default)]
#[non_exhaustive]
pub struct PanicTestContext<F> {
    inner: F,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test panicked".to_owned()
    }
}

impl<D, F> TestContext<Test<D>> for PanicTestContext<F>
where
    D: RefUnwindSafe,
    F: PanicTestInvoker<D>,
{
    fn run(&mut self, test: &Test<D>) -> Verdict {
        // Drop anything left behind by a previous test on this thread
        let _ = take_failures();

        let inner = &self.inner;
        let status = panic::catch_unwind(AssertUnwindSafe(|| {
            inner.precondition(test)?;
            inner.invoke(test)
        })).unwrap_or_else(|payload| Err(Abort::Fatal(panic_message(&*payload))));
        Verdict::from_status(status, take_failures())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NeedsWidget;

    impl PanicTestInvoker<fn()> for NeedsWidget {
        fn precondition(&self, test: &PlainTest) -> TestStatus {
            if test.requires_device_profile() {
                return Err(Abort::skip("no widget"));
            }
            Ok(())
        }

        fn invoke(&self, test: &PlainTest) -> TestStatus {
            (test.data())();
            Ok(())
        }
    }

    fn fails() {
        panic!("ran anyway");
    }

    #[test]
    fn precondition_skips_without_running() {
        let mut context = PanicTestContext::new(NeedsWidget);
        let gated = TestAttrs::new().requires_device_profile()
            .build_test("Gated.fails".to_owned(), fails as fn());
        assert_eq!(context.run(&gated), Verdict::skipped("no widget"));

        let open = TestAttrs::new()
            .build_test("Open.fails".to_owned(), fails as fn());
        assert_eq!(context.run(&open), Verdict::failed(vec!["ran anyway".to_owned()]));
    }

    #[test]
    fn recorded_failures_come_first() {
        let recorded = vec![Failure { message: "first".to_owned(), fatal: false }];
        let verdict =
            Verdict::from_status(Err(Abort::fatal("second")), recorded.clone());
        assert_eq!(verdict.failures, ["first", "second"]);

        let verdict = Verdict::from_status(Err(Abort::skip("why")), recorded);
        assert_eq!(verdict.skip_reason, None);
        assert_eq!(verdict.failures, ["first", "skipped after failing: why"]);

        let verdict = Verdict::from_status(Err(Abort::skip("why")), Vec::new());
        assert_eq!(verdict, Verdict::skipped("why"));
    }
}
