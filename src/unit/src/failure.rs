//! Failure recording shared by tests and the helpers they call.
//!
//! Failures come in two strengths. A *fatal* failure ends the test
//! body; it travels up the stack as `Err(Abort::Fatal(..))`. A
//! non-fatal failure is recorded with `add_failure` and the test keeps
//! going; the runner fails the test once the body returns. Skips are
//! not failures at all and travel as `Err(Abort::Skip(..))`.
use std::cell::RefCell;

use derive_more::Display;

/// Printed in front of the reason whenever a test is skipped.
pub const SKIP_PREFIX: &str = "             TEST SKIPPED:";

/// Early exit from a test body.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum Abort {
    #[display(fmt = "{}", _0)]
    Fatal(String),
    #[display(fmt = "skipped: {}", _0)]
    Skip(String),
}

impl Abort {
    pub fn fatal(msg: impl Into<String>) -> Self {
        Abort::Fatal(msg.into())
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Abort::Skip(reason.into())
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Abort::Skip(_))
    }
}

/// What a test body returns.
pub type TestStatus = Result<(), Abort>;

#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "{}", message)]
pub struct Failure {
    pub message: String,
    pub fatal: bool,
}

thread_local! {
    static FAILURES: RefCell<Vec<Failure>> = RefCell::new(Vec::new());
}

fn push(message: String, fatal: bool) {
    log::error!("{}", message);
    FAILURES.with(|f| f.borrow_mut().push(Failure { message, fatal }));
}

/// Records a failure without interrupting the test.
pub fn add_failure(message: impl Into<String>) {
    push(message.into(), false)
}

/// Records a failure that callers are expected to act on by returning
/// early; see `assert_no_fatal_failure!`.
pub fn add_fatal_failure(message: impl Into<String>) {
    push(message.into(), true)
}

pub fn has_failure() -> bool {
    FAILURES.with(|f| !f.borrow().is_empty())
}

pub fn has_fatal_failure() -> bool {
    FAILURES.with(|f| f.borrow().iter().any(|f| f.fatal))
}

/// Drains the failures recorded on this thread.
pub fn take_failures() -> Vec<Failure> {
    FAILURES.with(|f| std::mem::take(&mut *f.borrow_mut()))
}

/// Runs `f`, returning whatever it recorded separately from failures
/// recorded before the call.
pub fn record_failures<R>(f: impl FnOnce() -> R) -> (R, Vec<Failure>) {
    let outer = take_failures();
    let res = f();
    let inner = take_failures();
    FAILURES.with(|f| *f.borrow_mut() = outer);
    (res, inner)
}

/// Conversion used by `assert_no_fatal_failure!` so that it accepts
/// both unit-returning helpers and fallible ones.
pub trait IntoStatus {
    type Output;

    fn into_status(self) -> Result<Self::Output, Abort>;
}

impl IntoStatus for () {
    type Output = ();

    fn into_status(self) -> Result<(), Abort> {
        Ok(())
    }
}

impl<T, E: Into<Abort>> IntoStatus for Result<T, E> {
    type Output = T;

    fn into_status(self) -> Result<T, Abort> {
        self.map_err(Into::into)
    }
}

/// Returns from the enclosing test as skipped. The runner prints the
/// reason.
#[macro_export]
macro_rules! skip {
    ($($arg:tt)+) => {
        return Err($crate::Abort::Skip(format!($($arg)+)))
    };
}

#[macro_export]
macro_rules! assert_true {
    ($cond:expr) => {
        $crate::assert_true!($cond, "{} is false", stringify!($cond))
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::Abort::fatal(format!($($arg)+)));
        }
    };
}

#[macro_export]
macro_rules! assert_false {
    ($cond:expr) => {
        $crate::assert_false!($cond, "{} is true", stringify!($cond))
    };
    ($cond:expr, $($arg:tt)+) => {
        if $cond {
            return Err($crate::Abort::fatal(format!($($arg)+)));
        }
    };
}

/// Evaluates a helper and returns from the enclosing test if the helper
/// aborted or recorded a fatal failure.
#[macro_export]
macro_rules! assert_no_fatal_failure {
    ($e:expr) => {
        match $crate::IntoStatus::into_status($e) {
            Ok(value) => {
                if $crate::has_fatal_failure() {
                    return Err($crate::Abort::fatal(format!(
                        "fatal failure in {}", stringify!($e),
                    )));
                }
                value
            },
            Err(abort) => return Err(abort),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checks(flag: bool) -> TestStatus {
        assert_true!(flag);
        assert_false!(!flag, "flag was {}", flag);
        Ok(())
    }

    fn skips() -> TestStatus {
        skip!("no {} here", "widget");
    }

    fn nested(fatal: bool) -> TestStatus {
        assert_no_fatal_failure!(if fatal { add_fatal_failure("boom") });
        Ok(())
    }

    #[test]
    fn assertions() {
        assert_eq!(checks(true), Ok(()));
        assert_eq!(checks(false), Err(Abort::fatal("flag is false")));
    }

    #[test]
    fn skip_returns_reason() {
        assert_eq!(skips(), Err(Abort::skip("no widget here")));
    }

    #[test]
    fn fatal_failures_propagate() {
        let (res, failures) = record_failures(|| nested(true));
        assert!(matches!(res, Err(Abort::Fatal(_))));
        assert_eq!(failures.len(), 1);
        assert!(failures[0].fatal);

        let (res, failures) = record_failures(|| nested(false));
        assert_eq!(res, Ok(()));
        assert!(failures.is_empty());
    }

    #[test]
    fn record_failures_is_scoped() {
        add_failure("outer");
        let (_, inner) = record_failures(|| add_failure("inner"));
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].message, "inner");
        let outer = take_failures();
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].message, "outer");
        assert!(!has_failure());
    }
}
