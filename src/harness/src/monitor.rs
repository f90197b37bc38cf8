//! Pairs the diagnostics a test declares with the ones it observes.
//!
//! Records arrive on whatever thread is inside the API call. The debug
//! callback only reads atomics and pushes onto a lock-free queue; every
//! monitor operation first merges the queue into the state under the
//! mutex, so the mutex is never taken from inside a driver call and
//! never held across one.
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crossbeam::epoch::{self, Atomic, Owned, Shared};
use crossbeam::queue::SegQueue;
use derivative::Derivative;
use log::debug;
use parking_lot::{Mutex, MutexGuard};

use crate::*;

/// How an expectation recognizes a record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Matcher {
    /// Exact match on the record identifier.
    Identifier(String),
    /// Substring of the message text. Kept for diagnostics that carry
    /// no identifier; brittle across layer versions.
    Substring(String),
}

impl Matcher {
    pub fn substring(text: impl Into<String>) -> Self {
        Matcher::Substring(text.into())
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Matcher::Identifier(id) => record.identifier == *id,
            Matcher::Substring(text) => record.message.contains(&text[..]),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Matcher::Identifier(id) => write!(f, "{}", id),
            Matcher::Substring(text) => write!(f, "\"{}\"", text),
        }
    }
}

impl<'a> From<&'a str> for Matcher {
    fn from(id: &'a str) -> Self {
        Matcher::Identifier(id.to_owned())
    }
}

impl From<String> for Matcher {
    fn from(id: String) -> Self {
        Matcher::Identifier(id)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExpectationKind {
    /// Must be seen before the next `verify_found`.
    Desired,
    /// Tolerated if seen, typically a side effect of the call under test.
    Suppressed,
    /// Tolerated until the next reset.
    Allowed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Expectation {
    pub kind: ExpectationKind,
    pub filter: Severities,
    pub matcher: Matcher,
    pub remaining: u32,
}

impl Expectation {
    pub fn new(kind: ExpectationKind, filter: Severities, matcher: Matcher) ->
        Self
    {
        Self { kind, filter, matcher, remaining: 1 }
    }

    fn accepts(&self, record: &Record) -> bool {
        self.filter.contains(record.severity.bit())
            && self.matcher.matches(record)
    }
}

#[derive(Debug, Default, Eq, PartialEq)]
struct State {
    desired: Vec<Expectation>,
    suppressed: Vec<Expectation>,
    allowed: Vec<Expectation>,
    /// Severities that fail the current `expect_success` block.
    seal: Option<Severities>,
    seen: Vec<Record>,
    matched: Vec<Record>,
    unexpected: Vec<Record>,
    any_failure_seen: bool,
}

impl State {
    /// Severities anyone is listening for. Errors always are.
    fn interest(&self) -> Severities {
        self.desired.iter()
            .chain(self.allowed.iter())
            .fold(Severities::ERROR, |acc, exp| acc | exp.filter)
            | self.seal.unwrap_or_default()
    }

    fn process(&mut self, record: Record) {
        debug!("diagnostic: {}", record);
        self.seen.push(record.clone());

        let severity = record.severity.bit();
        if self.seal.map_or(false, |seal| seal.contains(severity)) {
            self.unexpected.push(record);
            return;
        }
        if !self.interest().contains(severity) {
            return;
        }

        if let Some(exp) = self.desired.iter_mut()
            .find(|exp| exp.remaining > 0 && exp.accepts(&record))
        {
            exp.remaining -= 1;
            self.any_failure_seen = true;
            self.matched.push(record);
            return;
        }
        if let Some(exp) = self.suppressed.iter_mut()
            .find(|exp| exp.accepts(&record))
        {
            exp.remaining = exp.remaining.saturating_sub(1);
            return;
        }
        // Repeats of an already satisfied expectation
        if self.desired.iter().any(|exp| exp.accepts(&record)) {
            self.matched.push(record);
            return;
        }
        if self.allowed.iter().any(|exp| exp.accepts(&record)) {
            return;
        }
        if record.severity == Severity::Error {
            self.unexpected.push(record);
        }
    }

    fn pending(&self) -> impl Iterator<Item = &Expectation> {
        self.desired.iter().filter(|exp| exp.remaining > 0)
    }

    fn reset(&mut self) {
        let suppressed = std::mem::take(&mut self.suppressed);
        *self = State { suppressed, ..Default::default() };
    }
}

/// Receives records from the debug callback.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Monitor {
    /// Cached `State::interest`, readable from the callback.
    interest: AtomicU32,
    #[derivative(Debug = "ignore")]
    inbox: SegQueue<Record>,
    /// Installed by `set_bailout`, null otherwise.
    #[derivative(Debug = "ignore")]
    bailout: Atomic<Arc<AtomicBool>>,
    state: Mutex<State>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            interest: AtomicU32::new(Severities::ERROR.bits()),
            inbox: SegQueue::new(),
            bailout: Atomic::null(),
            state: Mutex::new(Default::default()),
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        // No other references exist during drop.
        unsafe {
            let flag = self.bailout.load(Ordering::Relaxed, epoch::unprotected());
            if !flag.is_null() {
                drop(flag.into_owned());
            }
        }
    }
}

impl Monitor {
    pub fn new() -> Self {
        Default::default()
    }

    /// Locks the state after folding in everything received so far.
    fn lock(&self) -> MutexGuard<'_, State> {
        let mut state = self.state.lock();
        while let Some(record) = self.inbox.pop() {
            state.process(record);
        }
        state
    }

    fn swap_bailout(&self, flag: Option<Arc<AtomicBool>>) {
        let guard = epoch::pin();
        let old = match flag {
            Some(flag) => self.bailout.swap(Owned::new(flag), Ordering::AcqRel, &guard),
            None => self.bailout.swap(Shared::null(), Ordering::AcqRel, &guard),
        };
        if !old.is_null() {
            // Callbacks may still be reading the old flag.
            unsafe { guard.defer_destroy(old); }
        }
    }

    fn update_interest(&self, state: &State) {
        self.interest.store(state.interest().bits(), Ordering::Relaxed);
    }

    fn expect(&self, exp: Expectation) {
        let mut state = self.lock();
        match exp.kind {
            ExpectationKind::Desired => state.desired.push(exp),
            ExpectationKind::Suppressed => state.suppressed.push(exp),
            ExpectationKind::Allowed => state.allowed.push(exp),
        }
        self.update_interest(&state);
    }

    /// Declares a diagnostic the next call must produce.
    pub fn set_desired_failure_msg(
        &self,
        filter: Severities,
        matcher: impl Into<Matcher>,
    ) {
        let kind = ExpectationKind::Desired;
        self.expect(Expectation::new(kind, filter, matcher.into()));
    }

    /// Declares a diagnostic that may arise as a side effect and should
    /// be ignored. Survives `reset`.
    pub fn set_unexpected_error(&self, matcher: impl Into<Matcher>) {
        let kind = ExpectationKind::Suppressed;
        self.expect(Expectation::new(kind, Severities::all(), matcher.into()));
    }

    /// Tolerates a diagnostic until the next reset.
    pub fn set_allowed_failure_msg(&self, matcher: impl Into<Matcher>) {
        let kind = ExpectationKind::Allowed;
        self.expect(Expectation::new(kind, Severities::all(), matcher.into()));
    }

    /// No error may arrive before the next `verify_not_found`.
    pub fn expect_success(&self) {
        self.expect_success_with(Severities::ERROR)
    }

    pub fn expect_success_with(&self, mask: Severities) {
        let mut state = self.lock();
        state.seal = Some(state.seal.unwrap_or_default() | mask);
        self.update_interest(&state);
    }

    /// Checks that every desired diagnostic was seen and nothing else
    /// went wrong, then resets. Failures are recorded with the runner.
    pub fn verify_found(&self) -> bool {
        let mut state = self.lock();
        let mut ok = true;
        for exp in state.pending() {
            unit::add_failure(format!("expected {} not seen.", exp.matcher));
            ok = false;
        }
        for record in state.unexpected.iter() {
            unit::add_failure(format!("unexpected {}.", record.label()));
            ok = false;
        }
        self.finish_block(&mut state);
        ok
    }

    /// Checks that nothing desired or erroneous was seen, then resets.
    pub fn verify_not_found(&self) -> bool {
        let mut state = self.lock();
        let mut ok = true;
        for record in state.matched.iter().chain(state.unexpected.iter()) {
            unit::add_failure(format!("unexpected {}.", record.label()));
            ok = false;
        }
        self.finish_block(&mut state);
        ok
    }

    fn finish_block(&self, state: &mut State) {
        state.reset();
        self.update_interest(state);
        self.swap_bailout(None);
    }

    /// Forgets desired expectations and observations. Suppressions are
    /// kept.
    pub fn reset(&self) {
        let mut state = self.lock();
        self.finish_block(&mut state);
    }

    /// Returns to the freshly constructed state, dropping anything
    /// still queued.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        while self.inbox.pop().is_some() {}
        *state = Default::default();
        self.update_interest(&state);
        self.swap_bailout(None);
    }

    /// End-of-test check: pending desired expectations and unreported
    /// errors are failures. Leaves the monitor cleared.
    pub fn finish(&self) -> bool {
        let ok = {
            let state = self.lock();
            let mut ok = true;
            for exp in state.pending() {
                unit::add_failure(format!("expected {} not seen.", exp.matcher));
                ok = false;
            }
            for record in state.unexpected.iter() {
                unit::add_failure(format!("unexpected {}.", record.label()));
                ok = false;
            }
            ok
        };
        self.clear();
        ok
    }

    /// The flag is raised by the first interesting record; records
    /// arriving after that are discarded. Cleared by the next reset.
    pub fn set_bailout(&self, flag: Arc<AtomicBool>) {
        self.swap_bailout(Some(flag));
    }

    /// True once any desired expectation matched since the last reset.
    pub fn any_failure_seen(&self) -> bool {
        self.lock().any_failure_seen
    }

    /// Every record observed since the last reset.
    pub fn seen(&self) -> Vec<Record> {
        self.lock().seen.clone()
    }

    /// Desired expectations not yet satisfied.
    pub fn pending(&self) -> Vec<Matcher> {
        self.lock().pending().map(|exp| exp.matcher.clone()).collect()
    }

    /// Errors that no expectation accounted for.
    pub fn unexpected(&self) -> Vec<Record> {
        self.lock().unexpected.clone()
    }
}

impl DiagnosticSink for Monitor {
    fn receive(&self, record: Record) {
        let guard = epoch::pin();
        let flag = self.bailout.load(Ordering::Acquire, &guard);
        if let Some(flag) = unsafe { flag.as_ref() } {
            if flag.load(Ordering::Acquire) {
                return;
            }
            let interest = Severities::from_bits_truncate(
                self.interest.load(Ordering::Relaxed));
            if interest.contains(record.severity.bit()) {
                flag.store(true, Ordering::Release);
            }
        }
        self.inbox.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(id: &str, message: &str) -> Record {
        Record::new(Severity::Error, id, message)
    }

    fn warning(id: &str) -> Record {
        Record::new(Severity::Warning, id, "")
    }

    fn messages(failures: Vec<unit::Failure>) -> Vec<String> {
        failures.into_iter().map(|f| f.message).collect()
    }

    #[test]
    fn positive_match() {
        let m = Monitor::new();
        m.set_desired_failure_msg(Severities::ERROR, "VUID-A-0001");
        m.receive(error("VUID-A-0001", "bad thing"));
        let (ok, failures) = unit::record_failures(|| m.verify_found());
        assert!(ok);
        assert!(failures.is_empty());
    }

    #[test]
    fn unmatched() {
        let m = Monitor::new();
        m.set_desired_failure_msg(Severities::ERROR, "VUID-B-0002");
        let (ok, failures) = unit::record_failures(|| m.verify_found());
        assert!(!ok);
        assert_eq!(messages(failures), ["expected VUID-B-0002 not seen."]);
    }

    #[test]
    fn stray_error() {
        let m = Monitor::new();
        m.receive(error("VUID-C-0003", "stray"));
        let (ok, failures) = unit::record_failures(|| m.verify_not_found());
        assert!(!ok);
        assert_eq!(messages(failures), ["unexpected VUID-C-0003."]);
    }

    #[test]
    fn suppression() {
        let m = Monitor::new();
        m.set_unexpected_error("VUID-D-0004");
        m.set_desired_failure_msg(Severities::ERROR, "VUID-D-0005");
        m.receive(error("VUID-D-0004", "side effect"));
        m.receive(error("VUID-D-0005", "the point"));
        let (ok, failures) = unit::record_failures(|| m.verify_found());
        assert!(ok, "{:?}", failures);
    }

    #[test]
    fn reset_is_idempotent() {
        let m = Monitor::new();
        m.set_desired_failure_msg(Severities::ERROR, "VUID-A-0001");
        m.set_desired_failure_msg(Severities::WARNING, Matcher::substring("x"));
        m.receive(error("VUID-A-0001", ""));
        m.reset();
        assert_eq!(*m.state.lock(), State::default());
        m.reset();
        assert_eq!(*m.state.lock(), State::default());
        assert_eq!(m.interest.load(Ordering::Relaxed), Severities::ERROR.bits());
    }

    #[test]
    fn match_order_is_irrelevant() {
        let ids = ["VUID-X-a-1", "VUID-X-b-2", "VUID-X-c-3"];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for order in orders.iter() {
            let m = Monitor::new();
            for id in ids.iter() {
                m.set_desired_failure_msg(Severities::ERROR, *id);
            }
            for &i in order.iter() {
                m.receive(error(ids[i], ""));
            }
            let (ok, failures) = unit::record_failures(|| m.verify_found());
            assert!(ok, "{:?}: {:?}", order, failures);
        }
    }

    #[test]
    fn desired_before_suppressed() {
        let m = Monitor::new();
        m.set_unexpected_error("VUID-E-0006");
        m.set_desired_failure_msg(Severities::ERROR, "VUID-E-0006");
        m.receive(error("VUID-E-0006", "first"));
        assert!(m.any_failure_seen());
        assert!(m.pending().is_empty());
        m.receive(error("VUID-E-0006", "second"));
        assert!(m.unexpected().is_empty());
        assert_eq!(m.state.lock().suppressed[0].remaining, 0);
        let (ok, _) = unit::record_failures(|| m.verify_found());
        assert!(ok);
    }

    #[test]
    fn severity_filter_honored() {
        let m = Monitor::new();
        m.set_desired_failure_msg(Severities::WARNING, "VUID-F-0007");
        m.receive(error("VUID-F-0007", ""));
        let (ok, failures) = unit::record_failures(|| m.verify_found());
        assert!(!ok);
        assert_eq!(messages(failures), [
            "expected VUID-F-0007 not seen.",
            "unexpected VUID-F-0007.",
        ]);

        m.set_desired_failure_msg(Severities::WARNING, "VUID-F-0007");
        m.receive(warning("VUID-F-0007"));
        let (ok, _) = unit::record_failures(|| m.verify_found());
        assert!(ok);
    }

    #[test]
    fn expect_success_seals() {
        let m = Monitor::new();
        m.set_unexpected_error("VUID-G-0008");
        m.expect_success();
        m.receive(warning("UNASSIGNED-harmless"));
        let (ok, _) = unit::record_failures(|| m.verify_not_found());
        assert!(ok);

        m.expect_success();
        m.receive(error("VUID-G-0008", "suppressed elsewhere"));
        let (ok, failures) = unit::record_failures(|| m.verify_not_found());
        assert!(!ok);
        assert_eq!(messages(failures), ["unexpected VUID-G-0008."]);
    }

    #[test]
    fn verify_not_found_rejects_desired() {
        let m = Monitor::new();
        m.set_desired_failure_msg(Severities::WARNING, "UNASSIGNED-perf");
        let (ok, _) = unit::record_failures(|| m.verify_not_found());
        assert!(ok);

        m.set_desired_failure_msg(Severities::WARNING, "UNASSIGNED-perf");
        m.receive(warning("UNASSIGNED-perf"));
        let (ok, failures) = unit::record_failures(|| m.verify_not_found());
        assert!(!ok);
        assert_eq!(messages(failures), ["unexpected UNASSIGNED-perf."]);
    }

    #[test]
    fn uninteresting_records_dropped() {
        let m = Monitor::new();
        m.receive(warning("UNASSIGNED-noise"));
        m.receive(Record::new(Severity::Info, "", "created"));
        assert_eq!(m.seen().len(), 2);
        assert!(m.unexpected().is_empty());
        let (ok, _) = unit::record_failures(|| m.verify_not_found());
        assert!(ok);
    }

    #[test]
    fn substring_matcher() {
        let m = Monitor::new();
        m.set_desired_failure_msg(
            Severities::ERROR,
            Matcher::substring("sample count of"),
        );
        m.receive(error("", "was created with a sample count of 4"));
        let (ok, _) = unit::record_failures(|| m.verify_found());
        assert!(ok);
    }

    #[test]
    fn bailout_discards_later_records() {
        let m = Monitor::new();
        let flag = Arc::new(AtomicBool::new(false));
        m.set_bailout(Arc::clone(&flag));
        m.set_desired_failure_msg(Severities::ERROR, "UNASSIGNED-Threading");
        m.receive(Record::new(Severity::Info, "", "ignored"));
        assert!(!flag.load(Ordering::Acquire));
        m.receive(error("UNASSIGNED-Threading", ""));
        assert!(flag.load(Ordering::Acquire));
        m.receive(error("VUID-later-1", ""));
        let (ok, _) = unit::record_failures(|| m.verify_found());
        assert!(ok);
        // Verification uninstalls the flag.
        m.receive(error("VUID-later-2", ""));
        assert_eq!(m.unexpected().len(), 1);
    }

    #[test]
    fn bailout_is_shared_across_threads() {
        let m = Monitor::new();
        let flag = Arc::new(AtomicBool::new(false));
        m.set_desired_failure_msg(Severities::ERROR, "UNASSIGNED-Threading");
        m.set_bailout(Arc::clone(&flag));
        crossbeam::scope(|s| {
            for _ in 0..4 {
                s.spawn(|_| {
                    while !flag.load(Ordering::Acquire) {
                        m.receive(error("UNASSIGNED-Threading", ""));
                    }
                    m.receive(error("VUID-after-1", ""));
                });
            }
        }).unwrap();
        let (ok, failures) = unit::record_failures(|| m.verify_found());
        assert!(ok, "{:?}", messages(failures));

        // A new flag can be installed once the old one is gone.
        let second = Arc::new(AtomicBool::new(false));
        m.set_bailout(Arc::clone(&second));
        m.receive(error("VUID-after-2", ""));
        assert!(second.load(Ordering::Acquire));
        m.clear();
        m.receive(error("VUID-after-3", ""));
        assert_eq!(m.unexpected().len(), 1);
    }

    #[test]
    fn finish_reports_leftovers() {
        let m = Monitor::new();
        m.set_unexpected_error("VUID-H-0009");
        m.set_desired_failure_msg(Severities::ERROR, "VUID-H-0010");
        let (ok, failures) = unit::record_failures(|| m.finish());
        assert!(!ok);
        assert_eq!(messages(failures), ["expected VUID-H-0010 not seen."]);
        assert_eq!(*m.state.lock(), State::default());
    }
}
