//! Exercises test attributes and outcome accounting.
use layercheck_unit::*;

macro_rules! test {
    ($(@$attr:ident)* $fn:path) => {{
        let name = concat!("Vanilla.", stringify!($fn)).to_owned();
        TestAttrs::new()
            $(.$attr())*
            .build_test(name, $fn as fn())
    }}
}

fn test_disjoint() {
    assert!(!(1..3).any(|x| (3..5).contains(&x)));
}

fn test_iterate() {
    assert_eq!((0..4).sum::<i32>(), 6);
}

fn test_ignore() {
    panic!("ignored tests never run");
}

fn test_xfail() {
    panic!("expected to fail");
}

fn test_should_err() {
    panic!("expected to err");
}

fn test_failure() {
    assert_eq!(1 + 1, 3);
}

fn test_xpass() {}

fn test_recorded_failure() {
    add_failure("expected VUID-B-0002 not seen.");
    add_failure("unexpected VUID-C-0003.");
}

fn status_skip() -> TestStatus {
    skip!("needs {}", "a widget");
}

fn status_fatal() -> TestStatus {
    add_failure("first");
    assert_true!(1 > 2);
    Ok(())
}

fn status_ok() -> TestStatus {
    Ok(())
}

#[derive(Debug)]
struct StatusInvoker;

impl PanicTestInvoker<fn() -> TestStatus> for StatusInvoker {
    fn invoke(&self, test: &Test<fn() -> TestStatus>) -> TestStatus {
        (test.data())()
    }
}

fn add_tests(builder: &mut TestDriverBuilder<PlainTest>) {
    builder
        .add_test(test!(test_disjoint))
        .add_test(test!(test_iterate))
        .add_test(test!(@ignore test_ignore))
        .add_test(test!(@xfail test_xfail))
        .add_test(test!(@should_err test_should_err))
        // These three tests actually fail
        .add_test(test!(test_failure))
        .add_test(test!(@xfail test_xpass))
        .add_test(test!(test_recorded_failure));
}

fn status_tests() {
    type StatusFn = fn() -> TestStatus;
    let test = |name: &str, f: StatusFn| {
        TestAttrs::new().build_test(name.to_owned(), f)
    };
    let mut builder = TestDriverBuilder::new();
    builder
        .add_test(test("Status.skip", status_skip))
        .add_test(test("Status.fatal", status_fatal))
        .add_test(test("Status.ok", status_ok));
    let mut driver = builder.build(Box::new(PanicTestContext::new(StatusInvoker)));
    driver.run();

    let results = driver.results();
    assert_eq!(results[0].outcome(), Outcome::Skipped);
    assert_eq!(results[0].skip_reason(), Some("needs a widget"));
    assert_eq!(results[1].outcome(), Outcome::Failed);
    assert_eq!(results[1].failures(), ["first", "1 > 2 is false"]);
    assert_eq!(results[2].outcome(), Outcome::Passed);
    assert_eq!(driver.exit_code(), 1);
}

fn main() {
    let mut builder = TestDriverBuilder::new();
    add_tests(&mut builder);
    let mut driver = builder.build_basic();
    driver.run();

    assert_eq!(driver.results().len(), driver.tests().len());
    let counts = driver.counts();
    assert_eq!(counts[Outcome::Passed], 3);
    assert_eq!(counts[Outcome::Failed], 2);
    assert_eq!(counts[Outcome::Xfailed], 1);
    assert_eq!(counts[Outcome::Xpassed], 1);
    assert_eq!(counts[Outcome::Ignored], 1);
    assert_eq!(driver.exit_code(), 1);

    let recorded = &driver.results()[7];
    assert_eq!(recorded.outcome(), Outcome::Failed);
    assert_eq!(recorded.failures(), [
        "expected VUID-B-0002 not seen.",
        "unexpected VUID-C-0003.",
    ]);

    // A second run replaces the first one's results.
    driver.run();
    assert_eq!(driver.results().len(), 8);
    assert_eq!(driver.counts()[Outcome::Failed], 2);

    status_tests();
}
