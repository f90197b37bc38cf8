//! Tests configuration options.
use layercheck_unit::*;
use regex::Regex;

fn test_passing() {}

fn test_failing() {
    panic!("Oh no!");
}

fn test_ignored_failing() {
    panic!("only runs with include_ignored");
}

macro_rules! test {
    ($(@$attr:ident)* $fn:ident) => {{
        let name = concat!("Config.", stringify!($fn)).to_owned();
        TestAttrs::new()
            $(.$attr())*
            .build_test(name, $fn as fn())
    }}
}

fn add_tests(builder: &mut TestDriverBuilder<PlainTest>) {
    builder
        .add_test(test!(test_passing))
        .add_test(test!(test_failing))
        .add_test(test!(@ignore test_ignored_failing));
}

fn filter_test() {
    let mut builder = TestDriverBuilder::new();
    builder.set_config(RunnerConfig {
        filter: Some(Regex::new("passing$").unwrap()),
        ..Default::default()
    });
    add_tests(&mut builder);
    let mut driver = builder.build_basic();
    driver.run();
    let counts = driver.counts();
    assert_eq!(counts[Outcome::Passed], 1);
    assert_eq!(counts[Outcome::Filtered], 2);
    assert_eq!(driver.exit_code(), 0);
}

fn include_ignored_test() {
    let mut builder = TestDriverBuilder::new();
    builder.set_config(RunnerConfig {
        include_ignored: true,
        ..Default::default()
    });
    add_tests(&mut builder);
    let mut driver = builder.build_basic();
    driver.run();
    let counts = driver.counts();
    assert_eq!(counts[Outcome::Failed], 2);
    assert_eq!(counts[Outcome::Ignored], 0);
}

fn main() {
    filter_test();
    include_ignored_test();
}
