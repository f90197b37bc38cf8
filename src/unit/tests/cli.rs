//! Runs with whatever arguments cargo passes through, so
//! `cargo test --test cli -- --list` and filters work by hand.
use layercheck_unit::*;

macro_rules! test_type {
    () => { PlainTest }
}

fn prints_passing() {
    println!("I'm a little teapot");
}

fn skipped_in_filter() {
    println!("short and stout");
}

declare_tests!["Cli" => [prints_passing, skipped_in_filter]];

fn main() {
    let mut builder = TestDriverBuilder::parse_args();
    __collect_tests(&mut builder);
    let mut driver = builder.build_basic();
    driver.run();
    std::process::exit(driver.exit_code());
}
