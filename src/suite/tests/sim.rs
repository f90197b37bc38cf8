//! Runs the whole suite against the software driver.
use harness::{Backend, Config};
use unit::{Outcome, RunnerConfig};

fn run_suite(config: Config) -> (usize, usize) {
    let mut driver = layercheck_suite::driver(config, RunnerConfig::default());
    driver.run();
    let counts = driver.counts();
    assert_eq!(counts[Outcome::Failed], 0);
    assert_eq!(counts[Outcome::Xpassed], 0);
    assert_eq!(driver.exit_code(), 0);
    for result in driver.results() {
        if result.outcome() == Outcome::Skipped {
            assert!(!result.skip_reason().unwrap_or("").is_empty());
        }
    }
    (counts[Outcome::Passed], counts[Outcome::Skipped])
}

fn default_config() {
    let (passed, skipped) = run_suite(Config {
        backend: Backend::Sim,
        ..Default::default()
    });
    assert!(passed > 0);
    // Only the device profile test needs a layer that isn't loaded.
    assert_eq!(skipped, 1);
}

fn device_profile_and_debug_report() {
    let (passed, skipped) = run_suite(Config {
        backend: Backend::Sim,
        device_profile: true,
        debug_report: true,
        ..Default::default()
    });
    assert!(passed > 0);
    assert_eq!(skipped, 0);
}

fn filtered() {
    let mut driver = layercheck_suite::driver(
        Config { backend: Backend::Sim, ..Default::default() },
        RunnerConfig {
            filter: Some(regex::Regex::new(r"^PositiveLayerTest\.").unwrap()),
            ..Default::default()
        },
    );
    driver.run();
    let counts = driver.counts();
    assert!(counts[Outcome::Filtered] > 0);
    assert_eq!(counts[Outcome::Failed], 0);
}

fn main() {
    env_logger::builder().is_test(true).try_init().ok();
    default_config();
    device_profile_and_debug_report();
    filtered();
}
