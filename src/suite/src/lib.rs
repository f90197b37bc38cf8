//! Conformance tests for the validation layer.
//!
//! Every test runs through `Framework::run_test` with the suite's
//! monitor, so expectations left pending at the end of a test fail it.
//! Tests marked `#[requires_device_profile]` are skipped unless the
//! profile layer was requested.
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use clap::{App, Arg, ArgMatches};
use harness::{Config, Framework, HarnessResult, Monitor, Severities};
use log::debug;
use unit::{PanicTestContext, RunnerConfig, TestDriver, TestDriverBuilder, TestStatus};

pub type TestData = fn(&mut Framework) -> TestStatus;
pub type Test = unit::Test<TestData>;

macro_rules! test_type {
    () => { crate::Test }
}

mod barriers;
mod commands;
mod pipelines;
mod resources;
mod threading;

/// Brings up a device with every available feature and a render target.
pub(crate) fn init(fw: &mut Framework) -> HarnessResult<()> {
    fw.init(Default::default())?;
    fw.init_render_target()
}

/// Runs `f` while expecting the error `id`. Returns what `f` produced
/// if it succeeded.
pub(crate) fn expect_error<T>(
    monitor: &Monitor,
    id: &str,
    f: impl FnOnce() -> HarnessResult<T>,
) -> Option<T> {
    monitor.set_desired_failure_msg(Severities::ERROR, id);
    let res = f();
    monitor.verify_found();
    res.map_err(|e| debug!("call returned {}", e)).ok()
}

/// Runs `f` while expecting no errors at all.
pub(crate) fn expect_clean<T>(
    monitor: &Monitor,
    f: impl FnOnce() -> HarnessResult<T>,
) -> HarnessResult<T> {
    monitor.expect_success();
    let res = f();
    monitor.verify_not_found();
    res
}

/// Runs each test inside its own framework.
#[derive(Debug)]
pub struct SuiteInvoker {
    config: Config,
    monitor: AssertUnwindSafe<Arc<Monitor>>,
}

impl SuiteInvoker {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            monitor: AssertUnwindSafe(Arc::new(Monitor::new())),
        }
    }
}

impl unit::PanicTestInvoker<TestData> for SuiteInvoker {
    fn precondition(&self, test: &Test) -> TestStatus {
        if test.requires_device_profile() && !self.config.device_profile {
            unit::skip!("{} not requested", harness::sim::DEVICE_PROFILE_LAYER);
        }
        Ok(())
    }

    fn invoke(&self, test: &Test) -> TestStatus {
        Framework::run_test(&self.config, &*self.monitor, *test.data())
    }
}

/// The suite's command line: the runner's arguments plus driver
/// selection.
pub fn app<'a, 'b>(name: &str) -> App<'a, 'b> {
    unit::runner_app(name)
        .arg(Arg::with_name("driver")
            .long("driver")
            .takes_value(true)
            .possible_values(&["loader", "sim"])
            .default_value("sim")
            .help("Where Vulkan entry points come from"))
        .arg(Arg::with_name("devsim")
            .long("devsim")
            .help("Load the device profile layer"))
        .arg(Arg::with_name("debug-report")
            .long("debug-report")
            .help("Use a debug report callback instead of a messenger"))
}

pub fn config_from_matches(matches: &ArgMatches) -> HarnessResult<Config> {
    let backend = matches.value_of("driver").unwrap_or("sim").parse()?;
    Ok(Config {
        backend,
        device_profile: matches.is_present("devsim"),
        debug_report: matches.is_present("debug-report"),
        ..Default::default()
    })
}

/// Builds a driver holding every test in the suite.
pub fn driver(config: Config, runner: RunnerConfig) -> TestDriver<TestData> {
    let mut builder = TestDriverBuilder::new();
    builder.set_config(runner);
    __collect_tests(&mut builder);
    let context = PanicTestContext::new(SuiteInvoker::new(config));
    builder.build(Box::new(context))
}

unit::collect_tests![
    barriers,
    commands,
    pipelines,
    resources,
    threading,
];

#[cfg(test)]
mod tests {
    use harness::Backend;

    use super::*;

    #[test]
    fn parses_driver_options() {
        let matches = app("layercheck").get_matches_from(vec![
            "layercheck", "--driver", "loader", "--devsim", "^LayerTest",
        ]);
        let config = config_from_matches(&matches).unwrap();
        assert_eq!(config.backend, Backend::Loader);
        assert!(config.device_profile);
        assert!(!config.debug_report);
        let runner = RunnerConfig::from_matches(&matches).unwrap();
        assert_eq!(runner.filter.unwrap().as_str(), "^LayerTest");
    }

    #[test]
    fn defaults_to_sim() {
        let matches = app("layercheck").get_matches_from(vec!["layercheck"]);
        let config = config_from_matches(&matches).unwrap();
        assert_eq!(config.backend, Backend::Sim);
        assert!(!config.device_profile);
    }

    #[test]
    fn device_profile_tests_need_the_layer() {
        use unit::PanicTestInvoker;

        let mut builder = TestDriverBuilder::<Test>::new();
        __collect_tests(&mut builder);
        let gated: Vec<_> = builder.tests().iter()
            .filter(|test| test.requires_device_profile())
            .collect();
        assert_eq!(gated.len(), 1);
        assert_eq!(gated[0].name(), "LayerTest.image_view_format_features");

        let sim = Config { backend: Backend::Sim, ..Default::default() };
        let status = SuiteInvoker::new(sim.clone()).precondition(gated[0]);
        assert_eq!(status, Err(unit::Abort::skip(
            "VK_LAYER_LUNARG_device_simulation not requested")));

        let with_profile = Config { device_profile: true, ..sim };
        assert_eq!(SuiteInvoker::new(with_profile).precondition(gated[0]), Ok(()));
    }

    #[test]
    fn names_follow_suite_convention() {
        let mut builder = TestDriverBuilder::<Test>::new();
        __collect_tests(&mut builder);
        assert!(!builder.tests().is_empty());
        for test in builder.tests() {
            let suite = test.suite();
            assert!(suite == "LayerTest" || suite == "PositiveLayerTest",
                "{}", test.name());
        }
    }
}
