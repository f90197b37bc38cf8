use unit::RunnerConfig;

fn main() {
    env_logger::init();
    let matches = layercheck_suite::app("layercheck").get_matches();
    let runner = RunnerConfig::parse_matches(&matches);
    let config = layercheck_suite::config_from_matches(&matches)
        .unwrap_or_else(|e| clap::Error::with_description(
            &e.to_string(),
            clap::ErrorKind::InvalidValue,
        ).exit());
    let mut driver = layercheck_suite::driver(config, runner);
    driver.run();
    std::process::exit(driver.exit_code());
}
