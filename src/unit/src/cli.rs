use clap::{App, Arg, ArgMatches};
use regex::Regex;

use crate::*;

/// Runner options shared by every binary built on this crate.
#[derive(Clone, Debug, Default)]
pub struct RunnerConfig {
    /// Only tests whose name matches are run; the rest are filtered.
    pub filter: Option<Regex>,
    /// Print test names instead of running them.
    pub list: bool,
    /// Run tests marked `#[ignore]`.
    pub include_ignored: bool,
}

/// The runner's command line. Binaries may add arguments of their own
/// before parsing.
pub fn runner_app<'a, 'b>(name: &str) -> App<'a, 'b> {
    App::new(name)
        .arg(Arg::with_name("filter")
            .help("Only run tests whose name matches this regex")
            .index(1))
        .arg(Arg::with_name("list")
            .long("list")
            .help("List tests instead of running them"))
        .arg(Arg::with_name("include-ignored")
            .long("include-ignored")
            .help("Also run ignored tests"))
}

impl RunnerConfig {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, regex::Error> {
        let filter = matches.value_of("filter").map(Regex::new).transpose()?;
        Ok(RunnerConfig {
            filter,
            list: matches.is_present("list"),
            include_ignored: matches.is_present("include-ignored"),
        })
    }

    /// Parses runner arguments, exiting the process with a usage
    /// message on error.
    pub fn parse_matches(matches: &ArgMatches) -> Self {
        Self::from_matches(matches).unwrap_or_else(|e| {
            clap::Error::with_description(
                &format!("invalid filter: {}", e),
                clap::ErrorKind::InvalidValue,
            ).exit()
        })
    }
}

impl<T> TestDriverBuilder<T> {
    /// Creates a builder configured from the process arguments.
    pub fn parse_args() -> Self {
        let name = std::env::args().next().unwrap_or_default();
        let matches = runner_app(&name).get_matches();
        let mut builder = Self::new();
        builder.set_config(RunnerConfig::parse_matches(&matches));
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filter_and_flags() {
        let matches = runner_app("suite")
            .get_matches_from(vec!["suite", "--list", "^LayerTest"]);
        let config = RunnerConfig::from_matches(&matches).unwrap();
        assert!(config.list);
        assert!(!config.include_ignored);
        assert_eq!(config.filter.unwrap().as_str(), "^LayerTest");
    }

    #[test]
    fn rejects_bad_regex() {
        let matches = runner_app("suite").get_matches_from(vec!["suite", "("]);
        assert!(RunnerConfig::from_matches(&matches).is_err());
    }
}
