use clap::ArgMatches;

/// Command line interface for the service.
///
/// Returns the matches from the command line arguments.
#[must_use]
pub fn clargs() -> ArgMatches {
    use std::path::PathBuf;

    use clap::{arg, command, value_parser};

    command!()
        .arg(
            arg!(config: -c --config <FILE> "optional path to the configuration file")
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches()
}
