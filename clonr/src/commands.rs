use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("clonr")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("clonr")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner, progress bar and info logging")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("clone")
                .about(
                    "Discover same-host pages from a seed URL and mirror them for offline use. \
                Interrupted runs resume where they stopped.",
                )
                .arg(arg!(<URL>).help("Seed URL (scheme optional)"))
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Output root directory (default: ./<host>)"),
                )
                .arg(
                    arg!(-p --"max-pages" <NUM>)
                        .required(false)
                        .help("Maximum number of pages to discover")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("50"),
                )
                .arg(
                    arg!(-d --"max-depth" <NUM>)
                        .required(false)
                        .help("Maximum link depth from the seed (at most 50)")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"collect-only")
                        .required(false)
                        .help("Only discover and list URLs; do not mirror pages")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"keep-query")
                        .required(false)
                        .help("Treat URLs that differ only in their query string as different pages")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"depth-first")
                        .required(false)
                        .help("Explore links depth-first instead of breadth-first")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"retries" <NUM>)
                        .required(false)
                        .help("Attempts per page before it is skipped for this run")
                        .value_parser(clap::value_parser!(u32).range(1..))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"discovery-timeout" <SECS>)
                        .required(false)
                        .help("Timeout for link extraction during discovery")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .default_value("15"),
                )
                .arg(
                    arg!(--"render-timeout" <SECS>)
                        .required(false)
                        .help("Timeout for a full page load while mirroring")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .default_value("60"),
                )
                .arg(
                    arg!(--"min-delay-ms" <MS>)
                        .required(false)
                        .help("Lower bound of the random pause between pages")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("2000"),
                )
                .arg(
                    arg!(--"max-delay-ms" <MS>)
                        .required(false)
                        .help("Upper bound of the random pause between pages")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("5000"),
                )
                .arg(
                    arg!(--"session-per-page")
                        .required(false)
                        .help("Open a fresh session (and take the next proxy) for every page")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"proxy-file" <PATH>)
                        .required(false)
                        .help("File of host:port[:user:pass] proxies, used round-robin"),
                )
                .arg(
                    arg!(--"user-agent" <UA>)
                        .required(false)
                        .help("User-Agent header sent with every request"),
                )
                .arg(
                    arg!(-r --"report" <PATH>)
                        .required(false)
                        .help("Save the run report to a file (default: print to screen)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("status")
                .about("Show what has been discovered and mirrored for a seed, without network access")
                .arg(arg!(<URL>).help("Seed URL used for the clone"))
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Output root directory (default: ./<host>)"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
}
