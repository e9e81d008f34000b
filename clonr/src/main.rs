use clonr::commands::command_argument_builder;
use clonr::handlers::{handle_clone, handle_status, init_tracing};
use clonr_core::print_banner;
use colored::Colorize;

#[tokio::main]
async fn main() {
    let matches = command_argument_builder().get_matches();
    let quiet = matches.get_flag("quiet");

    init_tracing(quiet);

    if !quiet {
        print_banner();
    }

    let result = match matches.subcommand() {
        Some(("clone", args)) => handle_clone(args, quiet).await,
        Some(("status", args)) => handle_status(args),
        Some(_) => unreachable!("clap should ensure we don't get here"),
        None => return,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
