use splitdl_core::logging;

mod cli;

use crate::cli::CliCommand;

fn main() {
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = CliCommand::run_from_args() {
        eprintln!("splitdl error: {:#}", err);
        std::process::exit(1);
    }
}
