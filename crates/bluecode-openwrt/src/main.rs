use std::process::ExitCode;

use bluecode_openwrt::{init_tracing, run, Cli};
use clap::Parser;
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "bluecode failed");
            ExitCode::FAILURE
        }
    }
}
