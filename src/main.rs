use clap::Parser;
use colored::*;
use tokio::io::BufReader;

use portsweep::cancel::{cancel_pair, install_ctrl_c};
use portsweep::cli::Cli;
use portsweep::logging::init_logger;
use portsweep::prompt::Prompter;
use portsweep::session::{Session, SessionConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logger(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
    }

    let (handle, listener) = cancel_pair();
    install_ctrl_c(handle);

    let prompter = Prompter::new(BufReader::new(tokio::io::stdin()), std::io::stdout());
    let mut session = Session::new(SessionConfig::from_cli(&cli), prompter, listener);

    let code = match session.run().await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            1
        }
    };

    // Exit without dropping the runtime: the stdin reader may still be
    // parked in a blocking read after an interrupt.
    std::process::exit(code);
}
