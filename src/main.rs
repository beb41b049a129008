//! texpilot - LaTeX to HTML through pandoc and plugins

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = texpilot::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
