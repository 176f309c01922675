//! lakeref binary entry point.

use std::process::ExitCode;

use lakeref::ui::output;

fn main() -> ExitCode {
    match lakeref::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
