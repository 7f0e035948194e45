use std::process::ExitCode;

use strata::ui::output;

fn main() -> ExitCode {
    match strata::cli::run() {
        Ok(code) => code,
        Err(e) => {
            output::error(format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}
