use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match serval_mid::run_process() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "serval-mid: {error}");
            ExitCode::FAILURE
        }
    }
}
