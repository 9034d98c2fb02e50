use std::process::ExitCode;

fn main() -> ExitCode {
    match exo_classify::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            exo_classify::app::report_error(&err);
            ExitCode::from(err.exit_code())
        }
    }
}
