use colored::Colorize;
use std::process::ExitCode;

fn main() -> ExitCode {
    match ciwarden::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "error:".bright_red().bold(), e);
            if e.is_retryable() {
                ExitCode::from(75)
            } else {
                ExitCode::from(2)
            }
        }
    }
}
