use std::process::ExitCode;

fn main() -> ExitCode {
    match otplc::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code().clamp(1, 255) as u8)
        }
    }
}
