use std::process::ExitCode;

fn main() -> ExitCode {
    helplane_cli::run()
}
