use std::process::ExitCode;

fn main() -> ExitCode {
    clinibook_cli::run()
}
