use std::process::ExitCode;

fn main() -> ExitCode {
    pilapse_lib::run()
}
