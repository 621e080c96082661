use std::process::ExitCode;

fn main() -> ExitCode {
    negative_lib::run()
}
