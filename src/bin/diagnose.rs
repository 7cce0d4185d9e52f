use std::io;
use std::process::ExitCode;

use startup_diagnose::command::{self, DiagnoseArgs, EXIT_FAIL};
use startup_diagnose::health::Sink;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = match command::parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            if let command::DiagnoseError::Usage(clap_err) = &e {
                let _ = clap_err.print();
            } else {
                eprintln!("error: {e}");
            }
            return exit_code(e.exit_code());
        }
    };

    init_tracing(&args);
    exit_code(command::run(&args, Sink::stdout(), &mut io::stdout()))
}

fn init_tracing(args: &DiagnoseArgs) {
    let default_level = if args.debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if let Err(err) = builder.try_init() {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(EXIT_FAIL as u8))
}
