/*
 * main.rs
 *
 * Parse args, resolve targets (flags or config file), optionally daemonise,
 * then hand off to the supervisor. Boring on purpose - the interesting
 * stuff is in cpu_regulator.rs and mem_regulator.rs.
 */

use cmm::args::RawArgs;
use cmm::{daemon, supervisor};

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let raw = RawArgs::parse_args();

    let run_args = match raw.resolve() {
        Ok(args) => args,
        Err(e) => {
            println!("{e}");
            return 1;
        }
    };

    let default_level = if run_args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if run_args.daemon {
        if let Err(e) = daemon::daemonize() {
            println!("{e}");
            return 1;
        }
    }

    match supervisor::run(run_args) {
        Ok(code) => code,
        Err(e) => {
            println!("{e}");
            1
        }
    }
}
