use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hwci_submit::{cli, run_cli, ReplayFarmService};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (script_path, rest) = match split_replay(&args) {
        Some(parts) => parts,
        None => {
            eprintln!("{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };

    let script = match std::fs::read_to_string(&script_path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("cannot read {script_path}: {err}");
            return ExitCode::from(2);
        }
    };
    let service = match ReplayFarmService::from_yaml(&script) {
        Ok(service) => service,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    // SIGINT flips the interrupt flag; the controller cancels the in-flight
    // job and re-raises at the next poll-loop head.
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);
    if let Err(err) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    }) {
        eprintln!("cannot install interrupt handler: {err}");
        return ExitCode::from(2);
    }

    let output = run_cli(&rest, service, |key| std::env::var(key).ok(), interrupt);
    print!("{}", output.stdout);
    eprint!("{}", output.stderr);
    ExitCode::from(output.exit_code.clamp(0, u8::MAX as i32) as u8)
}

/// Pull `--replay <path>` out of the argument list.
fn split_replay(args: &[String]) -> Option<(String, Vec<String>)> {
    let mut script = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--replay" {
            script = Some(iter.next()?.clone());
        } else {
            rest.push(arg.clone());
        }
    }
    Some((script?, rest))
}
