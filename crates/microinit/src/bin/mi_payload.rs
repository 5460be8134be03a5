//! Test payload for microinit.
//!
//! Prints what it was started with, then performs the first action found in
//! its arguments: `exit_1`, `exit_2`, `trap`, `signal_int`, `signal_kill` or
//! `wait`. Without an action it exits with status 0.

#![allow(clippy::print_stdout)]

use std::process::ExitCode;

use nix::sys::signal::{Signal, raise};
use nix::unistd::{getpid, pause};

/// Environment entries echoed back so callers can check pass-through.
const WATCHED_ENV: [&str; 2] = ["MI_FOO=MI_BAR", "MI_BAR=MI_FOO"];

fn main() -> ExitCode {
    let pid = getpid();
    let args: Vec<String> = std::env::args().collect();

    println!("{pid}: argc: {}", args.len());
    for (i, arg) in args.iter().enumerate() {
        println!("{pid}: argv[{i}]='{arg}'");
    }

    for (i, (key, value)) in std::env::vars().enumerate() {
        let entry = format!("{key}={value}");
        if WATCHED_ENV.contains(&entry.as_str()) {
            println!("{pid}: env[{i}]='{entry}'");
        }
    }

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "exit_1" => return ExitCode::from(1),
            "exit_2" => return ExitCode::from(2),
            "trap" => std::process::abort(),
            "signal_int" => die_by(Signal::SIGINT),
            "signal_kill" => die_by(Signal::SIGKILL),
            "wait" => wait_for_signal(),
            _ => {}
        }
    }

    ExitCode::SUCCESS
}

/// Deliver `signal` to ourselves and spin until it lands.
fn die_by(signal: Signal) -> ! {
    let _ = raise(signal);
    loop {
        pause();
    }
}

/// Block until a signal with a terminating default action arrives.
fn wait_for_signal() -> ! {
    loop {
        pause();
    }
}
