//! Entry point for `udp-chat`.
//!
//! Parses CLI arguments and hands the validated values to the library.
//! `main.rs` owns only process setup (logging, runtime, argument parsing,
//! exit status); all protocol work is delegated to library modules.

use std::net::Ipv4Addr;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use udp_chat::{
    console::StdoutConsole,
    event_loop,
    socket::Socket,
    timer::TimerConfig,
    username::{is_valid_username, MAX_USERNAME_LEN},
    ClientConfig, Session,
};

/// Chat with other users through a UDP chat server.
///
/// Type a line to send it.  Commands: `/search <name>` asks whether a user is
/// online, `/disconnect` leaves.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// User name: letters and digits only, at most 20 characters.
    #[arg(long, value_parser = parse_user)]
    user: String,

    /// Server IPv4 address (e.g. 127.0.0.1).
    #[arg(long)]
    serv: Ipv4Addr,

    /// Server port (1024-65535).
    #[arg(long, value_parser = clap::value_parser!(u16).range(1024..))]
    port: u16,
}

fn parse_user(s: &str) -> Result<String, String> {
    if is_valid_username(s) {
        Ok(s.to_string())
    } else {
        Err(format!(
            "only letters and digits are allowed, at most {MAX_USERNAME_LEN} characters"
        ))
    }
}

fn main() -> ExitCode {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    // Exits with status 2 and a usage message on invalid arguments.
    let cli = Cli::parse();

    let config = ClientConfig {
        user: cli.user,
        server: cli.serv,
        rendezvous_port: cli.port,
        timers: TimerConfig::default(),
    };

    match run(config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: ClientConfig) -> anyhow::Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")?;

    let outcome = runtime.block_on(async {
        let socket = Socket::bind_ephemeral()
            .await
            .context("cannot open UDP socket")?;
        log::info!("Bound to {}", socket.local_addr);

        let input = event_loop::spawn_stdin_reader().context("cannot read from stdin")?;
        let mut session = Session::new(socket, config, StdoutConsole);
        event_loop::run(&mut session, input, event_loop::ctrl_c())
            .await
            .context("session failed")
    })?;

    log::info!("Session ended: {outcome:?}");
    // The stdin reader thread may still be blocked in a read; leave the
    // runtime behind rather than wait for it.
    runtime.shutdown_background();
    Ok(ExitCode::from(outcome.exit_code()))
}
