mod commands;
mod interactive;

use std::fs::File;

use osc_console_core::Config as ConsoleConfig;

const USAGE: &str = "\
usage: osc-console [-v] [COMMAND]

With no command, starts the interactive console (type 'help' inside).

commands:
  listen PORT [HOST] [--json]           print every received OSC message
  send HOST:PORT ADDRESS [ARG...]       send one OSC message
  replay FILE [--from T] [--to T] [--forward HOST:PORT]
                                        replay a saved log in real time

options:
  -v, --verbose                         debug-level logging";

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("osc-console")
        .join("osc-console.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path).unwrap_or_else(|_| {
        File::create("/tmp/osc-console.log").expect("Cannot create log file")
    });

    WriteLogger::init(log_level, Config::default(), log_file)
        .expect("Failed to initialize logger");

    log::info!("osc-console starting (log level: {:?})", log_level);
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let rest: Vec<&str> = args
        .iter()
        .skip(1)
        .map(String::as_str)
        .filter(|a| *a != "--verbose" && *a != "-v")
        .collect();

    match rest.first().copied() {
        None => interactive::run(ConsoleConfig::load()),
        Some("listen") => commands::listen(&rest[1..]),
        Some("send") => commands::send(&rest[1..]),
        Some("replay") => commands::replay(ConsoleConfig::load(), &rest[1..]),
        Some("help" | "--help" | "-h") => {
            println!("{}", USAGE);
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}
