//! Line-oriented interactive console.
//!
//! A reader thread feeds stdin lines into a channel; the main loop selects
//! between commands and a 200 ms refresh that drains the display queue.

use std::io::{self, BufRead};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{select, tick, unbounded, Receiver};

use osc_console_core::log_format::{format_time_of_day, parse_time_of_day};
use osc_console_core::{Config, Console, ConsoleResult};
use osc_console_types::Mode;

const REFRESH_INTERVAL: Duration = Duration::from_millis(200);

const HELP: &str = "\
commands:
  live | playback              switch mode
  port N                       change the listen port
  forward on|off               toggle forwarding
  forward-host HOST            forwarding destination host
  forward-port N               forwarding destination port
  open FILE                    open a log for replay (enters playback mode)
  play | pause | stop          playback transport
  seek T | start T | end T     playback time, window start, window end (HH:MM:SS.mmm)
  save FILE                    save the message log
  note TEXT                    add a note to the message log
  clear                        clear the message log
  status                       show current settings
  quit";

enum Flow {
    Continue,
    Quit,
}

fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

pub fn run(config: Config) -> io::Result<()> {
    let mut console = Console::new(config);
    // a bind failure is already on screen; the user can pick another port
    let _ = console.set_mode(Mode::Live);

    let lines = spawn_stdin_reader()?;
    let refresh = tick(REFRESH_INTERVAL);
    println!("OSC console. Type 'help' for commands.");

    loop {
        select! {
            recv(lines) -> line => {
                let Ok(line) = line else { break };
                flush_display(&console);
                match handle_command(&mut console, line.trim()) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => eprintln!("error: {}", e),
                }
            }
            recv(refresh) -> _ => flush_display(&console),
        }
    }

    console.shutdown();
    flush_display(&console);
    Ok(())
}

fn flush_display(console: &Console) {
    for line in console.sink().drain_display() {
        println!("{}", line);
    }
}

fn parse_port(arg: &str) -> Option<u16> {
    arg.parse().ok()
}

fn handle_command(console: &mut Console, line: &str) -> ConsoleResult<Flow> {
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd {
        "" => {}
        "help" | "?" => println!("{}", HELP),
        "quit" | "exit" => return Ok(Flow::Quit),
        "live" => console.set_mode(Mode::Live)?,
        "playback" => console.set_mode(Mode::Playback)?,
        "port" => match parse_port(arg) {
            Some(port) => console.set_port(port)?,
            None => eprintln!("usage: port N"),
        },
        "forward" => match arg {
            "on" => console.set_forwarding_enabled(true)?,
            "off" => console.set_forwarding_enabled(false)?,
            _ => eprintln!("usage: forward on|off"),
        },
        "forward-host" if !arg.is_empty() => console.set_forward_host(arg)?,
        "forward-port" => match parse_port(arg) {
            Some(port) => console.set_forward_port(port)?,
            None => eprintln!("usage: forward-port N"),
        },
        "open" if !arg.is_empty() => console.open_log(Path::new(arg))?,
        "play" => {
            if console.mode() != Mode::Playback {
                eprintln!("not in playback mode; use 'open FILE' or 'playback'");
            } else {
                console.player().play();
            }
        }
        "pause" => console.player().pause(),
        "stop" => console.player().stop(""),
        "seek" | "start" | "end" => match parse_time_of_day(arg) {
            Some(t) => match cmd {
                "seek" => console.player().set_playback_time(t),
                "start" => console.player().set_requested_start(t),
                _ => console.player().set_requested_end(t),
            },
            None => eprintln!("usage: {} HH:MM:SS.mmm", cmd),
        },
        "save" if !arg.is_empty() => console.save_log(Path::new(arg))?,
        "note" if !arg.is_empty() => console.add_note(arg),
        "clear" => console.clear_log(),
        "status" => print_status(console),
        _ => eprintln!("unknown command '{}'; type 'help'", line),
    }
    Ok(Flow::Continue)
}

fn print_status(console: &Console) {
    let player = console.player();
    let forwarding = console.forwarding();
    println!("mode:       {}", console.mode().name());
    match console.listener_addr() {
        Some(addr) => println!("listening:  {}", addr),
        None => println!("listening:  no (port {})", console.port()),
    }
    println!(
        "forwarding: {} -> {}",
        if forwarding.enabled { "on" } else { "off" },
        forwarding.destination()
    );
    if let Some(handle) = console.forwarder() {
        let stats = handle.stats();
        println!(
            "            sent {}, failed {}, dropped {}",
            stats.sent.load(std::sync::atomic::Ordering::Relaxed),
            stats.failed.load(std::sync::atomic::Ordering::Relaxed),
            stats.dropped.load(std::sync::atomic::Ordering::Relaxed)
        );
    }
    println!(
        "playback:   {} at {} [{} - {}], {} of {} events played",
        player.state().name(),
        format_time_of_day(player.current_time()),
        format_time_of_day(player.requested_start()),
        format_time_of_day(player.requested_end()),
        player.cursor_index(),
        player.event_count()
    );
    println!(
        "log:        {} lines, {} display drops",
        console.sink().messages().len(),
        console.sink().dropped_count()
    );
}
