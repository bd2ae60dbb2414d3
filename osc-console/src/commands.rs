//! One-shot subcommands: text listener, text sender and headless replay.

use std::io::{self, ErrorKind};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;

use osc_console_core::log_format::{format_event_line, format_time_of_day, local_time_of_day, parse_time_of_day};
use osc_console_core::transport::resolve;
use osc_console_core::{Config, Console, MessageHandler, OscListener, OscTransport, UdpTransport};
use osc_console_types::{MessageRecord, Mode, OscArg, PlaybackState};

const DEFAULT_LISTEN_HOST: &str = "localhost";

fn usage_error(text: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidInput, text.to_string())
}

/// Split `HOST:PORT`, accepting `[v6]:PORT`.
pub fn parse_destination(text: &str) -> Option<(String, u16)> {
    let (host, port) = text.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}

/// Infer a tag from the text: integer, then float, then string.
pub fn infer_arg(text: &str) -> (char, OscArg) {
    if let Ok(v) = text.parse::<i64>() {
        return ('i', OscArg::Int(v));
    }
    if let Ok(v) = text.parse::<f64>() {
        if v.is_finite() {
            return ('f', OscArg::Float(v));
        }
    }
    ('s', OscArg::Str(text.to_string()))
}

#[derive(Serialize)]
struct JsonLine<'a> {
    time: String,
    source: &'a str,
    address: &'a str,
    tags: &'a str,
    args: &'a [OscArg],
}

/// `listen PORT [HOST] [--json]`
pub fn listen(args: &[&str]) -> io::Result<()> {
    let json = args.contains(&"--json");
    let positional: Vec<&str> = args.iter().copied().filter(|a| *a != "--json").collect();
    let port: u16 = positional
        .first()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| usage_error("listen needs a PORT"))?;
    let host = positional.get(1).copied().unwrap_or(DEFAULT_LISTEN_HOST);

    let handler: MessageHandler = Arc::new(move |record: &MessageRecord, _: Option<f64>| {
        let now = local_time_of_day();
        if json {
            let line = JsonLine {
                time: format_time_of_day(now),
                source: &record.source,
                address: &record.address,
                tags: &record.type_tags,
                args: &record.args,
            };
            match serde_json::to_string(&line) {
                Ok(text) => println!("{}", text),
                Err(e) => log::error!("cannot serialise {}: {}", record.address, e),
            }
        } else {
            println!("{}", format_event_line(now, record));
        }
    });

    let listener = OscListener::open(host, port, handler)?;
    eprintln!("Listening on {}", listener.local_addr());
    while listener.is_running() {
        thread::sleep(Duration::from_millis(200));
    }
    Err(io::Error::new(ErrorKind::Other, "listener stopped"))
}

/// `send HOST:PORT ADDRESS [ARG...]`
pub fn send(args: &[&str]) -> io::Result<()> {
    let (host, port) = args
        .first()
        .and_then(|d| parse_destination(d))
        .ok_or_else(|| usage_error("send needs HOST:PORT"))?;
    let address = args
        .get(1)
        .filter(|a| a.starts_with('/'))
        .ok_or_else(|| usage_error("send needs an OSC address starting with '/'"))?;

    let (tags, osc_args): (String, Vec<OscArg>) = args[2..].iter().map(|a| infer_arg(a)).unzip();
    let record = MessageRecord::new(*address, tags, osc_args, "");

    let config = Config::load();
    let dest = resolve(&host, port).map_err(|e| io::Error::new(ErrorKind::NotFound, e.to_string()))?;
    let transport = UdpTransport::for_destination(dest, config.forwarder_send_timeout())?;
    transport
        .send_to(dest, &record)
        .map_err(|e| io::Error::new(ErrorKind::Other, e.to_string()))?;
    println!("Sent {} ({}) to {}", record.address, record.type_tags, dest);
    Ok(())
}

/// `replay FILE [--from T] [--to T] [--forward HOST:PORT]`
pub fn replay(config: Config, args: &[&str]) -> io::Result<()> {
    let mut file = None;
    let mut from = None;
    let mut to = None;
    let mut forward = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match *arg {
            "--from" | "--to" => {
                let t = iter
                    .next()
                    .and_then(|v| parse_time_of_day(v))
                    .ok_or_else(|| usage_error("--from/--to need a time (HH:MM:SS.mmm)"))?;
                if *arg == "--from" {
                    from = Some(t);
                } else {
                    to = Some(t);
                }
            }
            "--forward" => {
                forward = Some(
                    iter.next()
                        .and_then(|v| parse_destination(v))
                        .ok_or_else(|| usage_error("--forward needs HOST:PORT"))?,
                );
            }
            other => file = Some(other.to_string()),
        }
    }
    let file = file.ok_or_else(|| usage_error("replay needs a FILE"))?;

    let mut console = Console::new(config);
    let display = console.sink().display_receiver();
    console.set_mode(Mode::Playback)?;
    if let Some((host, port)) = forward {
        console.set_forward_host(&host)?;
        console.set_forward_port(port)?;
        console.set_forwarding_enabled(true)?;
    }
    console.open_log(Path::new(&file))?;
    if let Some(t) = from {
        console.player().set_requested_start(t);
    }
    if let Some(t) = to {
        console.player().set_requested_end(t);
    }

    console.player().play();
    loop {
        match display.recv_timeout(Duration::from_millis(50)) {
            Ok(line) => println!("{}", line),
            Err(RecvTimeoutError::Timeout) => {
                if console.player().state() == PlaybackState::Stopped {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    for line in display.try_iter() {
        println!("{}", line);
    }
    console.shutdown();
    Ok(())
}
