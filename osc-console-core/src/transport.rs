//! OSC transport: the thin layer over `rosc` encode/decode and UDP.
//!
//! `OscTransport` is the seam the forwarder sends through, so forwarding can
//! be tested without a network. Console code never touches `rosc` types;
//! everything above this module works with `MessageRecord`.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rosc::{OscArray, OscColor, OscMessage, OscMidiMessage, OscPacket, OscTime, OscType};

use osc_console_types::{MessageRecord, OscArg};

use crate::error::{TransportError, TransportResult};

/// Sends one message to a destination.
pub trait OscTransport: Send + Sync {
    fn send_to(&self, dest: SocketAddr, record: &MessageRecord) -> TransportResult;
}

// ─── UDP ────────────────────────────────────────────────────────────

/// UDP transport bound to an ephemeral local port.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind a socket suitable for sending to `dest`, with a per-send timeout.
    pub fn for_destination(dest: SocketAddr, send_timeout: Duration) -> std::io::Result<Self> {
        let local = if dest.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(local)?;
        socket.set_write_timeout(Some(send_timeout))?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl OscTransport for UdpTransport {
    fn send_to(&self, dest: SocketAddr, record: &MessageRecord) -> TransportResult {
        let bytes = encode_record(record)?;
        self.socket.send_to(&bytes, dest)?;
        Ok(())
    }
}

/// Resolve `host:port` to the first socket address it names.
pub fn resolve(host: &str, port: u16) -> TransportResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| TransportError::Resolve(format!("{}:{}", host, port)))
}

// ─── Encoding ───────────────────────────────────────────────────────

/// Encode a record as a single OSC message packet.
pub fn encode_record(record: &MessageRecord) -> TransportResult<Vec<u8>> {
    let packet = OscPacket::Message(record_to_osc(record));
    Ok(rosc::encoder::encode(&packet)?)
}

/// Build the wire message, using each argument's type tag to pick the wire type.
pub fn record_to_osc(record: &MessageRecord) -> OscMessage {
    let mut tags = record.type_tags.chars();
    let args = record
        .args
        .iter()
        .map(|arg| arg_to_osc(tags.next(), arg))
        .collect();
    OscMessage {
        addr: record.address.clone(),
        args,
    }
}

fn arg_to_osc(tag: Option<char>, arg: &OscArg) -> OscType {
    match (tag, arg) {
        (Some('h'), OscArg::Int(v)) => OscType::Long(*v),
        (Some('d'), OscArg::Float(v)) => OscType::Double(*v),
        (Some('b'), OscArg::Str(s)) => OscType::Blob(s.clone().into_bytes()),
        (Some('c'), OscArg::Str(s)) => match s.chars().next() {
            Some(c) => OscType::Char(c),
            None => OscType::String(String::new()),
        },
        (Some('T'), _) => OscType::Bool(true),
        (Some('F'), _) => OscType::Bool(false),
        (Some('N'), _) => OscType::Nil,
        (Some('I'), _) => OscType::Inf,
        (Some('m'), OscArg::Blob(b)) if b.len() == 4 => OscType::Midi(OscMidiMessage {
            port: b[0],
            status: b[1],
            data1: b[2],
            data2: b[3],
        }),
        (Some('r'), OscArg::Int(v)) => {
            let [red, green, blue, alpha] = (*v as u32).to_be_bytes();
            OscType::Color(OscColor {
                red,
                green,
                blue,
                alpha,
            })
        }
        (Some('t'), OscArg::Str(s)) => match parse_osc_time(s) {
            Some(t) => OscType::Time(t),
            None => OscType::String(s.clone()),
        },
        (_, OscArg::Int(v)) => match i32::try_from(*v) {
            Ok(i) => OscType::Int(i),
            Err(_) => OscType::Long(*v),
        },
        (_, OscArg::Float(v)) => OscType::Float(*v as f32),
        (_, OscArg::Str(s)) => OscType::String(s.clone()),
        (_, OscArg::Blob(b)) => OscType::Blob(b.clone()),
    }
}

fn parse_osc_time(s: &str) -> Option<OscTime> {
    let (seconds, fractional) = s.split_once(':')?;
    Some(OscTime {
        seconds: seconds.parse().ok()?,
        fractional: fractional.parse().ok()?,
    })
}

// ─── Decoding ───────────────────────────────────────────────────────

/// Decode a datagram into records, flattening bundles.
pub fn decode_datagram(bytes: &[u8], source: &str) -> TransportResult<Vec<MessageRecord>> {
    let (_, packet) = rosc::decoder::decode_udp(bytes)?;
    let mut records = Vec::new();
    collect_records(&packet, source, &mut records);
    Ok(records)
}

fn collect_records(packet: &OscPacket, source: &str, out: &mut Vec<MessageRecord>) {
    match packet {
        OscPacket::Message(msg) => out.push(message_to_record(msg, source)),
        OscPacket::Bundle(bundle) => {
            for p in &bundle.content {
                collect_records(p, source, out);
            }
        }
    }
}

/// Convert a decoded message, one tag per rendered argument.
pub fn message_to_record(msg: &OscMessage, source: &str) -> MessageRecord {
    let mut type_tags = String::new();
    let mut args = Vec::with_capacity(msg.args.len());
    for arg in &msg.args {
        push_decoded(arg, &mut type_tags, &mut args);
    }
    MessageRecord {
        address: msg.addr.clone(),
        type_tags,
        args,
        source: source.to_string(),
    }
}

fn push_decoded(arg: &OscType, tags: &mut String, args: &mut Vec<OscArg>) {
    let (tag, value) = match arg {
        OscType::Int(v) => ('i', OscArg::Int(*v as i64)),
        OscType::Long(v) => ('h', OscArg::Int(*v)),
        OscType::Float(v) => ('f', OscArg::Float(widen_f32(*v))),
        OscType::Double(v) => ('d', OscArg::Float(*v)),
        OscType::String(s) => ('s', OscArg::Str(s.clone())),
        OscType::Blob(b) => ('b', OscArg::Blob(b.clone())),
        OscType::Char(c) => ('c', OscArg::Str(c.to_string())),
        OscType::Time(t) => ('t', OscArg::Str(format!("{}:{}", t.seconds, t.fractional))),
        OscType::Midi(m) => ('m', OscArg::Blob(vec![m.port, m.status, m.data1, m.data2])),
        OscType::Color(c) => (
            'r',
            OscArg::Int(u32::from_be_bytes([c.red, c.green, c.blue, c.alpha]) as i64),
        ),
        OscType::Bool(true) => ('T', OscArg::Str("true".to_string())),
        OscType::Bool(false) => ('F', OscArg::Str("false".to_string())),
        OscType::Nil => ('N', OscArg::Str("nil".to_string())),
        OscType::Inf => ('I', OscArg::Str("inf".to_string())),
        OscType::Array(OscArray { content }) => {
            for inner in content {
                push_decoded(inner, tags, args);
            }
            return;
        }
    };
    tags.push(tag);
    args.push(value);
}

/// Widen through the shortest decimal form so 0.1f32 reads back as 0.1.
fn widen_f32(v: f32) -> f64 {
    v.to_string().parse().unwrap_or(v as f64)
}

// ─── Recording transport ────────────────────────────────────────────

/// A transport that records sends instead of touching the network.
/// Can be told to fail, to exercise error paths.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(SocketAddr, MessageRecord)>>,
    fail: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn sent(&self) -> Vec<(SocketAddr, MessageRecord)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_addresses(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|(_, rec)| rec.address)
            .collect()
    }
}

impl OscTransport for RecordingTransport {
    fn send_to(&self, dest: SocketAddr, record: &MessageRecord) -> TransportResult {
        if self.fail.load(Ordering::Relaxed) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "recording transport set to fail",
            )));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((dest, record.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(tags: &str, args: Vec<OscArg>) -> MessageRecord {
        MessageRecord::new("/test", tags, args, "127.0.0.1:9")
    }

    #[test]
    fn encode_then_decode_preserves_basic_types() {
        let original = rec(
            "ifs",
            vec![OscArg::Int(5), OscArg::Float(1.5), OscArg::Str("hi".into())],
        );
        let bytes = encode_record(&original).unwrap();
        let decoded = decode_datagram(&bytes, "127.0.0.1:9").unwrap();
        assert_eq!(decoded, vec![original]);
    }

    #[test]
    fn tags_pick_wide_wire_types() {
        let msg = record_to_osc(&rec("hd", vec![OscArg::Int(7), OscArg::Float(0.5)]));
        assert_eq!(msg.args, vec![OscType::Long(7), OscType::Double(0.5)]);
    }

    #[test]
    fn large_int_without_tag_becomes_long() {
        let msg = record_to_osc(&rec("", vec![OscArg::Int(i64::from(i32::MAX) + 1)]));
        assert_eq!(msg.args, vec![OscType::Long(i64::from(i32::MAX) + 1)]);
    }

    #[test]
    fn blob_tag_on_text_sends_bytes() {
        let msg = record_to_osc(&rec("b", vec![OscArg::Str("abc".into())]));
        assert_eq!(msg.args, vec![OscType::Blob(b"abc".to_vec())]);
    }

    #[test]
    fn logged_blob_resends_original_bytes() {
        let live = rec("b", vec![OscArg::Blob(vec![0x00, 0xab, 0xff])]);
        let line = crate::log_format::format_event_line(1.0, &live);
        let parsed = crate::parser::parse_log(&line, &mut |_: &crate::parser::ParseDiagnostic| {});
        let msg = record_to_osc(&parsed.events[0].message);
        assert_eq!(msg.args, vec![OscType::Blob(vec![0x00, 0xab, 0xff])]);
    }

    #[test]
    fn bool_and_nil_render_as_text_arguments() {
        let msg = OscMessage {
            addr: "/flags".into(),
            args: vec![OscType::Bool(true), OscType::Nil, OscType::Int(1)],
        };
        let record = message_to_record(&msg, "src");
        assert_eq!(record.type_tags, "TNi");
        assert_eq!(record.args.len(), record.type_tags.len());
        assert_eq!(record.joined_args(), "true, nil, 1");
    }

    #[test]
    fn arrays_are_flattened() {
        let msg = OscMessage {
            addr: "/arr".into(),
            args: vec![OscType::Array(OscArray {
                content: vec![OscType::Int(1), OscType::Int(2)],
            })],
        };
        let record = message_to_record(&msg, "src");
        assert_eq!(record.type_tags, "ii");
        assert_eq!(record.args, vec![OscArg::Int(1), OscArg::Int(2)]);
    }

    #[test]
    fn float32_widens_to_short_decimal() {
        assert_eq!(widen_f32(0.1), 0.1);
    }

    #[test]
    fn bundles_are_flattened() {
        let bundle = OscPacket::Bundle(rosc::OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![
                OscPacket::Message(OscMessage {
                    addr: "/a".into(),
                    args: vec![],
                }),
                OscPacket::Message(OscMessage {
                    addr: "/b".into(),
                    args: vec![OscType::Int(2)],
                }),
            ],
        });
        let bytes = rosc::encoder::encode(&bundle).unwrap();
        let records = decode_datagram(&bytes, "peer").unwrap();
        let addrs: Vec<_> = records.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addrs, vec!["/a", "/b"]);
        assert!(records.iter().all(|r| r.source == "peer"));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(decode_datagram(b"not osc", "peer").is_err());
    }

    #[test]
    fn udp_transport_delivers() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let dest = receiver.local_addr().unwrap();

        let transport = UdpTransport::for_destination(dest, Duration::from_millis(500)).unwrap();
        transport
            .send_to(dest, &rec("i", vec![OscArg::Int(42)]))
            .unwrap();

        let mut buf = [0u8; rosc::decoder::MTU];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        let decoded = decode_datagram(&buf[..n], "x").unwrap();
        assert_eq!(decoded[0].args, vec![OscArg::Int(42)]);
    }

    #[test]
    fn recording_transport_can_fail() {
        let t = RecordingTransport::new();
        let dest: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        t.send_to(dest, &rec("", vec![])).unwrap();
        t.set_failing(true);
        assert!(t.send_to(dest, &rec("", vec![])).is_err());
        assert_eq!(t.sent().len(), 1);
    }

    #[test]
    fn resolve_localhost() {
        let addr = resolve("127.0.0.1", 5000).unwrap();
        assert_eq!(addr.port(), 5000);
    }
}
