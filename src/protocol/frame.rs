//! STOMP 1.2 frame encoding and parsing
//!
//! A frame is a command line, zero or more `name:value` header lines, a blank
//! line, and a body terminated by NUL. A lone EOL is a heartbeat. Header
//! values are escaped on every frame except CONNECT/CONNECTED (per the 1.2
//! specification, which exempts the handshake for 1.0 compatibility).

use thiserror::Error;

/// STOMP commands this client produces or consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCommand {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Error,
    Disconnect,
    Receipt,
}

impl FrameCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameCommand::Connect => "CONNECT",
            FrameCommand::Connected => "CONNECTED",
            FrameCommand::Subscribe => "SUBSCRIBE",
            FrameCommand::Unsubscribe => "UNSUBSCRIBE",
            FrameCommand::Send => "SEND",
            FrameCommand::Message => "MESSAGE",
            FrameCommand::Error => "ERROR",
            FrameCommand::Disconnect => "DISCONNECT",
            FrameCommand::Receipt => "RECEIPT",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "CONNECT" => Some(FrameCommand::Connect),
            "CONNECTED" => Some(FrameCommand::Connected),
            "SUBSCRIBE" => Some(FrameCommand::Subscribe),
            "UNSUBSCRIBE" => Some(FrameCommand::Unsubscribe),
            "SEND" => Some(FrameCommand::Send),
            "MESSAGE" => Some(FrameCommand::Message),
            "ERROR" => Some(FrameCommand::Error),
            "DISCONNECT" => Some(FrameCommand::Disconnect),
            "RECEIPT" => Some(FrameCommand::Receipt),
            _ => None,
        }
    }
}

/// Framing errors
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("Empty frame")]
    Empty,
    #[error("Unknown STOMP command: {0}")]
    UnknownCommand(String),
    #[error("Malformed header line: {0}")]
    MalformedHeader(String),
    #[error("Frame body is not terminated")]
    UnterminatedBody,
    #[error("Invalid content-length header: {0}")]
    InvalidContentLength(String),
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: FrameCommand,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// One inbound WebSocket message, decoded at the framing layer
#[derive(Debug, Clone, PartialEq)]
pub enum ServerInput {
    /// A lone EOL keepalive
    Heartbeat,
    Frame(Frame),
}

impl Frame {
    pub fn new(command: FrameCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header<S: Into<String>>(mut self, name: &str, value: S) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// First value for a header name, if present. Repeated headers keep the
    /// first occurrence, as the STOMP specification requires.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Build a CONNECT frame for the given virtual host and heartbeat
    /// interval (same value advertised in both directions, in milliseconds).
    pub fn connect(host: &str, heartbeat_ms: u64) -> Self {
        Frame::new(FrameCommand::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", format!("{heartbeat_ms},{heartbeat_ms}"))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(FrameCommand::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(FrameCommand::Unsubscribe).with_header("id", id)
    }

    pub fn send(destination: &str, body: Vec<u8>) -> Self {
        Frame::new(FrameCommand::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    /// Serialize to the on-wire representation
    pub fn encode(&self) -> Vec<u8> {
        let escape = !matches!(
            self.command,
            FrameCommand::Connect | FrameCommand::Connected
        );

        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');

        for (name, value) in &self.headers {
            if escape {
                out.extend_from_slice(escape_header(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }

        if !self.body.is_empty() {
            out.extend_from_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }

        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }
}

/// Parse one inbound WebSocket payload into a heartbeat or a frame
pub fn parse(data: &[u8]) -> Result<ServerInput, FrameError> {
    if data.is_empty() {
        return Err(FrameError::Empty);
    }
    if data == b"\n" || data == b"\r\n" {
        return Ok(ServerInput::Heartbeat);
    }

    let (command_line, mut rest) = split_line(data).ok_or(FrameError::UnterminatedBody)?;
    let command_str = std::str::from_utf8(command_line)
        .map_err(|_| FrameError::UnknownCommand("<non-utf8>".to_string()))?;
    let command = FrameCommand::parse(command_str)
        .ok_or_else(|| FrameError::UnknownCommand(command_str.to_string()))?;

    let escape = !matches!(command, FrameCommand::Connect | FrameCommand::Connected);

    let mut headers: Vec<(String, String)> = Vec::new();
    loop {
        let (line, next) = split_line(rest).ok_or(FrameError::UnterminatedBody)?;
        rest = next;
        if line.is_empty() {
            break; // end of headers
        }
        let line = std::str::from_utf8(line)
            .map_err(|_| FrameError::MalformedHeader("<non-utf8>".to_string()))?;
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        let (name, value) = if escape {
            (unescape_header(name)?, unescape_header(value)?)
        } else {
            (name.to_string(), value.to_string())
        };
        // First occurrence wins
        if !headers.iter().any(|(n, _)| n == &name) {
            headers.push((name, value));
        }
    }

    let frame = Frame {
        command,
        headers,
        body: Vec::new(),
    };

    let body = match frame.header("content-length") {
        Some(len) => {
            let len: usize = len
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(len.to_string()))?;
            if rest.len() < len {
                return Err(FrameError::UnterminatedBody);
            }
            rest[..len].to_vec()
        }
        None => {
            let end = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or(FrameError::UnterminatedBody)?;
            rest[..end].to_vec()
        }
    };

    Ok(ServerInput::Frame(Frame { body, ..frame }))
}

/// Split off one line, accepting either LF or CRLF terminators
fn split_line(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = data.iter().position(|&b| b == b'\n')?;
    let line = if pos > 0 && data[pos - 1] == b'\r' {
        &data[..pos - 1]
    } else {
        &data[..pos]
    };
    Some((line, &data[pos + 1..]))
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::MalformedHeader(s.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_frame_encoding() {
        let encoded = Frame::connect("prayer.example.com", 10_000).encode();
        let text = String::from_utf8(encoded.clone()).unwrap();

        assert!(text.starts_with("CONNECT\n"));
        assert!(text.contains("accept-version:1.2\n"));
        assert!(text.contains("host:prayer.example.com\n"));
        assert!(text.contains("heart-beat:10000,10000\n"));
        assert_eq!(*encoded.last().unwrap(), 0);
    }

    #[test]
    fn test_send_frame_round_trip() {
        let frame = Frame::send("/app/prayer", br#"{"side":"up","count":5}"#.to_vec());
        let parsed = parse(&frame.encode()).unwrap();

        match parsed {
            ServerInput::Frame(f) => {
                assert_eq!(f.command, FrameCommand::Send);
                assert_eq!(f.header("destination"), Some("/app/prayer"));
                assert_eq!(f.header("content-type"), Some("application/json"));
                assert_eq!(f.body, br#"{"side":"up","count":5}"#);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_heartbeat_parsing() {
        assert_eq!(parse(b"\n").unwrap(), ServerInput::Heartbeat);
        assert_eq!(parse(b"\r\n").unwrap(), ServerInput::Heartbeat);
    }

    #[test]
    fn test_message_frame_with_content_length() {
        // Body contains a NUL, so only content-length delimits it correctly
        let body = b"ab\0cd";
        let raw = format!("MESSAGE\ndestination:/topic/prayer\ncontent-length:{}\n\n", body.len());
        let mut data = raw.into_bytes();
        data.extend_from_slice(body);
        data.push(0);

        match parse(&data).unwrap() {
            ServerInput::Frame(f) => {
                assert_eq!(f.command, FrameCommand::Message);
                assert_eq!(f.body, body);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_message_frame_without_content_length() {
        let data = b"MESSAGE\ndestination:/topic/ticker\nsubscription:sub-1\n\n{\"price\":1.0}\0";
        match parse(data).unwrap() {
            ServerInput::Frame(f) => {
                assert_eq!(f.header("destination"), Some("/topic/ticker"));
                assert_eq!(f.body, b"{\"price\":1.0}");
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_crlf_line_endings_accepted() {
        let data = b"CONNECTED\r\nversion:1.2\r\nheart-beat:10000,10000\r\n\r\n\0";
        match parse(data).unwrap() {
            ServerInput::Frame(f) => {
                assert_eq!(f.command, FrameCommand::Connected);
                assert_eq!(f.header("version"), Some("1.2"));
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_header_escaping_round_trip() {
        let frame = Frame::new(FrameCommand::Send)
            .with_header("destination", "/queue/a:b")
            .with_header("note", "line1\nline2\\end");
        let parsed = parse(&frame.encode()).unwrap();

        match parsed {
            ServerInput::Frame(f) => {
                assert_eq!(f.header("destination"), Some("/queue/a:b"));
                assert_eq!(f.header("note"), Some("line1\nline2\\end"));
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_repeated_header_keeps_first() {
        let data = b"MESSAGE\nfoo:first\nfoo:second\n\n\0";
        match parse(data).unwrap() {
            ServerInput::Frame(f) => assert_eq!(f.header("foo"), Some("first")),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        let result = parse(b"BOGUS\n\n\0");
        assert!(matches!(result, Err(FrameError::UnknownCommand(_))));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let result = parse(b"MESSAGE\nno-colon-here\n\n\0");
        assert!(matches!(result, Err(FrameError::MalformedHeader(_))));
    }

    #[test]
    fn test_unterminated_body_rejected() {
        let result = parse(b"MESSAGE\ndestination:/topic/x\n\nbody-without-nul");
        assert_eq!(result, Err(FrameError::UnterminatedBody));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert_eq!(parse(b""), Err(FrameError::Empty));
    }
}
