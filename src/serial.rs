//! # Serial transport
//!
//! Every request opens its port, clears stale buffers, writes, waits for the reply and
//! closes the port again when the handle drops. Nothing is kept open between requests, so
//! a device that glitches cannot poison the next call on another port.
//!
//! Two waiting disciplines are used:
//! - fixed command (camera scanner): the first burst of bytes is the whole answer;
//! - text (Golden Eye, SFC): bytes accumulate until a terminal keyword shows up or the
//!   deadline passes.

use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use encoding_rs::{UTF_8, WINDOWS_1252};
use serialport::{ClearBuffer, SerialPort};

use crate::error::ChannelError;

/// Polling period while waiting for a reply.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

const TERMINAL_TOKENS: [&str; 3] = ["PASS", "ERRO", "FAIL"];
const FAILURE_TOKENS: [&str; 2] = ["FAIL", "ERRO"];

/// Request/response access to the station's devices.
pub trait DeviceLink {
    /// Writes a fixed byte command and returns the first burst of bytes that comes back.
    fn send_fixed_command(
        &self,
        port: &str,
        command: &[u8],
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Vec<u8>, ChannelError>;

    /// Writes `text` (plus CRLF when `append_terminator`) and returns the trimmed reply.
    /// A reply containing `FAIL` or `ERRO` comes back as [`ChannelError::DeviceReported`].
    fn send_text_and_wait(
        &self,
        port: &str,
        text: &str,
        baud_rate: u32,
        append_terminator: bool,
        timeout: Duration,
    ) -> Result<String, ChannelError>;
}

impl<T: DeviceLink + ?Sized> DeviceLink for &T {
    fn send_fixed_command(
        &self,
        port: &str,
        command: &[u8],
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Vec<u8>, ChannelError> {
        (**self).send_fixed_command(port, command, baud_rate, timeout)
    }

    fn send_text_and_wait(
        &self,
        port: &str,
        text: &str,
        baud_rate: u32,
        append_terminator: bool,
        timeout: Duration,
    ) -> Result<String, ChannelError> {
        (**self).send_text_and_wait(port, text, baud_rate, append_terminator, timeout)
    }
}

/// [`DeviceLink`] over real serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialChannel;

impl SerialChannel {
    pub fn new() -> Self {
        Self
    }

    fn open(port: &str, baud_rate: u32, payload: &[u8]) -> Result<Box<dyn SerialPort>, ChannelError> {
        let mut handle = serialport::new(port, baud_rate)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|source| ChannelError::Open { port: port.to_string(), source })?;

        let io_err = |source| ChannelError::Io { port: port.to_string(), source };
        handle.clear(ClearBuffer::All).map_err(|e| io_err(io::Error::from(e)))?;
        handle.write_all(payload).map_err(io_err)?;
        handle.flush().map_err(io_err)?;
        Ok(handle)
    }
}

impl DeviceLink for SerialChannel {
    fn send_fixed_command(
        &self,
        port: &str,
        command: &[u8],
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Vec<u8>, ChannelError> {
        tracing::debug!(port, command = ?command, "sending fixed command");
        let mut handle = Self::open(port, baud_rate, command)?;
        let burst = wait_for_burst(&mut handle, Instant::now() + timeout)
            .map_err(|source| ChannelError::Io { port: port.to_string(), source })?;

        match burst {
            Some(bytes) => {
                tracing::debug!(port, received = bytes.len(), "burst received");
                Ok(bytes)
            }
            None => Err(ChannelError::Timeout { port: port.to_string() }),
        }
    }

    fn send_text_and_wait(
        &self,
        port: &str,
        text: &str,
        baud_rate: u32,
        append_terminator: bool,
        timeout: Duration,
    ) -> Result<String, ChannelError> {
        let mut payload = text.to_string();
        if append_terminator {
            payload.push_str("\r\n");
        }
        tracing::debug!(port, request = %text, "sending text");

        let mut handle = Self::open(port, baud_rate, payload.as_bytes())?;
        let reply = wait_for_terminal(&mut handle, Instant::now() + timeout)
            .map_err(|source| ChannelError::Io { port: port.to_string(), source })?;
        classify_reply(port, &reply)
    }
}

// The minimal read surface the wait loops need; lets them run against a scripted port.
trait PortIo {
    fn pending(&mut self) -> io::Result<usize>;
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl PortIo for Box<dyn SerialPort> {
    fn pending(&mut self) -> io::Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

fn wait_for_burst<P: PortIo>(port: &mut P, deadline: Instant) -> io::Result<Option<Vec<u8>>> {
    let mut received = Vec::new();
    while Instant::now() < deadline {
        let pending = port.pending()?;
        if pending > 0 {
            let mut buf = vec![0u8; pending];
            let n = port.read_chunk(&mut buf)?;
            received.extend_from_slice(&buf[..n]);
        }
        if !received.is_empty() {
            return Ok(Some(received));
        }
        thread::sleep(POLL_INTERVAL);
    }
    Ok(None)
}

fn wait_for_terminal<P: PortIo>(port: &mut P, deadline: Instant) -> io::Result<String> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 256];
    while Instant::now() < deadline {
        let n = port.read_chunk(&mut buf)?;
        if n == 0 {
            thread::sleep(POLL_INTERVAL);
            continue;
        }
        raw.extend_from_slice(&buf[..n]);
        let text = decode_text(&raw);
        tracing::debug!(chunk = %decode_text(&buf[..n]), "text received");
        if contains_any(&text, &TERMINAL_TOKENS) {
            return Ok(text);
        }
    }
    Ok(decode_text(&raw))
}

fn classify_reply(port: &str, reply: &str) -> Result<String, ChannelError> {
    let reply = reply.trim();
    if contains_any(reply, &FAILURE_TOKENS) {
        tracing::warn!(port, reply, "device reported failure");
        return Err(ChannelError::DeviceReported { port: port.to_string(), response: reply.to_string() });
    }
    if reply.is_empty() {
        return Err(ChannelError::Timeout { port: port.to_string() });
    }
    Ok(reply.to_string())
}

fn contains_any(text: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| text.contains(t))
}

/// Decodes device bytes as UTF-8, falling back to a single-byte decoding when they are
/// not valid UTF-8 so that no reply is ever lost to an encoding error.
pub fn decode_text(bytes: &[u8]) -> String {
    match UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        Some(text) => text.into_owned(),
        None => WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
    }
}

/// Scanner bytes with CR/LF removed, as text.
pub fn scan_text(bytes: &[u8]) -> String {
    let clean: Vec<u8> = bytes.iter().copied().filter(|b| *b != b'\r' && *b != b'\n').collect();
    decode_text(&clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedPort {
        chunks: VecDeque<Vec<u8>>,
        reads: usize,
    }

    impl ScriptedPort {
        fn new(chunks: &[&[u8]]) -> Self {
            Self { chunks: chunks.iter().map(|c| c.to_vec()).collect(), reads: 0 }
        }
    }

    impl PortIo for ScriptedPort {
        fn pending(&mut self) -> io::Result<usize> {
            Ok(self.chunks.front().map_or(0, Vec::len))
        }

        fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    fn deadline(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[test]
    fn burst_returns_first_arrival_only() {
        let mut port = ScriptedPort::new(&[b"SN123\r\n", b"LATE"]);
        let burst = wait_for_burst(&mut port, deadline(200)).unwrap();
        assert_eq!(burst.as_deref(), Some(&b"SN123\r\n"[..]));
        assert_eq!(port.chunks.len(), 1);
    }

    #[test]
    fn burst_times_out_on_silence() {
        let mut port = ScriptedPort::default();
        let start = Instant::now();
        assert_eq!(wait_for_burst(&mut port, deadline(40)).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn text_stops_at_terminal_token() {
        let mut port = ScriptedPort::new(&[b"DSN=SN1,", b"SSN4=XYZ999,PA", b"SS\r\n", b"NEXT"]);
        let text = wait_for_terminal(&mut port, deadline(500)).unwrap();
        assert_eq!(text, "DSN=SN1,SSN4=XYZ999,PASS\r\n");
        assert_eq!(port.chunks.len(), 1);
    }

    #[test]
    fn text_without_token_runs_to_deadline() {
        let mut port = ScriptedPort::new(&[b"DSN=SN1"]);
        let text = wait_for_terminal(&mut port, deadline(40)).unwrap();
        assert_eq!(text, "DSN=SN1");
        assert!(port.reads > 1);
    }

    #[test]
    fn classify_reply_outcomes() {
        assert_eq!(classify_reply("COM8", "  DSN=A,PASS\r\n").unwrap(), "DSN=A,PASS");
        assert_eq!(classify_reply("COM8", "DSN=A").unwrap(), "DSN=A");

        match classify_reply("COM8", "DSN=A,FAIL\r\n") {
            Err(ChannelError::DeviceReported { port, response }) => {
                assert_eq!(port, "COM8");
                assert_eq!(response, "DSN=A,FAIL");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(classify_reply("COM8", "ERRO"), Err(ChannelError::DeviceReported { .. })));
        assert!(matches!(classify_reply("COM8", " \r\n"), Err(ChannelError::Timeout { .. })));
    }

    #[test]
    fn decode_falls_back_on_invalid_utf8() {
        assert_eq!(decode_text("DSN=Ä".as_bytes()), "DSN=Ä");
        // 0xC4 alone is not UTF-8; in the single-byte fallback it is 'Ä'.
        assert_eq!(decode_text(b"DSN=\xC4,PASS"), "DSN=Ä,PASS");
    }

    #[test]
    fn absent_port_is_an_open_error() {
        let port = if cfg!(windows) { "COM250" } else { "/dev/does-not-exist" };
        let link = SerialChannel::new();

        let err = link
            .send_text_and_wait(port, "SN123", 9600, true, Duration::from_millis(50))
            .unwrap_err();
        match err {
            ChannelError::Open { port: p, .. } => assert_eq!(p, port),
            other => panic!("unexpected {:?}", other),
        }

        let err = link.send_fixed_command(port, &[0x16, 0x54, 0x0D], 9600, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, ChannelError::Open { .. }));
        assert_eq!(err.kind(), crate::error::FailureKind::Transport);
    }

    #[test]
    fn scan_text_drops_line_breaks() {
        assert_eq!(scan_text(b"GT542A0154530005\r\n"), "GT542A0154530005");
        assert_eq!(scan_text(b"\r\n"), "");
    }
}
