//! Serial connection to the sensor device.
//!
//! A [`SerialLink`] owns two halves of one port: the write half stays with the
//! link and carries control commands, while the read half ([`LineReader`]) is
//! lent to the background reader for the duration of a collection run. Both
//! halves share the same descriptor; serial I/O is full-duplex, so commands
//! and incoming lines may interleave freely.

use crate::link::types::{ConnectionError, DeviceCommand, LinkSettings, TransientReadError};
use serialport::{ClearBuffer, FlowControl, SerialPort};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::thread;
use tracing::{debug, info, trace, warn};

/// Longest line accepted before the partial data is discarded.
pub const MAX_LINE_BYTES: usize = 4096;

/// Line-oriented read half of a link.
pub struct LineReader {
    inner: BufReader<Box<dyn Read + Send>>,
    /// Bytes of a line whose terminator has not arrived yet.
    pending: Vec<u8>,
}

impl LineReader {
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            inner: BufReader::new(reader),
            pending: Vec::new(),
        }
    }

    /// Read one newline-terminated line, trimmed.
    ///
    /// Performs at most one read on the underlying transport, so a call never
    /// blocks longer than one read timeout even while bytes without a line
    /// terminator keep arriving. Returns `Ok(None)` when no complete line is
    /// available yet or the line was blank. Bytes of an incomplete line are
    /// kept and completed by later calls.
    pub fn next_line(&mut self) -> Result<Option<String>, TransientReadError> {
        let available = match self.inner.fill_buf() {
            Ok(buf) => buf,
            Err(e) if is_timeout(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if available.is_empty() {
            return Ok(None);
        }

        let (taken, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (end + 1, true),
            None => (available.len(), false),
        };
        self.pending.extend_from_slice(&available[..taken]);
        self.inner.consume(taken);

        if !complete {
            return self.check_overflow().map(|_| None);
        }

        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8(raw)?;
        let line = line.trim();
        if line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(line.to_string()))
        }
    }

    /// Forget any partial line and anything buffered but not yet returned.
    pub fn reset(&mut self) {
        self.pending.clear();
        let buffered = self.inner.buffer().len();
        self.inner.consume(buffered);
    }

    /// Fail-soft variant of [`next_line`](Self::next_line): any error reads as
    /// "no data" so the caller's loop stays alive.
    pub fn read_line(&mut self) -> String {
        match self.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => String::new(),
            Err(e) => {
                trace!("Dropped read attempt: {e}");
                String::new()
            }
        }
    }

    fn check_overflow(&mut self) -> Result<(), TransientReadError> {
        if self.pending.len() > MAX_LINE_BYTES {
            let len = self.pending.len();
            self.pending.clear();
            return Err(TransientReadError::Overflow(len));
        }
        Ok(())
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// An open connection to one device.
pub struct SerialLink {
    port_name: String,
    writer: Option<Box<dyn Write + Send>>,
    reader: Option<LineReader>,
    /// Handle used to flush the driver's receive queue. Absent for links
    /// built with [`SerialLink::from_parts`].
    control: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    /// Open `port_name` at the configured baud rate.
    ///
    /// Blocks for `settings.settle_delay` after opening; the board resets when
    /// the port is opened and drops anything sent before it is ready.
    pub fn open(port_name: &str, settings: &LinkSettings) -> Result<Self, ConnectionError> {
        info!(port = port_name, baud = settings.baud_rate, "Opening serial port");

        let port = serialport::new(port_name, settings.baud_rate)
            .timeout(settings.read_timeout)
            .flow_control(FlowControl::None)
            .open()
            .map_err(|source| ConnectionError::Open {
                port: port_name.to_string(),
                source,
            })?;

        let read_half = port.try_clone().map_err(|source| ConnectionError::Open {
            port: port_name.to_string(),
            source,
        })?;

        let control = port.try_clone().map_err(|source| ConnectionError::Open {
            port: port_name.to_string(),
            source,
        })?;

        thread::sleep(settings.settle_delay);
        debug!(port = port_name, "Serial port ready");

        let mut link = Self::from_parts(port_name, Box::new(read_half), Box::new(port));
        link.control = Some(control);
        Ok(link)
    }

    /// Build a link over an arbitrary transport.
    pub fn from_parts(
        port_name: &str,
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            port_name: port_name.to_string(),
            writer: Some(writer),
            reader: Some(LineReader::new(reader)),
            control: None,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Send a single control byte to the device.
    pub fn write_command(&mut self, command: DeviceCommand) -> Result<(), ConnectionError> {
        let writer = self.writer.as_mut().ok_or_else(|| ConnectionError::Closed {
            port: self.port_name.clone(),
        })?;

        writer
            .write_all(&[command.byte()])
            .and_then(|_| writer.flush())
            .map_err(|source| ConnectionError::Write {
                port: self.port_name.clone(),
                command,
                source,
            })?;

        debug!(port = %self.port_name, %command, "Sent device command");
        Ok(())
    }

    /// Drop bytes the driver received but nobody has read yet.
    pub fn clear_input(&mut self) {
        if let Some(control) = self.control.as_mut() {
            if let Err(e) = control.clear(ClearBuffer::Input) {
                warn!(port = %self.port_name, "Could not clear serial input: {e}");
            }
        }
    }

    /// Lend the read half to a background reader.
    pub fn take_reader(&mut self) -> Option<LineReader> {
        if !self.is_open() {
            return None;
        }
        self.reader.take()
    }

    /// Return a previously lent read half. Dropped if the link was closed
    /// in the meantime.
    pub fn restore_reader(&mut self, reader: LineReader) {
        if self.is_open() {
            self.reader = Some(reader);
        }
    }

    /// Close the link. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.writer.take().is_some() {
            info!(port = %self.port_name, "Closed serial port");
        }
        self.reader = None;
        self.control = None;
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Names of the serial ports present on this machine.
pub fn list_available_ports() -> Result<Vec<String>, serialport::Error> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Replays scripted chunks; `None` entries read as a timeout.
    struct Script(VecDeque<Option<Vec<u8>>>);

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Some(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                _ => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
            }
        }
    }

    fn reader(chunks: &[Option<&[u8]>]) -> LineReader {
        let script = chunks.iter().map(|c| c.map(|b| b.to_vec())).collect();
        LineReader::new(Box::new(Script(script)))
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_reads_trimmed_line() {
        let mut r = reader(&[Some(&b"1.0\t2.0\t3.0\r\n"[..])]);
        assert_eq!(r.next_line().unwrap().as_deref(), Some("1.0\t2.0\t3.0"));
    }

    #[test]
    fn test_timeout_reads_as_no_data() {
        let mut r = reader(&[None]);
        assert!(r.next_line().unwrap().is_none());
        assert_eq!(r.read_line(), "");
    }

    #[test]
    fn test_partial_line_survives_timeout() {
        let mut r = reader(&[Some(&b"0.5\t0."[..]), None, Some(&b"7\n"[..])]);
        assert!(r.next_line().unwrap().is_none());
        assert!(r.next_line().unwrap().is_none());
        assert_eq!(r.next_line().unwrap().as_deref(), Some("0.5\t0.7"));
    }

    #[test]
    fn test_buffered_lines_returned_one_per_call() {
        let mut r = reader(&[Some(&b"a\nb\n"[..])]);
        assert_eq!(r.next_line().unwrap().as_deref(), Some("a"));
        assert_eq!(r.next_line().unwrap().as_deref(), Some("b"));
        assert!(r.next_line().unwrap().is_none());
    }

    /// Streams newline-free bytes forever, a few at a time.
    struct Unterminated;

    impl Read for Unterminated {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(1));
            let n = buf.len().min(8);
            buf[..n].fill(b'x');
            Ok(n)
        }
    }

    #[test]
    fn test_returns_between_reads_without_terminator() {
        let mut r = LineReader::new(Box::new(Unterminated));

        let started = Instant::now();
        assert!(r.next_line().unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));

        let mut calls = 1;
        let overflowed = loop {
            match r.next_line() {
                Ok(None) if calls < 2 * MAX_LINE_BYTES => calls += 1,
                Err(TransientReadError::Overflow(len)) => break len,
                other => panic!("unexpected read result after {calls} calls: {other:?}"),
            }
        };
        assert!(overflowed <= MAX_LINE_BYTES + 8);
        assert!(r.pending.is_empty());
    }

    #[test]
    fn test_reset_discards_partial_and_buffered_data() {
        let mut r = reader(&[Some(&b"9.9\t8"[..]), Some(&b"1\n2\n"[..]), Some(&b"4\t5\n"[..])]);
        assert!(r.next_line().unwrap().is_none());
        // Consumes "1\n" and leaves "2\n" in the read buffer.
        assert_eq!(r.next_line().unwrap().as_deref(), Some("9.9\t81"));

        r.reset();

        assert_eq!(r.next_line().unwrap().as_deref(), Some("4\t5"));
    }

    #[test]
    fn test_blank_line_is_no_data() {
        let mut r = reader(&[Some(&b"  \r\n"[..])]);
        assert!(r.next_line().unwrap().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_dropped() {
        let mut r = reader(&[Some(&[0xff, 0xfe, b'\n'][..]), Some(&b"ok\n"[..])]);
        assert!(matches!(
            r.next_line(),
            Err(TransientReadError::Decode(_))
        ));
        assert_eq!(r.read_line(), "ok");
    }

    #[test]
    fn test_runaway_line_is_discarded() {
        let junk = vec![b'x'; MAX_LINE_BYTES + 1];
        let mut r = reader(&[Some(junk.as_slice()), Some(&b"next\n"[..])]);
        assert!(matches!(
            r.next_line(),
            Err(TransientReadError::Overflow(_))
        ));
        assert_eq!(r.read_line(), "next");
    }

    #[test]
    fn test_write_command_sends_single_byte() {
        let capture = Capture::default();
        let mut link = SerialLink::from_parts(
            "/dev/test",
            Box::new(Script(VecDeque::new())),
            Box::new(capture.clone()),
        );

        link.write_command(DeviceCommand::Start).unwrap();
        link.write_command(DeviceCommand::Stop).unwrap();

        assert_eq!(capture.0.lock().unwrap().as_slice(), b"sp");
    }

    #[test]
    fn test_write_failure_surfaces() {
        let mut link = SerialLink::from_parts(
            "/dev/test",
            Box::new(Script(VecDeque::new())),
            Box::new(Broken),
        );

        let err = link.write_command(DeviceCommand::Start).unwrap_err();
        assert!(matches!(err, ConnectionError::Write { .. }));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut link = SerialLink::from_parts(
            "/dev/test",
            Box::new(Script(VecDeque::new())),
            Box::new(Capture::default()),
        );

        link.close();
        link.close();

        assert!(!link.is_open());
        assert!(matches!(
            link.write_command(DeviceCommand::Stop),
            Err(ConnectionError::Closed { .. })
        ));
        assert!(link.take_reader().is_none());
    }

    #[test]
    fn test_reader_dropped_when_restored_after_close() {
        let mut link = SerialLink::from_parts(
            "/dev/test",
            Box::new(Script(VecDeque::new())),
            Box::new(Capture::default()),
        );

        let lent = link.take_reader().unwrap();
        link.close();
        link.restore_reader(lent);

        assert!(link.take_reader().is_none());
    }
}
