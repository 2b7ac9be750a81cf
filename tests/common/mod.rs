//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

use accel_data_collector::link::SerialLink;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How long a fake read waits before reporting a timeout.
const FAKE_READ_TIMEOUT: Duration = Duration::from_millis(2);

/// In-memory stand-in for a serial device.
///
/// Bytes fed with [`FakeDevice::feed`] are returned by the link's read half;
/// when nothing is queued a read times out like a real port would. Commands
/// written by the link are captured.
#[derive(Clone, Default)]
pub struct FakeDevice {
    incoming: Arc<Mutex<VecDeque<Vec<u8>>>>,
    written: Arc<Mutex<Vec<u8>>>,
    fail_writes: Arc<AtomicBool>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link whose transport is this device.
    pub fn link(&self) -> SerialLink {
        SerialLink::from_parts(
            "/dev/fake",
            Box::new(FakeReader(self.incoming.clone())),
            Box::new(FakeWriter {
                written: self.written.clone(),
                fail: self.fail_writes.clone(),
            }),
        )
    }

    /// Queue raw bytes for the reader.
    pub fn feed(&self, bytes: &[u8]) {
        self.incoming.lock().unwrap().push_back(bytes.to_vec());
    }

    /// Queue one line, newline appended.
    pub fn feed_line(&self, line: &str) {
        self.feed(format!("{line}\n").as_bytes());
    }

    /// Whether the reader has taken every queued chunk.
    pub fn is_drained(&self) -> bool {
        self.incoming.lock().unwrap().is_empty()
    }

    /// Everything the link has written so far.
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written.lock().unwrap()).into_owned()
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

struct FakeReader(Arc<Mutex<VecDeque<Vec<u8>>>>);

impl Read for FakeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.0.lock().unwrap();
        let Some(mut chunk) = queue.pop_front() else {
            drop(queue);
            thread::sleep(FAKE_READ_TIMEOUT);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "fake timeout"));
        };

        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            queue.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

struct FakeWriter {
    written: Arc<Mutex<Vec<u8>>>,
    fail: Arc<AtomicBool>,
}

impl Write for FakeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}
