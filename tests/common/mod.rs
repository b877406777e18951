// tests/common/mod.rs
//! Shared fixtures for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use quickdeck_core::config::{StorageSettings, SystemConfig};
use quickdeck_core::hal::SerialTransport;
use quickdeck_core::utils::time::{Clock, MockClock};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// In-memory serial link. Reads pop queued chunks; an empty queue behaves
/// like a read timeout. Writing `IDENTITY` queues the configured reply.
#[derive(Clone, Default)]
pub struct MockPort {
    incoming: Arc<Mutex<VecDeque<Vec<u8>>>>,
    written: Arc<Mutex<Vec<u8>>>,
    identity_reply: Option<String>,
}

impl MockPort {
    pub fn replying(reply: &str) -> Self {
        Self {
            identity_reply: Some(format!("{reply}\r\n")),
            ..Self::default()
        }
    }

    pub fn push_line(&self, line: &str) {
        self.incoming.lock().push_back(format!("{line}\n").into_bytes());
    }

    pub fn push_lines<'a>(&self, lines: impl IntoIterator<Item = &'a str>) {
        for line in lines {
            self.push_line(line);
        }
    }

    pub fn pending(&self) -> usize {
        self.incoming.lock().len()
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written.lock()).into_owned()
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut incoming = self.incoming.lock();
        match incoming.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    incoming.push_front(chunk.split_off(n));
                }
                Ok(n)
            }
            None => {
                drop(incoming);
                std::thread::sleep(Duration::from_millis(1));
                Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
            }
        }
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().extend_from_slice(buf);
        if buf.starts_with(b"IDENTITY") {
            if let Some(reply) = &self.identity_reply {
                self.incoming.lock().push_back(reply.clone().into_bytes());
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialTransport for MockPort {
    fn try_clone_transport(&self) -> io::Result<Box<dyn SerialTransport>> {
        Ok(Box::new(self.clone()))
    }

    fn set_read_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

pub fn mock_clock() -> Arc<dyn Clock> {
    Arc::new(MockClock::from_rfc3339("2024-09-12T14:30:00+01:00").unwrap())
}

/// Fast settings rooted at `base`
pub fn test_config(base: &Path) -> SystemConfig {
    let mut config = SystemConfig::default();
    config.storage = StorageSettings {
        base_dir: base.to_path_buf(),
        sync_on_append: false,
    };
    config.serial.poll_interval_ms = 5;
    config.serial.read_timeout_ms = 100;
    config.serial.settle_delay_ms = 0;
    config.acquisition.stop_timeout_ms = 1_000;
    config.simulator.strain_interval_ms = 5;
    config.simulator.motion_interval_ms = 2;
    config.simulator.seed = Some(7);
    config
}
