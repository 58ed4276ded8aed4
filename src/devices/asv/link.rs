//! Physical serial link to the vehicle
//!
//! The link has two states: closed (startup default) and open. Opening
//! is idempotent and triggered either eagerly at startup or lazily by
//! the first camera_ready event from a viewer. A reader thread splits
//! the byte stream into lines and hands each one to the ingestion
//! callback. Any I/O error closes the link; it stays closed until the
//! next external open trigger.

use crate::error::{Error, Result};
use crate::transport::{SerialTransport, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback invoked with each complete line read from the vehicle
pub type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;

type TransportSlot = Arc<Mutex<Option<Box<dyn Transport>>>>;

/// Serial link adapter owning the transport and its reader thread
pub struct SerialLink {
    port: String,
    baud_rate: u32,
    on_line: LineCallback,
    transport: TransportSlot,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SerialLink {
    pub fn new(port: &str, baud_rate: u32, on_line: LineCallback) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            on_line,
            transport: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
        }
    }

    /// Open the serial port if it is not already open.
    ///
    /// Safe to call from any trigger path; an already-open link is a
    /// logged no-op.
    pub fn ensure_open(&self) -> Result<()> {
        {
            let slot = self.transport.lock();
            if slot.is_some() {
                log::debug!("Serial link already open: {}", self.port);
                return Ok(());
            }
        }
        let transport = SerialTransport::open(&self.port, self.baud_rate)?;
        self.install(Box::new(transport))
    }

    /// Open the link over a caller-supplied transport (tests)
    pub fn open_with(&self, transport: Box<dyn Transport>) -> Result<()> {
        let slot = self.transport.lock();
        if slot.is_some() {
            return Ok(());
        }
        drop(slot);
        self.install(transport)
    }

    fn install(&self, transport: Box<dyn Transport>) -> Result<()> {
        {
            let mut slot = self.transport.lock();
            *slot = Some(transport);
        }

        let slot = Arc::clone(&self.transport);
        let on_line = Arc::clone(&self.on_line);
        let port = self.port.clone();
        let handle = thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || Self::reader_loop(slot, on_line, port))
            .map_err(|e| Error::Other(format!("Failed to spawn serial reader: {}", e)))?;

        let mut reader = self.reader.lock();
        if let Some(old) = reader.take() {
            // Previous reader exits on its own once the slot was cleared
            let _ = old.join();
        }
        *reader = Some(handle);
        Ok(())
    }

    /// Whether the link is currently open
    pub fn is_open(&self) -> bool {
        self.transport.lock().is_some()
    }

    /// Write one command line to the vehicle.
    ///
    /// Fails with `LinkClosed` when the port has not been opened. A
    /// write error closes the link.
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut slot = self.transport.lock();
        let transport = slot.as_mut().ok_or(Error::LinkClosed)?;
        match transport.write(line.as_bytes()) {
            Ok(_) => Ok(()),
            Err(e) => {
                log::error!("Serial write failed, closing link: {}", e);
                *slot = None;
                Err(e)
            }
        }
    }

    /// Close the link and stop the reader thread
    pub fn close(&self) {
        {
            let mut slot = self.transport.lock();
            if slot.take().is_some() {
                log::info!("Serial link closed: {}", self.port);
            }
        }
        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
    }

    fn reader_loop(slot: TransportSlot, on_line: LineCallback, port: String) {
        log::info!("Serial reader started: {}", port);
        let mut pending: Vec<u8> = Vec::new();
        let mut buf = [0u8; 512];

        loop {
            let read = {
                let mut guard = slot.lock();
                let Some(transport) = guard.as_mut() else {
                    break;
                };
                match transport.available().and_then(|n| {
                    if n == 0 {
                        Ok(0)
                    } else {
                        transport.read(&mut buf)
                    }
                }) {
                    Ok(n) => n,
                    Err(e) => {
                        log::error!("Serial read failed, closing link: {}", e);
                        *guard = None;
                        break;
                    }
                }
            };

            if read == 0 {
                thread::sleep(Duration::from_millis(20));
                continue;
            }

            pending.extend_from_slice(&buf[..read]);
            while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = pending.drain(..=newline).collect();
                line.pop(); // newline
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                let text = String::from_utf8_lossy(&line);
                on_line(&text);
            }
        }
        log::info!("Serial reader stopped: {}", port);
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}
