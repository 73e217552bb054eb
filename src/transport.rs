//! ==============================================================================
//! transport.rs - inbound line sources
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for reading telemetry lines.
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (uart through `rppal`) and a development machine (replayed text).
//!
//! design philosophy:
//!     - "Compile Anywhere": The gateway should compile on Windows/Mac/Linux.
//!     - "Bounded Waits": every read returns within its window, with or
//!       without a line, so the scheduler can keep checking the clock.
//!
//! relationships:
//!     - used by: scheduler.rs (next_line every iteration, clear_input per cycle)
//!     - uses: rppal (on feature="hardware")
//!
//! ==============================================================================

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time::Instant;

/// longest partial line kept while waiting for its newline
pub const MAX_LINE_BYTES: usize = 4096;

#[async_trait]
pub trait LineSource: Send {
    /// Wait up to `wait` for one complete line (without its terminator).
    /// `Ok(None)` means nothing arrived in the window.
    async fn next_line(&mut self, wait: Duration) -> Result<Option<String>>;

    /// Drop any input that is buffered but not yet read.
    async fn clear_input(&mut self) -> Result<()>;
}

#[async_trait]
impl<S: LineSource + ?Sized> LineSource for Box<S> {
    async fn next_line(&mut self, wait: Duration) -> Result<Option<String>> {
        (**self).next_line(wait).await
    }

    async fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input().await
    }
}

/// Pop the first complete line out of `pending`, decoding lossily.
pub fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    let end = pending.iter().position(|&b| b == b'\n')?;
    let raw: Vec<u8> = pending.drain(..=end).collect();
    Some(decode(&raw))
}

fn decode(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

// ==============================================================================================
// REPLAY IMPLEMENTATION (For development machines / bench tests)
// ==============================================================================================

/// Reads newline-delimited telemetry from a file, stdin or any buffered reader.
///
/// After end of input every read simply waits out its window, so the
/// scheduler keeps republishing the last reading.
pub struct ReplaySource<R> {
    reader: R,
    pending: Vec<u8>,
    exhausted: bool,
    pace: Duration,
    next_ready: Option<Instant>,
}

impl ReplaySource<BufReader<tokio::fs::File>> {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            anyhow::anyhow!("failed to open replay file {}: {}", path.display(), e)
        })?;
        tracing::info!(path = %path.display(), "Using REPLAY transport (file)");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl ReplaySource<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        tracing::info!("Using REPLAY transport (stdin)");
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            exhausted: false,
            pace: Duration::ZERO,
            next_ready: None,
        }
    }

    /// Release at most one line per `pace`, imitating a node's send rate.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    fn emit(&mut self, line: String) -> Option<String> {
        if !self.pace.is_zero() {
            self.next_ready = Some(Instant::now() + self.pace);
        }
        Some(line)
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LineSource for ReplaySource<R> {
    async fn next_line(&mut self, wait: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + wait;

        if let Some(ready) = self.next_ready {
            if ready > deadline {
                tokio::time::sleep_until(deadline).await;
                return Ok(None);
            }
            tokio::time::sleep_until(ready).await;
            self.next_ready = None;
        }

        if self.exhausted {
            tokio::time::sleep_until(deadline).await;
            return Ok(None);
        }

        // read_until keeps partial bytes in `pending` if the window closes first
        let read = tokio::time::timeout_at(
            deadline,
            self.reader.read_until(b'\n', &mut self.pending),
        )
        .await;

        match read {
            Err(_elapsed) => {
                if self.pending.len() > MAX_LINE_BYTES {
                    tracing::debug!(bytes = self.pending.len(), "dropping oversized partial line");
                    self.pending.clear();
                }
                Ok(None)
            }
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(_)) => {
                if let Some(line) = take_line(&mut self.pending) {
                    return Ok(self.emit(line));
                }
                // end of input; flush a final unterminated line
                self.exhausted = true;
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let line = decode(&std::mem::take(&mut self.pending));
                Ok(self.emit(line))
            }
        }
    }

    async fn clear_input(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub use uart::UartSource;

#[cfg(feature = "hardware")]
mod uart {
    use super::{take_line, LineSource, MAX_LINE_BYTES};
    use anyhow::{anyhow, Context, Result};
    use async_trait::async_trait;
    use rppal::uart::{Parity, Queue, Uart};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct UartInner {
        uart: Uart,
        pending: Vec<u8>,
    }

    impl UartInner {
        fn read_line(&mut self, wait: Duration) -> Result<Option<String>> {
            if let Some(line) = take_line(&mut self.pending) {
                return Ok(Some(line));
            }

            // min_length 0: return as soon as any bytes arrive, or after `wait`
            self.uart.set_read_mode(0, wait)?;
            let mut buf = [0u8; 256];
            let n = self.uart.read(&mut buf)?;
            self.pending.extend_from_slice(&buf[..n]);

            if let Some(line) = take_line(&mut self.pending) {
                return Ok(Some(line));
            }
            if self.pending.len() > MAX_LINE_BYTES {
                tracing::debug!(bytes = self.pending.len(), "dropping oversized partial line");
                self.pending.clear();
            }
            Ok(None)
        }

        fn clear(&mut self) -> Result<()> {
            self.pending.clear();
            self.uart.flush(Queue::Input)?;
            Ok(())
        }
    }

    /// Serial port read through rppal (8N1).
    ///
    /// rppal calls block, so each read runs on the blocking pool.
    #[derive(Clone)]
    pub struct UartSource {
        inner: Arc<Mutex<UartInner>>,
    }

    impl UartSource {
        pub fn open(port: &str, baud: u32) -> Result<Self> {
            let uart = Uart::with_path(port, baud, Parity::None, 8, 1)
                .with_context(|| format!("failed to open serial port {port} @ {baud}"))?;
            tracing::info!(port, baud, "Using REAL UART transport (rppal)");
            Ok(Self {
                inner: Arc::new(Mutex::new(UartInner { uart, pending: Vec::new() })),
            })
        }
    }

    #[async_trait]
    impl LineSource for UartSource {
        async fn next_line(&mut self, wait: Duration) -> Result<Option<String>> {
            let inner = self.inner.clone();
            tokio::task::spawn_blocking(move || {
                let mut guard = inner.lock().map_err(|_| anyhow!("uart lock poisoned"))?;
                guard.read_line(wait)
            })
            .await
            .map_err(|e| anyhow!("task join error: {}", e))?
        }

        async fn clear_input(&mut self) -> Result<()> {
            let inner = self.inner.clone();
            tokio::task::spawn_blocking(move || {
                let mut guard = inner.lock().map_err(|_| anyhow!("uart lock poisoned"))?;
                guard.clear()
            })
            .await
            .map_err(|e| anyhow!("task join error: {}", e))?
        }
    }
}
