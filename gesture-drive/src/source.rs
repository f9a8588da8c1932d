//! Frame sources
//!
//! Adapters that turn an external landmark stream into timed frames. The
//! bundled source reads newline-delimited JSON, one inference result per line:
//!
//! ```text
//! {"timestamp_ms": 1712, "landmarks": [{"x": 0.51, "y": 0.32}, ...]}
//! ```

use crate::landmarks::{Landmark, LandmarkFrame};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{trace, warn};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read frame stream: {0}")]
    Io(#[from] std::io::Error),
}

/// A frame together with its capture time on the local monotonic clock
#[derive(Debug, Clone)]
pub struct TimedFrame {
    pub frame: LandmarkFrame,
    pub at: Instant,
}

#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream has ended
    async fn next_frame(&mut self) -> Result<Option<TimedFrame>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct FrameRecord {
    timestamp_ms: u64,
    #[serde(default)]
    landmarks: Vec<Landmark>,
}

/// Maps capture timestamps (milliseconds, arbitrary epoch) onto `Instant`s,
/// anchored at the first frame seen.
#[derive(Debug, Default)]
struct CaptureClock {
    anchor: Option<(u64, Instant)>,
    last_ms: u64,
}

impl CaptureClock {
    fn instant_for(&mut self, timestamp_ms: u64) -> Instant {
        let (first_ms, base) = *self.anchor.get_or_insert_with(|| (timestamp_ms, Instant::now()));

        if timestamp_ms < self.last_ms {
            warn!(
                "Capture timestamp went backwards ({} < {}), clamping",
                timestamp_ms, self.last_ms
            );
        }
        self.last_ms = self.last_ms.max(timestamp_ms);

        base + Duration::from_millis(self.last_ms.saturating_sub(first_ms))
    }
}

/// Newline-delimited JSON frame reader
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    clock: CaptureClock,
    line_no: u64,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            clock: CaptureClock::default(),
            line_no: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> FrameSource for JsonLinesSource<R> {
    async fn next_frame(&mut self) -> Result<Option<TimedFrame>, SourceError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let record: FrameRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping malformed frame on line {}: {}", self.line_no, e);
                    continue;
                }
            };

            let frame = match LandmarkFrame::new(record.landmarks) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Skipping invalid frame on line {}: {}", self.line_no, e);
                    continue;
                }
            };

            trace!("Frame {} with {} landmarks", self.line_no, frame.len());

            return Ok(Some(TimedFrame {
                at: self.clock.instant_for(record.timestamp_ms),
                frame,
            }));
        }

        Ok(None)
    }
}
