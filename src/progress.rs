// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Progress reporting: the sink trait, the per-stage part counter and the observing stream.

use crate::{DataStream, Result};
use std::{
    io::{self, Read, Seek, SeekFrom, Write},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// Minimum time between two progress callbacks from one [`ProgressStream`].
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Receiver of progress updates.
///
/// `percentage` is in `0.0..=100.0`. Updates arrive from several worker threads at once, so
/// implementations must be thread-safe; the engine only serialises its own counters.
pub trait Progress: Send + Sync {
    /// Reports that `stage` has reached `percentage`.
    fn update(&self, stage: &str, percentage: f64);
}

impl<F> Progress for F
where
    F: Fn(&str, f64) + Send + Sync,
{
    fn update(&self, stage: &str, percentage: f64) {
        self(stage, percentage)
    }
}

/// Discards every update.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&self, _stage: &str, _percentage: f64) {}
}

/// Forwards every update to `tracing` at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn update(&self, stage: &str, percentage: f64) {
        tracing::debug!(stage, percentage, "progress");
    }
}

/// Counts completed parts of one stage and reports `done / total * 100` on every increment.
///
/// The count sits behind a single mutex which is held across the report, so the percentages
/// seen by the sink for one stage never go backwards.
pub(crate) struct StageCounter<'a> {
    stage: &'static str,
    total: usize,
    done: Mutex<usize>,
    sink: &'a dyn Progress,
}

impl<'a> StageCounter<'a> {
    pub(crate) fn new(stage: &'static str, total: usize, sink: &'a dyn Progress) -> Self {
        Self {
            stage,
            total,
            done: Mutex::new(0),
            sink,
        }
    }

    /// Reports the current count without changing it.
    pub(crate) fn report(&self) -> Result<()> {
        let done = self.done.lock()?;
        self.sink.update(self.stage, percentage(*done, self.total));
        Ok(())
    }

    /// Marks one more part as done.
    pub(crate) fn advance(&self) -> Result<()> {
        let mut done = self.done.lock()?;
        *done += 1;
        self.sink.update(self.stage, percentage(*done, self.total));
        Ok(())
    }
}

fn percentage(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Stream decorator reporting how far through an expected total the data moved so far.
///
/// Every read and write is forwarded to the inner stream; the bytes actually transferred are
/// added to a counter and, if more than the update interval passed since the last callback,
/// the sink receives
///
/// ```text
/// (total * base_percentage + transferred) / total * 100
/// ```
///
/// `base_percentage` (a fraction in `0.0..=1.0`) lets consecutive stages share one scale.
/// Seeking sets the counter to the absolute position reached, so after random access the
/// report reflects where the stream is rather than how much has moved.
pub struct ProgressStream<S> {
    inner: S,
    sink: Arc<dyn Progress>,
    stage: String,
    total: u64,
    transferred: u64,
    base_percentage: f64,
    interval: Duration,
    last_emit: Instant,
}

impl<S: DataStream> ProgressStream<S> {
    /// Wraps `inner`, reporting to `sink` under `stage` against an expected `total` bytes.
    pub fn new(
        inner: S,
        sink: Arc<dyn Progress>,
        stage: impl Into<String>,
        total: u64,
        base_percentage: f64,
    ) -> Self {
        Self {
            inner,
            sink,
            stage: stage.into(),
            total,
            transferred: 0,
            base_percentage,
            interval: PROGRESS_INTERVAL,
            last_emit: Instant::now(),
        }
    }

    /// Replaces the minimum time between two callbacks.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bytes counted so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// The value the next callback would carry.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        let total = self.total as f64;
        ((total * self.base_percentage + self.transferred as f64) / total * 100.0)
            .clamp(0.0, 100.0)
    }

    /// Borrows the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Unwraps the decorator, returning the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn observe(&mut self, bytes: usize) {
        self.transferred += bytes as u64;
        if self.last_emit.elapsed() > self.interval {
            self.last_emit = Instant::now();
            self.sink.update(&self.stage, self.percentage());
        }
    }
}

impl<S: DataStream> Read for ProgressStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.observe(read);
        Ok(read)
    }
}

impl<S: DataStream> Write for ProgressStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.observe(written);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: DataStream> Seek for ProgressStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = self.inner.seek(pos)?;
        self.transferred = position;
        Ok(position)
    }
}

impl<S: DataStream> DataStream for ProgressStream<S> {
    fn len(&self) -> io::Result<u64> {
        self.inner.len()
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.inner.set_len(len)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.inner.position()
    }
}
