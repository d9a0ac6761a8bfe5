// Copyright 2025-2026 CEMAXECUTER LLC

use std::thread;
use std::time::{Duration, Instant};

use bt_output::SinkRegistry;
use bt_radio::{PacketSource, Polled, TransportError};

use crate::cancel::CancellationToken;
use crate::dispatch::Dispatcher;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// How a capture loop ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    Cancelled,
    /// Recorded source ran out of frames
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    /// Sleep between polls
    pub poll_interval: Duration,
    /// Print running counters to stderr
    pub stats: bool,
}

/// Poll `source` until cancelled or exhausted, dispatching every frame.
///
/// Cancellation is checked before each poll and again before a polled frame
/// is processed. A transport error ends the loop immediately.
pub fn run_capture<S: PacketSource + ?Sized>(
    source: &mut S,
    dispatcher: &mut Dispatcher,
    sinks: &mut SinkRegistry,
    cancel: &CancellationToken,
    opts: &CaptureOptions,
) -> Result<CaptureEnd, TransportError> {
    let start = Instant::now();
    let mut last_stats = Instant::now();

    loop {
        if cancel.is_cancelled() {
            return Ok(CaptureEnd::Cancelled);
        }

        match source.poll()? {
            Polled::Frame(frame) => {
                if cancel.is_cancelled() {
                    log::debug!("discarding frame polled after interrupt");
                    return Ok(CaptureEnd::Cancelled);
                }
                dispatcher.process(&frame, sinks);
            }
            Polled::Idle => {}
            Polled::Exhausted => return Ok(CaptureEnd::Exhausted),
        }

        if opts.stats && last_stats.elapsed() >= STATS_INTERVAL {
            eprintln!("[{:.1}s] {}", start.elapsed().as_secs_f64(), dispatcher.stats());
            last_stats = Instant::now();
        }

        if !opts.poll_interval.is_zero() {
            thread::sleep(opts.poll_interval);
        }
    }
}
