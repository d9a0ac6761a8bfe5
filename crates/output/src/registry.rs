// Copyright 2025-2026 CEMAXECUTER LLC

use std::io;

use crate::{open_file_sink, CaptureSink, FrameRecord, SinkKind, SinkSpec};

/// The sinks of one session, at most one per kind.
/// Every sink is closed exactly once: by `close_all` or on drop.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<Box<dyn CaptureSink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn is_open(&self, kind: SinkKind) -> bool {
        self.sinks.iter().any(|s| s.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Open a sink of `kind` with `open` unless that slot is taken.
    /// Returns false (and opens nothing) when the slot was already filled.
    pub fn open_with<F>(&mut self, kind: SinkKind, label: &str, open: F) -> io::Result<bool>
    where
        F: FnOnce() -> io::Result<Box<dyn CaptureSink>>,
    {
        if self.is_open(kind) {
            log::warn!("Ignoring extra capture file: {}", label);
            return Ok(false);
        }
        self.sinks.push(open()?);
        Ok(true)
    }

    /// Open the file sink described by `spec`
    pub fn open_file(&mut self, spec: &SinkSpec) -> io::Result<bool> {
        let label = spec.path.display().to_string();
        self.open_with(spec.format.kind(), &label, || {
            open_file_sink(spec.format, &spec.path)
        })
    }

    /// Add an already-open sink. Returns false if its slot is taken.
    pub fn register(&mut self, sink: Box<dyn CaptureSink>) -> bool {
        if self.is_open(sink.kind()) {
            log::warn!("Ignoring extra capture file: {:?} sink", sink.kind());
            return false;
        }
        self.sinks.push(sink);
        true
    }

    /// Forward one record to every sink. A failing sink is logged and
    /// skipped; the others still receive the record. Returns the number
    /// of sinks that failed.
    pub fn write_all(&mut self, rec: &FrameRecord<'_>) -> usize {
        let mut failed = 0;
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.write(rec) {
                log::warn!("{:?} sink write failed: {}", sink.kind(), e);
                failed += 1;
            }
        }
        failed
    }

    /// Close and release every sink
    pub fn close_all(&mut self) {
        for mut sink in self.sinks.drain(..) {
            if let Err(e) = sink.close() {
                log::warn!("{:?} sink close failed: {}", sink.kind(), e);
            } else {
                log::debug!("{:?} sink closed", sink.kind());
            }
        }
    }
}

impl Drop for SinkRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
