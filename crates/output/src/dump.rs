// Copyright 2025-2026 CEMAXECUTER LLC

use std::io::{self, Write};

use crate::{CaptureSink, FrameRecord, SinkKind};

/// Binary dump: raw device frames, back to back, no header
pub struct DumpWriter<W: Write> {
    writer: W,
}

impl<W: Write> DumpWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> CaptureSink for DumpWriter<W> {
    fn kind(&self) -> SinkKind {
        SinkKind::Dump
    }

    fn write(&mut self, rec: &FrameRecord<'_>) -> io::Result<()> {
        self.writer.write_all(rec.frame.as_bytes())?;
        self.writer.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
