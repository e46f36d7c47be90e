//! Append-only line output for discovered open ports, optionally gzip-compressed.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use sweeper_core::ScanError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub compress: bool,
}

enum Writer {
    Plain(BufWriter<File>),
    Gzip(BufWriter<GzEncoder<File>>),
}

/// An open output file. Every open appends; with compression each open adds one gzip member.
pub struct ResultSink {
    path: PathBuf,
    writer: Writer,
}

impl ResultSink {
    pub fn open(cfg: &OutputConfig) -> Result<Self, ScanError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.path)
            .map_err(|e| ScanError::persistence(format!("failed to open output file {}", cfg.path.display()), e))?;
        let writer = if cfg.compress {
            Writer::Gzip(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            Writer::Plain(BufWriter::new(file))
        };
        Ok(ResultSink { path: cfg.path.clone(), writer })
    }

    pub fn write_line(&mut self, line: &str) -> Result<(), ScanError> {
        let res = match &mut self.writer {
            Writer::Plain(w) => writeln!(w, "{line}"),
            Writer::Gzip(w) => writeln!(w, "{line}"),
        };
        res.map_err(|e| self.error("failed to write to output file", e))
    }

    pub fn flush(&mut self) -> Result<(), ScanError> {
        let res = match &mut self.writer {
            Writer::Plain(w) => w.flush(),
            Writer::Gzip(w) => w.flush(),
        };
        res.map_err(|e| self.error("failed to flush output file", e))
    }

    /// Flush everything and, when compressing, write the gzip trailer.
    pub fn finish(self) -> Result<(), ScanError> {
        let path = self.path;
        let fail = |e: std::io::Error| ScanError::persistence(format!("failed to finish output file {}", path.display()), e);
        match self.writer {
            Writer::Plain(mut w) => w.flush().map_err(fail),
            Writer::Gzip(w) => {
                let encoder = w.into_inner().map_err(|e| fail(e.into_error()))?;
                let mut file = encoder.finish().map_err(fail)?;
                file.flush().map_err(fail)
            }
        }
    }

    fn error(&self, what: &str, e: std::io::Error) -> ScanError {
        ScanError::persistence(format!("{what} {}", self.path.display()), e)
    }
}
