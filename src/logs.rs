use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::{HaplotagError, Result};

/// Builds `<out_dir>/<prefix>_<name>`, or `<out_dir>/<name>` without a prefix.
pub fn log_path(out_dir: &Path, prefix: Option<&str>, name: &str) -> PathBuf {
    match prefix {
        Some(prefix) if !prefix.is_empty() => out_dir.join(format!("{}_{}", prefix, name)),
        _ => out_dir.join(name),
    }
}

/// A tab-delimited log file. Any write failure names the file.
pub struct LogFile {
    path: PathBuf,
    out: BufWriter<File>,
}

impl LogFile {
    /// Creates (or truncates) the file and writes its header line.
    pub fn create(path: PathBuf, header: &str) -> Result<Self> {
        let file = File::create(&path).map_err(|source| HaplotagError::Open {
            path: path.clone(),
            source,
        })?;
        let mut log = LogFile {
            path,
            out: BufWriter::new(file),
        };
        writeln!(log, "{}", header)?;
        Ok(log)
    }

    fn failed(&self, source: std::io::Error) -> HaplotagError {
        HaplotagError::LogWrite {
            path: self.path.clone(),
            source,
        }
    }

    /// Lets `write!`/`writeln!` target the log directly.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        self.out.write_fmt(args).map_err(|e| self.failed(e))
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes).map_err(|e| self.failed(e))
    }

    /// Writes `line` followed by a newline.
    pub fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.write_bytes(line)?;
        self.write_bytes(b"\n")
    }

    pub fn finish(mut self) -> Result<PathBuf> {
        self.out.flush().map_err(|e| self.failed(e))?;
        Ok(self.path)
    }
}
