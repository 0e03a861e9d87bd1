//! JSONL conversation sink.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ExtractError;
use crate::model::Conversation;

/// Default directory for extraction output, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "extracted_data";

/// `<dir>/conversations_<YYYYmmdd_HHMMSS>.jsonl` stamped with local time.
pub fn default_output_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("conversations_{stamp}.jsonl"))
}

/// Writes one compact JSON object per line.
///
/// `target` only labels errors; it is `-` when streaming to stdout.
pub struct JsonlWriter<W: Write> {
    inner: W,
    target: PathBuf,
}

impl JsonlWriter<BufWriter<File>> {
    /// Create the file (and its parent directories).
    pub fn create(path: &Path) -> Result<Self, ExtractError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| output_error(path, e))?;
        }
        let file = File::create(path).map_err(|e| output_error(path, e))?;
        debug!(path = %path.display(), "opened output file");
        Ok(Self::new(BufWriter::new(file), path))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(inner: W, target: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            target: target.into(),
        }
    }

    pub fn write(&mut self, conversation: &Conversation) -> Result<(), ExtractError> {
        serde_json::to_writer(&mut self.inner, conversation)
            .map_err(|e| output_error(&self.target, e))?;
        self.inner
            .write_all(b"\n")
            .map_err(|e| output_error(&self.target, e))?;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, ExtractError> {
        self.inner
            .flush()
            .map_err(|e| output_error(&self.target, e))?;
        Ok(self.inner)
    }
}

fn output_error(path: &Path, err: impl std::fmt::Display) -> ExtractError {
    ExtractError::OutputError {
        path: path.to_path_buf(),
        detail: err.to_string(),
    }
}
