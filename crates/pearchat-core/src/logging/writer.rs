//! Append-only JSONL file per participant

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::entry::LogEntry;

/// Appends [`LogEntry`] lines to `<dir>/raw/<date>_<participant>.jsonl`.
pub struct ParticipantLogWriter {
    participant: String,
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl ParticipantLogWriter {
    /// Open (or create) today's file for `participant` under `logs_dir`.
    pub fn new(logs_dir: impl AsRef<Path>, participant: impl Into<String>) -> std::io::Result<Self> {
        let participant = participant.into();
        let raw_dir = logs_dir.as_ref().join("raw");
        fs::create_dir_all(&raw_dir)?;

        let date = chrono::Local::now().format("%Y-%m-%d");
        let path = raw_dir.join(format!("{}_{}.jsonl", date, file_safe(&participant)));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            participant,
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a single line and flush.
    pub fn write(&self, entry: &LogEntry) -> std::io::Result<()> {
        let line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()
    }
}

impl Drop for ParticipantLogWriter {
    fn drop(&mut self) {
        let _ = self.writer.lock().flush();
    }
}

/// Read every parseable entry of one JSONL file. Bad lines are skipped.
pub fn read_entries(path: impl AsRef<Path>) -> std::io::Result<Vec<LogEntry>> {
    let file = File::open(path)?;
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if let Ok(entry) = serde_json::from_str(&line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Participant names end up in file names.
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
