//! Line-oriented file sources.
//!
//! Every non-empty line of the file is one event. Without `follow` the
//! stream ends at end of file; with it the file is polled for appended lines
//! until the stream is dropped. A partial line at end of file is held back
//! until its newline arrives.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use eventgate_gateway::{EventStream, SourceError, SourceExecutor};

use crate::config::{SourceConfig, validate_config};

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub follow: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl SourceConfig for FileConfig {
    const SOURCE_TYPE: &'static str = "file";

    fn check(&self) -> Result<(), String> {
        if self.path.is_empty() {
            return Err("path must be specified".to_owned());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll interval must be positive".to_owned());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FileExecutor;

#[async_trait]
impl SourceExecutor for FileExecutor {
    fn source_type(&self) -> &str {
        FileConfig::SOURCE_TYPE
    }

    async fn validate(&self, raw_config: &str) -> Result<(), SourceError> {
        validate_config::<FileConfig>(raw_config).map(|_| ())
    }

    async fn start(&self, raw_config: &str) -> Result<EventStream, SourceError> {
        let config = validate_config::<FileConfig>(raw_config)?;
        let path = PathBuf::from(&config.path);
        let file = File::open(&path).await.map_err(|e| {
            SourceError::Connection(format!("failed to open {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), follow = config.follow, "file source started");

        let tail = LineTail {
            reader: BufReader::new(file),
            path,
            partial: Vec::new(),
            follow: config.follow,
            poll: Duration::from_millis(config.poll_interval_ms),
            done: false,
        };
        let events = stream::unfold(tail, |mut tail| async move {
            let item = tail.next_line().await?;
            Some((item, tail))
        });
        Ok(events.boxed())
    }
}

struct LineTail {
    reader: BufReader<File>,
    path: PathBuf,
    /// Incomplete line read at end of file.
    partial: Vec<u8>,
    follow: bool,
    poll: Duration,
    done: bool,
}

impl LineTail {
    async fn next_line(&mut self) -> Option<Result<Bytes, SourceError>> {
        let mut buf = Vec::new();
        while !self.done {
            buf.clear();
            match self.reader.read_until(b'\n', &mut buf).await {
                Ok(0) if self.follow => tokio::time::sleep(self.poll).await,
                Ok(0) => {
                    self.done = true;
                    let rest = std::mem::take(&mut self.partial);
                    if !is_blank(&rest) {
                        return Some(Ok(Bytes::from(rest)));
                    }
                }
                Ok(_) if buf.ends_with(b"\n") => {
                    let mut line = std::mem::take(&mut self.partial);
                    line.extend_from_slice(trim_line_end(&buf));
                    if !is_blank(&line) {
                        return Some(Ok(Bytes::from(line)));
                    }
                }
                Ok(_) => self.partial.extend_from_slice(&buf),
                Err(e) => {
                    self.done = true;
                    return Some(Err(SourceError::Stream(format!(
                        "failed to read {}: {e}",
                        self.path.display()
                    ))));
                }
            }
        }
        None
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
