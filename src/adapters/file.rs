//! Line-oriented file reader and writer
//!
//! Both record byte offsets in the execution context, so a restarted step
//! resumes exactly after the last committed line. The writer also truncates the
//! file back to its committed length on rollback and on restart, which keeps
//! the output free of lines from uncommitted transactions.

use crate::adapters::traits::{ItemReader, ItemStream, ItemWriter};
use crate::domain::{BatchError, ExecutionContext, Result};
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, BufWriter};

/// Reads a text file line by line
///
/// Trailing `\n` and `\r\n` are stripped. A line that is not valid UTF-8 fails
/// with `BatchError::Read` and is consumed, so it can be skipped.
pub struct LineItemReader {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    offset: u64,
    line: usize,
    marked: (u64, usize),
    key: String,
}

impl LineItemReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reader: None,
            offset: 0,
            line: 0,
            marked: (0, 0),
            key: "line.reader".to_string(),
        }
    }

    /// Prefix of the context keys, for steps reading several files
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Lines read so far
    pub fn line(&self) -> usize {
        self.line
    }

    fn offset_key(&self) -> String {
        format!("{}.offset", self.key)
    }

    fn line_key(&self) -> String {
        format!("{}.line", self.key)
    }

    async fn seek_to(&mut self, offset: u64) -> Result<()> {
        let mut file = match self.reader.take() {
            Some(reader) => reader.into_inner(),
            None => File::open(&self.path).await.map_err(|e| {
                BatchError::Read(format!("Failed to open {}: {e}", self.path.display()))
            })?,
        };
        file.seek(SeekFrom::Start(offset)).await?;
        self.reader = Some(BufReader::new(file));
        self.offset = offset;
        Ok(())
    }
}

#[async_trait]
impl ItemStream for LineItemReader {
    async fn open(&mut self, context: &ExecutionContext) -> Result<()> {
        let offset = context.get_usize(&self.offset_key()).unwrap_or(0) as u64;
        self.line = context.get_usize(&self.line_key()).unwrap_or(0);
        self.reader = None;
        self.seek_to(offset).await?;
        self.marked = (self.offset, self.line);

        tracing::debug!(
            path = %self.path.display(),
            offset = self.offset,
            line = self.line,
            "Opened line reader"
        );
        Ok(())
    }

    async fn update(&mut self, context: &mut ExecutionContext) -> Result<()> {
        context.put_usize(self.offset_key(), self.offset as usize);
        context.put_usize(self.line_key(), self.line);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }

    async fn mark(&mut self) -> Result<()> {
        self.marked = (self.offset, self.line);
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        let (offset, line) = self.marked;
        self.seek_to(offset).await?;
        self.line = line;
        Ok(())
    }
}

#[async_trait]
impl ItemReader<String> for LineItemReader {
    async fn read(&mut self) -> Result<Option<String>> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(BatchError::Read("reader is not open".to_string()));
        };

        let mut buf = Vec::new();
        let n = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| BatchError::Read(format!("{}: {e}", self.path.display())))?;
        if n == 0 {
            return Ok(None);
        }
        self.offset += n as u64;
        self.line += 1;

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }

        String::from_utf8(buf).map(Some).map_err(|_| {
            BatchError::Read(format!(
                "{} line {} is not valid UTF-8",
                self.path.display(),
                self.line
            ))
        })
    }
}

/// Appends one line per item
///
/// Bytes written since the last commit are discarded by `reset`.
pub struct LineItemWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    position: u64,
    committed: u64,
    key: String,
}

impl LineItemWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            position: 0,
            committed: 0,
            key: "line.writer.offset".to_string(),
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| BatchError::Write("writer is not open".to_string()))
    }

    /// Cut the file back to `length` and continue writing there
    async fn truncate_to(&mut self, length: u64) -> Result<()> {
        let writer = self.writer()?;
        writer.flush().await?;
        let file = writer.get_mut();
        file.set_len(length).await?;
        file.seek(SeekFrom::Start(length)).await?;
        self.position = length;
        Ok(())
    }
}

#[async_trait]
impl ItemStream for LineItemWriter {
    async fn open(&mut self, context: &ExecutionContext) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .await
            .map_err(|e| {
                BatchError::Write(format!("Failed to open {}: {e}", self.path.display()))
            })?;
        self.writer = Some(BufWriter::new(file));

        let offset = context.get_usize(&self.key).unwrap_or(0) as u64;
        self.truncate_to(offset).await?;
        self.committed = offset;

        tracing::debug!(path = %self.path.display(), offset = offset, "Opened line writer");
        Ok(())
    }

    async fn update(&mut self, context: &mut ExecutionContext) -> Result<()> {
        let writer = self.writer()?;
        writer.flush().await?;
        writer.get_ref().sync_data().await?;
        context.put_usize(self.key.clone(), self.position as usize);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
        }
        Ok(())
    }

    async fn mark(&mut self) -> Result<()> {
        self.committed = self.position;
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        let committed = self.committed;
        self.truncate_to(committed).await
    }
}

#[async_trait]
impl<T: AsRef<str> + Send + Sync> ItemWriter<T> for LineItemWriter {
    async fn write(&mut self, items: &[T]) -> Result<()> {
        let writer = self.writer()?;
        let mut written = 0u64;
        for item in items {
            let line = item.as_ref();
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            written += line.len() as u64 + 1;
        }
        self.position += written;
        Ok(())
    }
}
