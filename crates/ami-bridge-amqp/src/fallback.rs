//! Fallback event log
//!
//! One append-only file per day, `YYYY-MM-DD_events.log`, holding one JSON event per
//! line. The date is fixed when the log is opened.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

/// Date-stamped append-only event log
#[derive(Debug)]
pub struct FallbackLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FallbackLog {
    /// File name used for events logged on `date`
    pub fn file_name(date: NaiveDate) -> String {
        format!("{}_events.log", date.format("%Y-%m-%d"))
    }

    /// Open (or create) today's log in `dir`, using local time
    pub async fn open(dir: &Path) -> io::Result<Self> {
        Self::open_for_date(dir, Local::now().date_naive()).await
    }

    pub async fn open_for_date(dir: &Path, date: NaiveDate) -> io::Result<Self> {
        let path = dir.join(Self::file_name(date));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        info!("Fallback event log opened at {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line; fails once the log is closed
    pub async fn append(&self, line: &str) -> io::Result<()> {
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "fallback log is closed"))?;

        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');
        file.write_all(record.as_bytes()).await?;
        file.flush().await
    }

    /// Flush and release the file; closing twice is a no-op
    pub async fn close(&self) -> io::Result<()> {
        match self.file.lock().await.take() {
            Some(mut file) => {
                file.flush().await?;
                file.sync_all().await
            }
            None => Ok(()),
        }
    }

    pub async fn is_open(&self) -> bool {
        self.file.lock().await.is_some()
    }
}
