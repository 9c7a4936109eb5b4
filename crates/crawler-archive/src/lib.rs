//! Writes fetched pages as gzip-compressed WARC/1.0 `response` records,
//! rotating to a new file every `pages_per_file` records.
//!
//! Each record is its own gzip member, appended to the current file — the
//! same multi-member layout `warcio` produces, so any standard WARC reader
//! can decompress and frame the records independently.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flate2::write::GzEncoder;
use flate2::Compression;

use crawler_core::{CrawlError, FetchResponse};

struct WriterState {
    file: File,
    file_num: u64,
    count: usize,
}

pub struct ArchiveWriter {
    data_dir: PathBuf,
    base_name: String,
    pages_per_file: usize,
    state: Mutex<WriterState>,
}

impl ArchiveWriter {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        base_name: impl Into<String>,
        pages_per_file: usize,
    ) -> Result<Self, CrawlError> {
        if pages_per_file == 0 {
            return Err(CrawlError::Archive(
                "pages_per_file must be greater than 0".to_string(),
            ));
        }
        let data_dir = data_dir.into();
        let base_name = base_name.into();
        std::fs::create_dir_all(&data_dir).map_err(|e| CrawlError::Archive(e.to_string()))?;
        let file = open_numbered_file(&data_dir, &base_name, 1)?;
        Ok(Self {
            data_dir,
            base_name,
            pages_per_file,
            state: Mutex::new(WriterState {
                file,
                file_num: 1,
                count: 0,
            }),
        })
    }

    /// Appends one response as a WARC record, rotating to the next file
    /// first if the current one is full.
    pub fn write(&self, resp: &FetchResponse) -> Result<(), CrawlError> {
        let mut state = self.state.lock().unwrap();
        if state.count >= self.pages_per_file {
            state.file_num += 1;
            state.file = open_numbered_file(&self.data_dir, &self.base_name, state.file_num)?;
            state.count = 0;
        }

        let record = build_warc_record(resp);
        let mut encoder = GzEncoder::new(&mut state.file, Compression::default());
        encoder
            .write_all(&record)
            .map_err(|e| CrawlError::Archive(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CrawlError::Archive(e.to_string()))?;
        state.count += 1;
        Ok(())
    }

    /// Flushes the current file. Safe to call more than once.
    pub fn close(&self) -> Result<(), CrawlError> {
        let mut state = self.state.lock().unwrap();
        state
            .file
            .flush()
            .map_err(|e| CrawlError::Archive(e.to_string()))
    }
}

fn open_numbered_file(dir: &Path, base: &str, n: u64) -> Result<File, CrawlError> {
    let path = dir.join(format!("{base}-{n}.warc.gz"));
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| CrawlError::Archive(e.to_string()))
}

fn build_warc_record(resp: &FetchResponse) -> Vec<u8> {
    let record_id = format!("<urn:uuid:{}>", uuid::Uuid::new_v4());
    let date = resp
        .fetched_at
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let mut http_block = Vec::new();
    http_block.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            resp.status,
            status_reason(resp.status)
        )
        .as_bytes(),
    );
    for (k, v) in &resp.headers {
        http_block.extend_from_slice(format!("{k}: {v}\r\n").as_bytes());
    }
    http_block.extend_from_slice(b"\r\n");
    http_block.extend_from_slice(&resp.body);

    let mut record = Vec::new();
    record.extend_from_slice(b"WARC/1.0\r\n");
    record.extend_from_slice(b"WARC-Type: response\r\n");
    record.extend_from_slice(format!("WARC-Target-URI: {}\r\n", resp.url).as_bytes());
    record.extend_from_slice(format!("WARC-Date: {date}\r\n").as_bytes());
    record.extend_from_slice(format!("WARC-Record-ID: {record_id}\r\n").as_bytes());
    record.extend_from_slice(b"Content-Type: application/http; msgtype=response\r\n");
    record.extend_from_slice(format!("Content-Length: {}\r\n", http_block.len()).as_bytes());
    record.extend_from_slice(b"\r\n");
    record.extend_from_slice(&http_block);
    record.extend_from_slice(b"\r\n\r\n");
    record
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
