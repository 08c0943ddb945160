//! Delimited input and output datasets.
//!
//! Input bytes that do not decode under the configured encoding are replaced, never fatal.
//! The output is only ever appended to; its header is written once, when the file holds no
//! records yet.

use super::record::{InputRecord, InputSchema, OutputRecord};
use crate::config::TextEncoding;
use encoding_rs::Encoding;
use std::{
    fs::{File, OpenOptions},
    io::{BufReader, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{}: required column `{column}` not found in header", .path.display())]
    MissingColumn { path: PathBuf, column: String },
}

impl DatasetError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        DatasetError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn decode_field(encoding: &'static Encoding, bytes: &[u8]) -> String {
    encoding.decode_without_bom_handling(bytes).0.into_owned()
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(false).flexible(true);
    builder
}

/// Streams input records in file order, after skipping already processed rows.
pub struct InputReader {
    path: PathBuf,
    reader: csv::Reader<BufReader<File>>,
    encoding: &'static Encoding,
    schema: Arc<InputSchema>,
    next_position: usize,
    record: csv::ByteRecord,
}

impl InputReader {
    pub fn open<P: AsRef<Path>>(
        path: P,
        encoding: &'static Encoding,
        skip: usize,
    ) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
        let mut reader = reader_builder().from_reader(BufReader::new(file));

        let mut header = csv::ByteRecord::new();
        reader
            .read_byte_record(&mut header)
            .map_err(|e| DatasetError::csv(path, e))?;
        let columns = header
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let field = if i == 0 && encoding == encoding_rs::UTF_8 {
                    field.strip_prefix(UTF8_BOM).unwrap_or(field)
                } else {
                    field
                };
                decode_field(encoding, field).trim().to_string()
            })
            .collect();

        let mut input = Self {
            path: path.to_path_buf(),
            reader,
            encoding,
            schema: Arc::new(InputSchema::new(columns)),
            next_position: 0,
            record: csv::ByteRecord::new(),
        };
        for _ in 0..skip {
            if !input.advance()? {
                break;
            }
        }
        Ok(input)
    }

    pub fn schema(&self) -> &Arc<InputSchema> {
        &self.schema
    }

    /// Position of the next record to be returned. Less than the requested skip when the
    /// input ran out first.
    pub fn position(&self) -> usize {
        self.next_position
    }

    pub fn require_column(&self, column: &str) -> Result<(), DatasetError> {
        if self.schema.contains(column) {
            Ok(())
        } else {
            Err(DatasetError::MissingColumn {
                path: self.path.clone(),
                column: column.to_string(),
            })
        }
    }

    /// Reads up to `size` records. An empty group means the input is exhausted.
    pub fn next_group(&mut self, size: usize) -> Result<Vec<InputRecord>, DatasetError> {
        let mut group = Vec::with_capacity(size);
        while group.len() < size {
            let position = self.next_position;
            if !self.advance()? {
                break;
            }
            let width = self.schema.columns().len();
            if self.record.len() > width {
                crate::warn!(
                    "Row {position} has {} fields but the header has {width}; extra fields dropped",
                    self.record.len()
                );
            }
            let values = self
                .record
                .iter()
                .map(|field| decode_field(self.encoding, field))
                .collect();
            group.push(InputRecord::new(position, Arc::clone(&self.schema), values));
        }
        Ok(group)
    }

    fn advance(&mut self) -> Result<bool, DatasetError> {
        let more = self
            .reader
            .read_byte_record(&mut self.record)
            .map_err(|e| DatasetError::csv(&self.path, e))?;
        if more {
            self.next_position += 1;
        }
        Ok(more)
    }
}

/// Number of data rows in a delimited file with a header. Used for progress only.
///
/// Records are split on ASCII delimiters before any decoding, so the count holds for every
/// ASCII-compatible input encoding.
pub fn count_data_rows<P: AsRef<Path>>(path: P) -> Result<usize, DatasetError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
    Ok(count_records(path, BufReader::new(file))?.saturating_sub(1))
}

/// Number of records, header included.
pub(crate) fn count_records<R: std::io::Read>(path: &Path, rdr: R) -> Result<usize, DatasetError> {
    let mut reader = reader_builder().from_reader(rdr);
    let mut record = csv::ByteRecord::new();
    let mut count = 0;
    while reader
        .read_byte_record(&mut record)
        .map_err(|e| DatasetError::csv(path, e))?
    {
        count += 1;
    }
    Ok(count)
}

pub struct OutputWriter {
    path: PathBuf,
    encoding: TextEncoding,
    /// Whether the output already holds a header, once known.
    has_header: Option<bool>,
}

impl OutputWriter {
    pub fn new<P: AsRef<Path>>(path: P, encoding: TextEncoding) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            encoding,
            has_header: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `rows` as one durable write. The BOM (for a zero-length file), the header
    /// (when the output has no records) and every row are serialized first and reach the
    /// file in a single `write_all`, followed by `sync_all`.
    pub fn append(&mut self, columns: &[String], rows: &[OutputRecord]) -> Result<(), DatasetError> {
        if rows.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
        }
        let has_header = match self.has_header {
            Some(has_header) => has_header,
            None => self.output_has_records()?,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DatasetError::io(&self.path, e))?;
        let is_empty = file
            .metadata()
            .map_err(|e| DatasetError::io(&self.path, e))?
            .len()
            == 0;

        let mut buffer = Vec::new();
        if is_empty && self.encoding == TextEncoding::Utf8Sig {
            buffer.extend_from_slice(UTF8_BOM);
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(buffer);
        if !has_header {
            writer
                .write_record(columns)
                .map_err(|e| DatasetError::csv(&self.path, e))?;
        }
        for row in rows {
            writer
                .write_record(row.to_row())
                .map_err(|e| DatasetError::csv(&self.path, e))?;
        }
        let buffer = writer
            .into_inner()
            .map_err(|e| DatasetError::io(&self.path, e.into_error()))?;

        file.write_all(&buffer)
            .map_err(|e| DatasetError::io(&self.path, e))?;
        file.sync_all()
            .map_err(|e| DatasetError::io(&self.path, e))?;
        self.has_header = Some(true);
        Ok(())
    }

    /// True when the output exists and holds at least one CSV record. A BOM alone, or
    /// blank lines, do not count.
    fn output_has_records(&self) -> Result<bool, DatasetError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(DatasetError::io(&self.path, e)),
        };
        let mut reader = reader_builder().from_reader(BufReader::new(file));
        let mut record = csv::ByteRecord::new();
        reader
            .read_byte_record(&mut record)
            .map_err(|e| DatasetError::csv(&self.path, e))
    }
}
