use super::dataset::{count_records, DatasetError};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

/// Resume position derived from the output dataset alone.
///
/// Output rows are appended in input order and never removed, so the number of data rows
/// already written is exactly the number of leading input rows to skip.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    output_path: PathBuf,
}

impl CheckpointTracker {
    pub fn new<P: AsRef<Path>>(output_path: P) -> Self {
        Self {
            output_path: output_path.as_ref().to_path_buf(),
        }
    }

    /// Data rows present in the output, header excluded. Zero if it does not exist yet.
    pub fn count_processed(&self) -> Result<usize, DatasetError> {
        let path = &self.output_path;
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(DatasetError::Io {
                    path: path.clone(),
                    source: e,
                })
            }
        };
        let records = count_records(path, BufReader::new(file))?;
        Ok(records.saturating_sub(1))
    }
}
