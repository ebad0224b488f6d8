//! Parquet dataset shards: directory listing and row decoding.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow_array::cast::AsArray;
use arrow_array::RecordBatch;
use arrow_schema::ArrowError;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ProjectionMask;
use parquet::errors::ParquetError;
use thiserror::Error;

const TITLE_COLUMN: &str = "title";
const URL_COLUMN: &str = "url";
const TEXT_COLUMN: &str = "text";
const READ_BATCH_ROWS: usize = 256;

/// One article row from a dataset shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Article title.
    pub title: String,
    /// Canonical article URL.
    pub url: String,
    /// Plain article text.
    pub text: String,
}

/// Errors raised while reading dataset shards.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Filesystem access failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// File is not valid parquet.
    #[error("invalid parquet file: {0}")]
    Parquet(#[from] ParquetError),
    /// Decoding a record batch failed.
    #[error("failed to decode record batch: {0}")]
    Arrow(#[from] ArrowError),
    /// Required column is absent from the shard.
    #[error("dataset is missing the `{0}` column")]
    MissingColumn(&'static str),
    /// Column exists but is not a string column.
    #[error("column `{column}` has type {data_type}, expected a string column")]
    ColumnType {
        /// Column name.
        column: &'static str,
        /// Arrow type found instead.
        data_type: String,
    },
}

/// Lists `*.parquet` files directly inside `dir`, sorted by file name.
pub fn parquet_files(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let io_err = |source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_parquet = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
        if is_parquet && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Streams [`Document`] rows out of a parquet shard.
pub struct DocumentReader {
    batches: ParquetRecordBatchReader,
    pending: std::vec::IntoIter<Document>,
}

impl DocumentReader {
    /// Opens a shard, reading at most `max_rows` rows when set.
    pub fn open(path: &Path, max_rows: Option<usize>) -> Result<Self, DatasetError> {
        let file = File::open(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let projection = ProjectionMask::columns(
            builder.parquet_schema(),
            [TITLE_COLUMN, URL_COLUMN, TEXT_COLUMN],
        );
        let mut builder = builder
            .with_projection(projection)
            .with_batch_size(READ_BATCH_ROWS);
        if let Some(limit) = max_rows {
            builder = builder.with_limit(limit);
        }
        Ok(Self {
            batches: builder.build()?,
            pending: Vec::new().into_iter(),
        })
    }
}

impl Iterator for DocumentReader {
    type Item = Result<Document, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.pending.next() {
                return Some(Ok(doc));
            }
            let batch = match self.batches.next()? {
                Ok(batch) => batch,
                Err(err) => return Some(Err(err.into())),
            };
            match decode_batch(&batch) {
                Ok(docs) => self.pending = docs.into_iter(),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

fn decode_batch(batch: &RecordBatch) -> Result<Vec<Document>, DatasetError> {
    let titles = string_column(batch, TITLE_COLUMN)?;
    let urls = string_column(batch, URL_COLUMN)?;
    let texts = string_column(batch, TEXT_COLUMN)?;
    Ok(titles
        .into_iter()
        .zip(urls)
        .zip(texts)
        .map(|((title, url), text)| Document { title, url, text })
        .collect())
}

fn string_column(batch: &RecordBatch, name: &'static str) -> Result<Vec<String>, DatasetError> {
    let column = batch
        .column_by_name(name)
        .ok_or(DatasetError::MissingColumn(name))?;
    // nulls decode as empty strings
    if let Some(values) = column.as_string_opt::<i32>() {
        return Ok(values
            .iter()
            .map(|value| value.unwrap_or_default().to_string())
            .collect());
    }
    if let Some(values) = column.as_string_opt::<i64>() {
        return Ok(values
            .iter()
            .map(|value| value.unwrap_or_default().to_string())
            .collect());
    }
    Err(DatasetError::ColumnType {
        column: name,
        data_type: column.data_type().to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use arrow_array::{ArrayRef, Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use parquet::arrow::ArrowWriter;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    pub(crate) fn write_shard(path: &Path, rows: &[(&str, &str, &str)]) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new(URL_COLUMN, DataType::Utf8, true),
            Field::new(TITLE_COLUMN, DataType::Utf8, true),
            Field::new(TEXT_COLUMN, DataType::Utf8, true),
        ]));
        let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(0..rows.len() as i64));
        let urls: ArrayRef = Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.1)));
        let titles: ArrayRef = Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0)));
        let texts: ArrayRef = Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.2)));
        let batch = RecordBatch::try_new(schema.clone(), vec![ids, urls, titles, texts])
            .expect("record batch");
        let file = File::create(path).expect("create shard");
        let mut writer = ArrowWriter::try_new(file, schema, None).expect("writer");
        writer.write(&batch).expect("write batch");
        writer.close().expect("close writer");
    }

    #[test]
    fn reads_rows_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("train-0.parquet");
        write_shard(
            &path,
            &[
                ("Sky", "https://en.wikipedia.org/wiki/Sky", "The sky is blue."),
                ("Grass", "https://en.wikipedia.org/wiki/Grass", "Grass is green."),
            ],
        );

        let docs = DocumentReader::open(&path, None)
            .expect("open")
            .collect::<Result<Vec<_>, _>>()
            .expect("decode");
        assert_eq!(
            docs,
            vec![
                Document {
                    title: "Sky".into(),
                    url: "https://en.wikipedia.org/wiki/Sky".into(),
                    text: "The sky is blue.".into(),
                },
                Document {
                    title: "Grass".into(),
                    url: "https://en.wikipedia.org/wiki/Grass".into(),
                    text: "Grass is green.".into(),
                },
            ]
        );
    }

    #[test]
    fn row_cap_limits_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("train-0.parquet");
        let rows: Vec<(String, String, String)> = (0..25)
            .map(|i| (format!("T{i}"), format!("https://x.test/{i}"), format!("body {i}")))
            .collect();
        let borrowed: Vec<(&str, &str, &str)> = rows
            .iter()
            .map(|(a, b, c)| (a.as_str(), b.as_str(), c.as_str()))
            .collect();
        write_shard(&path, &borrowed);

        let docs: Vec<_> = DocumentReader::open(&path, Some(10))
            .expect("open")
            .map(|doc| doc.expect("decode").title)
            .collect();
        assert_eq!(docs.len(), 10);
        assert_eq!(docs.first().map(String::as_str), Some("T0"));
        assert_eq!(docs.last().map(String::as_str), Some("T9"));
    }

    #[test]
    fn lists_only_parquet_files_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.parquet", "a.parquet", "notes.txt", "c.parquet.part"] {
            fs::write(dir.path().join(name), b"").expect("touch");
        }
        let names: Vec<_> = parquet_files(dir.path())
            .expect("list")
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.parquet", "b.parquet"]);
    }
}
