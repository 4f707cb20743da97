//! Splitting a local NDJSON blob into one file per record date.
//!
//! Every input line lands in exactly one output file. Lines that are not a
//! JSON object with a usable string `date` go to the [`SENTINEL_DATE`]
//! partition instead of being dropped.

use serde_json::{Map, Value};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{OpenSnafu, PartitionError, ReadSnafu, WriteSnafu};

/// Date assigned to records without a usable `date` field.
pub const SENTINEL_DATE: &str = "0000-00-00";

/// One per-date output file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Partition {
    pub date: String,
    pub path: PathBuf,
}

/// Result of splitting a blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitResult {
    /// Partitions sorted by date.
    pub partitions: Vec<Partition>,
    /// Number of lines read from the source.
    pub lines: u64,
}

/// Extract the partition date of one raw line.
///
/// The line must be a JSON object whose `date` member is a string that is
/// safe to append to a file name.
pub fn record_date(line: &[u8]) -> Cow<'_, str> {
    let Ok(record) = serde_json::from_slice::<Map<String, Value>>(line) else {
        return Cow::Borrowed(SENTINEL_DATE);
    };
    match record.get("date").and_then(Value::as_str) {
        Some(date) if is_path_safe(date) => Cow::Owned(date.to_string()),
        _ => Cow::Borrowed(SENTINEL_DATE),
    }
}

/// A date becomes the suffix of `<source>.<date>`; a separator or NUL would
/// leave the work directory or break the file name.
fn is_path_safe(date: &str) -> bool {
    !matches!(date, "." | "..") && !date.contains(['/', '\\', '\0'])
}

/// `<source>.<date>`
pub fn partition_path(source: &Path, date: &str) -> PathBuf {
    let mut path = source.as_os_str().to_os_string();
    path.push(".");
    path.push(date);
    PathBuf::from(path)
}

/// Open per-date writers for one split.
struct PartitionWriters<'a> {
    source: &'a Path,
    writers: BTreeMap<String, (PathBuf, BufWriter<File>)>,
}

impl<'a> PartitionWriters<'a> {
    fn new(source: &'a Path) -> Self {
        Self {
            source,
            writers: BTreeMap::new(),
        }
    }

    fn write_line(&mut self, date: &str, line: &[u8]) -> Result<(), PartitionError> {
        let (path, writer) = match self.writers.entry(date.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = partition_path(self.source, date);
                let file = File::create(&path).context(WriteSnafu { path: &path })?;
                entry.insert((path, BufWriter::new(file)))
            }
        };
        writer.write_all(line).context(WriteSnafu { path: &*path })
    }

    /// Flush and close every writer, returning the partitions.
    ///
    /// All writers are closed even if one of them fails; the first failure
    /// is returned.
    fn close(self) -> Result<Vec<Partition>, PartitionError> {
        let mut partitions = Vec::with_capacity(self.writers.len());
        let mut first_error = None;

        for (date, (path, writer)) in self.writers {
            let closed = writer.into_inner().map(drop).map_err(|e| e.into_error());
            if let Err(source) = closed {
                first_error.get_or_insert(PartitionError::Write {
                    path: path.clone(),
                    source,
                });
            }
            partitions.push(Partition { date, path });
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(partitions),
        }
    }
}

/// Split `source` into one file per record date.
///
/// Lines are copied byte for byte, terminator included, preserving their
/// order within each date.
pub fn split_by_date(source: &Path) -> Result<SplitResult, PartitionError> {
    let file = File::open(source).context(OpenSnafu { path: source })?;
    let mut reader = BufReader::new(file);
    let mut writers = PartitionWriters::new(source);

    let scanned = scan(&mut reader, source, &mut writers);
    // Writers are closed on every path, including a failed scan.
    let closed = writers.close();

    let lines = scanned?;
    let partitions = closed?;
    Ok(SplitResult { partitions, lines })
}

fn scan(
    reader: &mut impl BufRead,
    source: &Path,
    writers: &mut PartitionWriters<'_>,
) -> Result<u64, PartitionError> {
    let mut line = Vec::new();
    let mut lines = 0;

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .context(ReadSnafu { path: source })?;
        if read == 0 {
            break;
        }
        lines += 1;
        writers.write_line(&record_date(&line), &line)?;
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn write_source(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("p.x.log");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .split_inclusive('\n')
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_record_date() {
        assert_eq!(record_date(br#"{"date": "2023-01-01", "x": 1}"#), "2023-01-01");
        assert_eq!(record_date(b"{\"date\":\"2023-01-02\"}\n"), "2023-01-02");
        assert_eq!(record_date(b"not json\n"), SENTINEL_DATE);
        assert_eq!(record_date(br#"{"day": "2023-01-01"}"#), SENTINEL_DATE);
        assert_eq!(record_date(br#"{"date": 20230101}"#), SENTINEL_DATE);
        assert_eq!(record_date(br#"["2023-01-01"]"#), SENTINEL_DATE);
        assert_eq!(record_date(b"\n"), SENTINEL_DATE);
    }

    #[test]
    fn test_record_date_rejects_unsafe_values() {
        assert_eq!(record_date(br#"{"date": "../../etc"}"#), SENTINEL_DATE);
        assert_eq!(record_date(br#"{"date": "2023/01/01"}"#), SENTINEL_DATE);
        assert_eq!(record_date(br#"{"date": ".."}"#), SENTINEL_DATE);
        assert_eq!(record_date(br#"{"date": "."}"#), SENTINEL_DATE);
        assert_eq!(record_date(br#"{"date": "a\u0000b"}"#), SENTINEL_DATE);
    }

    #[test]
    fn test_record_date_keeps_other_string_dates() {
        assert_eq!(
            record_date(br#"{"date": "2023-01-05T10:00:00Z"}"#),
            "2023-01-05T10:00:00Z"
        );
        assert_eq!(record_date(br#"{"date": "2023-1-5"}"#), "2023-1-5");
        assert_eq!(record_date(br#"{"date": "20230105"}"#), "20230105");
        assert_eq!(record_date(br#"{"date": "2023\u002d01-05"}"#), "2023-01-05");
    }

    #[test]
    fn test_array_records_go_to_sentinel() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "[\"2023-01-01\"]\n[\"2023-01-02\", 5]\n");

        let result = split_by_date(&source).unwrap();
        let dates: Vec<&str> = result.partitions.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, vec![SENTINEL_DATE]);
        assert_eq!(read_lines(&result.partitions[0].path).len(), 2);
    }

    #[test]
    fn test_writers_flushed_when_scan_fails() {
        let dir = TempDir::new().unwrap();
        let source = write_source(
            &dir,
            "{\"date\": \"2023-01-01\"}\n{\"date\": \"2023-01-02\"}\n",
        );
        // A directory in the way makes the second partition uncreatable.
        std::fs::create_dir(partition_path(&source, "2023-01-02")).unwrap();

        let err = split_by_date(&source).unwrap_err();

        assert!(matches!(err, PartitionError::Write { .. }));
        assert_eq!(
            std::fs::read_to_string(partition_path(&source, "2023-01-01")).unwrap(),
            "{\"date\": \"2023-01-01\"}\n"
        );
    }

    #[test]
    fn test_partition_path() {
        assert_eq!(
            partition_path(Path::new("/tmp/p.x.log"), "2023-01-01"),
            PathBuf::from("/tmp/p.x.log.2023-01-01")
        );
    }

    #[test]
    fn test_split_by_date() {
        let dir = TempDir::new().unwrap();
        let source = write_source(
            &dir,
            "{\"date\": \"2023-01-01\", \"n\": 1}\n\
             {\"date\": \"2023-01-01\", \"n\": 2}\n\
             {\"date\": \"2023-01-02\", \"n\": 3}\n",
        );

        let result = split_by_date(&source).unwrap();
        assert_eq!(result.lines, 3);
        assert_eq!(result.partitions.len(), 2);

        let first = &result.partitions[0];
        assert_eq!(first.date, "2023-01-01");
        assert_eq!(first.path, partition_path(&source, "2023-01-01"));
        assert_eq!(
            read_lines(&first.path),
            vec![
                "{\"date\": \"2023-01-01\", \"n\": 1}\n",
                "{\"date\": \"2023-01-01\", \"n\": 2}\n",
            ]
        );

        let second = &result.partitions[1];
        assert_eq!(second.date, "2023-01-02");
        assert_eq!(
            read_lines(&second.path),
            vec!["{\"date\": \"2023-01-02\", \"n\": 3}\n"]
        );
    }

    #[test]
    fn test_partition_completeness() {
        let dir = TempDir::new().unwrap();
        let input = "{\"date\": \"2023-03-01\"}\n\
                     garbage\n\
                     {\"date\": \"2023-03-02\"}\n\
                     {\"other\": true}\n\
                     {\"date\": \"2023-03-01\"}\n\
                     \n\
                     {\"date\": \"2023-03-03\"}";
        let source = write_source(&dir, input);

        let result = split_by_date(&source).unwrap();

        let mut expected: HashMap<String, usize> = HashMap::new();
        for line in input.split_inclusive('\n') {
            *expected.entry(line.to_string()).or_default() += 1;
        }

        let mut actual: HashMap<String, usize> = HashMap::new();
        for partition in &result.partitions {
            for line in read_lines(&partition.path) {
                *actual.entry(line).or_default() += 1;
            }
        }

        assert_eq!(actual, expected);
        assert_eq!(result.lines, 7);

        let dates: Vec<&str> = result.partitions.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(
            dates,
            vec![SENTINEL_DATE, "2023-03-01", "2023-03-02", "2023-03-03"]
        );
    }

    #[test]
    fn test_sentinel_routing() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "oops\n{\"name\": \"no date\"}\n");

        let result = split_by_date(&source).unwrap();
        assert_eq!(result.partitions.len(), 1);
        assert_eq!(result.partitions[0].date, SENTINEL_DATE);
        assert_eq!(
            read_lines(&result.partitions[0].path),
            vec!["oops\n", "{\"name\": \"no date\"}\n"]
        );
    }

    #[test]
    fn test_last_line_without_terminator_kept_verbatim() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "{\"date\": \"2023-01-01\"}");

        let result = split_by_date(&source).unwrap();
        assert_eq!(
            std::fs::read(&result.partitions[0].path).unwrap(),
            b"{\"date\": \"2023-01-01\"}"
        );
    }

    #[test]
    fn test_non_utf8_line_goes_to_sentinel() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("binary.log");
        std::fs::write(&source, b"\xff\xfe\n{\"date\": \"2023-01-01\"}\n").unwrap();

        let result = split_by_date(&source).unwrap();
        assert_eq!(result.partitions.len(), 2);
        assert_eq!(
            std::fs::read(partition_path(&source, SENTINEL_DATE)).unwrap(),
            b"\xff\xfe\n"
        );
    }

    #[test]
    fn test_empty_source_has_no_partitions() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "");

        let result = split_by_date(&source).unwrap();
        assert!(result.partitions.is_empty());
        assert_eq!(result.lines, 0);
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = split_by_date(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, PartitionError::Open { .. }));
    }
}
