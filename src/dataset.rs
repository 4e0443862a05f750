//! Line-oriented dataset helpers. No quoting or escaping: a field may not
//! contain the separator.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::error::{Error, Result};

pub const FIELD_SEPARATOR: char = ',';

pub fn split_fields(row: &str) -> Vec<&str> {
    row.split(FIELD_SEPARATOR).collect()
}

pub fn join_fields<S: AsRef<str>>(fields: &[S]) -> String {
    let mut out = String::new();
    for (i, f) in fields.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEPARATOR);
        }
        out.push_str(f.as_ref());
    }
    out
}

pub fn header_columns(header: &str) -> Vec<String> {
    split_fields(header).into_iter().map(str::to_string).collect()
}

pub fn open_lines(path: &Path) -> Result<Lines<BufReader<File>>> {
    let file = File::open(path).map_err(|e| {
        Error::io(format!("failed to open '{}'", path.to_string_lossy()), e)
    })?;
    Ok(BufReader::new(file).lines())
}

pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let display = path.to_string_lossy().to_string();
    open_lines(path)?
        .map(|l| l.map_err(|e| Error::io(format!("failed to read '{display}'"), e)))
        .collect()
}

/// Data rows only; the header is not counted.
pub fn count_data_rows(path: &Path) -> Result<usize> {
    let display = path.to_string_lossy().to_string();
    let mut n = 0usize;
    for line in open_lines(path)? {
        line.map_err(|e| Error::io(format!("failed to read '{display}'"), e))?;
        n += 1;
    }
    Ok(n.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn split_and_join_are_inverse() {
        let row = "1,2.5,,tcp,normal";
        let fields = split_fields(row);
        assert_eq!(fields, vec!["1", "2.5", "", "tcp", "normal"]);
        assert_eq!(join_fields(&fields), row);
    }

    #[test]
    fn row_without_separator_is_one_field() {
        assert_eq!(split_fields("lonely"), vec!["lonely"]);
        assert_eq!(split_fields(""), vec![""]);
    }

    #[test]
    fn counts_exclude_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        fs::write(&path, "a,b\n1,2\n3,4\n").unwrap();
        assert_eq!(count_data_rows(&path).unwrap(), 2);
        fs::write(&path, "").unwrap();
        assert_eq!(count_data_rows(&path).unwrap(), 0);
        fs::write(&path, "a,b\r\n1,2\r\n").unwrap();
        assert_eq!(read_lines(&path).unwrap(), vec!["a,b", "1,2"]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_lines(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
