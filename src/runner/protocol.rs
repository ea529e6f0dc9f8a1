//! Framed result table shared by the batch runner and the remote runner
//!
//! The remote runner writes a CSV table to stdout with every physical line
//! prefixed by [`FRAME_PREFIX`], so result rows can share the stream with
//! unrelated log lines. The host keeps only prefixed lines, strips the
//! prefix and parses what is left as CSV.

use std::io::{self, Write};

/// Marks lines that belong to the result table
pub const FRAME_PREFIX: &[u8] = b"# csv #- ";

/// Column order written by the remote runner
pub const HEADER: [&str; 8] = [
    "file",
    "line",
    "subject",
    "output",
    "oracle",
    "return code",
    "input",
    "has input",
];

/// `has input` cell for a row that carries a payload
const PRESENT: &[u8] = b"1";
const ABSENT: &[u8] = b"0";

/// One row of the result table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    /// Staged sample file name
    pub file: String,
    /// Command line as read from the sample file
    pub line: String,
    pub subject: String,
    pub output: Vec<u8>,
    /// Always written empty; verdicts are computed on the host
    pub oracle: String,
    pub return_code: i32,
    /// Piped payload; `None` when there was none to recover
    ///
    /// A CSV cell cannot tell empty from missing, so presence travels in the
    /// separate `has input` column.
    pub input: Option<Vec<u8>>,
}

/// Keep only framed lines, without their prefix
pub fn extract_frames(raw: &[u8]) -> Vec<u8> {
    let mut table = Vec::new();
    for line in raw.split(|b| *b == b'\n') {
        if let Some(rest) = line.strip_prefix(FRAME_PREFIX) {
            table.extend_from_slice(rest);
            table.push(b'\n');
        }
    }
    table
}

/// Parse a de-framed table; the error is a human-readable reason
pub fn parse_table(table: &[u8]) -> Result<Vec<ResultRow>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(table);
    let headers = reader
        .byte_headers()
        .map_err(|e| format!("unreadable header: {}", e))?
        .clone();

    let column = |name: &str| headers.iter().position(|h| h == name.as_bytes());
    let required = |name: &str| column(name).ok_or_else(|| format!("missing column `{}`", name));
    let file = required("file")?;
    let line = required("line")?;
    let subject = required("subject")?;
    let output = required("output")?;
    let return_code = required("return code")?;
    let oracle = column("oracle");
    let input = column("input");
    let has_input = column("has input");

    let mut rows = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.map_err(|e| format!("row {}: {}", idx + 1, e))?;
        let text = |col: usize| String::from_utf8_lossy(record.get(col).unwrap_or_default()).into_owned();

        let rc_text = text(return_code);
        let rc = rc_text
            .trim()
            .parse::<i32>()
            .map_err(|_| format!("row {}: bad return code {:?}", idx + 1, rc_text))?;

        rows.push(ResultRow {
            file: text(file),
            line: text(line),
            subject: text(subject),
            output: record.get(output).unwrap_or_default().to_vec(),
            oracle: oracle.map(text).unwrap_or_default(),
            return_code: rc,
            input: match (input, has_input) {
                (Some(col), Some(flag)) if record.get(flag) == Some(PRESENT) => {
                    record.get(col).map(<[u8]>::to_vec)
                }
                (Some(_), Some(_)) => None,
                // Tables without the presence column carry every cell as given
                (Some(col), None) => record.get(col).map(<[u8]>::to_vec),
                (None, _) => None,
            },
        });
    }
    Ok(rows)
}

/// Writer that puts [`FRAME_PREFIX`] in front of every line
pub struct FramedWriter<W: Write> {
    inner: W,
    at_line_start: bool,
}

impl<W: Write> FramedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            at_line_start: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for FramedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for chunk in buf.split_inclusive(|b| *b == b'\n') {
            if self.at_line_start {
                self.inner.write_all(FRAME_PREFIX)?;
            }
            self.inner.write_all(chunk)?;
            self.at_line_start = chunk.ends_with(b"\n");
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// CSV rows over a [`FramedWriter`], flushed one at a time
pub struct RowWriter<W: Write> {
    writer: csv::Writer<FramedWriter<W>>,
}

impl<W: Write> RowWriter<W> {
    /// Start a table; the header row is written immediately
    pub fn new(inner: W) -> Result<Self, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(FramedWriter::new(inner));
        writer.write_record(HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    pub fn write_row(&mut self, row: &ResultRow) -> Result<(), csv::Error> {
        let return_code = row.return_code.to_string();
        self.writer.write_record([
            row.file.as_bytes(),
            row.line.as_bytes(),
            row.subject.as_bytes(),
            row.output.as_slice(),
            row.oracle.as_bytes(),
            return_code.as_bytes(),
            row.input.as_deref().unwrap_or_default(),
            if row.input.is_some() { PRESENT } else { ABSENT },
        ])?;
        self.writer.flush()?;
        Ok(())
    }
}
