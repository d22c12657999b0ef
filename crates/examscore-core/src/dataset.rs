//! Delimited-text tables: decoding, row extraction and score merging.

use chrono::NaiveDateTime;
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};

use crate::domain::{Row, Score};
use crate::error::DataError;

pub const QUESTION_NUMBER_COLUMN: &str = "№ вопроса";
pub const QUESTION_TEXT_COLUMN: &str = "Текст вопроса";
pub const ANSWER_COLUMN: &str = "Транскрибация ответа";
pub const SCORE_COLUMN: &str = "Оценка экзаменатора";

const BOM: &str = "\u{feff}";

/// Text encoding of a table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    /// UTF-8 prefixed with a byte-order mark, as spreadsheet tools expect.
    Utf8Bom,
}

/// Delimiter, encoding and quoting of a table file.
///
/// A leading BOM is always tolerated on read, whatever the encoding says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFormat {
    pub delimiter: u8,
    pub encoding: Encoding,
    pub quote_all: bool,
}

impl TableFormat {
    /// `;`-separated UTF-8, minimal quoting.
    pub fn input() -> Self {
        TableFormat {
            delimiter: b';',
            encoding: Encoding::Utf8,
            quote_all: false,
        }
    }

    /// `;`-separated UTF-8 with BOM, every field quoted.
    pub fn output() -> Self {
        TableFormat {
            delimiter: b';',
            encoding: Encoding::Utf8Bom,
            quote_all: true,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl Default for TableFormat {
    fn default() -> Self {
        Self::input()
    }
}

/// What unscored rows get in the score column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingScorePolicy {
    /// Leave the cell empty.
    #[default]
    Blank,
    /// Write `0`.
    Zero,
}

impl MissingScorePolicy {
    fn cell(self) -> &'static str {
        match self {
            Self::Blank => "",
            Self::Zero => "0",
        }
    }
}

/// A header row plus records, every record as wide as the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        Table { headers, records }
    }

    /// Decode `bytes` as a delimited table with a header row.
    ///
    /// Short records are padded with empty cells; records wider than the
    /// header are rejected. Blank lines are skipped.
    pub fn parse(bytes: &[u8], format: &TableFormat) -> Result<Table, DataError> {
        let text = std::str::from_utf8(bytes).map_err(|e| DataError::Encoding {
            encoding: "UTF-8",
            message: e.to_string(),
        })?;
        let text = text.strip_prefix(BOM).unwrap_or(text);

        let mut reader = ReaderBuilder::new()
            .delimiter(format.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() {
            return Err(DataError::Malformed("missing header row".to_string()));
        }

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result?;
            if record.len() > headers.len() {
                let line = record.position().map_or(0, |p| p.line());
                return Err(DataError::Malformed(format!(
                    "line {line}: expected {} fields, found {}",
                    headers.len(),
                    record.len()
                )));
            }
            let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
            cells.resize(headers.len(), String::new());
            records.push(cells);
        }

        Ok(Table { headers, records })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[Vec<String>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn require_column(&self, name: &str) -> Result<usize, DataError> {
        self.column_index(name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    /// Valid rows with their record index, in table order.
    pub fn extract_rows(&self) -> Result<Vec<(usize, Row)>, DataError> {
        let number = self.require_column(QUESTION_NUMBER_COLUMN)?;
        let question = self.require_column(QUESTION_TEXT_COLUMN)?;
        let answer = self.require_column(ANSWER_COLUMN)?;

        Ok(self
            .records
            .iter()
            .enumerate()
            .filter_map(|(i, record)| {
                Row::from_cells(&record[number], &record[question], &record[answer])
                    .map(|row| (i, row))
            })
            .collect())
    }

    /// Write `scores` (record index, score) into the score column.
    ///
    /// The column is appended if absent and overwritten in place otherwise.
    /// Records without a score get the policy's cell.
    pub fn annotate(&mut self, scores: &[(usize, Score)], policy: MissingScorePolicy) {
        let column = match self.column_index(SCORE_COLUMN) {
            Some(i) => i,
            None => {
                self.headers.push(SCORE_COLUMN.to_string());
                for record in &mut self.records {
                    record.push(String::new());
                }
                self.headers.len() - 1
            }
        };

        for record in &mut self.records {
            record[column] = policy.cell().to_string();
        }
        for (index, score) in scores {
            if let Some(record) = self.records.get_mut(*index) {
                record[column] = score.to_string();
            }
        }
    }

    /// Encode the table, header first, `\n`-terminated.
    pub fn to_bytes(&self, format: &TableFormat) -> Result<Vec<u8>, DataError> {
        let mut out = Vec::new();
        if format.encoding == Encoding::Utf8Bom {
            out.extend_from_slice(BOM.as_bytes());
        }

        let quote_style = if format.quote_all {
            QuoteStyle::Always
        } else {
            QuoteStyle::Necessary
        };
        let mut writer = WriterBuilder::new()
            .delimiter(format.delimiter)
            .quote_style(quote_style)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(out);

        writer.write_record(&self.headers)?;
        for record in &self.records {
            writer.write_record(record)?;
        }
        writer
            .into_inner()
            .map_err(|e| DataError::Malformed(e.to_string()))
    }
}

/// Download name for a finished job, e.g. `обработанный_20260101_093000.csv`.
pub fn download_name(now: NaiveDateTime) -> String {
    format!("обработанный_{}.csv", now.format("%Y%m%d_%H%M%S"))
}
