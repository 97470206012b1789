use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;

use crate::annotate::{Address, Record};
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.clone(),
            CellValue::Number(value) => value.to_string(),
        }
    }

    fn from_field(field: &str) -> Self {
        if field.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(field.to_string())
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::from_field(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

pub type Row = Vec<CellValue>;

/// `None` marks a row absent in the source; it keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Option<Row>>,
}

impl Table {
    pub fn new(header: Vec<String>) -> Self {
        Self {
            header,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(Some(row));
    }

    pub fn push_absent(&mut self) {
        self.rows.push(None);
    }

    pub fn width(&self) -> usize {
        self.header.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSchema {
    pub merchant_line1: usize,
    pub merchant_line2: usize,
    pub home_line1: usize,
    pub home_line2: usize,
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self {
            merchant_line1: 13,
            merchant_line2: 14,
            home_line1: 45,
            home_line2: 46,
        }
    }
}

impl ColumnSchema {
    pub fn extract(&self, row: &[CellValue]) -> Record {
        let cell = |index: usize| row.get(index).map(CellValue::as_text).unwrap_or_default();
        Record {
            merchant: Address::new(cell(self.merchant_line1), cell(self.merchant_line2)),
            home: Address::new(cell(self.home_line1), cell(self.home_line2)),
        }
    }
}

pub fn read_csv<R: Read>(mut source: R) -> AppResult<Table> {
    let mut input = Vec::new();
    source.read_to_end(&mut input)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input.as_slice());

    let header = reader
        .headers()?
        .iter()
        .map(|field| field.trim_start_matches('\u{feff}').to_string())
        .collect::<Vec<_>>();
    if header.iter().all(|field| field.trim().is_empty()) {
        return Err(AppError::Schema("missing header row".into()));
    }

    let mut table = Table::new(header);
    let mut record = csv::StringRecord::new();
    loop {
        let start = reader.position().byte() as usize;
        if !reader.read_record(&mut record)? {
            break;
        }
        // The reader skips empty lines; they still occupy a row slot.
        for _ in 0..blank_lines_before(&input, start) {
            table.push_absent();
        }
        if record.iter().all(str::is_empty) {
            table.push_absent();
        } else {
            table.push_row(record.iter().map(CellValue::from_field).collect());
        }
    }
    Ok(table)
}

// Counts empty lines between the previous record, which ends at `start`, and
// the next record's first field. The previous record's terminator may or may
// not have been consumed by the time `start` was taken.
fn blank_lines_before(input: &[u8], start: usize) -> usize {
    let is_break = |byte: u8| byte == b'\r' || byte == b'\n';
    let previous = start.checked_sub(1).and_then(|index| input.get(index).copied());
    let mut rest = input.get(start..).unwrap_or_default();

    if previous == Some(b'\r') && rest.first() == Some(&b'\n') {
        rest = &rest[1..];
    }
    let terminator_pending = previous.is_some_and(|byte| !is_break(byte));

    let mut breaks: usize = 0;
    let mut bytes = rest.iter().copied().take_while(|byte| is_break(*byte)).peekable();
    while let Some(byte) = bytes.next() {
        if byte == b'\r' && bytes.peek() == Some(&b'\n') {
            bytes.next();
        }
        breaks += 1;
    }

    if terminator_pending {
        breaks.saturating_sub(1)
    } else {
        breaks
    }
}

pub fn write_csv<W: Write>(table: &Table, writer: W) -> AppResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);

    writer.write_record(&table.header)?;
    let blank = vec![String::new(); table.width()];
    for row in &table.rows {
        match row {
            Some(cells) => writer.write_record(cells.iter().map(CellValue::as_text))?,
            None => writer.write_record(&blank)?,
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn read_csv_path(path: &Path) -> AppResult<Table> {
    let file = File::open(path)?;
    read_csv(file)
}

pub fn write_csv_path(table: &Table, path: &Path) -> AppResult<()> {
    let file = File::create(path)?;
    write_csv(table, file)
}
