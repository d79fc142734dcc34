//! ---
//! rsl_section: "03-persistence-logging"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Tabular encoding of the station inventory file."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
//! The inventory file is comma-delimited with one fixed header row. Every
//! column except `description` is drawn from a delimiter-free alphabet, so
//! only the description is quoted on write. Reading goes through the `csv`
//! reader, which accepts both quoted and bare fields.

use std::io::Read;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use rsl_common::Platform;

use crate::record::{StationRecord, StationStatus};
use crate::{InventoryError, Result};

/// Column names, in file order.
pub const HEADER: [&str; 7] = [
    "id",
    "platform",
    "hostname",
    "address",
    "description",
    "created_date",
    "status",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Canonical header line without the trailing newline.
pub fn header_line() -> String {
    HEADER.join(",")
}

/// One data row as read from disk, kept even when it fails to parse.
#[derive(Debug, Clone)]
pub struct RawRow {
    /// 1-based line number of the row in the file.
    pub line: u64,
    pub parsed: std::result::Result<StationRecord, String>,
}

/// Decoded file contents prior to any consistency checks.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// `None` when the file was empty.
    pub header: Option<Vec<String>>,
    pub rows: Vec<RawRow>,
}

impl Table {
    pub fn header_matches(&self) -> bool {
        match &self.header {
            Some(header) => header.iter().map(String::as_str).eq(HEADER.iter().copied()),
            None => false,
        }
    }

    pub fn found_header(&self) -> String {
        self.header
            .as_ref()
            .map(|header| header.join(","))
            .unwrap_or_default()
    }

    /// Strict view used by CRUD: a wrong header or any malformed row is an error.
    pub fn into_records(self) -> Result<Vec<StationRecord>> {
        if !self.header_matches() {
            return Err(InventoryError::HeaderMismatch {
                expected: header_line(),
                found: self.found_header(),
            });
        }
        self.rows
            .into_iter()
            .map(|row| {
                let line = row.line;
                row.parsed
                    .map_err(|reason| InventoryError::MalformedRow { line, reason })
            })
            .collect()
    }
}

/// Decode the inventory table from any reader.
pub fn decode<R: Read>(reader: R) -> Result<Table> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut table = Table::default();
    for (index, result) in csv_reader.records().enumerate() {
        let row = result?;
        let line = row
            .position()
            .map(|position| position.line())
            .unwrap_or(index as u64 + 1);
        if index == 0 {
            table.header = Some(row.iter().map(|field| field.trim().to_owned()).collect());
            continue;
        }
        table.rows.push(RawRow {
            line,
            parsed: parse_row(&row),
        });
    }
    Ok(table)
}

fn parse_row(row: &StringRecord) -> std::result::Result<StationRecord, String> {
    if row.len() != HEADER.len() {
        return Err(format!(
            "expected {} fields, found {}",
            HEADER.len(),
            row.len()
        ));
    }
    let field = |index: usize| row.get(index).unwrap_or_default();
    let id = field(0)
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("invalid id '{}': {}", field(0), err))?;
    let platform = field(1)
        .parse::<Platform>()
        .map_err(|err| err.to_string())?;
    let created_date = NaiveDate::parse_from_str(field(5).trim(), DATE_FORMAT)
        .map_err(|err| format!("invalid created_date '{}': {}", field(5), err))?;
    let status = field(6)
        .parse::<StationStatus>()
        .map_err(|err| err.to_string())?;
    let record = StationRecord {
        id,
        platform,
        hostname: field(2).trim().to_owned(),
        address: field(3).trim().to_owned(),
        description: field(4).to_owned(),
        created_date,
        status,
    };
    record.validate().map_err(|err| err.to_string())?;
    Ok(record)
}

/// Encode a full inventory (header plus rows) as file contents.
pub fn encode(records: &[StationRecord]) -> String {
    let mut out = header_line();
    out.push('\n');
    for record in records {
        out.push_str(&encode_row(record));
        out.push('\n');
    }
    out
}

/// Encode a single row; the description is always quoted with embedded quotes doubled.
pub fn encode_row(record: &StationRecord) -> String {
    format!(
        "{},{},{},{},{},{},{}",
        record.id,
        record.platform,
        record.hostname,
        record.address,
        quote(&record.description),
        record.created_date.format(DATE_FORMAT),
        record.status
    )
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
