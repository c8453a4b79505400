//! Dialogue spreadsheet reader
//!
//! A sheet is cached as rows of optional cell text, addressed from cell A1
//! regardless of where the data actually starts. Cells that are empty, an
//! empty string, numeric zero or `false` count as blank, matching how the
//! dialogue sheets are filled in by hand.

use crate::error::{Result, VoicegenError};
use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which columns hold what, and where the data starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Column with the character name (e.g. "A")
    pub character: String,

    /// Column with the line to speak
    pub dialogue: String,

    /// Column with the output file name
    pub filename: String,

    /// First data row, 1-based (2 when row 1 is a header)
    pub start_row: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            character: "A".to_string(),
            dialogue: "B".to_string(),
            filename: "C".to_string(),
            start_row: 2,
        }
    }
}

/// One line of dialogue belonging to a character
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueLine {
    pub dialogue: String,
    pub filename: String,
}

/// Convert a column index (0-based) to its letters: 0 -> "A", 26 -> "AA"
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Convert column letters to a 0-based index: "A" -> 0, "AA" -> 26
pub fn column_index(letters: &str) -> Result<usize> {
    let letters = letters.trim();
    if letters.is_empty() || letters.len() > 3 {
        return Err(VoicegenError::Workbook(format!(
            "Invalid column: {:?}",
            letters
        )));
    }

    let mut index = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return Err(VoicegenError::Workbook(format!(
                "Invalid column: {:?}",
                letters
            )));
        }
        index = index * 26 + (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
    }
    Ok(index - 1)
}

/// Render a cell as text, or `None` when it is blank
fn cell_text(data: &Data) -> Option<String> {
    match data {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(0) => None,
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) if *f == 0.0 => None,
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(false) => None,
        Data::Bool(true) => Some("True".to_string()),
        other => Some(other.to_string()),
    }
}

/// An opened workbook
pub struct Workbook {
    path: PathBuf,
    inner: Sheets<BufReader<File>>,
}

impl Workbook {
    /// Open an xlsx/xlsm/xls/ods file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(VoicegenError::Workbook(format!(
                "File not found: {}",
                path.display()
            )));
        }
        info!("Opening workbook {:?}", path);
        let inner = open_workbook_auto(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.inner.sheet_names()
    }

    /// Read a whole sheet into memory
    pub fn sheet(&mut self, name: &str) -> Result<Sheet> {
        if !self.sheet_names().iter().any(|n| n == name) {
            return Err(VoicegenError::Workbook(format!(
                "Sheet {:?} not found in {}",
                name,
                self.path.display()
            )));
        }
        let range = self.inner.worksheet_range(name)?;
        let sheet = Sheet::from_range(name, &range);
        debug!(
            "Cached sheet {:?}: {} rows, {} columns",
            name,
            sheet.row_count(),
            sheet.column_count()
        );
        Ok(sheet)
    }
}

/// Cached contents of one sheet
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    name: String,
    rows: Vec<Vec<Option<String>>>,
    columns: usize,
}

impl Sheet {
    /// Build a sheet from rows of cell text (row 0 is sheet row 1)
    pub fn from_rows(name: &str, rows: Vec<Vec<Option<String>>>) -> Self {
        let rows: Vec<Vec<Option<String>>> = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| cell.filter(|s| !s.is_empty()))
                    .collect()
            })
            .collect();
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            name: name.to_string(),
            rows,
            columns,
        }
    }

    fn from_range(name: &str, range: &Range<Data>) -> Self {
        let (Some(_), Some((end_row, end_col))) = (range.start(), range.end()) else {
            return Self::from_rows(name, Vec::new());
        };

        let rows = (0..=end_row)
            .map(|r| {
                (0..=end_col)
                    .map(|c| range.get_value((r, c)).and_then(cell_text))
                    .collect()
            })
            .collect();

        Self::from_rows(name, rows)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows, counting from row 1
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns
    }

    /// Column letters from A up to the last used column
    pub fn column_letters(&self) -> Vec<String> {
        (0..self.columns).map(column_letter).collect()
    }

    fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }

    fn data_rows(&self, start_row: usize) -> std::ops::Range<usize> {
        start_row.max(1) - 1..self.rows.len()
    }

    /// Distinct, trimmed, non-blank values of a column from `start_row` down, sorted
    pub fn unique_values_in_column(&self, column: &str, start_row: usize) -> Result<Vec<String>> {
        let col = column_index(column)?;
        let values: BTreeSet<String> = self
            .data_rows(start_row)
            .filter_map(|row| self.cell(row, col))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect();
        Ok(values.into_iter().collect())
    }

    /// Lines spoken by `character`, in sheet order.
    ///
    /// Rows with a blank dialogue or filename cell are skipped.
    pub fn rows_for_character(
        &self,
        layout: &ColumnLayout,
        character: &str,
    ) -> Result<Vec<DialogueLine>> {
        let char_col = column_index(&layout.character)?;
        let dialogue_col = column_index(&layout.dialogue)?;
        let filename_col = column_index(&layout.filename)?;

        let lines = self
            .data_rows(layout.start_row)
            .filter(|&row| {
                self.cell(row, char_col)
                    .is_some_and(|value| value.trim() == character)
            })
            .filter_map(|row| {
                let dialogue = self.cell(row, dialogue_col)?.trim();
                let filename = self.cell(row, filename_col)?.trim();
                Some(DialogueLine {
                    dialogue: dialogue.to_string(),
                    filename: filename.to_string(),
                })
            })
            .collect();

        Ok(lines)
    }
}
