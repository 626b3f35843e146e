//! Well naming and plate coordinate conversions.
//!
//! Rows are lettered with bijective base-26 (A..Z, AA, AB, ...), columns are
//! numbered from 1. Linear indices are 1-based and depend on the traversal
//! direction.

use std::fmt;
use std::str::FromStr;

use crate::error::{LabError, Result};

const ROW_LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Traversal order over a plate.
///
/// `Row` walks A1, A2, ... A12, B1, ...; `Column` walks A1, B1, ... H1, A2, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Row,
    Column,
}

impl FromStr for Direction {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "row" => Ok(Direction::Row),
            "column" => Ok(Direction::Column),
            other => Err(LabError::InvalidDirection(other.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Row => f.write_str("row"),
            Direction::Column => f.write_str("column"),
        }
    }
}

/// Convert A->1, Z->26, AA->27, etc. Lowercase letters are accepted.
pub fn rowname_to_number(name: &str) -> Result<usize> {
    if name.is_empty() {
        return Err(LabError::InvalidWellName(name.to_string()));
    }
    let mut number = 0usize;
    for ch in name.chars() {
        let upper = ch.to_ascii_uppercase();
        if !upper.is_ascii_uppercase() {
            return Err(LabError::InvalidWellName(name.to_string()));
        }
        let digit = (upper as u8 - b'A') as usize + 1;
        number = number
            .checked_mul(26)
            .and_then(|n| n.checked_add(digit))
            .ok_or_else(|| LabError::InvalidWellName(name.to_string()))?;
    }
    Ok(number)
}

/// Convert 1->A, 26->Z, 27->AA, 52->AZ, 53->BA, etc.
///
/// `number` must be at least 1; zero has no representation.
pub fn number_to_rowname(number: usize) -> String {
    let mut letters = Vec::new();
    let mut n = number;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(ROW_LETTERS[rem]);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Convert A1->(1, 1), H11->(8, 11), etc.
pub fn wellname_to_coordinates(wellname: &str) -> Result<(usize, usize)> {
    let split = wellname
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| LabError::InvalidWellName(wellname.to_string()))?;
    let (rowname, colname) = wellname.split_at(split);
    if rowname.is_empty() || !colname.chars().all(|c| c.is_ascii_digit()) {
        return Err(LabError::InvalidWellName(wellname.to_string()));
    }
    let row = rowname_to_number(rowname)?;
    let column: usize = colname
        .parse()
        .map_err(|_| LabError::InvalidWellName(wellname.to_string()))?;
    if column == 0 {
        return Err(LabError::InvalidWellName(wellname.to_string()));
    }
    Ok((row, column))
}

/// Convert (1, 1)->A1, (4, 3)->D3, etc.
pub fn coordinates_to_wellname((row, column): (usize, usize)) -> String {
    format!("{}{}", number_to_rowname(row), column)
}

/// Convert 96->(8, 12), 384->(16, 24), 1536->(32, 48).
///
/// Only meaningful for plates with the standard 2:3 footprint.
pub fn compute_rows_columns(num_wells: usize) -> (usize, usize) {
    let a = (num_wells as f64 / 6.0).sqrt();
    ((2.0 * a).round() as usize, (3.0 * a).round() as usize)
}

/// 1-based linear index of a (row, column) position.
pub fn coordinates_to_index(
    (row, column): (usize, usize),
    num_rows: usize,
    num_columns: usize,
    direction: Direction,
) -> Result<usize> {
    if row == 0 || row > num_rows || column == 0 || column > num_columns {
        return Err(LabError::InvalidWellName(coordinates_to_wellname((
            row, column,
        ))));
    }
    Ok(match direction {
        Direction::Row => column + num_columns * (row - 1),
        Direction::Column => row + num_rows * (column - 1),
    })
}

/// (row, column) position of a 1-based linear index.
pub fn index_to_coordinates(
    index: usize,
    num_rows: usize,
    num_columns: usize,
    direction: Direction,
) -> Result<(usize, usize)> {
    let num_wells = num_rows * num_columns;
    if index == 0 || index > num_wells {
        return Err(LabError::IndexOutOfRange { index, num_wells });
    }
    let i = index - 1;
    Ok(match direction {
        Direction::Row => (1 + i / num_columns, 1 + i % num_columns),
        Direction::Column => (1 + i % num_rows, 1 + i / num_rows),
    })
}

/// Convert e.g. A1..H12 into 1..96 on a plate of the given size.
pub fn wellname_to_index(
    wellname: &str,
    num_rows: usize,
    num_columns: usize,
    direction: Direction,
) -> Result<usize> {
    let coords = wellname_to_coordinates(wellname)?;
    coordinates_to_index(coords, num_rows, num_columns, direction)
}

/// Convert e.g. 1..96 into A1..H12 on a plate of the given size.
pub fn index_to_wellname(
    index: usize,
    num_rows: usize,
    num_columns: usize,
    direction: Direction,
) -> Result<String> {
    index_to_coordinates(index, num_rows, num_columns, direction).map(coordinates_to_wellname)
}
