//! Field snapshot files written by generated solvers.
//!
//! A snapshot is plain text: header lines first, then one row per line with
//! each value preceded by a single space. Any line that does not start with
//! the delimiter is a header line.

use crate::error::{Error, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const DELIMITER: char = ' ';

/// Renders `rows` under a single `header` line.
pub fn format_snapshot(header: &str, rows: &[Vec<f64>]) -> String {
    let mut out = String::new();
    let header = header.trim_start_matches(DELIMITER);
    out.push_str(if header.is_empty() { "#" } else { header });
    out.push('\n');
    for row in rows {
        for value in row {
            // Writing into a String cannot fail.
            let _ = write!(out, "{DELIMITER}{value:e}");
        }
        out.push('\n');
    }
    out
}

pub fn write_snapshot(path: impl AsRef<Path>, header: &str, rows: &[Vec<f64>]) -> Result<()> {
    fs::write(path, format_snapshot(header, rows))?;
    Ok(())
}

pub fn parse_snapshot(text: &str) -> Result<Vec<Vec<f64>>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| line.starts_with(DELIMITER))
        .map(|(number, line)| {
            line.split_whitespace()
                .map(|token| {
                    token.parse::<f64>().map_err(|e| {
                        Error::invalid_parameter(
                            "snapshot",
                            format!("line {}: `{token}` is not a number ({e})", number + 1),
                        )
                    })
                })
                .collect()
        })
        .collect()
}

pub fn read_snapshot(path: impl AsRef<Path>) -> Result<Vec<Vec<f64>>> {
    parse_snapshot(&fs::read_to_string(path)?)
}

/// Drops `halo` rows and columns from each edge of a 2D snapshot.
pub fn strip_halo(rows: &[Vec<f64>], halo: usize) -> Vec<Vec<f64>> {
    if rows.len() <= 2 * halo {
        return Vec::new();
    }
    rows[halo..rows.len() - halo]
        .iter()
        .map(|row| {
            if row.len() <= 2 * halo {
                Vec::new()
            } else {
                row[halo..row.len() - halo].to_vec()
            }
        })
        .collect()
}
