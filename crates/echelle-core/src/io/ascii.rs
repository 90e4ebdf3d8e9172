use std::path::Path;

use crate::consts::PLACEHOLDER_IVAR;
use crate::error::{EchelleError, Result};
use crate::io::reader::RawOrders;
use crate::spectrum::Metadata;

/// Parse whitespace-delimited columns, taking the first `ncols` of each row.
fn parse_columns(text: &str, ncols: usize, skip_rows: usize) -> Result<Vec<Vec<f64>>> {
    let mut columns = vec![Vec::new(); ncols];
    for (lineno, line) in text.lines().enumerate().skip(skip_rows) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < ncols {
            return Err(EchelleError::StructuralRead(format!(
                "line {}: expected {ncols} columns, found {}",
                lineno + 1,
                tokens.len()
            )));
        }
        for (col, tok) in columns.iter_mut().zip(&tokens) {
            let value = tok.parse::<f64>().map_err(|_| {
                EchelleError::StructuralRead(format!("line {}: bad number '{tok}'", lineno + 1))
            })?;
            col.push(value);
        }
    }
    if columns[0].is_empty() {
        return Err(EchelleError::StructuralRead("no data rows".into()));
    }
    Ok(columns)
}

/// Parse, retrying once without the first row (a header line).
fn parse_with_retry(path: &Path, ncols: usize) -> Result<Vec<Vec<f64>>> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    parse_columns(&text, ncols, 0).or_else(|_| parse_columns(&text, ncols, 1))
}

fn into_orders(mut columns: Vec<Vec<f64>>, ivar: Vec<f64>) -> RawOrders {
    let flux = columns.swap_remove(1);
    let dispersion = columns.swap_remove(0);
    RawOrders {
        dispersion: vec![dispersion],
        flux: vec![flux],
        ivar: vec![ivar],
        metadata: Metadata::new(),
        order_numbers: Vec::new(),
    }
}

/// Three columns: dispersion, flux, ivar.
pub(crate) fn read_ascii3(path: &Path) -> Result<RawOrders> {
    let mut columns = parse_with_retry(path, 3)?;
    let ivar = columns.pop().unwrap_or_default();
    Ok(into_orders(columns, ivar))
}

/// Two columns: dispersion, flux; ivar takes a placeholder value.
pub(crate) fn read_ascii2(path: &Path) -> Result<RawOrders> {
    let columns = parse_with_retry(path, 2)?;
    let ivar = vec![PLACEHOLDER_IVAR; columns[0].len()];
    Ok(into_orders(columns, ivar))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let cols = parse_columns("# wave flux\n\n1 2\n3 4 5\n", 2, 0).unwrap();
        assert_eq!(cols, vec![vec![1.0, 3.0], vec![2.0, 4.0]]);
    }

    #[test]
    fn short_rows_fail() {
        assert!(parse_columns("1 2\n", 3, 0).is_err());
    }

    #[test]
    fn header_row_fails_until_skipped() {
        let text = "wave flux ivar\n1 2 3\n";
        assert!(parse_columns(text, 3, 0).is_err());
        assert_eq!(parse_columns(text, 3, 1).unwrap()[2], vec![3.0]);
    }
}
