//! Coercion of raw tables into a numeric `FeatureMatrix`.
//!
//! Steps:
//! 1. every required column must be present by exact name (else `MissingColumns`,
//!    nothing is coerced)
//! 2. cells are parsed as `f64`; unparseable or non-finite cells become missing
//! 3. missing cells are filled with the median of their column **over this batch**
//!
//! Step 3 is batch-local: the same row can coerce differently depending on
//! which other rows arrive with it. A column with no usable value at all is
//! filled with `0.0`.

use nalgebra::DMatrix;

use crate::domain::FeatureMatrix;
use crate::error::AppError;
use crate::io::RawTable;

/// Coerce `table` into a matrix whose columns are exactly `required`, in order.
pub fn coerce(table: &RawTable, required: &[String]) -> Result<FeatureMatrix, AppError> {
    table.require_columns(required)?;

    let n = table.len();
    let d = required.len();
    let mut values = DMatrix::<f64>::zeros(n, d);
    let mut imputed = 0usize;

    for (j, name) in required.iter().enumerate() {
        let cells = table
            .column(name)
            .ok_or_else(|| AppError::missing_columns(vec![name.clone()]))?;
        let parsed: Vec<Option<f64>> = cells.iter().map(|c| parse_cell(c)).collect();

        let fill = median(parsed.iter().flatten().copied()).unwrap_or(0.0);
        for (i, v) in parsed.into_iter().enumerate() {
            values[(i, j)] = match v {
                Some(v) => v,
                None => {
                    imputed += 1;
                    fill
                }
            };
        }
    }

    if imputed > 0 {
        tracing::debug!(rows = n, imputed, "filled missing cells with batch medians");
    }

    FeatureMatrix::new(required.to_vec(), values)
}

/// Parse a numeric cell; blanks, garbage and infinities are missing.
pub fn parse_cell(cell: &str) -> Option<f64> {
    let v = cell.trim().parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

/// Median of the values (mean of the middle pair for even counts).
pub fn median(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
