use gridcalc_common::{CellError, CellValue, ErrorKind};

/// Numeric parameter coercion: numbers pass, empty is zero, everything
/// else is a type error.
pub(crate) fn to_number(v: &CellValue) -> Result<f64, CellError> {
    match v {
        CellValue::Number(n) => Ok(*n),
        CellValue::Empty => Ok(0.0),
        CellValue::Error(e) => Err(e.clone()),
        other => Err(CellError::new(ErrorKind::Value)
            .with_message(format!("expected a number, got {}", other.type_name()))),
    }
}

/// Integer parameter: numeric and whole, or a type error.
pub(crate) fn to_index(v: &CellValue) -> Result<i64, CellError> {
    let n = to_number(v)?;
    if n.fract() != 0.0 || !n.is_finite() {
        return Err(CellError::new(ErrorKind::Value)
            .with_message(format!("expected an integer, got {n}")));
    }
    Ok(n as i64)
}

pub(crate) fn flatten(rows: Vec<Vec<CellValue>>) -> Vec<CellValue> {
    rows.into_iter().flatten().collect()
}
