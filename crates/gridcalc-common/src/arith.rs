//! The value algebra: total arithmetic, comparison, and text operations
//! over [`CellValue`].
//!
//! Every function here returns a `CellValue` for every input pair — never
//! a Rust error. Overflow maps to the matching infinity, indeterminate
//! forms (`∞ − ∞`, `0/0`, `∞/∞`, `∞/0`, `0·∞`) map to `#NUM!`, and
//! boolean/string operands to arithmetic map to `#VALUE!` naming the two
//! operand types. `NaN` passes through as a number.

use std::cmp::Ordering;

use crate::error::{CellError, ErrorKind};
use crate::value::{CellValue, Sign};

/// Numeric view of an operand for the arithmetic ops.
enum Operand {
    Num(f64),
    Inf(Sign),
}

fn numeric_operand(v: &CellValue) -> Result<Operand, CellError> {
    match v {
        CellValue::Number(n) => Ok(Operand::Num(*n)),
        CellValue::Infinity(s) => Ok(Operand::Inf(*s)),
        // References to empty cells participate as zero.
        CellValue::Empty => Ok(Operand::Num(0.0)),
        CellValue::Error(e) => Err(e.clone()),
        other => Err(CellError::new(ErrorKind::Value)
            .with_message(format!("expected a number, got {}", other.type_name()))),
    }
}

fn type_error(op: &str, l: &CellValue, r: &CellValue) -> CellValue {
    CellValue::error(CellError::new(ErrorKind::Value).with_message(format!(
        "cannot {op} {} and {}",
        l.type_name(),
        r.type_name()
    )))
}

fn indeterminate(what: &str) -> CellValue {
    CellValue::error(CellError::new(ErrorKind::Num).with_message(format!("{what} is indeterminate")))
}

/// Fold an IEEE result back into the algebra: infinities become tagged
/// infinity values, everything else (including NaN) stays a number.
fn close(n: f64) -> CellValue {
    if n.is_infinite() {
        CellValue::Infinity(Sign::of(n))
    } else {
        CellValue::Number(n)
    }
}

fn binary_operands(
    op: &str,
    l: &CellValue,
    r: &CellValue,
) -> Result<(Operand, Operand), CellValue> {
    match (numeric_operand(l), numeric_operand(r)) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(e), _) if l.is_error() => Err(CellValue::Error(e)),
        (_, Err(e)) if r.is_error() => Err(CellValue::Error(e)),
        _ => Err(type_error(op, l, r)),
    }
}

pub fn add(l: &CellValue, r: &CellValue) -> CellValue {
    let (a, b) = match binary_operands("add", l, r) {
        Ok(pair) => pair,
        Err(e) => return e,
    };
    match (a, b) {
        (Operand::Num(x), Operand::Num(y)) => close(x + y),
        (Operand::Inf(s), Operand::Num(_)) | (Operand::Num(_), Operand::Inf(s)) => {
            CellValue::Infinity(s)
        }
        (Operand::Inf(s1), Operand::Inf(s2)) => {
            if s1 == s2 {
                CellValue::Infinity(s1)
            } else {
                indeterminate("INFINITY + -INFINITY")
            }
        }
    }
}

pub fn sub(l: &CellValue, r: &CellValue) -> CellValue {
    let (a, b) = match binary_operands("subtract", l, r) {
        Ok(pair) => pair,
        Err(e) => return e,
    };
    match (a, b) {
        (Operand::Num(x), Operand::Num(y)) => close(x - y),
        (Operand::Inf(s), Operand::Num(_)) => CellValue::Infinity(s),
        (Operand::Num(_), Operand::Inf(s)) => CellValue::Infinity(s.flip()),
        (Operand::Inf(s1), Operand::Inf(s2)) => {
            if s1 != s2 {
                CellValue::Infinity(s1)
            } else {
                indeterminate("INFINITY - INFINITY")
            }
        }
    }
}

pub fn mul(l: &CellValue, r: &CellValue) -> CellValue {
    let (a, b) = match binary_operands("multiply", l, r) {
        Ok(pair) => pair,
        Err(e) => return e,
    };
    match (a, b) {
        (Operand::Num(x), Operand::Num(y)) => close(x * y),
        (Operand::Inf(s), Operand::Num(n)) | (Operand::Num(n), Operand::Inf(s)) => {
            if n == 0.0 {
                indeterminate("0 * INFINITY")
            } else {
                CellValue::Infinity(s.product(Sign::of(n)))
            }
        }
        (Operand::Inf(s1), Operand::Inf(s2)) => CellValue::Infinity(s1.product(s2)),
    }
}

pub fn div(l: &CellValue, r: &CellValue) -> CellValue {
    let (a, b) = match binary_operands("divide", l, r) {
        Ok(pair) => pair,
        Err(e) => return e,
    };
    match (a, b) {
        (Operand::Num(x), Operand::Num(y)) => {
            if y == 0.0 {
                if x == 0.0 {
                    indeterminate("0 / 0")
                } else {
                    CellValue::Infinity(Sign::of(x).product(Sign::of(y)))
                }
            } else {
                close(x / y)
            }
        }
        (Operand::Inf(_), Operand::Inf(_)) => indeterminate("INFINITY / INFINITY"),
        (Operand::Inf(s), Operand::Num(n)) => {
            if n == 0.0 {
                indeterminate("INFINITY / 0")
            } else {
                CellValue::Infinity(s.product(Sign::of(n)))
            }
        }
        (Operand::Num(n), Operand::Inf(s)) => {
            // x / ∞ underflows to signed zero.
            CellValue::Number(if Sign::of(n) == s { 0.0 } else { -0.0 })
        }
    }
}

pub fn pow(l: &CellValue, r: &CellValue) -> CellValue {
    let (a, b) = match binary_operands("exponentiate", l, r) {
        Ok(pair) => pair,
        Err(e) => return e,
    };
    let x = match a {
        Operand::Num(n) => n,
        Operand::Inf(s) => s.to_f64(),
    };
    let y = match b {
        Operand::Num(n) => n,
        Operand::Inf(s) => s.to_f64(),
    };
    if x == 0.0 && y == 0.0 {
        return indeterminate("0 ^ 0");
    }
    close(x.powf(y))
}

pub fn neg(v: &CellValue) -> CellValue {
    match v {
        CellValue::Number(n) => CellValue::Number(-n),
        CellValue::Infinity(s) => CellValue::Infinity(s.flip()),
        CellValue::Empty => CellValue::Number(0.0),
        CellValue::Error(e) => CellValue::Error(e.clone()),
        other => CellValue::error(
            CellError::new(ErrorKind::Value)
                .with_message(format!("cannot negate {}", other.type_name())),
        ),
    }
}

pub fn plus(v: &CellValue) -> CellValue {
    match v {
        CellValue::Number(_) | CellValue::Infinity(_) | CellValue::Error(_) => v.clone(),
        CellValue::Empty => CellValue::Number(0.0),
        other => CellValue::error(
            CellError::new(ErrorKind::Value)
                .with_message(format!("expected a number, got {}", other.type_name())),
        ),
    }
}

/// Postfix `%`: divide by one hundred. Infinities are fixed points.
pub fn percent(v: &CellValue) -> CellValue {
    match v {
        CellValue::Number(n) => CellValue::Number(n / 100.0),
        CellValue::Infinity(s) => CellValue::Infinity(*s),
        CellValue::Empty => CellValue::Number(0.0),
        CellValue::Error(e) => CellValue::Error(e.clone()),
        other => CellValue::error(
            CellError::new(ErrorKind::Value)
                .with_message(format!("cannot take a percentage of {}", other.type_name())),
        ),
    }
}

/// `&` concatenation: errors propagate, everything else coerces to text.
pub fn concat(l: &CellValue, r: &CellValue) -> CellValue {
    if let CellValue::Error(e) = l {
        return CellValue::Error(e.clone());
    }
    if let CellValue::Error(e) = r {
        return CellValue::Error(e.clone());
    }
    CellValue::Text(format!("{}{}", l.to_text(), r.to_text()))
}

/// Type rank for cross-type comparison: numeric < text < boolean < error.
fn rank(v: &CellValue) -> u8 {
    match v {
        CellValue::Number(_) | CellValue::Infinity(_) | CellValue::Empty => 0,
        CellValue::Text(_) => 1,
        CellValue::Boolean(_) => 2,
        CellValue::Error(_) => 3,
    }
}

fn numeric_key(v: &CellValue) -> Option<f64> {
    match v {
        CellValue::Number(n) => Some(*n),
        CellValue::Infinity(s) => Some(s.to_f64()),
        CellValue::Empty => Some(0.0),
        _ => None,
    }
}

/// Total-order float comparison: `NaN` equals `NaN` and sorts above every
/// other number.
fn cmp_f64(a: f64, b: f64) -> Ordering {
    match a.partial_cmp(&b) {
        Some(o) => o,
        None => match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => unreachable!(),
        },
    }
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// The total comparison underlying `= <> < > <= >=`, `MATCH`, and sorting.
///
/// Errors compare equal to each other; the empty value coerces to 0; a
/// number against a string tries numeric coercion of the string and falls
/// back to lexicographic on the text renderings; booleans compare as 0/1;
/// remaining cross-type pairs order by a fixed type rank.
pub fn compare(l: &CellValue, r: &CellValue) -> Ordering {
    use CellValue::*;
    match (l, r) {
        (Error(_), Error(_)) => Ordering::Equal,
        (Boolean(a), Boolean(b)) => a.cmp(b),
        (Text(a), Text(b)) => cmp_text(a, b),
        _ => match (numeric_key(l), numeric_key(r)) {
            (Some(a), Some(b)) => cmp_f64(a, b),
            (Some(a), None) if matches!(r, Text(_)) => match coerce_numeric_text(r) {
                Some(b) => cmp_f64(a, b),
                None => cmp_text(&l.to_text(), &r.to_text()),
            },
            (None, Some(b)) if matches!(l, Text(_)) => match coerce_numeric_text(l) {
                Some(a) => cmp_f64(a, b),
                None => cmp_text(&l.to_text(), &r.to_text()),
            },
            _ => rank(l).cmp(&rank(r)),
        },
    }
}

fn coerce_numeric_text(v: &CellValue) -> Option<f64> {
    match v {
        CellValue::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Anchored, case-insensitive wildcard match: `?` matches one character,
/// `*` matches any run.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.to_lowercase().chars().collect();
    let txt: Vec<char> = text.to_lowercase().chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}
