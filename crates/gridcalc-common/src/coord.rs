use once_cell::sync::Lazy;
use std::fmt::{self, Display};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// Precomputed letters for the common A..ZZ band (702 columns).
static COLUMN_LOOKUP: Lazy<Vec<String>> = Lazy::new(|| {
    let mut cols = Vec::with_capacity(702);
    for c in b'A'..=b'Z' {
        cols.push(String::from(c as char));
    }
    for c1 in b'A'..=b'Z' {
        for c2 in b'A'..=b'Z' {
            cols.push(format!("{}{}", c1 as char, c2 as char));
        }
    }
    cols
});

/// A zero-based cell coordinate. Column `0` is `A`, row `0` is the
/// one-based row `1` of the external A1 form.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    pub col: u32,
    pub row: u32,
}

impl Coord {
    pub fn new(col: u32, row: u32) -> Self {
        Coord { col, row }
    }

    /// Apply a signed delta to both axes. `None` when the result would
    /// leave the grid.
    pub fn offset(&self, dc: i64, dr: i64) -> Option<Coord> {
        let col = (self.col as i64).checked_add(dc)?;
        let row = (self.row as i64).checked_add(dr)?;
        if col < 0 || row < 0 || col > u32::MAX as i64 || row > u32::MAX as i64 {
            return None;
        }
        Some(Coord::new(col as u32, row as u32))
    }

    /// Render as an A1-style key (`Coord::new(1, 9)` → `"B10"`).
    pub fn to_a1(&self) -> String {
        format!("{}{}", index_to_column(self.col), self.row + 1)
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", index_to_column(self.col), self.row + 1)
    }
}

/// Which components of a reference are anchored with `$`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AbsFlags {
    pub col: bool,
    pub row: bool,
}

impl AbsFlags {
    pub fn both() -> Self {
        AbsFlags { col: true, row: true }
    }
}

/// Convert a column letter run (`"A"`, `"BC"`) to a zero-based index.
/// The encoding is the bijection between letter strings and the
/// non-negative integers with `A ↔ 0`.
pub fn column_to_index(column: &str) -> Option<u32> {
    let bytes = column.as_bytes();
    if bytes.is_empty() || bytes.len() > 7 {
        return None;
    }
    let mut result: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        result = result * 26 + (b.to_ascii_uppercase() - b'A' + 1) as u64;
        if result > u32::MAX as u64 {
            return None;
        }
    }
    Some((result - 1) as u32)
}

/// Convert a zero-based column index to its letter form.
pub fn index_to_column(index: u32) -> String {
    if index < 702 {
        return COLUMN_LOOKUP[index as usize].clone();
    }
    let mut num = index as u64 + 1;
    let mut result = String::with_capacity(5);
    while num > 0 {
        num -= 1;
        result.insert(0, ((num % 26) as u8 + b'A') as char);
        num /= 26;
    }
    result
}

/// Parse an A1-style cell key (`"A1"`, `"$B$10"`) into a coordinate and
/// its absolute flags. Byte-driven; rejects trailing garbage.
pub fn parse_cell_key(key: &str) -> Option<(Coord, AbsFlags)> {
    let bytes = key.as_bytes();
    let mut i = 0;
    let mut abs = AbsFlags::default();

    if i < bytes.len() && bytes[i] == b'$' {
        abs.col = true;
        i += 1;
    }
    let col_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    if i == col_start {
        return None;
    }
    let col = column_to_index(&key[col_start..i])?;

    if i < bytes.len() && bytes[i] == b'$' {
        abs.row = true;
        i += 1;
    }
    let row_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == row_start || i != bytes.len() {
        return None;
    }
    let row_one_based: u64 = key[row_start..i].parse().ok()?;
    if row_one_based == 0 || row_one_based > u32::MAX as u64 {
        return None;
    }
    Some((Coord::new(col, (row_one_based - 1) as u32), abs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_round_trip() {
        for idx in [0u32, 1, 25, 26, 27, 701, 702, 16383] {
            let letters = index_to_column(idx);
            assert_eq!(column_to_index(&letters), Some(idx), "{letters}");
        }
        assert_eq!(index_to_column(0), "A");
        assert_eq!(index_to_column(25), "Z");
        assert_eq!(index_to_column(26), "AA");
        assert_eq!(index_to_column(701), "ZZ");
        assert_eq!(index_to_column(702), "AAA");
    }

    #[test]
    fn parse_cell_keys() {
        assert_eq!(
            parse_cell_key("A1"),
            Some((Coord::new(0, 0), AbsFlags::default()))
        );
        assert_eq!(
            parse_cell_key("$B$10"),
            Some((Coord::new(1, 9), AbsFlags::both()))
        );
        let (coord, abs) = parse_cell_key("C$7").unwrap();
        assert_eq!(coord, Coord::new(2, 6));
        assert!(!abs.col);
        assert!(abs.row);
        assert_eq!(parse_cell_key("A0"), None);
        assert_eq!(parse_cell_key("1A"), None);
        assert_eq!(parse_cell_key("A1x"), None);
        assert_eq!(parse_cell_key(""), None);
    }

    #[test]
    fn coord_offset_clamps_at_origin() {
        let c = Coord::new(1, 1);
        assert_eq!(c.offset(-1, -1), Some(Coord::new(0, 0)));
        assert_eq!(c.offset(-2, 0), None);
        assert_eq!(c.offset(0, -2), None);
    }

    #[test]
    fn coord_display_is_a1() {
        assert_eq!(Coord::new(0, 0).to_string(), "A1");
        assert_eq!(Coord::new(27, 99).to_string(), "AB100");
    }
}
