//! Grammar tables: operator precedence and the byte classifiers used to
//! reassemble references from the token stream.

use crate::ast::BinaryOpKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

/// Binding power, low → high: comparison < `&` < `+ -` < `* /` < `^`.
/// `^` is the only right-associative operator. Postfix `%` binds tighter
/// than any binary; prefix `+`/`-` bind tighter than `%`.
pub fn precedence(op: BinaryOpKind) -> (u8, Assoc) {
    use BinaryOpKind::*;
    match op {
        Eq | Ne | Lt | Gt | Le | Ge => (1, Assoc::Left),
        Concat => (2, Assoc::Left),
        Add | Sub => (3, Assoc::Left),
        Mul | Div => (4, Assoc::Left),
        Pow => (5, Assoc::Right),
    }
}

/// Split an identifier into a column-letter prefix and row-digit suffix
/// (`"AB12"` → `("AB", "12")`). `None` unless the whole text is letters
/// followed by digits with both parts nonempty.
pub fn split_cell_ident(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    if i == 0 || i == bytes.len() {
        return None;
    }
    if !bytes[i..].iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((&text[..i], &text[i..]))
}

/// Whole text is column letters.
pub fn is_column_ident(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Strip the preserved quotes from a sheet-name identifier
/// (`"'My Sheet'"` → `"My Sheet"`, `''` un-escaped).
pub fn unquote_sheet_name(text: &str) -> String {
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        text[1..text.len() - 1].replace("''", "'")
    } else {
        text.to_string()
    }
}

/// Whether a sheet name must be single-quoted when formatted.
pub fn sheet_name_needs_quoting(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    if name.as_bytes()[0].is_ascii_digit() {
        return true;
    }
    !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80)
}

/// Whether a structured-reference column name needs the double-bracket
/// escaped form.
pub fn column_name_needs_escaping(name: &str) -> bool {
    name.is_empty()
        || name
            .bytes()
            .any(|b| matches!(b, b' ' | b'[' | b']' | b'#' | b'@' | b',' | b':' | b'='))
}
