//! Text functions. These are strict about types: numbers and booleans do
//! not coerce to text, and count arguments must be whole non-negative
//! numbers.

use gridcalc_common::{CellError, CellValue, ErrorKind};

use crate::function::{ArgumentHandle, FnCaps, FnCtx, Function};
use crate::result::EvalResult;

fn strict_text(v: &CellValue) -> Result<&str, CellError> {
    match v {
        CellValue::Text(s) => Ok(s),
        CellValue::Error(e) => Err(e.clone()),
        other => Err(CellError::new(ErrorKind::Value)
            .with_message(format!("expected a string, got {}", other.type_name()))),
    }
}

fn strict_count(v: &CellValue, default: usize) -> Result<usize, CellError> {
    match v {
        CellValue::Empty => Ok(default),
        CellValue::Number(n) => {
            if n.fract() != 0.0 || *n < 0.0 || !n.is_finite() {
                Err(CellError::new(ErrorKind::Value)
                    .with_message(format!("invalid count {n}")))
            } else {
                Ok(*n as usize)
            }
        }
        CellValue::Error(e) => Err(e.clone()),
        other => Err(CellError::new(ErrorKind::Value)
            .with_message(format!("expected a number, got {}", other.type_name()))),
    }
}

/// Run an elementwise two-argument text kernel, broadcasting over spilled
/// arguments.
fn elementwise2<'a, 'e>(
    args: &[ArgumentHandle<'a, 'e>],
    cx: &FnCtx<'a, 'e>,
    kernel: &dyn Fn(&CellValue, &CellValue) -> CellValue,
) -> EvalResult {
    let a = match args.first() {
        Some(a) => a.result(),
        None => EvalResult::Value(CellValue::Empty),
    };
    if let EvalResult::Error(e) = a {
        return EvalResult::Error(e);
    }
    let b = match args.get(1) {
        Some(b) => b.result(),
        None => EvalResult::Value(CellValue::Empty),
    };
    if let EvalResult::Error(e) = b {
        return EvalResult::Error(e);
    }
    match (a, b) {
        (EvalResult::Value(x), EvalResult::Value(y)) => EvalResult::from_value(kernel(&x, &y)),
        (a, b) => cx.broadcast2(a, b, kernel),
    }
}

#[derive(Debug)]
pub struct LeftFn;

impl Function for LeftFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ELEMENTWISE
    }

    fn name(&self) -> &'static str {
        "LEFT"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        elementwise2(args, cx, &|text, count| {
            let s = match strict_text(text) {
                Ok(s) => s,
                Err(e) => return CellValue::Error(e),
            };
            let n = match strict_count(count, 1) {
                Ok(n) => n,
                Err(e) => return CellValue::Error(e),
            };
            CellValue::Text(s.chars().take(n).collect())
        })
    }
}

#[derive(Debug)]
pub struct RightFn;

impl Function for RightFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ELEMENTWISE
    }

    fn name(&self) -> &'static str {
        "RIGHT"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        elementwise2(args, cx, &|text, count| {
            let s = match strict_text(text) {
                Ok(s) => s,
                Err(e) => return CellValue::Error(e),
            };
            let n = match strict_count(count, 1) {
                Ok(n) => n,
                Err(e) => return CellValue::Error(e),
            };
            let chars: Vec<char> = s.chars().collect();
            let start = chars.len().saturating_sub(n);
            CellValue::Text(chars[start..].iter().collect())
        })
    }
}

#[derive(Debug)]
pub struct LenFn;

impl Function for LenFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ELEMENTWISE
    }

    fn name(&self) -> &'static str {
        "LEN"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        elementwise2(args, cx, &|text, _| match strict_text(text) {
            Ok(s) => CellValue::Number(s.chars().count() as f64),
            Err(e) => CellValue::Error(e),
        })
    }
}

#[derive(Debug)]
pub struct FindFn;

impl Function for FindFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE
    }

    fn name(&self) -> &'static str {
        "FIND"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], _cx: &FnCtx<'a, 'e>) -> EvalResult {
        let needle_v = args[0].value();
        let needle = match strict_text(&needle_v) {
            Ok(s) => s.to_string(),
            Err(e) => return EvalResult::Error(e),
        };
        let hay_v = args[1].value();
        let hay = match strict_text(&hay_v) {
            Ok(s) => s.to_string(),
            Err(e) => return EvalResult::Error(e),
        };
        let start = match args.get(2) {
            None => 1usize,
            Some(a) => match strict_count(&a.value(), 1) {
                Ok(n) if n >= 1 => n,
                Ok(_) => {
                    return EvalResult::Error(
                        CellError::new(ErrorKind::Value)
                            .with_message("start position must be at least 1"),
                    );
                }
                Err(e) => return EvalResult::Error(e),
            },
        };

        let hay_chars: Vec<char> = hay.chars().collect();
        if start > hay_chars.len() + 1 {
            return EvalResult::Error(
                CellError::new(ErrorKind::Value).with_message("start position past end of text"),
            );
        }
        let needle_chars: Vec<char> = needle.chars().collect();
        let from = start - 1;
        if needle_chars.is_empty() {
            return EvalResult::Value(CellValue::Number(start as f64));
        }
        if from + needle_chars.len() <= hay_chars.len() {
            for i in from..=(hay_chars.len() - needle_chars.len()) {
                if hay_chars[i..i + needle_chars.len()] == needle_chars[..] {
                    return EvalResult::Value(CellValue::Number((i + 1) as f64));
                }
            }
        }
        EvalResult::Error(
            CellError::new(ErrorKind::Value).with_message(format!("{needle:?} not found")),
        )
    }
}

#[derive(Debug)]
pub struct MidFn;

impl Function for MidFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ELEMENTWISE
    }

    fn name(&self) -> &'static str {
        "MID"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], _cx: &FnCtx<'a, 'e>) -> EvalResult {
        let text_v = args[0].value();
        let s = match strict_text(&text_v) {
            Ok(s) => s.to_string(),
            Err(e) => return EvalResult::Error(e),
        };
        let start = match strict_count(&args[1].value(), 1) {
            Ok(n) if n >= 1 => n,
            Ok(_) => {
                return EvalResult::Error(
                    CellError::new(ErrorKind::Value)
                        .with_message("start position must be at least 1"),
                );
            }
            Err(e) => return EvalResult::Error(e),
        };
        let len = match strict_count(&args[2].value(), 0) {
            Ok(n) => n,
            Err(e) => return EvalResult::Error(e),
        };
        let out: String = s.chars().skip(start - 1).take(len).collect();
        EvalResult::Value(CellValue::Text(out))
    }
}

/// One-argument strict-text kernels share a wrapper that broadcasts over
/// spilled arguments.
#[derive(Debug)]
struct TextMapFn {
    name: &'static str,
    apply: fn(&str) -> String,
}

impl Function for TextMapFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ELEMENTWISE
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval<'a, 'e>(&self, args: &[ArgumentHandle<'a, 'e>], cx: &FnCtx<'a, 'e>) -> EvalResult {
        let apply = self.apply;
        elementwise2(args, cx, &move |text, _| match strict_text(text) {
            Ok(s) => CellValue::Text(apply(s)),
            Err(e) => CellValue::Error(e),
        })
    }
}

/// Leading and trailing spaces removed, internal runs collapsed to one.
fn trim_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for part in s.split(' ').filter(|p| !p.is_empty()) {
        if pending_space {
            out.push(' ');
        }
        out.push_str(part);
        pending_space = true;
    }
    out
}

pub fn register_builtins() {
    use std::sync::Arc;
    crate::function_registry::register_function(Arc::new(LeftFn));
    crate::function_registry::register_function(Arc::new(RightFn));
    crate::function_registry::register_function(Arc::new(LenFn));
    crate::function_registry::register_function(Arc::new(FindFn));
    crate::function_registry::register_function(Arc::new(MidFn));
    crate::function_registry::register_function(Arc::new(TextMapFn {
        name: "TRIM",
        apply: trim_spaces,
    }));
    crate::function_registry::register_function(Arc::new(TextMapFn {
        name: "UPPER",
        apply: |s| s.to_uppercase(),
    }));
    crate::function_registry::register_function(Arc::new(TextMapFn {
        name: "LOWER",
        apply: |s| s.to_lowercase(),
    }));
}

#[cfg(test)]
mod tests {
    use crate::test_support::Harness;
    use gridcalc_common::{CellValue, ErrorKind};

    fn err_kind(v: CellValue) -> Option<ErrorKind> {
        match v {
            CellValue::Error(e) => Some(e.kind),
            _ => None,
        }
    }

    #[test]
    fn left_contract() {
        let mut h = Harness::new();
        assert_eq!(h.eval("=LEFT(\"Hello\",2)"), CellValue::from("He"));
        assert_eq!(h.eval("=LEFT(\"Hello\")"), CellValue::from("H"));
        assert_eq!(h.eval("=LEFT(\"Hello\",0)"), CellValue::from(""));
        assert_eq!(h.eval("=LEFT(\"Hello\",999999)"), CellValue::from("Hello"));
        assert_eq!(
            err_kind(h.eval("=LEFT(\"Hello\",-1)")),
            Some(ErrorKind::Value)
        );
        assert_eq!(
            err_kind(h.eval("=LEFT(\"Hello\",1.5)")),
            Some(ErrorKind::Value)
        );
        // strict typing: no number-to-text coercion
        assert_eq!(err_kind(h.eval("=LEFT(123,1)")), Some(ErrorKind::Value));
    }

    #[test]
    fn left_broadcasts_elementwise() {
        let mut h = Harness::new();
        h.set("A1", "apple");
        h.set("A2", "banana");
        assert_eq!(h.eval("=INDEX(LEFT(A1:A2,3),2,1)"), CellValue::from("ban"));
    }

    #[test]
    fn right_and_len() {
        let mut h = Harness::new();
        assert_eq!(h.eval("=RIGHT(\"Hello\",3)"), CellValue::from("llo"));
        assert_eq!(h.eval("=LEN(\"Hello\")"), CellValue::Number(5.0));
        assert_eq!(err_kind(h.eval("=LEN(5)")), Some(ErrorKind::Value));
    }

    #[test]
    fn mid_trim_case() {
        let mut h = Harness::new();
        assert_eq!(h.eval("=MID(\"spreadsheet\",7,5)"), CellValue::from("sheet"));
        assert_eq!(h.eval("=MID(\"abc\",2,99)"), CellValue::from("bc"));
        assert_eq!(h.eval("=MID(\"abc\",9,2)"), CellValue::from(""));
        assert_eq!(
            err_kind(h.eval("=MID(\"abc\",0,2)")),
            Some(ErrorKind::Value)
        );
        assert_eq!(
            h.eval("=TRIM(\"  a   b  \")"),
            CellValue::from("a b")
        );
        assert_eq!(h.eval("=UPPER(\"gRid\")"), CellValue::from("GRID"));
        assert_eq!(h.eval("=LOWER(\"GRID\")"), CellValue::from("grid"));
        assert_eq!(err_kind(h.eval("=UPPER(5)")), Some(ErrorKind::Value));
    }

    #[test]
    fn find_scenario() {
        let mut h = Harness::new();
        h.set("A1", "apple,banana,cherry");
        assert_eq!(
            h.eval("=LEFT(A1,FIND(\",\",A1)-1)"),
            CellValue::from("apple")
        );
        assert_eq!(h.eval("=FIND(\"an\",\"banana\")"), CellValue::Number(2.0));
        assert_eq!(h.eval("=FIND(\"an\",\"banana\",3)"), CellValue::Number(4.0));
        assert_eq!(
            err_kind(h.eval("=FIND(\"z\",\"banana\")")),
            Some(ErrorKind::Value)
        );
    }
}
