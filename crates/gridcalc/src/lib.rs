//! Meta crate that re-exports the gridcalc building blocks with sensible
//! defaults. Depend on this crate and opt into layers via features, or
//! reach into the underlying crates directly for deeper integration.

pub use gridcalc_common as common;
pub use gridcalc_parse as parse;

#[cfg(feature = "eval")]
pub use gridcalc_eval as eval;

pub use gridcalc_common::{CellError, CellValue, Coord, ErrorKind, SerializedValue};
pub use gridcalc_parse::{Expr, ExprKind, format, parse as parse_formula};

#[cfg(feature = "eval")]
pub use gridcalc_eval::{CellAddr, Engine, EngineConfig, EngineError, EngineEvent, SheetAddr};
