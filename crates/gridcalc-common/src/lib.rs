pub mod arith;
pub mod coord;
pub mod error;
pub mod range;
pub mod value;

pub use coord::{AbsFlags, Coord};
pub use error::{CellError, ErrorKind};
pub use range::{AxisEnd, FiniteRange, SheetRange};
pub use value::{CellValue, SerializedValue, Sign};
