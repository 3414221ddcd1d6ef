pub mod builtins;
pub mod engine;
pub mod function;
pub mod function_registry;
pub mod interpreter;
pub mod result;

pub use engine::{
    CellAddr, Engine, EngineConfig, EngineError, EngineEvent, SheetAddr, SubscriptionId,
    TableDesc,
};
pub use function::{ArgumentHandle, FnCaps, FnCtx, Function};
pub use result::{EvalResult, SpillResult, SpillSource};

#[cfg(test)]
pub(crate) mod test_support;
