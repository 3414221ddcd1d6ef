//! Built-in function bodies.

pub mod dynamic;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod text;
mod utils;

pub fn register_all() {
    math::register_builtins();
    text::register_builtins();
    lookup::register_builtins();
    dynamic::register_builtins();
    logical::register_builtins();
}
