use crate::function::Function;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

// Case-insensitive registry keyed by uppercased name.
static REG: Lazy<DashMap<String, Arc<dyn Function>>> = Lazy::new(DashMap::new);

#[inline]
fn norm<S: AsRef<str>>(s: S) -> String {
    s.as_ref().to_uppercase()
}

pub fn register_function(f: Arc<dyn Function>) {
    REG.insert(norm(f.name()), f);
}

pub fn get(name: &str) -> Option<Arc<dyn Function>> {
    REG.get(&norm(name)).map(|v| Arc::clone(v.value()))
}

/// Register every builtin exactly once; cheap to call repeatedly.
pub fn ensure_builtins() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(crate::builtins::register_all);
}
