use crate::store::NodeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Caches owned by a single run. A fresh context is created for every run,
/// so nothing leaks between runs or between engines sharing a store.
#[derive(Debug, Default)]
pub struct RunContext {
    modules: HashMap<String, NodeId>,
    symbols: HashMap<String, NodeId>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&self, name: &str) -> Option<&NodeId> {
        self.modules.get(name)
    }

    pub fn remember_module(&mut self, name: &str, id: NodeId) {
        self.modules.insert(name.to_string(), id);
    }

    pub fn symbol(&self, symbol: &str) -> Option<&NodeId> {
        self.symbols.get(symbol)
    }

    pub fn remember_symbol(&mut self, symbol: &str, id: NodeId) {
        self.symbols.insert(symbol.to_string(), id);
    }
}

/// Cooperative cancellation, checked by the engine between files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
