//! Deduplicating name cache for the deserialization path.

use std::collections::HashSet;
use std::sync::Arc;

use crate::capture::Name;

/// Hands out one shared allocation per distinct name
#[derive(Debug, Default)]
pub struct NameInterner {
    names: HashSet<Arc<str>>,
}

impl NameInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Name {
        if let Some(existing) = self.names.get(name) {
            return Name::Shared(existing.clone());
        }
        let shared: Arc<str> = Arc::from(name);
        self.names.insert(shared.clone());
        Name::Shared(shared)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
