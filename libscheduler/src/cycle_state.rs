use std::{any::Any, collections::HashMap};

/// Scratch state private to one pod's scheduling attempt.
///
/// PreFilter hooks write computed data here; downstream Filter/Score/Bind
/// hooks of the same cycle read it back. The host destroys the state at the
/// end of the cycle, so nothing written here outlives one attempt.
#[derive(Default)]
pub struct CycleState {
    storage: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl CycleState {
    pub fn read<T: 'static>(&self, key: &str) -> Option<&T> {
        self.storage.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn write(&mut self, key: &str, value: Box<dyn Any + Send + Sync>) {
        self.storage.insert(key.to_string(), value);
    }
}
