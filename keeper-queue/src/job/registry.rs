use std::collections::HashMap;
use std::sync::Arc;

use crate::{job::JobHandler, QueueError, QueueResult};

/// Job type -> handler table used for runtime dispatch
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    /// Create a new job registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler; a job type can only be registered once
    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) -> QueueResult<()> {
        let job_type = job_type.into();

        if self.handlers.contains_key(&job_type) {
            return Err(QueueError::HandlerAlreadyRegistered(job_type));
        }

        self.handlers.insert(job_type, handler);
        Ok(())
    }

    /// Look up the handler for a job type
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// Check if a job type is registered
    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Get all registered job types, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}
