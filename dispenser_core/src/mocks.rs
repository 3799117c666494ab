//! Test and helper mocks for dispenser_core

use std::sync::{Arc, Mutex};

use crate::router::Publisher;

/// Publisher that records every message in memory. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    sent: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Published messages on `topic`, decoded as JSON.
    pub fn json_on(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .filter_map(|(_, body)| serde_json::from_slice(&body).ok())
            .collect()
    }
}

impl Publisher for MemoryPublisher {
    fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sent
            .lock()
            .map_err(|_| std::io::Error::other("publisher poisoned"))?
            .push((topic.to_string(), payload));
        Ok(())
    }
}

/// Publisher whose broker is always unreachable.
pub struct OfflinePublisher;

impl Publisher for OfflinePublisher {
    fn publish(
        &mut self,
        _topic: &str,
        _payload: Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("broker offline")))
    }
}
