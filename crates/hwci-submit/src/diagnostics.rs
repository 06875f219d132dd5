//! Structured diagnostics for post-mortem inspection.
//!
//! An explicit sink passed down to the controller instead of a mutable
//! module-level record. Fields are recorded pass or fail: attempt counts,
//! fail reasons, per-phase timestamps, device assignment.

use serde_json::Value;

pub trait DiagnosticsSink {
    fn record(&mut self, key: &str, value: Value);
    /// Open a record for a new job attempt; returns its index.
    fn append_job(&mut self) -> usize;
    fn update_job(&mut self, index: usize, key: &str, value: Value);
}

/// In-memory, insertion-ordered sink; the default implementation.
#[derive(Debug, Default)]
pub struct MemorySink {
    fields: Vec<(String, Value)>,
    jobs: Vec<Vec<(String, Value)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn job_field(&self, index: usize, key: &str) -> Option<&Value> {
        self.jobs
            .get(index)?
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Render the whole record as one JSON value.
    pub fn snapshot(&self) -> Value {
        let mut root = serde_json::Map::new();
        for (key, value) in &self.fields {
            root.insert(key.clone(), value.clone());
        }
        let jobs: Vec<Value> = self
            .jobs
            .iter()
            .map(|job| {
                let mut map = serde_json::Map::new();
                for (key, value) in job {
                    map.insert(key.clone(), value.clone());
                }
                Value::Object(map)
            })
            .collect();
        root.insert("jobs".to_string(), Value::Array(jobs));
        Value::Object(root)
    }
}

fn upsert(entries: &mut Vec<(String, Value)>, key: &str, value: Value) {
    if let Some(entry) = entries.iter_mut().find(|(k, _)| k == key) {
        entry.1 = value;
    } else {
        entries.push((key.to_string(), value));
    }
}

impl DiagnosticsSink for MemorySink {
    fn record(&mut self, key: &str, value: Value) {
        upsert(&mut self.fields, key, value);
    }

    fn append_job(&mut self) -> usize {
        self.jobs.push(Vec::new());
        self.jobs.len() - 1
    }

    fn update_job(&mut self, index: usize, key: &str, value: Value) {
        if let Some(job) = self.jobs.get_mut(index) {
            upsert(job, key, value);
        }
    }
}
