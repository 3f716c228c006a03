use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{CounterError, CounterStore, INITIAL_COUNTER};

/// All counters in one CBOR map, rewritten through a temp file + rename on
/// every `put`.
pub struct FileCounterStore {
    path: PathBuf,
    values: BTreeMap<String, u32>,
}

impl FileCounterStore {
    pub fn open(path: PathBuf) -> Result<Self, CounterError> {
        let values = if path.exists() {
            let bytes = std::fs::read(&path)?;
            ciborium::from_reader(bytes.as_slice())
                .map_err(|e| CounterError::Serialization(e.to_string()))?
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), count = values.len(), "Counter store loaded");
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn persist(&self, values: &BTreeMap<String, u32>) -> Result<(), CounterError> {
        let mut buf = Vec::new();
        ciborium::into_writer(values, &mut buf)
            .map_err(|e| CounterError::Serialization(e.to_string()))?;

        crate::persist::write_atomic(&self.path, &buf)?;
        Ok(())
    }
}

impl CounterStore for FileCounterStore {
    fn get(&self, key: &str) -> Result<u32, CounterError> {
        Ok(self.values.get(key).copied().unwrap_or(INITIAL_COUNTER))
    }

    fn put(&mut self, key: &str, value: u32) -> Result<(), CounterError> {
        // Persist a copy first so a failed write leaves memory and disk agreeing.
        let mut next = self.values.clone();
        next.insert(key.to_string(), value);
        self.persist(&next)?;
        self.values = next;
        Ok(())
    }
}
