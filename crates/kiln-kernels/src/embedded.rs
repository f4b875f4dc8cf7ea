//! Process-wide registry of code objects compiled into the binary.
//!
//! Populated once at startup (typically from generated `include_bytes!`
//! tables) and read-only afterwards.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::KernelError;
use crate::Result;

static EMBEDDED: OnceLock<EmbeddedCodeObjects> = OnceLock::new();

/// Code-object blobs grouped by key (e.g. an architecture or library name).
#[derive(Debug, Default)]
pub struct EmbeddedCodeObjects {
    entries: BTreeMap<String, Vec<&'static [u8]>>,
}

impl EmbeddedCodeObjects {
    pub fn builder() -> EmbeddedBuilder {
        EmbeddedBuilder::default()
    }

    /// Blobs registered under `key`, in registration order.
    pub fn get(&self, key: &str) -> &[&'static [u8]] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every blob, ordered by key then registration order.
    pub fn all(&self) -> impl Iterator<Item = (&str, &'static [u8])> + '_ {
        self.entries
            .iter()
            .flat_map(|(k, blobs)| blobs.iter().map(move |b| (k.as_str(), *b)))
    }

    /// Blobs for `key`, or every blob when `key` is None.
    pub fn select(&self, key: Option<&str>) -> Vec<(&str, &'static [u8])> {
        match key {
            Some(k) => match self.entries.get_key_value(k) {
                Some((key, blobs)) => blobs.iter().map(|b| (key.as_str(), *b)).collect(),
                None => Vec::new(),
            },
            None => self.all().collect(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct EmbeddedBuilder {
    entries: BTreeMap<String, Vec<&'static [u8]>>,
}

impl EmbeddedBuilder {
    pub fn add(mut self, key: impl Into<String>, blob: &'static [u8]) -> Self {
        self.entries.entry(key.into()).or_default().push(blob);
        self
    }

    pub fn build(self) -> EmbeddedCodeObjects {
        EmbeddedCodeObjects {
            entries: self.entries,
        }
    }
}

/// Install the process-wide registry. Must run before the first call to
/// `embedded()`; a second registration fails.
pub fn register_embedded(registry: EmbeddedCodeObjects) -> Result<()> {
    let count = registry.len();
    EMBEDDED
        .set(registry)
        .map_err(|_| KernelError::EmbeddedAlreadyInitialized)?;
    tracing::info!("registered {} embedded code objects", count);
    Ok(())
}

/// The process-wide registry (empty if nothing was registered).
pub fn embedded() -> &'static EmbeddedCodeObjects {
    EMBEDDED.get_or_init(EmbeddedCodeObjects::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    static A0: &[u8] = b"a0";
    static A1: &[u8] = b"a1";
    static B0: &[u8] = b"b0";

    fn sample() -> EmbeddedCodeObjects {
        EmbeddedCodeObjects::builder()
            .add("gfx90a", A0)
            .add("gfx942", B0)
            .add("gfx90a", A1)
            .build()
    }

    #[test]
    fn test_get_by_key() {
        let reg = sample();
        assert_eq!(reg.get("gfx90a"), &[A0, A1]);
        assert_eq!(reg.get("gfx942"), &[B0]);
        assert!(reg.get("gfx1100").is_empty());
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_select() {
        let reg = sample();
        let all: Vec<_> = reg.select(None).into_iter().map(|(_, b)| b).collect();
        assert_eq!(all, vec![A0, A1, B0]);
        let one = reg.select(Some("gfx942"));
        assert_eq!(one, vec![("gfx942", B0)]);
        assert_eq!(reg.keys().collect::<Vec<_>>(), vec!["gfx90a", "gfx942"]);
    }
}
