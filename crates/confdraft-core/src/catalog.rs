// Read-only catalog of draftable resource names.

use std::collections::HashMap;

use crate::draft::DraftError;

/// Lookup key for a resource name: trimmed, inner whitespace collapsed to a
/// single space, lowercased.
pub fn resource_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The immutable set of resources a draft allocates, in the order the
/// provider supplied them.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    names: Vec<String>,
    by_key: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog from canonical names. Names that collapse to the same
    /// key as an earlier entry are dropped so lookups stay unambiguous.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Catalog::default();
        for name in names {
            let name = name.into();
            let key = resource_key(&name);
            if key.is_empty() || catalog.by_key.contains_key(&key) {
                continue;
            }
            catalog.by_key.insert(key, catalog.names.len());
            catalog.names.push(name);
        }
        catalog
    }

    /// Parse a catalog from a JSON array of name strings.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let names: Vec<String> = serde_json::from_str(text)?;
        Ok(Catalog::new(names))
    }

    /// Resolve user input to the canonical resource name.
    pub fn normalize(&self, name: &str) -> Result<&str, DraftError> {
        self.by_key
            .get(&resource_key(name))
            .map(|&idx| self.names[idx].as_str())
            .ok_or_else(|| DraftError::UnknownResource(name.trim().to_string()))
    }

    /// All canonical names in catalog order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
