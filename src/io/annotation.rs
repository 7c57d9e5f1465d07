//! Gene annotation lookup (id -> symbol, description)

use std::collections::HashMap;
use std::path::Path;

use crate::error::{DexError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEntry {
    pub symbol: String,
    pub description: Option<String>,
}

/// Mapping from gene or probeset id to its annotation
#[derive(Debug, Clone, Default)]
pub struct GeneAnnotation {
    entries: HashMap<String, AnnotationEntry>,
}

impl GeneAnnotation {
    pub fn insert(&mut self, id: &str, entry: AnnotationEntry) {
        self.entries.insert(id.to_string(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&AnnotationEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Translate ids to symbols, keeping ids without an annotation
    pub fn symbols_for(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .map(|id| self.get(id).map(|e| e.symbol.clone()).unwrap_or_else(|| id.clone()))
            .collect()
    }
}

/// Read an annotation table with columns `id, symbol[, description]`.
/// The first row is a header; rows with an empty symbol are skipped.
pub fn read_annotation<P: AsRef<Path>>(path: P) -> Result<GeneAnnotation> {
    let path = path.as_ref();
    let mut reader = super::csv::delimited_reader(path)?;

    let mut annotation = GeneAnnotation::default();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let id = record.get(0).unwrap_or("").trim();
        let symbol = record.get(1).unwrap_or("").trim();
        if id.is_empty() {
            return Err(DexError::ImportFailed {
                path: path.display().to_string(),
                reason: format!("empty id on data line {}", line + 1),
            });
        }
        if symbol.is_empty() || symbol == "NA" {
            continue;
        }
        let description = record
            .get(2)
            .map(str::trim)
            .filter(|d| !d.is_empty() && *d != "NA")
            .map(String::from);
        annotation.insert(
            id,
            AnnotationEntry {
                symbol: symbol.to_string(),
                description,
            },
        );
    }
    log::info!("read {} annotation entries from {}", annotation.len(), path.display());
    Ok(annotation)
}
