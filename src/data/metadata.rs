//! Sample sheet: the sample-to-condition mapping table

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DexError, Result};

/// One row of an inline sample table, as written in a JSON config:
/// `{"sample": "s1", "condition": "treated", "path": "s1/quant.sf"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSpec {
    pub sample: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub attributes: HashMap<String, String>,
}

/// Ordered sample identifiers with categorical annotations and optional
/// per-sample input file paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSheet {
    sample_ids: Vec<String>,
    /// Column name -> value per sample
    columns: HashMap<String, Vec<String>>,
    /// Column names in insertion order
    column_order: Vec<String>,
    paths: Vec<Option<PathBuf>>,
}

impl SampleSheet {
    pub fn new(sample_ids: Vec<String>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for id in &sample_ids {
            if !seen.insert(id) {
                return Err(DexError::InvalidSampleSheet {
                    reason: format!("Duplicate sample ID '{}'", id),
                });
            }
        }
        let n = sample_ids.len();
        Ok(Self {
            sample_ids,
            columns: HashMap::new(),
            column_order: Vec::new(),
            paths: vec![None; n],
        })
    }

    /// Build a sheet from inline sample specifications
    pub fn from_specs(specs: &[SampleSpec]) -> Result<Self> {
        if specs.is_empty() {
            return Err(DexError::EmptyData {
                reason: "Sample table is empty".to_string(),
            });
        }
        let ids = specs.iter().map(|s| s.sample.clone()).collect();
        let mut sheet = Self::new(ids)?;

        let mut names: Vec<&String> = specs[0].attributes.keys().collect();
        names.sort();
        for name in names {
            let values: Option<Vec<String>> = specs.iter().map(|s| s.attributes.get(name).cloned()).collect();
            let values = values.ok_or_else(|| DexError::InvalidSampleSheet {
                reason: format!("Column '{}' is missing for some samples", name),
            })?;
            sheet.add_column(name, values)?;
        }
        for (i, spec) in specs.iter().enumerate() {
            sheet.paths[i] = spec.path.clone();
        }
        Ok(sheet)
    }

    pub fn add_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(DexError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        if !self.columns.contains_key(name) {
            self.column_order.push(name.to_string());
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    pub fn set_paths(&mut self, paths: Vec<Option<PathBuf>>) -> Result<()> {
        if paths.len() != self.sample_ids.len() {
            return Err(DexError::DimensionMismatch {
                expected: format!("{} paths", self.sample_ids.len()),
                got: format!("{} paths", paths.len()),
            });
        }
        self.paths = paths;
        Ok(())
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    /// Column names in the order they were added
    pub fn column_names(&self) -> &[String] {
        &self.column_order
    }

    pub fn path(&self, sample_idx: usize) -> Option<&Path> {
        self.paths.get(sample_idx).and_then(|p| p.as_deref())
    }

    /// Unique levels of a column in order of first appearance
    pub fn levels(&self, name: &str) -> Result<Vec<String>> {
        let values = self.column(name).ok_or_else(|| DexError::InvalidSampleSheet {
            reason: format!("Column '{}' not found in sample sheet", name),
        })?;
        let mut levels: Vec<String> = Vec::new();
        for v in values {
            if !levels.contains(v) {
                levels.push(v.clone());
            }
        }
        Ok(levels)
    }

    pub fn samples_with_level(&self, name: &str, level: &str) -> Vec<usize> {
        self.column(name)
            .map(|values| {
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.as_str() == level)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reorder the rows to follow `ids`; every id must be present
    pub fn reorder_to(&self, ids: &[String]) -> Result<Self> {
        let index: HashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        let order: Vec<usize> = ids
            .iter()
            .map(|id| {
                index.get(id.as_str()).copied().ok_or_else(|| DexError::InvalidSampleSheet {
                    reason: format!("Sample '{}' is not in the sample sheet", id),
                })
            })
            .collect::<Result<_>>()?;

        let mut out = Self::new(ids.to_vec())?;
        for name in &self.column_order {
            let values = &self.columns[name];
            out.add_column(name, order.iter().map(|&i| values[i].clone()).collect())?;
        }
        out.paths = order.iter().map(|&i| self.paths[i].clone()).collect();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> SampleSheet {
        let mut s = SampleSheet::new(vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()]).unwrap();
        s.add_column(
            "condition",
            vec!["control".into(), "control".into(), "treated".into(), "treated".into()],
        )
        .unwrap();
        s
    }

    #[test]
    fn test_levels_and_membership() {
        let s = sheet();
        assert_eq!(s.levels("condition").unwrap(), vec!["control", "treated"]);
        assert_eq!(s.samples_with_level("condition", "treated"), vec![2, 3]);
        assert!(s.levels("batch").is_err());
    }

    #[test]
    fn test_levels_follow_sheet_order() {
        let mut s = SampleSheet::new(vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()]).unwrap();
        s.add_column("genotype", vec!["wt".into(), "wt".into(), "ko".into(), "ko".into()])
            .unwrap();
        assert_eq!(s.levels("genotype").unwrap(), vec!["wt", "ko"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        assert!(SampleSheet::new(vec!["a".into(), "a".into()]).is_err());
    }

    #[test]
    fn test_reorder_to() {
        let s = sheet();
        let r = s
            .reorder_to(&["s3".to_string(), "s1".to_string(), "s4".to_string(), "s2".to_string()])
            .unwrap();
        assert_eq!(r.column("condition").unwrap(), &["treated", "control", "treated", "control"]);
        assert!(s.reorder_to(&["s9".to_string()]).is_err());
    }

    #[test]
    fn test_from_specs_json() {
        let json = r#"[
            {"sample": "a", "condition": "ctl", "path": "a/quant.sf"},
            {"sample": "b", "condition": "trt"}
        ]"#;
        let specs: Vec<SampleSpec> = serde_json::from_str(json).unwrap();
        let s = SampleSheet::from_specs(&specs).unwrap();
        assert_eq!(s.column("condition").unwrap(), &["ctl", "trt"]);
        assert_eq!(s.path(0), Some(Path::new("a/quant.sf")));
        assert_eq!(s.path(1), None);
    }
}
