//! Raw probe-level microarray intensities, one text file per array

use std::path::{Path, PathBuf};

use ndarray::Array2;

use super::csv::delimited_reader;
use crate::data::SampleSheet;
use crate::error::{DexError, Result};

/// Probe x array intensity matrix with the probeset of each probe
#[derive(Debug, Clone)]
pub struct RawIntensities {
    pub probe_ids: Vec<String>,
    pub probeset_ids: Vec<String>,
    pub sample_ids: Vec<String>,
    pub values: Array2<f64>,
}

impl RawIntensities {
    pub fn n_probes(&self) -> usize {
        self.probe_ids.len()
    }

    pub fn n_arrays(&self) -> usize {
        self.sample_ids.len()
    }

    /// Distinct probesets in order of first appearance, with their probe rows
    pub fn probesets(&self) -> Vec<(String, Vec<usize>)> {
        let mut index = std::collections::HashMap::new();
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (row, id) in self.probeset_ids.iter().enumerate() {
            let g = *index.entry(id.as_str()).or_insert_with(|| {
                groups.push((id.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[g].1.push(row);
        }
        groups
    }
}

struct ArrayFile {
    probe_ids: Vec<String>,
    probeset_ids: Vec<String>,
    intensities: Vec<f64>,
}

fn read_array_file(path: &Path) -> Result<ArrayFile> {
    let fail = |reason: String| DexError::ImportFailed {
        path: path.display().to_string(),
        reason,
    };
    let mut reader = delimited_reader(path)?;
    let header = reader.headers()?.clone();
    let col = |name: &str| {
        header
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| fail(format!("missing column '{}'", name)))
    };
    let (probe_col, set_col, value_col) = (col("probe_id")?, col("probeset_id")?, col("intensity")?);

    let mut file = ArrayFile {
        probe_ids: Vec::new(),
        probeset_ids: Vec::new(),
        intensities: Vec::new(),
    };
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let raw = record.get(value_col).unwrap_or("");
        let value = raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| fail(format!("intensity '{}' on data line {} is not positive", raw, line + 1)))?;
        file.probe_ids.push(record.get(probe_col).unwrap_or("").to_string());
        file.probeset_ids.push(record.get(set_col).unwrap_or("").to_string());
        file.intensities.push(value);
    }
    if file.intensities.is_empty() {
        return Err(fail("no probes".to_string()));
    }
    Ok(file)
}

/// Intensity file for sample `i`: the sheet path, else `<dir>/<sample>.txt`,
/// `.tsv` or `.csv`
pub fn locate_intensity_file(sheet: &SampleSheet, i: usize, data_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = sheet.path(i) {
        return Ok(p.to_path_buf());
    }
    let sample = &sheet.sample_ids()[i];
    let dir = data_dir.ok_or_else(|| DexError::InvalidSampleSheet {
        reason: format!("No data path for sample '{}' and no data directory given", sample),
    })?;
    ["txt", "tsv", "csv"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", sample, ext)))
        .find(|p| p.is_file())
        .ok_or_else(|| DexError::ImportFailed {
            path: dir.display().to_string(),
            reason: format!("no intensity file found for sample '{}'", sample),
        })
}

/// Read one intensity file per sample. Every file must list the same probes
/// in the same order.
pub fn read_intensities(sheet: &SampleSheet, data_dir: Option<&Path>) -> Result<RawIntensities> {
    let mut files: Vec<ArrayFile> = Vec::with_capacity(sheet.n_samples());
    for i in 0..sheet.n_samples() {
        let path = locate_intensity_file(sheet, i, data_dir)?;
        let file = read_array_file(&path)?;
        if let Some(first) = files.first() {
            if first.probe_ids != file.probe_ids || first.probeset_ids != file.probeset_ids {
                return Err(DexError::ImportFailed {
                    path: path.display().to_string(),
                    reason: "probe layout differs from the first array".to_string(),
                });
            }
        }
        files.push(file);
    }
    if files.is_empty() {
        return Err(DexError::EmptyData {
            reason: "no arrays in sample sheet".to_string(),
        });
    }

    let n_probes = files[0].intensities.len();
    let mut values = Array2::<f64>::zeros((n_probes, files.len()));
    for (s, f) in files.iter().enumerate() {
        for (p, &v) in f.intensities.iter().enumerate() {
            values[[p, s]] = v;
        }
    }
    let first = files.swap_remove(0);
    log::info!("read {} probes on {} arrays", n_probes, sheet.n_samples());
    Ok(RawIntensities {
        probe_ids: first.probe_ids,
        probeset_ids: first.probeset_ids,
        sample_ids: sheet.sample_ids().to_vec(),
        values,
    })
}
