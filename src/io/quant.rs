//! Import of per-sample transcript quantifications (Salmon `quant.sf`,
//! kallisto `abundance.tsv`) and summarisation to genes

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use super::csv::delimited_reader;
use crate::data::{CountMatrix, SampleSheet};
use crate::error::{DexError, Result};

/// Quantifier output format, detected from the header line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantFormat {
    Salmon,
    Kallisto,
}

impl QuantFormat {
    /// Column names for (id, effective length, abundance, counts)
    fn columns(self) -> [&'static str; 4] {
        match self {
            QuantFormat::Salmon => ["Name", "EffectiveLength", "TPM", "NumReads"],
            QuantFormat::Kallisto => ["target_id", "eff_length", "tpm", "est_counts"],
        }
    }

    fn detect(header: &csv::StringRecord) -> Option<Self> {
        let has = |name: &str| header.iter().any(|h| h == name);
        [QuantFormat::Salmon, QuantFormat::Kallisto]
            .into_iter()
            .find(|f| f.columns().iter().all(|c| has(*c)))
    }
}

/// One sample's quantification
#[derive(Debug, Clone)]
pub struct QuantTable {
    pub format: QuantFormat,
    pub ids: Vec<String>,
    pub lengths: Vec<f64>,
    pub abundance: Vec<f64>,
    pub counts: Vec<f64>,
}

fn import_error(path: &Path, reason: String) -> DexError {
    DexError::ImportFailed {
        path: path.display().to_string(),
        reason,
    }
}

/// Read a single Salmon or kallisto output file
pub fn read_quant_file<P: AsRef<Path>>(path: P) -> Result<QuantTable> {
    let path = path.as_ref();
    let mut reader = delimited_reader(path)?;
    let header = reader.headers()?.clone();
    let format = QuantFormat::detect(&header)
        .ok_or_else(|| import_error(path, "header is neither Salmon quant.sf nor kallisto abundance.tsv".into()))?;
    let idx: Vec<usize> = format
        .columns()
        .iter()
        .map(|c| header.iter().position(|h| h == *c).unwrap_or(0))
        .collect();

    let mut table = QuantTable {
        format,
        ids: Vec::new(),
        lengths: Vec::new(),
        abundance: Vec::new(),
        counts: Vec::new(),
    };
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let num = |k: usize| -> Result<f64> {
            let field = record.get(idx[k]).unwrap_or("");
            field
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| import_error(path, format!("bad value '{}' on data line {}", field, line + 1)))
        };
        table.lengths.push(num(1)?);
        table.abundance.push(num(2)?);
        table.counts.push(num(3)?);
        table.ids.push(record.get(idx[0]).unwrap_or("").to_string());
    }
    if table.ids.is_empty() {
        return Err(import_error(path, "no transcripts".into()));
    }
    log::debug!("{:?} file {} with {} transcripts", format, path.display(), table.ids.len());
    Ok(table)
}

/// Find the quantification file for sample `i`: the sheet path if given,
/// else `<dir>/<sample>/quant.sf`, `<dir>/<sample>/abundance.tsv`,
/// `<dir>/<sample>.sf` or `<dir>/<sample>.tsv`
pub fn locate_quant_file(sheet: &SampleSheet, i: usize, quant_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = sheet.path(i) {
        return Ok(p.to_path_buf());
    }
    let sample = &sheet.sample_ids()[i];
    let dir = quant_dir.ok_or_else(|| DexError::InvalidSampleSheet {
        reason: format!("No data path for sample '{}' and no quantification directory given", sample),
    })?;
    let candidates = [
        dir.join(sample).join("quant.sf"),
        dir.join(sample).join("abundance.tsv"),
        dir.join(format!("{}.sf", sample)),
        dir.join(format!("{}.tsv", sample)),
    ];
    candidates
        .iter()
        .find(|c| c.is_file())
        .cloned()
        .ok_or_else(|| import_error(dir, format!("no quantification file found for sample '{}'", sample)))
}

/// Read a two-column transcript-to-gene table (header line required)
pub fn read_tx2gene<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    let mut reader = delimited_reader(path)?;
    let mut map = HashMap::new();
    for record in reader.records() {
        let record = record?;
        match (record.get(0), record.get(1)) {
            (Some(tx), Some(gene)) if !tx.is_empty() && !gene.is_empty() => {
                map.insert(tx.to_string(), gene.to_string());
            }
            _ => return Err(import_error(path, "expected transcript and gene columns".into())),
        }
    }
    if map.is_empty() {
        return Err(import_error(path, "empty tx2gene table".into()));
    }
    Ok(map)
}

/// Feature x sample matrices of counts, abundances and effective lengths
#[derive(Debug, Clone)]
pub struct TxImport {
    pub ids: Vec<String>,
    pub sample_ids: Vec<String>,
    pub counts: Array2<f64>,
    pub abundance: Array2<f64>,
    pub lengths: Array2<f64>,
}

impl TxImport {
    /// Rounded counts for negative binomial modelling
    pub fn count_matrix(&self) -> Result<CountMatrix> {
        Ok(CountMatrix::new(self.counts.clone(), self.ids.clone(), self.sample_ids.clone())?.rounded())
    }

    /// Sum transcripts per gene. Gene length is the abundance-weighted mean
    /// effective length, or the plain mean when the gene has no abundance.
    pub fn summarize_to_gene(&self, tx2gene: &HashMap<String, String>) -> Result<TxImport> {
        let mut gene_order: Vec<String> = Vec::new();
        let mut gene_index: HashMap<&str, usize> = HashMap::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        let mut unmapped = 0;
        for (t, id) in self.ids.iter().enumerate() {
            let Some(gene) = tx2gene.get(id) else {
                unmapped += 1;
                continue;
            };
            let g = *gene_index.entry(gene.as_str()).or_insert_with(|| {
                gene_order.push(gene.clone());
                members.push(Vec::new());
                gene_order.len() - 1
            });
            members[g].push(t);
        }
        if gene_order.is_empty() {
            return Err(DexError::ImportFailed {
                path: "tx2gene".to_string(),
                reason: "none of the transcripts appear in the tx2gene table".to_string(),
            });
        }
        if unmapped > 0 {
            log::warn!("{} transcripts missing from tx2gene were dropped", unmapped);
        }

        let n_samples = self.sample_ids.len();
        let shape = (gene_order.len(), n_samples);
        let mut counts = Array2::<f64>::zeros(shape);
        let mut abundance = Array2::<f64>::zeros(shape);
        let mut lengths = Array2::<f64>::zeros(shape);
        for (g, txs) in members.iter().enumerate() {
            for s in 0..n_samples {
                let total_abundance: f64 = txs.iter().map(|&t| self.abundance[[t, s]]).sum();
                counts[[g, s]] = txs.iter().map(|&t| self.counts[[t, s]]).sum();
                abundance[[g, s]] = total_abundance;
                lengths[[g, s]] = if total_abundance > 0.0 {
                    txs.iter().map(|&t| self.abundance[[t, s]] * self.lengths[[t, s]]).sum::<f64>() / total_abundance
                } else {
                    txs.iter().map(|&t| self.lengths[[t, s]]).sum::<f64>() / txs.len() as f64
                };
            }
        }
        log::info!("summarised {} transcripts to {} genes", self.ids.len() - unmapped, gene_order.len());
        Ok(TxImport {
            ids: gene_order,
            sample_ids: self.sample_ids.clone(),
            counts,
            abundance,
            lengths,
        })
    }
}

/// Import every sample in the sheet. All files must list the same
/// transcripts in the same order.
pub fn import_quantifications(sheet: &SampleSheet, quant_dir: Option<&Path>) -> Result<TxImport> {
    let mut tables: Vec<QuantTable> = Vec::with_capacity(sheet.n_samples());
    for i in 0..sheet.n_samples() {
        let path = locate_quant_file(sheet, i, quant_dir)?;
        let table = read_quant_file(&path)?;
        if let Some(first) = tables.first() {
            if first.ids != table.ids {
                return Err(import_error(
                    &path,
                    format!("transcripts differ from those of sample '{}'", sheet.sample_ids()[0]),
                ));
            }
        }
        tables.push(table);
    }
    if tables.is_empty() {
        return Err(DexError::EmptyData {
            reason: "no samples to import".to_string(),
        });
    }

    let n_tx = tables[0].ids.len();
    let n_samples = tables.len();
    let mut counts = Array2::<f64>::zeros((n_tx, n_samples));
    let mut abundance = Array2::<f64>::zeros((n_tx, n_samples));
    let mut lengths = Array2::<f64>::zeros((n_tx, n_samples));
    for (s, table) in tables.iter().enumerate() {
        for t in 0..n_tx {
            counts[[t, s]] = table.counts[t];
            abundance[[t, s]] = table.abundance[t];
            lengths[[t, s]] = table.lengths[t];
        }
    }
    log::info!("imported {} transcripts for {} samples", n_tx, n_samples);
    Ok(TxImport {
        ids: tables.swap_remove(0).ids,
        sample_ids: sheet.sample_ids().to_vec(),
        counts,
        abundance,
        lengths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_salmon(dir: &Path, sample: &str, reads: [f64; 3]) {
        let d = dir.join(sample);
        fs::create_dir_all(&d).unwrap();
        let mut text = String::from("Name\tLength\tEffectiveLength\tTPM\tNumReads\n");
        let tpm = [100.0, 300.0, 0.0];
        let eff = [900.0, 1900.0, 400.0];
        for (k, tx) in ["tx1", "tx2", "tx3"].iter().enumerate() {
            text.push_str(&format!("{}\t1000\t{}\t{}\t{}\n", tx, eff[k], tpm[k], reads[k]));
        }
        fs::write(d.join("quant.sf"), text).unwrap();
    }

    fn sheet() -> SampleSheet {
        SampleSheet::new(vec!["A".into(), "B".into()]).unwrap()
    }

    #[test]
    fn test_import_and_summarize() {
        let dir = tempdir().unwrap();
        write_salmon(dir.path(), "A", [10.4, 20.0, 5.0]);
        write_salmon(dir.path(), "B", [12.0, 30.0, 0.0]);

        let tx = import_quantifications(&sheet(), Some(dir.path())).unwrap();
        assert_eq!(tx.ids, vec!["tx1", "tx2", "tx3"]);
        assert_eq!(tx.counts[[0, 0]], 10.4);

        let mut map = HashMap::new();
        map.insert("tx1".to_string(), "geneA".to_string());
        map.insert("tx2".to_string(), "geneA".to_string());
        map.insert("tx3".to_string(), "geneB".to_string());
        let genes = tx.summarize_to_gene(&map).unwrap();
        assert_eq!(genes.ids, vec!["geneA", "geneB"]);
        assert!((genes.counts[[0, 0]] - 30.4).abs() < 1e-12);
        // (100 * 900 + 300 * 1900) / 400
        assert!((genes.lengths[[0, 0]] - 1650.0).abs() < 1e-9);
        // zero abundance falls back to the plain mean
        assert_eq!(genes.lengths[[1, 0]], 400.0);

        let cm = genes.count_matrix().unwrap();
        assert_eq!(cm.counts()[[0, 0]], 30.0);
    }

    #[test]
    fn test_kallisto_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abundance.tsv");
        fs::write(&path, "target_id\tlength\teff_length\test_counts\ttpm\ntx1\t500\t350.5\t12\t3.1\n").unwrap();
        let table = read_quant_file(&path).unwrap();
        assert_eq!(table.format, QuantFormat::Kallisto);
        assert_eq!(table.lengths, vec![350.5]);
        assert_eq!(table.counts, vec![12.0]);
    }

    #[test]
    fn test_mismatched_transcripts_rejected() {
        let dir = tempdir().unwrap();
        write_salmon(dir.path(), "A", [1.0, 2.0, 3.0]);
        fs::create_dir_all(dir.path().join("B")).unwrap();
        fs::write(
            dir.path().join("B/quant.sf"),
            "Name\tLength\tEffectiveLength\tTPM\tNumReads\ntxX\t1\t1\t1\t1\n",
        )
        .unwrap();
        assert!(import_quantifications(&sheet(), Some(dir.path())).is_err());
    }

    #[test]
    fn test_unmapped_only_is_error() {
        let tx = TxImport {
            ids: vec!["tx1".into()],
            sample_ids: vec!["A".into()],
            counts: Array2::ones((1, 1)),
            abundance: Array2::ones((1, 1)),
            lengths: Array2::ones((1, 1)),
        };
        assert!(tx.summarize_to_gene(&HashMap::new()).is_err());
    }
}
