//! Delimited text reading and writing: count matrices, sample sheets,
//! result tables and transformed matrices

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ndarray::Array2;

use super::results::DeTable;
use crate::data::{CountMatrix, ExpressionMatrix, SampleSheet};
use crate::error::{DexError, Result};

/// Tab if the first line contains one, comma otherwise
fn detect_delimiter(path: &Path) -> Result<u8> {
    let mut first = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first)?;
    if first.trim().is_empty() {
        return Err(DexError::EmptyData {
            reason: format!("{} is empty", path.display()),
        });
    }
    Ok(if first.contains('\t') { b'\t' } else { b',' })
}

/// Reader over a headed, tab- or comma-delimited file
pub(crate) fn delimited_reader(path: &Path) -> Result<csv::Reader<File>> {
    let delimiter = detect_delimiter(path)?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<File>> {
    Ok(csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?)
}

/// Read a count matrix: first column gene ids, one column per sample
pub fn read_count_matrix<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let path = path.as_ref();
    let mut reader = delimited_reader(path)?;
    let header = reader.headers()?.clone();
    if header.len() < 2 {
        return Err(DexError::InvalidCountMatrix {
            reason: "Not enough columns in header".to_string(),
        });
    }
    let sample_ids: Vec<String> = header.iter().skip(1).map(String::from).collect();
    let n_samples = sample_ids.len();

    let mut gene_ids = Vec::new();
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != n_samples + 1 {
            return Err(DexError::InvalidCountMatrix {
                reason: format!("Row has {} columns, expected {}", record.len(), n_samples + 1),
            });
        }
        gene_ids.push(record[0].to_string());
        for field in record.iter().skip(1) {
            values.push(field.parse::<f64>().map_err(|_| DexError::InvalidCountMatrix {
                reason: format!("Invalid count value '{}' for gene {}", field, &record[0]),
            })?);
        }
    }
    if gene_ids.is_empty() {
        return Err(DexError::EmptyData {
            reason: "No genes found in count matrix".to_string(),
        });
    }

    let counts = Array2::from_shape_vec((gene_ids.len(), n_samples), values).map_err(|e| {
        DexError::InvalidCountMatrix {
            reason: e.to_string(),
        }
    })?;
    log::info!("read {} genes x {} samples from {}", gene_ids.len(), n_samples, path.display());
    CountMatrix::new(counts, gene_ids, sample_ids)
}

/// Read a sample sheet. The first column holds sample ids; a column named
/// `path` or `file` gives per-sample data files, resolved relative to the
/// sheet's directory. Every other column is categorical.
pub fn read_sample_sheet<P: AsRef<Path>>(path: P) -> Result<SampleSheet> {
    let path = path.as_ref();
    let mut reader = delimited_reader(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    if header.is_empty() {
        return Err(DexError::InvalidSampleSheet {
            reason: "Missing header".to_string(),
        });
    }
    let path_col = header
        .iter()
        .position(|h| h.eq_ignore_ascii_case("path") || h.eq_ignore_ascii_case("file"));
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut ids = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); header.len()];
    let mut paths: Vec<Option<PathBuf>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != header.len() {
            return Err(DexError::InvalidSampleSheet {
                reason: format!("Row has {} columns, expected {}", record.len(), header.len()),
            });
        }
        ids.push(record[0].to_string());
        for (c, field) in record.iter().enumerate().skip(1) {
            columns[c].push(field.to_string());
        }
        paths.push(path_col.map(|c| &record[c]).filter(|p| !p.is_empty()).map(|p| {
            let p = PathBuf::from(p);
            if p.is_relative() {
                base.join(p)
            } else {
                p
            }
        }));
    }
    if ids.is_empty() {
        return Err(DexError::EmptyData {
            reason: "No samples found in sample sheet".to_string(),
        });
    }

    let mut sheet = SampleSheet::new(ids)?;
    for (c, values) in columns.into_iter().enumerate().skip(1) {
        if Some(c) != path_col {
            sheet.add_column(&header[c], values)?;
        }
    }
    sheet.set_paths(paths)?;
    Ok(sheet)
}

/// Write a results table as TSV
pub fn write_results<P: AsRef<Path>>(path: P, table: &DeTable) -> Result<()> {
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(table.headers())?;
    for i in 0..table.n_rows() {
        writer.write_record(table.row_fields(i))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a feature x sample matrix of log-scale values as TSV
pub fn write_expression_matrix<P: AsRef<Path>>(path: P, matrix: &ExpressionMatrix) -> Result<()> {
    let mut writer = tsv_writer(path.as_ref())?;
    let mut header = vec!["id".to_string()];
    header.extend(matrix.sample_ids().iter().cloned());
    writer.write_record(&header)?;
    for (i, id) in matrix.feature_ids().iter().enumerate() {
        let mut row = vec![id.clone()];
        row.extend(matrix.row(i).iter().map(|v| format!("{:.6}", v)));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_read_count_matrix() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2\ts3").unwrap();
        writeln!(file, "gene1\t100\t200\t150").unwrap();
        writeln!(file, "gene2\t50\t75\t60").unwrap();
        file.flush().unwrap();

        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.counts()[[1, 2]], 60.0);
    }

    #[test]
    fn test_read_count_matrix_comma_and_bad_value() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id,s1,s2").unwrap();
        writeln!(file, "gene1,1,x").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            read_count_matrix(file.path()),
            Err(DexError::InvalidCountMatrix { .. })
        ));
    }

    #[test]
    fn test_read_sample_sheet_with_paths() {
        let dir = tempdir().unwrap();
        let sheet_path = dir.path().join("samples.csv");
        std::fs::write(
            &sheet_path,
            "sample,condition,path\nA,control,A/quant.sf\nB,treated,/abs/B.sf\n",
        )
        .unwrap();

        let sheet = read_sample_sheet(&sheet_path).unwrap();
        assert_eq!(sheet.sample_ids(), &["A".to_string(), "B".to_string()]);
        assert_eq!(sheet.column("condition").unwrap()[1], "treated");
        assert!(sheet.column("path").is_none());
        assert_eq!(sheet.path(0).unwrap(), dir.path().join("A/quant.sf"));
        assert_eq!(sheet.path(1).unwrap(), Path::new("/abs/B.sf"));
    }

    #[test]
    fn test_write_expression_matrix() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("rlog.tsv");
        let m = ExpressionMatrix::new(
            ndarray::array![[1.0, 2.5]],
            vec!["g1".into()],
            vec!["s1".into(), "s2".into()],
        )
        .unwrap();
        write_expression_matrix(&out, &m).unwrap();
        let text = std::fs::read_to_string(out).unwrap();
        assert_eq!(text, "id\ts1\ts2\ng1\t1.000000\t2.500000\n");
    }
}
