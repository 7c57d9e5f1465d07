//! GMT gene-set files: `name<TAB>description<TAB>gene<TAB>gene...`

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{DexError, Result};

/// A named pathway or ontology term with its member genes
#[derive(Debug, Clone, PartialEq)]
pub struct GeneSet {
    pub name: String,
    pub description: String,
    pub genes: Vec<String>,
}

/// Read all gene sets from a GMT file. Duplicate members within a set are
/// collapsed; blank lines and `#` comments are skipped.
pub fn read_gmt<P: AsRef<Path>>(path: P) -> Result<Vec<GeneSet>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut sets = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(DexError::ImportFailed {
                path: path.display().to_string(),
                reason: format!("line {} has fewer than three fields", line_no + 1),
            });
        }
        let mut genes: Vec<String> = Vec::new();
        for g in fields[2..].iter().map(|g| g.trim()).filter(|g| !g.is_empty()) {
            if !genes.iter().any(|x| x == g) {
                genes.push(g.to_string());
            }
        }
        sets.push(GeneSet {
            name: fields[0].trim().to_string(),
            description: fields[1].trim().to_string(),
            genes,
        });
    }
    if sets.is_empty() {
        return Err(DexError::EmptyData {
            reason: format!("no gene sets in {}", path.display()),
        });
    }
    log::info!("read {} gene sets from {}", sets.len(), path.display());
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_gmt() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# pathways").unwrap();
        writeln!(file, "GLYCOLYSIS\thttp://example.org\tHK1\tPFKM\tHK1\t").unwrap();
        writeln!(file, "APOPTOSIS\tcell death\tTP53").unwrap();
        file.flush().unwrap();

        let sets = read_gmt(file.path()).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].genes, vec!["HK1", "PFKM"]);
        assert_eq!(sets[1].description, "cell death");
    }

    #[test]
    fn test_short_line_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ONLY\tname").unwrap();
        file.flush().unwrap();
        assert!(read_gmt(file.path()).is_err());
    }
}
