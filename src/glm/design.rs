//! Design matrix construction for a single categorical factor

use ndarray::Array2;

use crate::data::SampleSheet;
use crate::error::{DexError, Result};

/// Design matrix with its column names and the sample grouping it encodes.
///
/// Columns are the intercept followed by one indicator per non-reference
/// level (treatment coding). `levels[0]` is the reference.
#[derive(Debug, Clone)]
pub struct DesignInfo {
    pub matrix: Array2<f64>,
    pub column_names: Vec<String>,
    pub factor: String,
    pub levels: Vec<String>,
    /// Level index of each sample
    pub groups: Vec<usize>,
}

impl DesignInfo {
    /// `~ factor` with `reference` (or the first level in sheet order) as baseline
    pub fn one_factor(sheet: &SampleSheet, factor: &str, reference: Option<&str>) -> Result<Self> {
        let values = sheet.column(factor).ok_or_else(|| DexError::InvalidDesign {
            reason: format!("Design factor '{}' not found in sample sheet", factor),
        })?;
        let mut levels = sheet.levels(factor)?;
        if let Some(reference) = reference {
            let pos = levels.iter().position(|l| l == reference).ok_or_else(|| DexError::InvalidDesign {
                reason: format!("Reference level '{}' is not a level of '{}'", reference, factor),
            })?;
            let r = levels.remove(pos);
            levels.insert(0, r);
        }
        if levels.len() < 2 {
            return Err(DexError::InvalidDesign {
                reason: format!("Design factor '{}' needs at least two levels", factor),
            });
        }

        let groups: Vec<usize> = values
            .iter()
            .map(|v| levels.iter().position(|l| l == v).unwrap_or(0))
            .collect();

        let n = values.len();
        let p = levels.len();
        if n <= p {
            return Err(DexError::InvalidDesign {
                reason: format!(
                    "{} samples cannot support {} coefficients; replicates are required",
                    n, p
                ),
            });
        }

        let mut matrix = Array2::<f64>::zeros((n, p));
        for (s, &g) in groups.iter().enumerate() {
            matrix[[s, 0]] = 1.0;
            if g > 0 {
                matrix[[s, g]] = 1.0;
            }
        }

        let mut column_names = vec!["Intercept".to_string()];
        for level in &levels[1..] {
            column_names.push(format!("{}_{}_vs_{}", factor, level, levels[0]));
        }

        Ok(Self {
            matrix,
            column_names,
            factor: factor.to_string(),
            levels,
            groups,
        })
    }

    /// `~ 1`: every sample in one group
    pub fn intercept_only(n_samples: usize) -> Self {
        Self {
            matrix: Array2::ones((n_samples, 1)),
            column_names: vec!["Intercept".to_string()],
            factor: String::new(),
            levels: vec!["all".to_string()],
            groups: vec![0; n_samples],
        }
    }

    pub fn n_coefs(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_groups(&self) -> usize {
        self.levels.len()
    }

    pub fn level_index(&self, level: &str) -> Result<usize> {
        self.levels.iter().position(|l| l == level).ok_or_else(|| DexError::InvalidContrast {
            reason: format!(
                "Level '{}' not found for factor '{}' (levels: {})",
                level,
                self.factor,
                self.levels.join(", ")
            ),
        })
    }

    /// Coefficient weights giving `numerator - denominator` on the link scale
    pub fn contrast_vector(&self, numerator: &str, denominator: &str) -> Result<Vec<f64>> {
        let num = self.level_index(numerator)?;
        let den = self.level_index(denominator)?;
        if num == den {
            return Err(DexError::InvalidContrast {
                reason: "Numerator and denominator levels must differ".to_string(),
            });
        }
        let mut c = vec![0.0; self.n_coefs()];
        if num > 0 {
            c[num] += 1.0;
        }
        if den > 0 {
            c[den] -= 1.0;
        }
        Ok(c)
    }

    /// Sample count per level
    pub fn group_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_groups()];
        for &g in &self.groups {
            sizes[g] += 1;
        }
        sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(levels: &[&str]) -> SampleSheet {
        let ids = (0..levels.len()).map(|i| format!("s{}", i)).collect();
        let mut s = SampleSheet::new(ids).unwrap();
        s.add_column("condition", levels.iter().map(|l| l.to_string()).collect()).unwrap();
        s
    }

    #[test]
    fn test_treatment_coding() {
        let d = DesignInfo::one_factor(&sheet(&["b", "a", "b", "a", "c"]), "condition", None).unwrap();
        // without an explicit reference the first level in the sheet is the baseline
        assert_eq!(d.levels, vec!["b", "a", "c"]);
        assert_eq!(d.groups, vec![0, 1, 0, 1, 2]);
        assert_eq!(d.column_names[1], "condition_a_vs_b");
        assert_eq!(d.matrix.row(4).to_vec(), vec![1.0, 0.0, 1.0]);
        assert_eq!(d.matrix.row(1).to_vec(), vec![1.0, 1.0, 0.0]);
        assert_eq!(d.matrix.row(0).to_vec(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_reference_level_override() {
        let d = DesignInfo::one_factor(&sheet(&["ctl", "trt", "ctl", "trt"]), "condition", Some("trt")).unwrap();
        assert_eq!(d.levels, vec!["trt", "ctl"]);
        assert_eq!(d.contrast_vector("trt", "ctl").unwrap(), vec![0.0, -1.0]);
        assert_eq!(d.contrast_vector("ctl", "trt").unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_default_reference_with_unsorted_levels() {
        let d = DesignInfo::one_factor(&sheet(&["wt", "wt", "ko", "ko"]), "condition", None).unwrap();
        assert_eq!(d.levels, vec!["wt", "ko"]);
        let config = crate::config::AnalysisConfig::default();
        assert_eq!(
            config.resolve_contrast(&d.levels).unwrap(),
            ("ko".to_string(), "wt".to_string())
        );
    }

    #[test]
    fn test_contrast_between_non_reference_levels() {
        let d = DesignInfo::one_factor(&sheet(&["a", "b", "c", "a", "b", "c"]), "condition", None).unwrap();
        assert_eq!(d.contrast_vector("c", "b").unwrap(), vec![0.0, -1.0, 1.0]);
        assert!(d.contrast_vector("c", "c").is_err());
        assert!(d.contrast_vector("z", "a").is_err());
    }

    #[test]
    fn test_rejects_unreplicated_and_single_level() {
        assert!(DesignInfo::one_factor(&sheet(&["a", "b"]), "condition", None).is_err());
        assert!(DesignInfo::one_factor(&sheet(&["a", "a", "a"]), "condition", None).is_err());
    }
}
