//! Input/Output: quantification and intensity import, tables, gene sets

mod annotation;
mod csv;
mod gmt;
mod intensity;
mod quant;
mod results;

pub use self::csv::{read_count_matrix, read_sample_sheet, write_expression_matrix, write_results};
pub use annotation::{read_annotation, AnnotationEntry, GeneAnnotation};
pub use gmt::{read_gmt, GeneSet};
pub use intensity::{locate_intensity_file, read_intensities, RawIntensities};
pub use quant::{import_quantifications, locate_quant_file, read_quant_file, read_tx2gene, QuantFormat, QuantTable, TxImport};
pub use results::{Contrast, DeTable, ResultsSummary, TableKind};
