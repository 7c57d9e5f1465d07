//! plotly figures embedded in the HTML report

mod boxplot;
mod enrichment;
mod heatmap;
mod pca;
mod style;
mod volcano;

pub use boxplot::boxplot;
pub use enrichment::enrichment_dotplot;
pub use heatmap::heatmap;
pub use pca::pca_plot;
pub use volcano::volcano_plot;
