//! Command-line interface for dexflow

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::AnalysisConfig;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "dexflow")]
#[command(version)]
#[command(about = "RNA-seq and microarray differential expression with HTML reports")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Worker threads for per-gene fits [default: all cores]
    #[arg(short = 't', long, global = true, default_value = "0")]
    pub threads: usize,
}

/// Options shared by every workflow
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Sample sheet (first column sample id; optional path column)
    #[arg(short, long)]
    pub samples: Option<PathBuf>,

    /// JSON configuration; may hold an inline sample table
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Sample sheet column holding the groups to compare
    #[arg(short = 'd', long)]
    pub condition: Option<String>,

    /// Baseline level of the condition [default: first level in the sample sheet]
    #[arg(long)]
    pub reference: Option<String>,

    /// Level compared against the baseline
    #[arg(long)]
    pub numerator: Option<String>,

    /// Adjusted p-value cutoff [default: 0.05]
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Linear fold change cutoff [default: 2]
    #[arg(long)]
    pub fold_change: Option<f64>,

    /// Rows per table in the report [default: 100]
    #[arg(long)]
    pub report_rows: Option<usize>,

    /// Rows in the heatmap [default: 30 RNA-seq, 50 microarray]
    #[arg(long)]
    pub heatmap_genes: Option<usize>,

    /// Gene or probeset annotation (id, symbol, description)
    #[arg(short, long)]
    pub annotation: Option<PathBuf>,

    /// Gene sets in GMT format for pathway enrichment
    #[arg(short, long)]
    pub gene_sets: Option<PathBuf>,

    /// Report title
    #[arg(long)]
    pub title: Option<String>,
}

impl CommonArgs {
    /// Config file (or defaults) with explicit flags applied on top
    pub fn resolve_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(v) = &self.condition {
            config.condition = v.clone();
        }
        if let Some(v) = &self.reference {
            config.reference = Some(v.clone());
        }
        if let Some(v) = &self.numerator {
            config.numerator = Some(v.clone());
        }
        if let Some(v) = self.alpha {
            config.alpha = v;
        }
        if let Some(v) = self.fold_change {
            config.fold_change = v;
        }
        if let Some(v) = self.report_rows {
            config.report_rows = v;
        }
        if let Some(v) = self.heatmap_genes {
            config.heatmap_genes = Some(v);
        }
        if let Some(v) = &self.title {
            config.title = Some(v.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// RNA-seq differential expression report
    #[command(
        long_about = "RNA-seq differential expression report\n\n\
            Imports Salmon or kallisto quantifications (or a count matrix), drops genes\n\
            with fewer than 10 reads, fits negative binomial GLMs and tests the contrast\n\
            with Wald tests. Figures use regularized-log counts.",
        after_long_help = "\
Examples:
  dexflow rnaseq -s samples.tsv -q quant/ --tx2gene tx2gene.tsv -d condition \\
    --reference control -g pathways.gmt -o report_dir

  dexflow rnaseq --counts counts.tsv -s samples.tsv -d condition -o report_dir"
    )]
    Rnaseq {
        #[command(flatten)]
        common: CommonArgs,

        /// Directory holding <sample>/quant.sf or <sample>/abundance.tsv
        #[arg(short, long)]
        quant_dir: Option<PathBuf>,

        /// Gene x sample count matrix instead of quantification files
        #[arg(short, long)]
        counts: Option<PathBuf>,

        /// Transcript to gene table for gene-level counts
        #[arg(long)]
        tx2gene: Option<PathBuf>,

        /// Estimate rlog dispersions using the design (not blind)
        #[arg(long)]
        no_blind: bool,

        /// Output directory
        #[arg(short, long, default_value = "dexflow_rnaseq")]
        output: PathBuf,
    },

    /// Microarray differential expression report
    #[command(
        long_about = "Microarray differential expression report\n\n\
            Reads one probe-level intensity file per array, runs RMA (background\n\
            correction, quantile normalization, median polish) and tests the contrast\n\
            with an empirical Bayes moderated linear model.",
        after_long_help = "\
Examples:
  dexflow microarray -s arrays.tsv --data-dir raw/ -d group --reference wt \\
    -a probes.tsv -g pathways.gmt -o report_dir"
    )]
    Microarray {
        #[command(flatten)]
        common: CommonArgs,

        /// Directory holding <sample>.txt intensity files
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "dexflow_microarray")]
        output: PathBuf,
    },

    /// Regularized-log transformed counts only
    Rlog {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(short, long)]
        quant_dir: Option<PathBuf>,

        #[arg(short, long)]
        counts: Option<PathBuf>,

        #[arg(long)]
        tx2gene: Option<PathBuf>,

        /// Estimate dispersions using the design (not blind)
        #[arg(long)]
        no_blind: bool,

        /// Output file [default: rlog_transformed.tsv]
        #[arg(short, long, default_value = "rlog_transformed.tsv")]
        output: PathBuf,
    },

    /// RMA expression matrix only
    Rma {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Output file [default: rma_expression.tsv]
        #[arg(short, long, default_value = "rma_expression.tsv")]
        output: PathBuf,
    },
}
