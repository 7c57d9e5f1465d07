//! dexflow command-line interface

use clap::{CommandFactory, Parser};
use log::{info, LevelFilter};

use dexflow::cli::{Cli, Commands};
use dexflow::pipeline::{
    run_microarray, run_rnaseq, summarize_arrays, transform_counts, MicroarrayInputs, PipelineOutput, RnaSeqInputs,
};
use dexflow::Result;

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    if cli.threads > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(cli.threads).build_global() {
            log::warn!("could not configure {} threads: {}", cli.threads, e);
        }
    }

    let command = match cli.command {
        Some(c) => c,
        None => {
            let _ = Cli::command().print_help();
            return;
        }
    };

    if let Err(e) = run(command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Rnaseq {
            common,
            quant_dir,
            counts,
            tx2gene,
            no_blind,
            output,
        } => {
            let mut config = common.resolve_config()?;
            config.rlog_blind = config.rlog_blind && !no_blind;
            let inputs = RnaSeqInputs {
                sample_sheet: common.samples,
                quant_dir,
                counts,
                tx2gene,
                annotation: common.annotation,
                gene_sets: common.gene_sets,
                out_dir: output,
            };
            let out = run_rnaseq(&inputs, &config)?;
            print_outputs(&out);
        }
        Commands::Microarray {
            common,
            data_dir,
            output,
        } => {
            let config = common.resolve_config()?;
            let inputs = MicroarrayInputs {
                sample_sheet: common.samples,
                data_dir,
                annotation: common.annotation,
                gene_sets: common.gene_sets,
                out_dir: output,
            };
            let out = run_microarray(&inputs, &config)?;
            print_outputs(&out);
        }
        Commands::Rlog {
            common,
            quant_dir,
            counts,
            tx2gene,
            no_blind,
            output,
        } => {
            let mut config = common.resolve_config()?;
            config.rlog_blind = config.rlog_blind && !no_blind;
            let inputs = RnaSeqInputs {
                sample_sheet: common.samples,
                quant_dir,
                counts,
                tx2gene,
                ..RnaSeqInputs::default()
            };
            let result = transform_counts(&inputs, &config, &output)?;
            info!(
                "Done! {} genes transformed (prior variance {:.4})",
                result.matrix.n_features(),
                result.beta_prior_var
            );
        }
        Commands::Rma {
            common,
            data_dir,
            output,
        } => {
            let config = common.resolve_config()?;
            let inputs = MicroarrayInputs {
                sample_sheet: common.samples,
                data_dir,
                ..MicroarrayInputs::default()
            };
            let result = summarize_arrays(&inputs, &config, &output)?;
            info!(
                "Done! {} probesets on {} arrays",
                result.expression.n_features(),
                result.expression.n_samples()
            );
        }
    }
    Ok(())
}

fn print_outputs(out: &PipelineOutput) {
    println!("{}", out.summary);
    println!("Report:      {}", out.report.display());
    println!("All results: {}", out.results.display());
    println!("Significant: {}", out.significant.display());
    println!("Matrix:      {}", out.matrix.display());
}
