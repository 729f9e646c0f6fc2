use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;

use infosel::{
    ForwardSelection, MiStrategy, Selection, SelectionError, VariableTable, write_tie_diagnostics,
};

#[derive(Parser)]
#[command(
    name = "infosel",
    version,
    about = "Screen candidate predictors by mutual information with a dependent variable"
)]
struct Args {
    /// Text file containing the data: the first line is variable names,
    /// subsequent lines are the data. Delimiters can be space, comma, or tab
    datafile: PathBuf,

    /// Number of independent variables, starting with the first column
    n_indep: usize,

    /// Name of the 'dependent' variable. It must be after the first n_indep
    /// variables
    depname: String,

    /// Normally zero, to employ adaptive partitioning. Specify 5 (for very
    /// few cases) to 15 (for an enormous number of cases) to use Parzen
    /// windows
    windows: usize,

    /// Stepwise selection will keep at most this many predictors
    max_kept: usize,

    /// Where the report is written
    #[arg(long, default_value = "infosel.log")]
    report: PathBuf,

    /// Adaptive partitioning: cells holding this many points or fewer are
    /// never subdivided
    #[arg(long, default_value_t = 0)]
    min_points: usize,

    /// Adaptive partitioning: chi-square statistic above which a cell is
    /// subdivided
    #[arg(long, default_value_t = 6.0)]
    chi: f64,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let table = match VariableTable::from_path(&args.datafile) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("ERROR... {e}");
            process::exit(1);
        }
    };

    let strategy = if args.windows > 0 {
        MiStrategy::Parzen {
            windows: args.windows,
        }
    } else {
        MiStrategy::Adaptive {
            min_points: args.min_points,
            chi: args.chi,
        }
    };

    let selector = match ForwardSelection::new(&table, args.n_indep, &args.depname, strategy) {
        Ok(selector) => selector,
        Err(e) => {
            eprintln!("ERROR... {e}");
            process::exit(1);
        }
    };

    let file = match File::create(&args.report) {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "ERROR... Cannot open {} for writing: {e}",
                args.report.display()
            );
            process::exit(1);
        }
    };
    let mut report = BufWriter::new(file);

    match screen(&args, &table, &selector, strategy, &mut report) {
        Ok(selection) => {
            log::info!(
                "Kept {} of {} candidates ({} pairwise evaluations); report written to {}",
                selection.kept.len(),
                args.n_indep,
                selection.pair_evaluations,
                args.report.display()
            );
        }
        Err(e) => {
            eprintln!("ERROR... {e}");
            process::exit(1);
        }
    }
}

/// Runs the screening sequence against an open report sink: tie warnings
/// first when adaptive partitioning is in play, then the selection itself.
fn screen<W: Write>(
    args: &Args,
    table: &VariableTable,
    selector: &ForwardSelection<'_>,
    strategy: MiStrategy,
    report: &mut W,
) -> Result<Selection, SelectionError> {
    if matches!(strategy, MiStrategy::Adaptive { .. }) {
        write_tie_diagnostics(table, args.n_indep, selector.target_index(), report)?;
    }
    let selection = selector.run(args.max_kept, report)?;
    report.flush()?;
    Ok(selection)
}
