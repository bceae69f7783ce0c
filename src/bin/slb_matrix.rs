use cajal_gw::{cells_to_mmspaces, read_intracell_csv, slb_all, write_slb_csv, RayonDispatcher};

use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the intracell distance CSV.
    #[clap(short, long, value_parser)]
    input_file: String,

    /// Path to write the `first_object,second_object,slb` CSV to.
    #[clap(short, long, value_parser)]
    output_file: String,

    /// Dispatcher worker pool size.
    #[clap(short = 'p', long, value_parser, default_value_t = 1)]
    num_processes: usize,

    /// Dispatcher batch size.
    #[clap(short, long, value_parser, default_value_t = 20)]
    chunksize: usize,

    /// Emit progress logging.
    #[clap(short, long, value_parser, default_value_t = false)]
    verbose: bool,
}

fn run(args: Args) -> cajal_gw::Result<()> {
    let cells = read_intracell_csv(&args.input_file)?;
    let names: Vec<String> = cells.iter().map(|c| c.name.clone()).collect();
    let mmspaces = cells_to_mmspaces(&cells)?;

    log::info!("loaded {} cells from {}", mmspaces.len(), args.input_file);

    let time = Instant::now();
    let dispatcher = RayonDispatcher::new(args.num_processes, args.verbose);
    let slb = slb_all(&mmspaces, args.chunksize, &dispatcher);
    log::info!("computed full SLB matrix in {:.2}s", time.elapsed().as_secs_f64());

    write_slb_csv(&args.output_file, &names, &slb)?;
    log::info!("wrote {}", args.output_file);
    Ok(())
}

pub fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
