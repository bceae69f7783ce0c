use cajal_gw::{cells_to_mmspaces, read_intracell_csv, write_qgw_csv, Config, RayonDispatcher, RefinementController};

use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the intracell distance CSV.
    #[clap(short, long, value_parser)]
    input_file: String,

    /// Path to write the `first_object,second_object,qgw,kind` CSV to.
    #[clap(short, long, value_parser)]
    output_file: String,

    #[clap(flatten)]
    config: Config,
}

fn run(args: Args) -> cajal_gw::Result<()> {
    args.config.validate()?;

    let cells = read_intracell_csv(&args.input_file)?;
    let names: Vec<String> = cells.iter().map(|c| c.name.clone()).collect();
    let mmspaces = cells_to_mmspaces(&cells)?;

    log::info!("loaded {} cells from {}", mmspaces.len(), args.input_file);

    let time = Instant::now();
    let dispatcher = RayonDispatcher::new(args.config.num_processes, args.config.verbose);
    let controller = RefinementController::new(&args.config);
    let outcome = controller.run(&mmspaces, &dispatcher)?;
    log::info!("refinement controller finished in {:.2}s", time.elapsed().as_secs_f64());

    write_qgw_csv(&args.output_file, &names, &outcome)?;
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
