use std::path::PathBuf;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{rng, Rng, SeedableRng};
use tracing::info;

use nsm_core::error::Result;
use nsm_core::grid::{Grid, StructuredGrid};
use nsm_core::nsm::Nsm;
use nsm_core::parser::ParseState;
use nsm_core::species::Species;

#[derive(Debug, Parser)]
#[command(
    name = "nsm",
    about = "Stochastic reaction-diffusion simulation with the Next Subvolume Method.",
    long_about = "Simulates stochastic reaction-diffusion chemistry on a structured grid of compartments.
The program takes as input one or more data files in the format:

A = 6
B = 8
C = 0
A + B -> C, 0.05

listing species and their initial (grid-wide) total copy numbers, and reactions
with their rate constants. Every reaction and species applies uniformly to
every compartment of the grid."
)]
struct Cli {
    /// The amount of time to simulate.
    time: f64,

    /// The path to the files specifying the chemical reaction network.
    #[arg(num_args = 1.., )]
    data: Vec<PathBuf>,

    /// Grid dimensions (Nx, Ny, Nz). Defaults to a single well-mixed compartment.
    #[arg(long, num_args = 3, default_values_t = [1, 1, 1])]
    dims: Vec<usize>,

    /// Grid low corner.
    #[arg(long, num_args = 3, default_values_t = [0.0, 0.0, 0.0])]
    low: Vec<f64>,

    /// Grid high corner.
    #[arg(long, num_args = 3, default_values_t = [1.0, 1.0, 1.0])]
    high: Vec<f64>,

    /// How often to sample and print the state. If not given, only the final state is printed.
    #[arg(short, long)]
    samples: Option<u64>,

    /// The seed to use for random number generation.
    #[arg(long)]
    seed: Option<u64>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(args: Cli) -> Result<()> {
    let low: [f64; 3] = args.low.clone().try_into().unwrap_or([0.0; 3]);
    let high: [f64; 3] = args.high.clone().try_into().unwrap_or([1.0; 3]);
    let dims: [usize; 3] = args.dims.clone().try_into().unwrap_or([1, 1, 1]);
    let grid = StructuredGrid::new(low, high, dims)?;
    info!(size = grid.size(), "built grid");

    let seed = args.seed.unwrap_or_else(|| rng().random());
    let mut nsm = Nsm::new(grid, seed);

    let mut state = ParseState::new();
    for path in &args.data {
        state.parse_data_file(path)?;
    }
    let (names, initial, equations) = state.into_network()?;

    let all_cells: Vec<usize> = (0..nsm.grid().size()).collect();
    let mut species_rng = StdRng::seed_from_u64(seed);
    for (name, total) in names.iter().zip(initial.iter()) {
        let mut species = Species::new(0.0);
        species.bind_grid(nsm.grid());
        if *total > 0 {
            species.fill_uniform(nsm.grid(), &all_cells, *total as usize, &mut species_rng);
        }
        let idx = nsm.add_species(species)?;
        info!(species = name.as_str(), index = idx, total = total, "registered species");
    }

    for (rate, eq) in equations {
        nsm.add_reaction(rate, eq)?;
    }
    nsm.reset_all_priorities()?;

    let sample_count = args.samples.unwrap_or(1).max(1);
    let dt = args.time / sample_count as f64;

    print!("time");
    for name in &names {
        print!("\t{name}");
    }
    println!();
    print_state(0.0, &nsm, &names);
    for _ in 0..sample_count {
        nsm.integrate(dt)?;
        print_state(nsm.time(), &nsm, &names);
    }
    Ok(())
}

fn print_state<G: Grid>(time: f64, nsm: &Nsm<G>, names: &[String]) {
    print!("{time}");
    for i in 0..names.len() {
        let total: i64 = nsm.species()[i].copy_numbers.iter().sum();
        print!("\t{total}");
    }
    println!();
}

fn main() {
    let args = Cli::parse();
    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(err) = run(args) {
        tracing::error!(%err, "simulation failed");
        std::process::exit(1);
    }
}
