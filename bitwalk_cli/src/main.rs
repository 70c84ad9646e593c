use bitwalk_core::config::DriverConfig;
use bitwalk_core::engine::BitFlipEngine;
use bitwalk_core::mutator::{MutateOutcome, ResumableMutator};

use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Seed input file to enumerate mutants of.
    seed_file: Option<PathBuf>,
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Restrict the walk to one window size (1, 2, 4, 8, 16, or 32 bits).
    #[clap(short, long)]
    num_bits: Option<u64>,
    /// Resume from a state file written by --checkpoint.
    #[clap(long)]
    resume_from: Option<PathBuf>,
    /// Write the engine state to this file after the run.
    #[clap(long)]
    checkpoint: Option<PathBuf>,
    /// Stop after this many mutants.
    #[clap(short, long)]
    limit: Option<u64>,
    /// Print every mutant as hex next to its digest.
    #[clap(long)]
    hex: bool,
    /// Print the engine's option help and exit.
    #[clap(long)]
    explain_options: bool,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    if cli.explain_options {
        print!("{}", BitFlipEngine::help());
        return Ok(());
    }

    let mut config = match cli.config_file {
        Some(config_path) => {
            println!("Loading configuration from specified path: {config_path:?}");
            DriverConfig::load_from_file(&config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("bitwalk.toml");
            if default_config_path.exists() {
                println!(
                    "No config file specified via CLI, loading default: {default_config_path:?}"
                );
                DriverConfig::load_from_file(&default_config_path)?
            } else {
                DriverConfig::default()
            }
        }
    };

    if let Some(num_bits) = cli.num_bits {
        config.num_bits = Some(num_bits);
    }
    if let Some(limit) = cli.limit {
        config.max_mutations = Some(limit);
    }

    let seed_path = cli
        .seed_file
        .or(config.seed_path.take())
        .ok_or_else(|| anyhow::anyhow!("No seed file given on the CLI or in the config file"))?;
    let seed = std::fs::read(&seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file {:?}: {}", seed_path, e))?;

    let options = config.options();
    let engine = match &cli.resume_from {
        Some(state_path) => {
            let snapshot = std::fs::read_to_string(state_path)
                .map_err(|e| anyhow::anyhow!("Failed to read state file {:?}: {}", state_path, e))?;
            BitFlipEngine::with_snapshot(options, &snapshot, seed)?
        }
        None => BitFlipEngine::new(options, seed)?,
    };

    let total = engine.total_iterations();
    println!(
        "Seed {:?}: {} bytes, {} total mutations, starting at iteration {}",
        seed_path,
        engine.input_info().sizes[0],
        total,
        engine.current_iteration()
    );

    let start_time = Instant::now();
    let mut produced: u64 = 0;
    let mut buf = vec![0u8; engine.input_info().sizes[0]];

    loop {
        if let Some(limit) = config.max_mutations {
            if produced >= limit {
                println!("Stopping at the configured limit of {limit} mutants.");
                break;
            }
        }
        match engine.mutate(&mut buf)? {
            MutateOutcome::Mutated(len) => {
                produced += 1;
                let mutant = &buf[..len];
                let digest = md5::compute(mutant);
                if cli.hex {
                    let hex: String = mutant.iter().map(|b| format!("{b:02x}")).collect();
                    println!("{:>8}  {:x}  {}", engine.current_iteration(), digest, hex);
                } else {
                    println!("{:>8}  {:x}", engine.current_iteration(), digest);
                }
            }
            MutateOutcome::Exhausted => {
                println!("Mutation sequence exhausted.");
                break;
            }
        }
    }

    let elapsed = start_time.elapsed();
    let rate = produced as f32 / elapsed.as_secs_f32().max(f32::EPSILON);
    println!(
        "Produced {}/{} mutants in {:.2?} ({:.0} mutants/sec)",
        engine.current_iteration(),
        total,
        elapsed,
        rate
    );

    if let Some(checkpoint_path) = cli.checkpoint {
        std::fs::write(&checkpoint_path, engine.state_snapshot()?).map_err(|e| {
            anyhow::anyhow!("Failed to write state file {:?}: {}", checkpoint_path, e)
        })?;
        println!("Engine state checkpointed to {checkpoint_path:?}");
    }

    Ok(())
}
