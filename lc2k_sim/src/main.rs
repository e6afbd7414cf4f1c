use clap::Parser as ClapParser;
use log::info;

use lc2k_common::image::Executable;
use lc2k_common::resource::TextResource;

mod cache;
mod machine;

/// LC-2K instruction-level simulator with a configurable
/// set-associative cache between the processor and memory.
#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Executable image to simulate
  exe: String,

  /// Cache block size in words (power of two)
  block_size: usize,

  /// Number of cache sets (power of two)
  num_sets: usize,

  /// Number of blocks per set
  blocks_per_set: usize,

  /// Increase logging verbosity (-v, -vv, etc.)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn init_logging(verbose: u8) {
  let level = match verbose {
    0 => log::LevelFilter::Off,
    1 => log::LevelFilter::Info,
    2 => log::LevelFilter::Debug,
    _ => log::LevelFilter::Trace,
  };
  env_logger::Builder::new().filter_level(level).init();
}

fn run(cli: &Cli) -> Result<(), String> {
  let image = Executable::read_from_path(&cli.exe)?;
  info!("loaded {} words from {}", image.words.len(), cli.exe);

  let cache = cache::Cache::new(cli.block_size, cli.num_sets, cli.blocks_per_set)?;
  let mut machine = machine::Machine::new(&image, cache)?;

  let stdout = std::io::stdout();
  let executed = machine.run(&mut stdout.lock())?;
  info!("executed {executed} instructions");
  Ok(())
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  if let Err(message) = run(&cli) {
    println!("{message}");
    std::process::exit(1);
  }
}
