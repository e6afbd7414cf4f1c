use std::fs;

use clap::Parser as ClapParser;
use log::info;

use lc2k_common::resource::TextResource;

mod assembler;
mod parser;

/// Two-pass LC-2K assembler: translates assembly text into a
/// relocatable object record.
#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Input assembly file
  input: String,

  /// Output object file
  output: String,

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
  info!("Assembling {} into {}", cli.input, cli.output);

  let source =
    fs::read_to_string(&cli.input).map_err(|e| format!("error in opening {}: {e}", cli.input))?;
  let program = parser::parse_program(&source)?;
  let object = assembler::Assembler::assemble(&program)?;

  object.write_to_path(&cli.output)?;

  info!(
    "Assembled {} lines into {} text and {} data words",
    program.len(),
    object.text.len(),
    object.data.len()
  );
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
