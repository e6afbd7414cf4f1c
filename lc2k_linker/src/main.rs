use clap::Parser as ClapParser;
use log::info;

use lc2k_common::object::ObjectFile;
use lc2k_common::resource::TextResource;

mod linker;
mod script;

/// LC-2K linker: merges relocatable object records into a flat
/// executable image.
#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Input object files followed by the output executable file
  files: Vec<String>,

  /// TOML link script carrying input_files and output_file
  #[arg(long, conflicts_with = "files")]
  script: Option<String>,

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
  let (inputs, output) = match &cli.script {
    Some(path) => {
      let script = script::parse_linker_script(path)?;
      (script.input_files, script.output_file)
    }
    None => match cli.files.split_last() {
      Some((output, inputs)) if !inputs.is_empty() => (inputs.to_vec(), output.clone()),
      _ => return Err("error: usage: lc2k_linker <obj file> ... <output-exe-file>".to_string()),
    },
  };

  let mut objects = Vec::with_capacity(inputs.len());
  for path in &inputs {
    let object = ObjectFile::read_from_path(path)?;
    info!(
      "read {path}: {} text, {} data, {} symbols, {} relocations",
      object.text.len(),
      object.data.len(),
      object.symbols.len(),
      object.relocations.len()
    );
    objects.push(object);
  }

  let image = linker::link(&objects)?;
  image.write_to_path(&output)?;

  info!("wrote {} words to {output}", image.words.len());
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
