/**
 * Reactive View Compiler CLI - rvc
 *
 * Lowers serialized component units and prints the generated programs
 */
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use reactive_view_compiler_cli::perform_compile::{perform_compilation, CompileOptions, OutputFormat};

fn main() {
    let matches = Command::new("rvc")
        .version(reactive_view_compiler_cli::version())
        .about("Reactive view compiler")
        .arg(
            Arg::new("inputs")
                .value_name("FILE")
                .help("Compilation unit JSON files or glob patterns")
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Path to a compiler configuration JSON file"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print a JSON summary instead of the procedure listing"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log lowering progress to stderr"),
        )
        .get_matches();

    let default_level = if matches.get_flag("verbose") { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = CompileOptions {
        inputs: matches
            .get_many::<String>("inputs")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
        config: matches.get_one::<String>("config").map(PathBuf::from),
        format: if matches.get_flag("json") {
            OutputFormat::Json
        } else {
            OutputFormat::Listing
        },
    };

    match perform_compilation(&options) {
        Ok(output) => println!("{}", output),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            process::exit(1);
        }
    }
}
