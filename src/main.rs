use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use svelte_gjs_compiler::{
    build_project, compile_file, parse_component, render, success_message, BuildConfig,
    CompileError,
};

#[derive(Parser, Debug)]
#[command(name = "svelte-gjs", version, about = "Compile Svelte components into GJS widget code")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile every component and module of a project
    Build {
        /// Source directory
        #[arg(long)]
        src: Option<PathBuf>,
        /// Output directory (cleared before writing)
        #[arg(long)]
        out: Option<PathBuf>,
        /// JSON config file (defaults to ./svelte-gjs.json when present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Do not write runtime.js into the output directory
        #[arg(long)]
        no_runtime: bool,
    },
    /// Compile one file and print the result
    Compile {
        file: PathBuf,
        /// Source root used for module names and import bounds
        #[arg(long, default_value = "src")]
        src: PathBuf,
    },
    /// Print the parsed template of a component as JSON
    Ast { file: PathBuf },
}

fn setup_logging(verbose_count: u8) {
    let log_level = match verbose_count {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .init();
}

fn run(command: Command) -> Result<(), CompileError> {
    match command {
        Command::Build {
            src,
            out,
            config,
            no_runtime,
        } => {
            let mut config = BuildConfig::discover(config.as_deref())?;
            if let Some(src) = src {
                config.src_dir = src;
            }
            if let Some(out) = out {
                config.out_dir = out;
            }
            if no_runtime {
                config.write_runtime = false;
            }
            let report = build_project(&config)?;
            println!("{}", success_message(&report.out_dir));
        }
        Command::Compile { file, src } => {
            print!("{}", compile_file(&file, &src)?);
        }
        Command::Ast { file } => {
            let source = fs::read_to_string(&file).map_err(|e| CompileError::io(&file, &e))?;
            let root = parse_component(&source).map_err(|e| e.with_file(&file))?;
            let json = serde_json::to_string_pretty(&root).map_err(|e| {
                CompileError::new(svelte_gjs_compiler::ErrorKind::Io, e.to_string(), None)
            })?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let source = err.file.as_ref().and_then(|path| fs::read_to_string(path).ok());
            eprintln!("{}", render(&err, source.as_deref()));
            ExitCode::FAILURE
        }
    }
}
