use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser as ClapParser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use msci_compiler::config::Config;
use msci_compiler::{
    parse_text, CompilerError, GameVersion, ParsedScript, ScriptReader, SyntaxLibrary,
};

#[derive(ClapParser)]
#[command(author, version, about = "MSCI script compiler and decompiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SyntaxArgs {
    /// Syntax definition file, repeatable; merged in order. Defaults to the configured files
    #[arg(long = "syntax", value_name = "PATH")]
    syntax_files: Vec<PathBuf>,
    /// Game release to resolve commands for, e.g. x3tc
    #[arg(long)]
    game: Option<GameVersion>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a script source file and print it as resolved
    Parse {
        file: PathBuf,
        #[command(flatten)]
        syntax: SyntaxArgs,
    },
    /// Check a script source file, exiting with status 1 on errors
    Verify {
        file: PathBuf,
        #[command(flatten)]
        syntax: SyntaxArgs,
    },
    /// Decompile a compiled XML script to source text
    Decompile {
        file: PathBuf,
        #[command(flatten)]
        syntax: SyntaxArgs,
    },
    /// Manage msci configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the configuration in effect
    Show,
    /// Write a default config file for the current environment
    Init,
    /// Print where the config file lives
    Path,
}

fn load_library(args: &SyntaxArgs, config: &Config) -> Result<Arc<SyntaxLibrary>, CompilerError> {
    let paths = if args.syntax_files.is_empty() {
        &config.syntax_files
    } else {
        &args.syntax_files
    };
    if paths.is_empty() {
        warn!("no syntax files given; only comments and blank lines will resolve");
    }
    SyntaxLibrary::load(paths)
}

fn read_source(path: &Path) -> Result<String, CompilerError> {
    if !path.exists() {
        return Err(CompilerError::FileNotFound(format!(
            "Script not found: {}",
            path.display()
        )));
    }
    Ok(fs::read_to_string(path)?)
}

fn parse_file(
    path: &Path,
    args: &SyntaxArgs,
    config: &Config,
) -> Result<ParsedScript, CompilerError> {
    let source = read_source(path)?;
    let library = load_library(args, config)?;
    let version = args.game.unwrap_or(config.game_version);
    let lines: Vec<&str> = source.lines().collect();
    Ok(parse_text(&lines, &library, version))
}

fn decompile(path: &Path, args: &SyntaxArgs, config: &Config) -> Result<String, CompilerError> {
    if !path.exists() {
        return Err(CompilerError::FileNotFound(format!(
            "Script not found: {}",
            path.display()
        )));
    }
    let library = load_library(args, config)?;
    let file = ScriptReader::new(&library).read_file(fs::File::open(path)?)?;

    let mut out = String::new();
    out.push_str(&format!("* name: {}\n", file.name));
    if !file.description.is_empty() {
        out.push_str(&format!("* description: {}\n", file.description));
    }
    let release = file.target_version().map_or("unknown release", GameVersion::title);
    out.push_str(&format!("* engine version: {} ({})\n", file.engine_version, release));
    if !file.variables.is_empty() {
        let names: Vec<String> = file.variables.iter().map(|v| format!("${}", v.name)).collect();
        out.push_str(&format!("* variables: {}\n", names.join(" ")));
    }
    for argument in &file.arguments {
        out.push_str(&format!(
            "* argument {} ({}): {}\n",
            argument.name, argument.param_type, argument.description
        ));
    }
    out.push_str(&file.to_text());
    Ok(out)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::Parse { file, syntax } => {
            let script = parse_file(&file, &syntax, &config)?;
            print!("{}", script.to_text());
            for error in &script.errors {
                eprintln!("{}:{}", file.display(), error);
            }
        }
        Commands::Verify { file, syntax } => {
            let script = parse_file(&file, &syntax, &config)?;
            let invalid = script.verify();
            for error in &script.errors {
                println!("{}:{}", file.display(), error);
            }
            if !invalid.is_empty() {
                println!("{} invalid line(s)", invalid.len());
                process::exit(1);
            }
            println!("{}: no errors", file.display());
        }
        Commands::Decompile { file, syntax } => {
            print!("{}", decompile(&file, &syntax, &config)?);
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigCommands::Init => {
                let config_path = Config::get_config_path();
                if config_path.exists() {
                    println!("Config already exists at: {}", config_path.display());
                } else {
                    config.save()?;
                    println!("Initialized new config at: {}", config_path.display());
                }
            }
            ConfigCommands::Path => {
                println!("{}", Config::get_config_path().display());
            }
        },
    }

    Ok(())
}
