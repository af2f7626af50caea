//! `tessel` command line front end.
//!
//! ```text
//! tessel compile index.html.tsl --root templates
//! tessel warm --root templates --cache .cache/tessel
//! tessel clear --cache .cache/tessel
//! ```
//!
//! Environment options can be read from a YAML file with `--config`; command
//! line flags override the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use console::Style;
use tessel::{Environment, EnvironmentOptions, FilesystemLoader};

/// Compile templates into cached units.
#[derive(Parser)]
#[command(name = "tessel", version, about)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// YAML file with environment options
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the emitted source of one template
    Compile(CompileArgs),

    /// Compile every template under the roots into the cache
    Warm(WarmArgs),

    /// Delete persisted units
    Clear(ClearArgs),
}

#[derive(Args)]
struct CompileArgs {
    /// Template name, relative to a root
    name: String,

    /// Template directory, searched in order
    #[arg(long = "root", value_name = "DIR", required = true)]
    roots: Vec<PathBuf>,
}

#[derive(Args)]
struct WarmArgs {
    /// Template directory, searched in order
    #[arg(long = "root", value_name = "DIR", required = true)]
    roots: Vec<PathBuf>,

    /// Cache directory (defaults to `cache` from the config)
    #[arg(long, value_name = "DIR")]
    cache: Option<PathBuf>,
}

#[derive(Args)]
struct ClearArgs {
    /// Cache directory (defaults to `cache` from the config)
    #[arg(long, value_name = "DIR")]
    cache: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", Style::new().red().bold().apply_to("error:"), err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let options = load_options(cli.config.as_deref())?;
    match cli.command {
        Commands::Compile(args) => compile(args, options),
        Commands::Warm(args) => warm(args, options),
        Commands::Clear(args) => clear(args, options),
    }
}

fn load_options(config: Option<&Path>) -> Result<EnvironmentOptions> {
    let Some(path) = config else {
        return Ok(EnvironmentOptions::default());
    };
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    EnvironmentOptions::from_yaml(&yaml)
        .with_context(|| format!("invalid config {}", path.display()))
}

fn loader_for(roots: &[PathBuf]) -> Result<FilesystemLoader> {
    let mut loader = FilesystemLoader::default();
    for root in roots {
        loader.add_path(root)?;
    }
    Ok(loader)
}

fn compile(args: CompileArgs, mut options: EnvironmentOptions) -> Result<()> {
    options.cache = None;
    let env = Environment::with_options(loader_for(&args.roots)?, options);
    let source = env.loader()?.source(&args.name)?;
    let compiled = env.compile_source(&source, &args.name)?;
    print!("{}", compiled);
    Ok(())
}

fn warm(args: WarmArgs, mut options: EnvironmentOptions) -> Result<()> {
    let Some(cache) = args.cache.or_else(|| options.cache.take()) else {
        bail!("no cache directory: pass --cache or set `cache` in the config");
    };
    options.cache = Some(cache.clone());

    let loader = loader_for(&args.roots)?;
    let names = loader.template_names()?;
    let env = Environment::with_options(loader, options);

    let dim = Style::new().dim();
    for name in &names {
        let unit = env
            .resolve_unit(name, None)
            .with_context(|| format!("failed to compile {}", name))?;
        tracing::debug!(template = %name, unit = %unit.name(), "warmed");
        println!("{} {}", dim.apply_to("compiled"), name);
    }
    println!(
        "{} {} template(s) into {}",
        Style::new().green().bold().apply_to("Warmed"),
        names.len(),
        cache.display()
    );
    Ok(())
}

fn clear(args: ClearArgs, mut options: EnvironmentOptions) -> Result<()> {
    let Some(cache) = args.cache.or_else(|| options.cache.take()) else {
        bail!("no cache directory: pass --cache or set `cache` in the config");
    };
    options.cache = Some(cache.clone());

    let env = Environment::from_options(options);
    let removed = env.clear_persisted_cache();
    println!(
        "{} {} unit file(s) from {}",
        Style::new().green().bold().apply_to("Removed"),
        removed,
        cache.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_warm() {
        let cli = Cli::try_parse_from([
            "tessel", "-vv", "warm", "--root", "a", "--root", "b", "--cache", "c",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Warm(args) => {
                assert_eq!(args.roots, [PathBuf::from("a"), PathBuf::from("b")]);
                assert_eq!(args.cache, Some(PathBuf::from("c")));
            }
            _ => panic!("expected warm"),
        }
    }

    #[test]
    fn test_warm_then_clear() {
        let templates = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        fs::create_dir(templates.path().join("mail")).unwrap();
        fs::write(templates.path().join("index.tsl"), "Hello {{ name }}").unwrap();
        fs::write(templates.path().join("mail/welcome.tsl"), "Welcome").unwrap();

        warm(
            WarmArgs {
                roots: vec![templates.path().to_path_buf()],
                cache: Some(cache.path().to_path_buf()),
            },
            EnvironmentOptions::default(),
        )
        .unwrap();

        let env = Environment::from_options(EnvironmentOptions {
            cache: Some(cache.path().to_path_buf()),
            ..Default::default()
        });
        assert_eq!(env.clear_persisted_cache(), 2);
    }

    #[test]
    fn test_clear_requires_cache() {
        let err = clear(ClearArgs { cache: None }, EnvironmentOptions::default()).unwrap_err();
        assert!(err.to_string().contains("no cache directory"));
    }

    #[test]
    fn test_load_options_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tessel.yaml");
        fs::write(&path, "strict_variables: true\ncache: /tmp/tessel\n").unwrap();
        let options = load_options(Some(&path)).unwrap();
        assert!(options.strict_variables);
        assert_eq!(options.cache, Some(PathBuf::from("/tmp/tessel")));
    }
}
