mod bootstrap;
mod cli;
mod paths;
mod run;

use anyhow::{Context, Result};
use bootstrap::{apply_overrides, load_config, ConfigOrigin};
use cli::{Command, ConfigAction, RunArgs};
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Config(config_cmd)) => handle_config_command(config_cmd.action, &cli.run),
        None => run::run(cli.run),
    }
}

fn handle_config_command(action: ConfigAction, args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    match action {
        ConfigAction::Where => run_config_where(&paths, args),
        ConfigAction::Print => run_config_print(&paths, args),
    }
}

fn run_config_where(paths: &AppPaths, args: &RunArgs) -> Result<()> {
    let default_file = paths.default_config_file();
    println!("Configuration:");
    println!("  dir:      {}", paths.config_dir().display());
    println!(
        "  default:  {} ({})",
        default_file.display(),
        if default_file.is_file() {
            "present"
        } else {
            "missing"
        }
    );
    if let Some(explicit) = &args.config {
        println!("  explicit: {}", explicit.display());
    }
    Ok(())
}

fn run_config_print(paths: &AppPaths, args: &RunArgs) -> Result<()> {
    let (mut config, origin) = load_config(args, paths)?;
    apply_overrides(&mut config, args)?;
    let rendered = config
        .to_toml_string()
        .context("failed to serialise configuration")?;
    match origin {
        ConfigOrigin::Explicit(path) | ConfigOrigin::UserDefault(path) => {
            println!("# loaded from {}", path.display());
        }
        ConfigOrigin::BuiltIn => println!("# built-in defaults"),
    }
    print!("{rendered}");
    Ok(())
}
