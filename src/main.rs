use std::path::PathBuf;
use std::process;

use clap::Parser;
use voxel_script::config::ScriptConfig;
use voxel_script::core::init_logging;
use voxel_script::host::Goxel;
use voxel_script::scripting::run_script;

#[derive(Parser, Debug)]
#[command(name = "voxel_script", about = "Run a script against a voxel editor document")]
struct Cli {
    /// Configuration file (.toml or .json); omit to search the working directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Script to evaluate.
    script: PathBuf,
}

fn main() {
    // usage errors exit with 2
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match ScriptConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                process::exit(2);
            }
        },
        None => ScriptConfig::load_or_default(),
    };
    config.apply_env_overrides();
    init_logging(&config.logging);

    let mut goxel = Goxel::new();
    let status = run_script(&cli.script, &mut goxel, &config);
    if let voxel_script::RunStatus::Failed(reason) = &status {
        eprintln!("Script host failed: {}", reason);
    }
    process::exit(status.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_cli_accepts_script_and_config() {
        let cli = Cli::try_parse_from(["voxel_script", "--config", "cfg.toml", "scene.js"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("cfg.toml")));
        assert_eq!(cli.script, PathBuf::from("scene.js"));

        let cli = Cli::try_parse_from(["voxel_script", "-c", "cfg.json", "scene.js"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("cfg.json")));
    }

    #[test]
    fn test_cli_rejects_unknown_flag() {
        let err = Cli::try_parse_from(["voxel_script", "--verbose"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_cli_requires_script() {
        let err = Cli::try_parse_from(["voxel_script"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        assert!(Cli::try_parse_from(["voxel_script", "a.js", "b.js"]).is_err());
    }
}
