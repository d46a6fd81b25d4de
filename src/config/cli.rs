use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "geodata-harvest")]
#[command(about = "Download soil, elevation and radiometric rasters for a region of interest")]
pub struct CliArgs {
    /// Path to the settings document (.json or .toml)
    #[arg(short, long, default_value = "settings.json")]
    pub config: PathBuf,

    /// Override `outpath` from the settings document
    #[arg(short, long)]
    pub outpath: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Sample memory usage after each harvest phase
    #[arg(long)]
    pub monitor: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Dry run - show what would be fetched without downloading
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["geodata-harvest"]);
        assert_eq!(args.config, PathBuf::from("settings.json"));
        assert!(args.outpath.is_none());
        assert!(!args.verbose && !args.monitor && !args.dry_run && !args.json_logs);
    }

    #[test]
    fn test_flags() {
        let args = CliArgs::parse_from([
            "geodata-harvest",
            "--config",
            "harvest.toml",
            "-o",
            "/tmp/out",
            "--monitor",
            "--dry-run",
        ]);
        assert_eq!(args.config, PathBuf::from("harvest.toml"));
        assert_eq!(args.outpath, Some(PathBuf::from("/tmp/out")));
        assert!(args.monitor && args.dry_run);
    }
}
