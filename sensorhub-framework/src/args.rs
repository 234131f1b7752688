//! CLI argument parsing for the service.

use std::path::PathBuf;

use clap::Parser;

/// Common CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(about = "SensorHub telemetry service")]
pub struct ServiceArgs {
    /// Path to configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override the metrics listen address.
    #[arg(long)]
    pub listen: Option<String>,
}

impl ServiceArgs {
    /// Parse CLI arguments with a default config path.
    ///
    /// If no `--config` argument is provided, uses the default.
    pub fn parse_with_default(default_config: &'static str) -> Self {
        let matches = <Self as clap::CommandFactory>::command()
            .mut_arg("config", |arg| arg.default_value(default_config))
            .get_matches();

        <Self as clap::FromArgMatches>::from_arg_matches(&matches)
            .unwrap_or_else(|e| e.exit())
    }

    /// Parse CLI arguments (requires --config to be specified).
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_from_iter() {
        let args = ServiceArgs::try_parse_from([
            "sensorhub",
            "--config",
            "test.json5",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("test.json5"));
        assert_eq!(args.log_level, Some("debug".to_string()));
        assert_eq!(args.listen, None);
    }

    #[test]
    fn test_args_require_config() {
        assert!(ServiceArgs::try_parse_from(["sensorhub"]).is_err());
    }
}
