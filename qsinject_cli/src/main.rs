use qsinject_core::config::{EngineConfig, RuleFile, RunOptions, default_concurrency};
use qsinject_core::corpus::read_targets;
use qsinject_core::error::EngineError;
use qsinject_core::logging::init_logging;
use qsinject_core::mutator::Mutator;
use qsinject_core::scheduler::Dispatcher;
use qsinject_core::sink::WriterSink;

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;

/// Generates query-string fuzzing candidates from URLs read on stdin.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Regex rules file (TOML, or JSON/YAML by .json/.yaml/.yml extension); supports multiple rules per run
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,
    /// Print more detail for failed or malformed URLs
    #[clap(long)]
    debug: bool,
    /// Concurrency / worker count
    #[clap(short, long, default_value_t = default_concurrency())]
    workers: usize,
    /// Emit URL-decoded query strings (default is encoded)
    #[clap(short, long)]
    decode: bool,
    /// Regex matching query string values to be replaced
    #[clap(short, long = "match")]
    match_regex: Option<String>,
    /// Replacement for values matched by --match
    #[clap(short, long = "replace")]
    replacement: Option<String>,
    /// Comma separated payloads to inject into every query string value
    #[clap(short, long)]
    injections: Option<String>,
    /// Append to the original value instead of replacing it (q=1 > q=1injection)
    #[clap(short, long)]
    append: bool,
    /// Include URLs a match/replace rule left unchanged
    #[clap(long, alias = "iu")]
    include_unaltered: bool,
    /// Print version
    #[clap(short = 'v', long, action = clap::ArgAction::Version)]
    version: (),
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            debug: self.debug,
            concurrency: self.workers,
            decoded_params: self.decode,
            append_mode: self.append,
            include_unaltered: self.include_unaltered,
        }
    }

    fn engine_config(&self) -> Result<EngineConfig, anyhow::Error> {
        let rule_file = match &self.config {
            Some(path) => Some(
                RuleFile::load_from_file(path).context("Failed loading config")?,
            ),
            None => None,
        };

        let config = EngineConfig::builder()
            .options(self.run_options())
            .match_regex(self.match_regex.clone())
            .replacement(self.replacement.clone())
            .raw_injections(self.injections.clone())
            .rule_file(rule_file)
            .build()?;
        Ok(config)
    }
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.debug) {
        eprintln!("{e:#}");
    }

    let config = Arc::new(cli.engine_config()?);
    let dispatcher = Dispatcher::new(Arc::clone(&config));
    tracing::debug!(
        strategy = dispatcher.strategy().name(),
        rules = config.rules.len(),
        injections = config.injections.len(),
        "Configuration loaded"
    );

    let targets = read_targets(io::stdin().lock())?;

    let mut sink = WriterSink::new(BufWriter::new(io::stdout().lock()));
    match dispatcher.run(targets, &mut sink) {
        Ok(_) => Ok(()),
        // Output piped into something like `head`.
        Err(EngineError::Sink(e)) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_flags_map_to_options() {
        let cli = Cli::try_parse_from(["qsinject", "-w", "3", "-d", "-a", "-i", "XSS,SQLI"]).unwrap();
        assert_eq!(
            cli.run_options(),
            RunOptions {
                debug: false,
                concurrency: 3,
                decoded_params: true,
                append_mode: true,
                include_unaltered: false,
            }
        );
        let config = cli.engine_config().unwrap();
        assert_eq!(config.injections, vec!["XSS", "SQLI"]);
        assert!(!config.uses_regex_rules());
    }

    #[test]
    fn long_flags_and_alias() {
        let cli = Cli::try_parse_from([
            "qsinject",
            "--match",
            "^1$",
            "--replace",
            "2",
            "--iu",
            "--debug",
        ])
        .unwrap();
        assert!(cli.include_unaltered);
        assert!(cli.debug);
        assert_eq!(cli.workers, 15);

        let config = cli.engine_config().unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].name, "cli");
    }

    #[test]
    fn match_without_replace_is_rejected() {
        let cli = Cli::try_parse_from(["qsinject", "-m", "^1$"]).unwrap();
        assert!(cli.engine_config().is_err());
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let cli = Cli::try_parse_from(["qsinject", "-m", "(", "-r", "x"]).unwrap();
        let err = cli.engine_config().unwrap_err();
        assert!(err.to_string().contains("failed to compile"), "unexpected error: {err}");
    }

    #[test]
    fn missing_rule_file_is_rejected() {
        let cli = Cli::try_parse_from(["qsinject", "-c", "/nonexistent/rules.toml"]).unwrap();
        let err = cli.engine_config().unwrap_err();
        assert!(format!("{err:#}").contains("Failed loading config"));
    }

    #[test]
    fn version_flag_short_circuits() {
        let err = Cli::try_parse_from(["qsinject", "-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
