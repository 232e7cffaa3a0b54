mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "goridge", version, about = "Goridge RPC client")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::CodecArg;

    #[test]
    fn parses_call_subcommand() {
        let cli = Cli::try_parse_from([
            "goridge",
            "call",
            "Service.Echo",
            "--connection",
            "unix:///tmp/rr.sock",
            "--json",
            "{\"x\":1}",
            "--codec",
            "msgpack",
        ])
        .expect("call args should parse");

        match cli.command {
            Command::Call(args) => {
                assert_eq!(args.method, "Service.Echo");
                assert_eq!(args.connection.connection, "unix:///tmp/rr.sock");
                assert!(matches!(args.codec, CodecArg::Msgpack));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "goridge",
            "call",
            "Service.Echo",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_multi_subcommand_with_defaults() {
        let cli = Cli::try_parse_from(["goridge", "multi", "Service.Ping", "-c", "tcp://10.0.0.1:7000"])
            .expect("multi args should parse");

        match cli.command {
            Command::Multi(args) => {
                assert_eq!(args.count, 10);
                assert_eq!(args.relays, 4);
                assert_eq!(args.connection.connection, "tcp://10.0.0.1:7000");
                assert!(matches!(args.codec, CodecArg::Json));
            }
            other => panic!("expected multi, got {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_relays() {
        let err = Cli::try_parse_from(["goridge", "multi", "Service.Ping", "--relays", "0"])
            .expect_err("zero relays should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "goridge",
            "version",
            "--extended",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("version args should parse");
        assert!(matches!(cli.command, Command::Version(_)));
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.log_level, LogLevel::Debug));
    }
}
