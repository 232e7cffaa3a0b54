use std::time::Duration;

use bytes::Bytes;
use clap::{Args, Subcommand, ValueEnum};
use goridge_relay::{Endpoint, Relay, SocketConfig, SocketRelay};
use goridge_rpc::Codec;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod multi;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Call one method and print its result.
    Call(CallArgs),
    /// Fire several calls over a relay pool and print responses as they complete.
    Multi(MultiArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format),
        Command::Multi(args) => multi::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Worker connection string: tcp://host:port, unix:///path or pipes://stdin:stdout.
    #[arg(
        long,
        short = 'c',
        env = "GORIDGE_CONNECTION",
        default_value = "tcp://127.0.0.1:6001"
    )]
    pub connection: String,
    /// Socket read/write timeout (e.g. 30s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// JSON argument.
    #[arg(long, conflicts_with = "data")]
    pub json: Option<String>,
    /// String argument.
    #[arg(long, conflicts_with = "json")]
    pub data: Option<String>,
    /// Payload codec.
    #[arg(long, value_enum, default_value = "json")]
    pub codec: CodecArg,
    /// Service prefix; the method is title-cased and joined as PREFIX.Method.
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Remote method, e.g. Service.Ping.
    pub method: String,
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct MultiArgs {
    /// Remote method, e.g. Service.Ping.
    pub method: String,
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Number of calls to submit.
    #[arg(long, default_value_t = 10)]
    pub count: usize,
    /// Number of relays in the pool.
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    pub relays: u16,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum CodecArg {
    Json,
    Msgpack,
    Raw,
}

impl From<CodecArg> for Codec {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::Json => Codec::Json,
            CodecArg::Msgpack => Codec::MsgPack,
            CodecArg::Raw => Codec::Raw,
        }
    }
}

/// Call argument as given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Value(Value),
    Raw(Bytes),
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Value(value) => value.serialize(serializer),
            Payload::Raw(bytes) => bytes.serialize(serializer),
        }
    }
}

/// Build the call argument for `codec`.
///
/// The raw codec sends the given text as bytes; the structured codecs send
/// parsed JSON, a plain string, or null when nothing was given.
pub fn resolve_payload(args: &PayloadArgs, codec: Codec) -> CliResult<Payload> {
    if let Some(json) = &args.json {
        let value = serde_json::from_str::<Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(match codec {
            Codec::Raw => Payload::Raw(Bytes::from(json.clone().into_bytes())),
            _ => Payload::Value(value),
        });
    }

    let data = args.data.clone();
    Ok(match (codec, data) {
        (Codec::Raw, data) => Payload::Raw(Bytes::from(data.unwrap_or_default().into_bytes())),
        (_, Some(data)) => Payload::Value(Value::String(data)),
        (_, None) => Payload::Value(Value::Null),
    })
}

/// Open an unconnected relay, applying the I/O timeout to sockets.
pub fn open_relay(args: &ConnectionArgs) -> CliResult<Box<dyn Relay>> {
    let timeout = parse_duration(&args.timeout)?;
    let endpoint = goridge_relay::parse(&args.connection)
        .map_err(|err| transport_error("invalid connection", err))?;

    match endpoint {
        Endpoint::Socket(address) => {
            let config = SocketConfig {
                read_timeout: Some(timeout),
                write_timeout: Some(timeout),
                ..SocketConfig::default()
            };
            Ok(Box::new(SocketRelay::new(address).with_config(config)))
        }
        Endpoint::Pipes { .. } => goridge_relay::create(&args.connection)
            .map_err(|err| transport_error("failed opening pipes", err)),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload_args(json: Option<&str>, data: Option<&str>) -> PayloadArgs {
        PayloadArgs {
            json: json.map(str::to_string),
            data: data.map(str::to_string),
            codec: CodecArg::Json,
            prefix: None,
        }
    }

    #[test]
    fn json_payload_is_parsed_for_structured_codecs() {
        let args = payload_args(Some("{\"ids\":[1,2]}"), None);
        assert_eq!(
            resolve_payload(&args, Codec::MsgPack).unwrap(),
            Payload::Value(json!({"ids": [1, 2]}))
        );
        assert_eq!(
            resolve_payload(&args, Codec::Raw).unwrap(),
            Payload::Raw(Bytes::from_static(b"{\"ids\":[1,2]}"))
        );
    }

    #[test]
    fn invalid_json_is_usage_error() {
        let err = resolve_payload(&payload_args(Some("{nope"), None), Codec::Json).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn data_and_empty_payloads() {
        assert_eq!(
            resolve_payload(&payload_args(None, Some("hi")), Codec::Json).unwrap(),
            Payload::Value(json!("hi"))
        );
        assert_eq!(
            resolve_payload(&payload_args(None, None), Codec::Json).unwrap(),
            Payload::Value(Value::Null)
        );
        assert_eq!(
            resolve_payload(&payload_args(None, None), Codec::Raw).unwrap(),
            Payload::Raw(Bytes::new())
        );
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn socket_relays_open_lazily() {
        let args = ConnectionArgs {
            connection: "tcp://127.0.0.1:6001".to_string(),
            timeout: "1s".to_string(),
        };
        let relay = open_relay(&args).unwrap();
        assert!(!relay.is_connected());
        assert_eq!(relay.to_string(), "tcp://127.0.0.1:6001");

        let args = ConnectionArgs {
            connection: "udp://127.0.0.1:6001".to_string(),
            timeout: "1s".to_string(),
        };
        match open_relay(&args) {
            Err(err) => assert_eq!(err.code, USAGE),
            Ok(relay) => panic!("expected usage error, got relay {relay}"),
        }
    }
}
