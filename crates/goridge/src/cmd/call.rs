use bytes::Bytes;
use goridge_rpc::{Codec, DecodeOptions, Rpc, SequenceCounter};
use serde_json::Value;
use tracing::debug;

use crate::cmd::{open_relay, resolve_payload, CallArgs};
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_call, OutputFormat, Reply};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let codec = Codec::from(args.payload.codec);
    let payload = resolve_payload(&args.payload, codec)?;
    let relay = open_relay(&args.connection)?;

    let sequence = SequenceCounter::new();
    let mut rpc = Rpc::new(relay)
        .with_codec(codec)
        .with_sequence(sequence.clone());
    if let Some(prefix) = &args.payload.prefix {
        rpc = rpc.with_service_prefix(prefix.clone());
    }

    debug!(method = %args.method, codec = codec.name(), relay = %rpc.relay(), "calling");
    let reply = match codec {
        Codec::Raw => rpc
            .call::<_, Bytes>(&args.method, &payload)
            .map(Reply::Raw),
        _ => rpc
            .call_with_options::<_, Value>(&args.method, &payload, DecodeOptions::EMPTY_AS_NULL)
            .map(Reply::Value),
    }
    .map_err(|err| rpc_error("call failed", err))?;

    let relay = rpc.relay().to_string();
    print_call(&args.method, sequence.last(), codec, &relay, &reply, format);
    Ok(SUCCESS)
}
