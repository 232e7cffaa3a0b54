use std::time::Instant;

use bytes::Bytes;
use goridge_rpc::{Codec, DecodeOptions, MultiRpc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::cmd::{open_relay, resolve_payload, MultiArgs};
use crate::exit::{rpc_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_multi, MultiRow, OutputFormat, Reply};

pub fn run(args: MultiArgs, format: OutputFormat) -> CliResult<i32> {
    let codec = Codec::from(args.payload.codec);
    let payload = resolve_payload(&args.payload, codec)?;

    let relays = (0..args.relays)
        .map(|_| open_relay(&args.connection))
        .collect::<CliResult<Vec<_>>>()?;
    let mut pool = MultiRpc::new(relays)
        .map_err(|err| rpc_error("invalid relay pool", err))?
        .with_codec(codec);
    if let Some(prefix) = &args.payload.prefix {
        pool = pool.with_service_prefix(prefix.clone());
    }
    pool.pre_connect_relays()
        .map_err(|err| rpc_error("connect failed", err))?;

    let started = Instant::now();
    let mut sequences = Vec::with_capacity(args.count);
    for _ in 0..args.count {
        let sequence = pool
            .call_async(&args.method, &payload)
            .map_err(|err| rpc_error("submit failed", err))?;
        debug!(sequence, "submitted");
        sequences.push(sequence);
    }

    let rows = match codec {
        Codec::Raw => collect::<Bytes>(&mut pool, &sequences, DecodeOptions::NONE, Reply::Raw)?,
        _ => collect::<Value>(
            &mut pool,
            &sequences,
            DecodeOptions::EMPTY_AS_NULL,
            Reply::Value,
        )?,
    };

    let failed = rows.iter().filter(|row| row.outcome.is_err()).count();
    info!(
        calls = rows.len(),
        failed,
        relays = pool.total_relays(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "multi call finished"
    );
    print_multi(&args.method, &rows, format);

    Ok(if failed == 0 { SUCCESS } else { FAILURE })
}

/// Drain every response in completion order.
fn collect<R: DeserializeOwned>(
    pool: &mut MultiRpc,
    sequences: &[u32],
    options: DecodeOptions,
    wrap: fn(R) -> Reply,
) -> CliResult<Vec<MultiRow>> {
    let responses = pool
        .get_responses_with_options::<R>(sequences, options)
        .map_err(|err| rpc_error("collect failed", err))?;

    Ok(responses
        .map(|(sequence, result)| MultiRow {
            sequence,
            outcome: result.map(wrap).map_err(|err| err.to_string()),
        })
        .collect())
}
