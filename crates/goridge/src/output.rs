use std::io::{IsTerminal, Write};

use bytes::Bytes;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use goridge_rpc::Codec;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A decoded call result.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Value(Value),
    Raw(Bytes),
}

impl Reply {
    /// Result as JSON: structured values as-is, raw bytes as text.
    fn to_json(&self) -> Value {
        match self {
            Reply::Value(value) => value.clone(),
            Reply::Raw(bytes) => Value::String(payload_preview(bytes)),
        }
    }

    fn to_text(&self) -> String {
        match self {
            Reply::Value(value) => value.to_string(),
            Reply::Raw(bytes) => payload_preview(bytes),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Reply::Value(value) => value.to_string().into_bytes(),
            Reply::Raw(bytes) => bytes.to_vec(),
        }
    }
}

#[derive(Serialize)]
struct CallOutput<'a> {
    method: &'a str,
    sequence: u32,
    codec: &'a str,
    relay: &'a str,
    result: Value,
}

pub fn print_call(method: &str, sequence: u32, codec: Codec, relay: &str, reply: &Reply, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                method,
                sequence,
                codec: codec.name(),
                relay,
                result: reply.to_json(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "SEQ", "CODEC", "RELAY", "RESULT"])
                .add_row(vec![
                    method.to_string(),
                    sequence.to_string(),
                    codec.name().to_string(),
                    relay.to_string(),
                    reply.to_text(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "method={method} seq={sequence} codec={} relay={relay} result={}",
                codec.name(),
                reply.to_text()
            );
        }
        OutputFormat::Raw => print_raw(&reply.to_bytes()),
    }
}

/// One completed call of a `multi` run.
pub struct MultiRow {
    pub sequence: u32,
    pub outcome: Result<Reply, String>,
}

#[derive(Serialize)]
struct MultiRowOutput<'a> {
    sequence: u32,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl MultiRow {
    fn status(&self) -> &'static str {
        if self.outcome.is_ok() {
            "ok"
        } else {
            "error"
        }
    }

    fn detail(&self) -> String {
        match &self.outcome {
            Ok(reply) => reply.to_text(),
            Err(message) => message.clone(),
        }
    }

    fn to_output(&self) -> MultiRowOutput<'_> {
        MultiRowOutput {
            sequence: self.sequence,
            status: self.status(),
            result: self.outcome.as_ref().ok().map(Reply::to_json),
            error: self.outcome.as_ref().err().map(String::as_str),
        }
    }
}

pub fn print_multi(method: &str, rows: &[MultiRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for row in rows {
                println!(
                    "{}",
                    serde_json::to_string(&row.to_output()).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "METHOD", "STATUS", "RESULT"]);
            for row in rows {
                table.add_row(vec![
                    row.sequence.to_string(),
                    method.to_string(),
                    row.status().to_string(),
                    row.detail(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!(
                    "seq={} method={method} status={} {}",
                    row.sequence,
                    row.status(),
                    row.detail()
                );
            }
        }
        OutputFormat::Raw => {
            for row in rows {
                if let Ok(reply) = &row.outcome {
                    let mut bytes = reply.to_bytes();
                    bytes.push(b'\n');
                    print_raw(&bytes);
                }
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}
