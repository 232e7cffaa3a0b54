use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    profile: &'static str,
    codecs: [&'static str; 3],
    schemes: [&'static str; 3],
}

const VERSION: VersionOutput = VersionOutput {
    name: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
    target: match option_env!("GORIDGE_BUILD_TARGET") {
        Some(target) => target,
        None => "unknown",
    },
    profile: match option_env!("GORIDGE_BUILD_PROFILE") {
        Some(profile) => profile,
        None => "unknown",
    },
    codecs: ["raw", "json", "msgpack"],
    schemes: ["tcp", "unix", "pipes"],
};

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("{} {}", VERSION.name, VERSION.version);
        return Ok(SUCCESS);
    }

    if let OutputFormat::Json = format {
        println!(
            "{}",
            serde_json::to_string(&VERSION).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(SUCCESS);
    }

    println!("name: {}", VERSION.name);
    println!("version: {}", VERSION.version);
    println!("target: {}", VERSION.target);
    println!("profile: {}", VERSION.profile);
    println!("codecs: {}", VERSION.codecs.join(", "));
    println!("schemes: {}", VERSION.schemes.join(", "));

    Ok(SUCCESS)
}
