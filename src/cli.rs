//! Command-line surface.
//!
//! Global options are parsed by clap; everything after the command name is
//! handed to the command as a JSON args record.

use std::path::PathBuf;

use clap::Parser;
use serde_json::{Map, Value};

/// Kiln: pluggable front-end build orchestration.
#[derive(Debug, Parser)]
#[command(name = "kiln", version)]
pub struct Cli {
    /// Configuration file (defaults to `<root>/kiln.toml`)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Project root
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to run: build, dev, plugins, config, or one added by a plugin
    pub command: String,

    /// Command arguments, e.g. `--port 4000 --json`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Turns trailing arguments into `{ "_": [positional...], key: value, flag: true }`.
///
/// `--key value` and `--key=value` set a value, a bare `--flag` is `true`,
/// `--no-flag` is `false`. Dashes in keys become underscores. Values that
/// look like integers or booleans are typed. Everything after `--` is
/// positional.
pub fn parse_command_args(args: &[String]) -> Value {
    let mut record = Map::new();
    let mut positional = Vec::new();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        if arg == "--" {
            positional.extend(iter.by_ref().map(|a| Value::String(a.clone())));
            break;
        }

        let Some(flag) = arg.strip_prefix("--") else {
            positional.push(Value::String(arg.clone()));
            continue;
        };

        if let Some((key, value)) = flag.split_once('=') {
            record.insert(key_of(key), scalar(value));
        } else if let Some(negated) = flag.strip_prefix("no-") {
            record.insert(key_of(negated), Value::Bool(false));
        } else {
            match iter.next_if(|next| !next.starts_with("--")) {
                Some(value) => record.insert(key_of(flag), scalar(value)),
                None => record.insert(key_of(flag), Value::Bool(true)),
            };
        }
    }

    record.insert("_".to_string(), Value::Array(positional));
    Value::Object(record)
}

fn key_of(flag: &str) -> String {
    flag.replace('-', "_")
}

fn scalar(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
