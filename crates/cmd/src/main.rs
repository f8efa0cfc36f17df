// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use snafu::{ResultExt, Whatever, whatever};
use spool_common_telemetry::{LoggingOptions, init_global_logging, set_panic_hook};
use spool_queue::{OffsetCachePolicy, QueueBuilder, QueueConfig, QueueFile};

#[derive(Debug, Parser)]
#[clap(
name = "spool",
about = "Inspect and edit file-backed FIFO queues",
author = env!("CARGO_PKG_AUTHORS"),
version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(flatten)]
    queue: QueueArgs,

    /// Log filter, e.g. "debug" or "spool_queue=trace".
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write rotated log files to this directory.
    #[arg(long, global = true)]
    log_dir: Option<String>,

    #[command(subcommand)]
    commands: Commands,
}

/// Settings for opening the queue. Flags override `--config`.
#[derive(Debug, Clone, Args)]
struct QueueArgs {
    /// Queue file to operate on.
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// JSON file holding a queue configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Initial length of a newly created file.
    #[arg(long, global = true)]
    capacity: Option<u64>,

    /// Skip flushing on every commit.
    #[arg(long, global = true)]
    no_sync: bool,

    /// Leave removed bytes in place instead of zeroing them.
    #[arg(long, global = true)]
    no_overwrite: bool,

    /// Pointer caching: none, lazy or eager.
    #[arg(long, global = true, value_parser = parse_cache_policy)]
    offset_cache: Option<OffsetCachePolicy>,
}

impl QueueArgs {
    fn resolve(&self) -> Result<QueueConfig, Whatever> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path).with_whatever_context(|_| {
                    format!("failed to read config {}", path.display())
                })?;
                serde_json::from_str::<QueueConfig>(&raw).with_whatever_context(|_| {
                    format!("failed to parse config {}", path.display())
                })?
            }
            None => QueueConfig::default(),
        };

        if let Some(file) = &self.file {
            config.path.clone_from(file);
        } else if self.config.is_none() {
            whatever!("no queue file given: pass --file or --config");
        }
        if let Some(capacity) = self.capacity {
            config.initial_capacity = capacity;
        }
        if self.no_sync {
            config.sync_writes = false;
        }
        if self.no_overwrite {
            config.overwrite_on_remove = false;
        }
        if let Some(policy) = self.offset_cache {
            config.offset_cache = policy;
        }
        Ok(config)
    }

    fn open(&self) -> Result<QueueFile, Whatever> {
        let config = self.resolve()?;
        let path = config.path.clone();
        QueueBuilder::from_config(config)
            .open()
            .with_whatever_context(|_| format!("failed to open queue {}", path.display()))
    }
}

fn parse_cache_policy(value: &str) -> Result<OffsetCachePolicy, String> {
    match value {
        "none" => Ok(OffsetCachePolicy::None),
        "lazy" => Ok(OffsetCachePolicy::Lazy),
        "eager" => Ok(OffsetCachePolicy::Eager),
        other => Err(format!("unknown offset cache policy '{other}'")),
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Info(InfoArgs),
    Push(PushArgs),
    Peek(PeekArgs),
    Pop(PopArgs),
    Dump(DumpArgs),
    Clear(ClearArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print size, file length, used bytes and header format.
Examples:

spool info -f events.qf

")]
struct InfoArgs {}

impl InfoArgs {
    fn run(&self, queue: &QueueFile) -> Result<(), Whatever> {
        println!("path:       {}", queue.path().display());
        println!("format:     {}", queue.format());
        println!("elements:   {}", queue.size());
        println!("file len:   {}", queue.file_len());
        println!("used bytes: {}", queue.used_bytes());
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Append elements in one transaction.
Examples:

spool push -f events.qf first second
cat lines.txt | spool push -f events.qf --stdin

")]
struct PushArgs {
    /// Elements to append, as UTF-8 text.
    data: Vec<String>,

    /// Append every line read from stdin.
    #[arg(long)]
    stdin: bool,
}

impl PushArgs {
    fn run(&self, queue: &mut QueueFile) -> Result<(), Whatever> {
        let mut payloads: Vec<Vec<u8>> = self.data.iter().map(|d| d.as_bytes().to_vec()).collect();
        if self.stdin {
            for line in std::io::stdin().lock().lines() {
                payloads.push(line.whatever_context("failed to read stdin")?.into_bytes());
            }
        }
        let added = payloads.len();
        queue
            .add_n(payloads)
            .whatever_context("failed to append elements")?;
        println!("added {added}, size {}", queue.size());
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print the head element without removing it.
Examples:

spool peek -f events.qf

")]
struct PeekArgs {
    /// Print bytes as hex instead of text.
    #[arg(long)]
    hex: bool,
}

impl PeekArgs {
    fn run(&self, queue: &QueueFile) -> Result<(), Whatever> {
        match queue.peek().whatever_context("failed to read head")? {
            Some(payload) => println!("{}", render(&payload, self.hex)),
            None => println!("(empty)"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print and remove the oldest elements.
Examples:

spool pop -f events.qf
spool pop -f events.qf -n 10

")]
struct PopArgs {
    /// Number of elements to remove.
    #[arg(short, default_value_t = 1)]
    n: usize,

    /// Print bytes as hex instead of text.
    #[arg(long)]
    hex: bool,
}

impl PopArgs {
    fn run(&self, queue: &mut QueueFile) -> Result<(), Whatever> {
        let popped: Vec<Bytes> = queue
            .iter()
            .take(self.n)
            .collect::<Result<_, _>>()
            .whatever_context("failed to read elements")?;
        queue
            .remove_n(self.n)
            .whatever_context("failed to remove elements")?;
        for payload in popped {
            println!("{}", render(&payload, self.hex));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print every element, head first, with its index.
Examples:

spool dump -f events.qf --hex

")]
struct DumpArgs {
    /// Print bytes as hex instead of text.
    #[arg(long)]
    hex: bool,
}

impl DumpArgs {
    fn run(&self, queue: &mut QueueFile) -> Result<(), Whatever> {
        let mut out = std::io::stdout().lock();
        for (index, payload) in queue.iter().enumerate() {
            let payload = payload.whatever_context("failed to read element")?;
            writeln!(out, "{index}\t{}", render(&payload, self.hex))
                .whatever_context("failed to write output")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Remove every element.
Examples:

spool clear -f events.qf

")]
struct ClearArgs {}

impl ClearArgs {
    fn run(&self, queue: &mut QueueFile) -> Result<(), Whatever> {
        queue.clear().whatever_context("failed to clear queue")?;
        println!("cleared, file len {}", queue.file_len());
        Ok(())
    }
}

fn render(payload: &[u8], hex: bool) -> String {
    if hex {
        payload.iter().map(|b| format!("{b:02x}")).collect()
    } else {
        String::from_utf8_lossy(payload).into_owned()
    }
}

fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();

    let logging = LoggingOptions {
        dir: cli.log_dir.clone().unwrap_or_default(),
        level: Some(cli.log_level.clone().unwrap_or_else(|| "warn".to_string())),
        append_stdout: cli.log_level.is_some(),
        ..Default::default()
    };
    let _guards = init_global_logging("spool", &logging);
    set_panic_hook();

    let mut queue = cli.queue.open()?;
    match cli.commands {
        Commands::Info(args) => args.run(&queue),
        Commands::Push(args) => args.run(&mut queue),
        Commands::Peek(args) => args.run(&queue),
        Commands::Pop(args) => args.run(&mut queue),
        Commands::Dump(args) => args.run(&mut queue),
        Commands::Clear(args) => args.run(&mut queue),
    }
}
