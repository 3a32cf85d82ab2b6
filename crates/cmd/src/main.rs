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

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use qfile_common_telemetry::{LogFormat, LoggingOptions, init_global_logging, set_panic_hook};
use qfile_storage_queue::{
    DEFAULT_INITIAL_SIZE, DEFAULT_MAX_SIZE, QueueFile, QueueFileBuilder, StorageKind,
};
use snafu::{ResultExt, Whatever, ensure_whatever};

#[derive(Debug, Parser)]
#[clap(
name = "qfile",
about = "Inspect and operate on durable queue files",
author,
version)]
struct Cli {
    /// Log level filter, e.g. "info" or "warn,qfile_storage_queue=debug".
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StorageArg {
    Direct,
    Mapped,
}

impl From<StorageArg> for StorageKind {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Direct => Self::Direct,
            StorageArg::Mapped => Self::Mapped,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Inspect(InspectArgs),
    Verify(VerifyArgs),
    Create(CreateArgs),
    Push(PushArgs),
    Peek(PeekArgs),
    Pop(PopArgs),
    Clear(ClearArgs),
}

/// Options shared by every command that opens a queue file.
#[derive(Debug, Clone, Args)]
struct QueueArgs {
    /// Path of the queue file.
    path: PathBuf,

    #[arg(long, value_enum, default_value_t = StorageArg::Direct)]
    storage: StorageArg,

    /// Size the file shrinks back to when cleared.
    #[arg(long, default_value_t = DEFAULT_INITIAL_SIZE)]
    initial_size: u64,

    /// Upper bound the file may grow to.
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE)]
    max_size: u64,
}

impl QueueArgs {
    fn builder(&self) -> QueueFileBuilder {
        QueueFileBuilder::new(&self.path)
            .initial_size(self.initial_size)
            .max_size(self.max_size)
            .storage_kind(self.storage.into())
    }

    /// Opens a queue file that must already exist.
    fn open_existing(&self, verify: bool) -> Result<QueueFile, Whatever> {
        ensure_whatever!(
            is_non_empty_file(&self.path),
            "Queue file {} does not exist",
            self.path.display()
        );
        self.builder()
            .verify_on_open(verify)
            .build()
            .with_whatever_context(|e| {
                format!(
                    "Failed to open queue file {} ({:?}): {e}",
                    self.path.display(),
                    e.kind()
                )
            })
    }
}

fn is_non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

fn print_payload(payload: &[u8]) { println!("{}", String::from_utf8_lossy(payload)); }

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print the header of a queue file.
Examples:

qfile inspect ./queue.dat

")]
struct InspectArgs {
    #[command(flatten)]
    queue: QueueArgs,
}

impl InspectArgs {
    fn run(&self) -> Result<(), Whatever> {
        let queue = self.queue.open_existing(false)?;
        let header = queue.header();
        println!("{header}");
        println!("version:         {}", header.version());
        println!("checksum:        {:#010x}", header.checksum());
        println!("used bytes:      {}", queue.used_bytes());
        println!("remaining bytes: {}", queue.remaining_bytes());
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Check the header and the checksum of every element.
Examples:

qfile verify ./queue.dat

")]
struct VerifyArgs {
    #[command(flatten)]
    queue: QueueArgs,
}

impl VerifyArgs {
    fn run(&self) -> Result<(), Whatever> {
        let queue = self.queue.open_existing(true)?;
        println!("OK: {} elements", queue.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Create an empty queue file.
Examples:

qfile create ./queue.dat --initial-size 65536

")]
struct CreateArgs {
    #[command(flatten)]
    queue: QueueArgs,
}

impl CreateArgs {
    fn run(&self) -> Result<(), Whatever> {
        ensure_whatever!(
            !is_non_empty_file(&self.queue.path),
            "Queue file {} already exists",
            self.queue.path.display()
        );
        let queue = self
            .queue
            .builder()
            .build()
            .whatever_context("Failed to create queue file")?;
        println!("{}", queue.header());
        queue.close().whatever_context("Failed to close queue file")
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Append one or more elements, creating the file if needed.
Examples:

qfile push ./queue.dat first second

")]
struct PushArgs {
    #[command(flatten)]
    queue: QueueArgs,

    #[arg(required = true)]
    payloads: Vec<String>,
}

impl PushArgs {
    fn run(&self) -> Result<(), Whatever> {
        let mut queue = self
            .queue
            .builder()
            .build()
            .whatever_context("Failed to open queue file")?;
        queue
            .push_all(&self.payloads)
            .whatever_context("Failed to push elements")?;
        println!("{} elements", queue.len());
        queue.close().whatever_context("Failed to close queue file")
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print elements without removing them, oldest first.
Examples:

qfile peek ./queue.dat
qfile peek ./queue.dat --all

")]
struct PeekArgs {
    #[command(flatten)]
    queue: QueueArgs,

    /// Print every element instead of only the oldest.
    #[arg(long)]
    all: bool,
}

impl PeekArgs {
    fn run(&self) -> Result<(), Whatever> {
        let queue = self.queue.open_existing(false)?;
        if self.all {
            for payload in &queue {
                print_payload(&payload.whatever_context("Failed to read element")?);
            }
        } else if let Some(payload) = queue.peek().whatever_context("Failed to read element")? {
            print_payload(&payload);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print and remove the oldest elements.
Examples:

qfile pop ./queue.dat -n 3

")]
struct PopArgs {
    #[command(flatten)]
    queue: QueueArgs,

    /// Number of elements to remove.
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,
}

impl PopArgs {
    fn run(&self) -> Result<(), Whatever> {
        let mut queue = self.queue.open_existing(false)?;
        let count = self.count.min(queue.len());
        for payload in queue.iter().take(count) {
            print_payload(&payload.whatever_context("Failed to read element")?);
        }
        queue
            .remove(count)
            .whatever_context("Failed to remove elements")?;
        queue.close().whatever_context("Failed to close queue file")
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Remove all elements and shrink the file to its initial size.
Examples:

qfile clear ./queue.dat

")]
struct ClearArgs {
    #[command(flatten)]
    queue: QueueArgs,
}

impl ClearArgs {
    fn run(&self) -> Result<(), Whatever> {
        let mut queue = self.queue.open_existing(false)?;
        queue.clear().whatever_context("Failed to clear queue file")?;
        queue.close().whatever_context("Failed to close queue file")
    }
}

fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();

    let opts = LoggingOptions {
        level: Some(cli.log_level.clone()),
        log_format: cli.log_format.into(),
        ..Default::default()
    };
    let _guards = init_global_logging("qfile", &opts).whatever_context("Failed to initialize logging")?;
    set_panic_hook("qfile");

    match cli.commands {
        Commands::Inspect(args) => args.run(),
        Commands::Verify(args) => args.run(),
        Commands::Create(args) => args.run(),
        Commands::Push(args) => args.run(),
        Commands::Peek(args) => args.run(),
        Commands::Pop(args) => args.run(),
        Commands::Clear(args) => args.run(),
    }
}
