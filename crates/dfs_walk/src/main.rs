// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Prints every path below a directory, one per line, in pre-order.
//!
//! # Usage
//!
//! ```bash
//! dfs_walk [ROOT]
//! ```
//!
//! `ROOT` defaults to the current directory. The tool exits with code 0 once every path has
//! been printed, or with code 1 after printing the first error to standard error. Diagnostic
//! logging goes to standard error and is controlled by `RUST_LOG` (default `warn`).

use std::io::{self, Write as _};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[derive(Parser, Debug)]
#[command(name = "dfs_walk", version, about = "Prints every path below a directory, in pre-order")]
struct Cli {
    /// Directory to walk
    #[arg(value_name = "ROOT", default_value = ".")]
    root: PathBuf,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut out = io::stdout().lock();
    dfs_walk::walk(&cli.root, |path| {
        writeln!(out, "{}", path.display()).context("cannot write to standard output")
    })?;
    out.flush().context("cannot write to standard output")
}
