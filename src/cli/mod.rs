//! Command-line interface for hierlock
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is defined in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::output::OutputOptions;

mod check;
mod config;
mod resolve;

/// hierlock - hierarchical intent locking
///
/// Resolves hierarchy lock requests into ordered bucket locks and checks
/// their compatibility against an in-process blocking substrate.
#[derive(Parser, Debug)]
#[command(name = "hierlock")]
#[command(author, version, about = "hierlock - hierarchical intent locking", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to ./.hierlock.toml when present)
    #[arg(long, global = true, env = "HIERLOCK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the ordered lock targets for a request
    Resolve {
        /// Request: top:U, child:U/C or leaf:U/C/L
        request: String,
    },

    /// Show the canonical lock targets for several leaves under one child
    ResolveLeaves {
        /// Top-level id
        #[arg(long)]
        top: String,

        /// Child id
        #[arg(long)]
        child: String,

        /// Leaf ids, in any order
        #[arg(required = true)]
        leaves: Vec<String>,
    },

    /// Check whether two requests block each other
    Check {
        /// Request held first
        first: String,

        /// Request attempted while the first is held
        second: String,

        /// How long the second request may wait before it counts as blocked
        #[arg(long, default_value = "100ms")]
        wait: String,
    },

    /// Print the effective configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };
        let config = crate::config::Config::discover(self.config.as_ref())?;

        match self.command {
            Commands::Resolve { request } => resolve::run_resolve(resolve::ResolveOptions {
                request,
                config,
                output,
            }),
            Commands::ResolveLeaves { top, child, leaves } => {
                resolve::run_resolve_leaves(resolve::ResolveLeavesOptions {
                    top,
                    child,
                    leaves,
                    config,
                    output,
                })
            }
            Commands::Check {
                first,
                second,
                wait,
            } => check::run(check::CheckOptions {
                first,
                second,
                wait,
                config,
                output,
            }),
            Commands::Config => config::run(config, output),
        }
    }
}
