use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod args;
mod parsers;


pub use args::{CheckArgs, DaemonArgs, PutArgs, SearchArgs, UpdateArgs, UriArg};
pub use parsers::PropertyAssignment;

#[derive(Debug, Parser)]
#[command(name = "propdex")]
#[command(about = "Property-set search index maintenance", version)]
pub struct Cli {
    #[arg(long, default_value = ".propdex")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Init,
    Status,
    /// Create or replace a resource in the store.
    Put(PutArgs),
    /// Delete a resource and everything below it from the store.
    Rm(UriArg),
    Show(UriArg),
    /// Apply one batch of pending changes to the index.
    Update(UpdateArgs),
    /// Run the scheduled updater in the foreground.
    Daemon(DaemonArgs),
    /// Compare the index with the store, optionally repairing it.
    Check(CheckArgs),
    Search(SearchArgs),
}

impl Commands {
    /// Operation label carried in error payloads.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Status => "status",
            Self::Put(_) => "store.put",
            Self::Rm(_) => "store.delete",
            Self::Show(_) => "store.show",
            Self::Update(_) => "updater.batch",
            Self::Daemon(_) => "updater.daemon",
            Self::Check(_) => "consistency.check",
            Self::Search(_) => "index.search",
        }
    }
}
