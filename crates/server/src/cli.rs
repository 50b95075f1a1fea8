// crates/server/src/cli.rs
//! Command-line interface of the `batchwright` binary.

use std::path::PathBuf;

use batchwright_core::JobType;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "batchwright", version, about = "Resumable batch import and backup jobs")]
pub struct Cli {
    /// Base URL of a running server (default: http://127.0.0.1:<configured port>)
    #[arg(short, long, global = true, env = "BATCHWRIGHT_SERVER")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Upload a CSV file and drive the import to completion
    Import {
        /// Record type: customers, products or orders
        job_type: JobType,
        /// CSV file to import
        file: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Back up every file under a directory into the configured storage
    Backup {
        /// Directory to back up (a path on the server's filesystem)
        dir: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print the current job snapshot as JSON
    Status,
    /// Remove the job record and staged files
    Clear,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Run the job in this process instead of through a server
    #[arg(long, default_value_t = false)]
    pub local: bool,

    /// Start the job and return without driving it
    #[arg(long, default_value_t = false, conflicts_with = "local")]
    pub detach: bool,

    /// Clear the job once it finishes
    #[arg(long, default_value_t = false)]
    pub clear: bool,
}

impl Cli {
    /// Server URL to talk to, falling back to the local default port.
    pub fn server_url(&self, default_port: u16) -> String {
        self.server
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{default_port}"))
    }
}
