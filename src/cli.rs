use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Overrides;
use crate::handler::DirectCommand;

/// Command-line interface
#[derive(Parser, Debug)]
#[command(author, version, about = "Decompress zip/gz objects in S3 back into their bucket")]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand (each overrides its S3UNZIP_* variable)
#[derive(Args, Debug, Default)]
pub struct StoreArgs {
    /// Custom S3 endpoint URL
    #[arg(long, global = true)]
    pub endpoint_url: Option<String>,

    /// Region override
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Use path-style addressing (LocalStack, MinIO)
    #[arg(long, global = true)]
    pub force_path_style: bool,

    /// Send unsigned requests
    #[arg(long, global = true)]
    pub anonymous: bool,

    /// Directory for scratch copies of downloaded objects
    #[arg(long, global = true)]
    pub scratch_dir: Option<PathBuf>,

    /// Upload every member even after a failure
    #[arg(long, global = true)]
    pub continue_on_upload_error: bool,

    /// Abort a run that takes longer than this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decompress one object
    Unzip {
        /// BUCKET FILE
        #[arg(value_names = ["BUCKET", "FILE"], num_args = 0..=2)]
        args: Vec<String>,

        /// Bucket holding the compressed object
        #[arg(long)]
        bucket: Option<String>,

        /// Key of the compressed object
        #[arg(long)]
        file: Option<String>,

        /// Delete the compressed object once every member is uploaded
        #[arg(long)]
        delete_on_success: bool,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Handle an S3 notification read from PATH or stdin
    Event {
        /// Notification JSON file; `-` or absent reads stdin
        path: Option<PathBuf>,
    },
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            endpoint_url: self.store.endpoint_url.clone(),
            region: self.store.region.clone(),
            force_path_style: self.store.force_path_style,
            anonymous: self.store.anonymous,
            scratch_dir: self.store.scratch_dir.clone(),
            continue_on_upload_error: self.store.continue_on_upload_error,
            timeout_secs: self.store.timeout,
        }
    }

    /// Notifications always log verbosely
    pub fn is_verbose(&self) -> bool {
        match &self.command {
            Commands::Unzip { verbose, .. } => *verbose,
            Commands::Event { .. } => true,
        }
    }
}

impl Commands {
    /// The direct invocation this subcommand describes, if any
    pub fn direct_command(&self) -> Option<DirectCommand> {
        match self {
            Commands::Unzip {
                args,
                bucket,
                file,
                delete_on_success,
                verbose,
            } => Some(DirectCommand {
                args: args.clone(),
                bucket: bucket.clone(),
                file: file.clone(),
                delete_on_success: *delete_on_success,
                verbose: *verbose,
            }),
            Commands::Event { .. } => None,
        }
    }
}
