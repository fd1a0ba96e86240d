//! Command-line options for gfclient and gfserverd
//!
//! Every value is optional here so that a `--config` file can fill in what
//! the command line leaves out; see `config` for the resolved settings.

use clap::Parser;
use std::path::PathBuf;

#[derive(Clone, Debug, Default, Parser)]
#[command(name = "gfclient", version, about = "Multi-threaded GETFILE batch downloader")]
pub struct ClientOpts {
    /// Server address (default: 127.0.0.1)
    #[arg(short = 's', long = "server")]
    pub server: Option<String>,

    /// Server port (default: 29458)
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Number of download threads (default: 8, max: 1024)
    #[arg(short = 't', long = "nthreads")]
    pub nthreads: Option<usize>,

    /// Path to workload file (default: workload.txt)
    #[arg(short = 'w', long)]
    pub workload: Option<PathBuf>,

    /// Request download total (default: 16). `-r`/`--rflag` set the same
    /// value; older grading harnesses pass it under that name.
    #[arg(short = 'n', long = "nrequests", short_alias = 'r', alias = "rflag")]
    pub nrequests: Option<usize>,

    /// Directory downloads are written under (default: current directory)
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Append timestamped event lines to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Append one JSON record per finished download to this file
    #[arg(long)]
    pub journal: Option<PathBuf>,

    /// TOML configuration file ([client] table)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Parser)]
#[command(name = "gfserverd", version, about = "Multi-threaded GETFILE file-serving daemon")]
pub struct ServerOpts {
    /// Listen port (default: 10880)
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Number of serving threads (default: 20)
    #[arg(short = 't', long = "nthreads")]
    pub nthreads: Option<usize>,

    /// Content file mapping request paths to local files (default: content.txt)
    #[arg(short = 'm', long = "content", conflicts_with = "root")]
    pub content: Option<PathBuf>,

    /// Serve every regular file below this directory instead of a content map
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Delay before each content lookup, in microseconds (0-5000000)
    #[arg(short = 'd', long)]
    pub delay: Option<u64>,

    /// Report every served request on stdout
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Append timestamped event lines to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// TOML configuration file ([server] table)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
