//! Settings resolution: command line, then optional TOML file, then defaults

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{ClientOpts, ServerOpts};
use crate::content::MAX_DELAY_US;
use crate::protocol::defaults;

pub const MAX_CLIENT_THREADS: usize = 1024;

// Ports above this are refused by gfclient.
pub const MAX_CLIENT_PORT: u16 = 65331;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub nthreads: Option<usize>,
    pub workload: Option<PathBuf>,
    pub nrequests: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub journal: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub nthreads: Option<usize>,
    pub content: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub delay_us: Option<u64>,
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub client: ClientSection,
    pub server: ServerSection,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let cfg: FileConfig =
            toml::from_str(&data).with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientSettings {
    pub server: String,
    pub port: u16,
    pub nthreads: usize,
    pub workload: PathBuf,
    pub nrequests: usize,
    pub output_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub journal: Option<PathBuf>,
}

impl ClientSettings {
    pub fn resolve(opts: &ClientOpts, file: &ClientSection) -> Result<Self> {
        let s = ClientSettings {
            server: opts
                .server
                .clone()
                .or_else(|| file.server.clone())
                .unwrap_or_else(|| defaults::SERVER.to_string()),
            port: opts.port.or(file.port).unwrap_or(defaults::CLIENT_PORT),
            nthreads: opts.nthreads.or(file.nthreads).unwrap_or(8),
            workload: opts
                .workload
                .clone()
                .or_else(|| file.workload.clone())
                .unwrap_or_else(|| PathBuf::from("workload.txt")),
            nrequests: opts.nrequests.or(file.nrequests).unwrap_or(16),
            output_dir: opts
                .output_dir
                .clone()
                .or_else(|| file.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            log_file: opts.log_file.clone().or_else(|| file.log_file.clone()),
            journal: opts.journal.clone().or_else(|| file.journal.clone()),
        };
        if s.port > MAX_CLIENT_PORT {
            bail!("Invalid port number");
        }
        if s.nthreads < 1 || s.nthreads > MAX_CLIENT_THREADS {
            bail!("Invalid number of threads");
        }
        Ok(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ContentBacking {
    Map(PathBuf),
    Root(PathBuf),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerSettings {
    pub port: u16,
    pub nthreads: usize,
    pub content: ContentBacking,
    pub delay: Duration,
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
}

impl ServerSettings {
    pub fn resolve(opts: &ServerOpts, file: &ServerSection) -> Result<Self> {
        // A source named on the command line replaces whatever the file says.
        let content = match (&opts.content, &opts.root, &file.content, &file.root) {
            (Some(m), _, _, _) => ContentBacking::Map(m.clone()),
            (None, Some(r), _, _) => ContentBacking::Root(r.clone()),
            (None, None, Some(_), Some(_)) => bail!("config sets both content and root"),
            (None, None, Some(m), None) => ContentBacking::Map(m.clone()),
            (None, None, None, Some(r)) => ContentBacking::Root(r.clone()),
            (None, None, None, None) => ContentBacking::Map(PathBuf::from("content.txt")),
        };
        let delay_us = opts.delay.or(file.delay_us).unwrap_or(0);
        if delay_us > MAX_DELAY_US {
            bail!("Content delay must be less than {} (microseconds)", MAX_DELAY_US);
        }
        Ok(ServerSettings {
            port: opts.port.or(file.port).unwrap_or(defaults::SERVER_PORT),
            nthreads: opts.nthreads.or(file.nthreads).unwrap_or(20).max(1),
            content,
            delay: Duration::from_micros(delay_us),
            verbose: opts.verbose || file.verbose,
            log_file: opts.log_file.clone().or_else(|| file.log_file.clone()),
        })
    }
}
