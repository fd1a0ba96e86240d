//! Workload files: the request paths a client batch cycles through

use anyhow::{bail, Context, Result};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Workload {
    paths: Vec<String>,
    next: usize,
}

impl Workload {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to load workload file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid workload file {}", path.display()))
    }

    /// One request path per line; blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let paths: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        if paths.is_empty() {
            bail!("workload contains no request paths");
        }
        if let Some(bad) = paths.iter().find(|p| !p.starts_with('/')) {
            bail!("request path must start with '/': {}", bad);
        }
        Ok(Workload { paths, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Next path, wrapping around once the list is exhausted.
    pub fn next_path(&mut self) -> &str {
        let i = self.next;
        self.next = (self.next + 1) % self.paths.len();
        &self.paths[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_paths() {
        let mut w = Workload::parse("/a\n\n# skip\n/b\n").unwrap();
        assert_eq!(w.len(), 2);
        let got: Vec<String> = (0..5).map(|_| w.next_path().to_string()).collect();
        assert_eq!(got, vec!["/a", "/b", "/a", "/b", "/a"]);
    }

    #[test]
    fn rejects_empty_or_relative() {
        assert!(Workload::parse("\n# nothing\n").is_err());
        assert!(Workload::parse("/ok\nrelative\n").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Workload::load("/definitely/not/here.txt").unwrap_err();
        assert!(err.to_string().contains("Unable to load workload file"));
    }
}
