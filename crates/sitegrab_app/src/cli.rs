use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;
use sitegrab_core::{parse_rate_limit, split_pattern_list, PathFilter};
use sitegrab_engine::{EngineConfig, MirrorOptions, SuffixStyle, DEFAULT_CONCURRENCY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SuffixArg {
    /// name(1).ext
    Parenthesized,
    /// name1.ext
    Appended,
}

/// Non-interactive downloader for files and whole sites.
#[derive(Parser, Debug)]
#[command(name = "sitegrab", version)]
pub struct Cli {
    /// URLs to fetch.
    pub urls: Vec<String>,

    /// Read URLs from FILE, one per line.
    #[arg(short = 'i', long = "input-file", value_name = "FILE")]
    pub input_file: Option<PathBuf>,

    /// Save a single download as FILE.
    #[arg(short = 'O', long = "output-document", value_name = "FILE")]
    pub output_document: Option<String>,

    /// Save files under DIR.
    #[arg(short = 'P', long = "directory-prefix", value_name = "DIR", default_value = ".")]
    pub directory_prefix: PathBuf,

    /// Limit download speed, e.g. 200k or 1.5M bytes per second.
    #[arg(long = "limit-rate", value_name = "RATE", value_parser = parse_rate)]
    pub limit_rate: Option<i64>,

    /// Write messages to the log file instead of the terminal.
    #[arg(short = 'B', long = "background")]
    pub background: bool,

    /// Recursively download every page and asset reachable from each URL.
    #[arg(short = 'm', long = "mirror")]
    pub mirror: bool,

    /// After mirroring, make links in pages point at the local copies.
    #[arg(short = 'k', long = "convert-links")]
    pub convert_links: bool,

    /// Comma separated file name suffixes or globs to skip.
    #[arg(short = 'R', long = "reject", value_name = "LIST")]
    pub reject: Vec<String>,

    /// Comma separated directories to skip.
    #[arg(short = 'X', long = "exclude-directories", value_name = "LIST")]
    pub exclude: Vec<String>,

    /// Maximum link depth when mirroring.
    #[arg(short = 'l', long = "level", value_name = "DEPTH")]
    pub level: Option<usize>,

    /// Follow links to other hosts when mirroring.
    #[arg(short = 'H', long = "span-hosts")]
    pub span_hosts: bool,

    /// Also follow references inside stylesheets and scripts.
    #[arg(long = "follow-assets")]
    pub follow_assets: bool,

    /// Simultaneous transfers when mirroring.
    #[arg(short = 'j', long = "jobs", default_value_t = DEFAULT_CONCURRENCY)]
    pub jobs: usize,

    /// How to rename a download whose file name is already taken.
    #[arg(long = "suffix-style", value_enum, default_value_t = SuffixArg::Parenthesized)]
    pub suffix_style: SuffixArg,

    /// More log output; repeat for trace.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

fn parse_rate(raw: &str) -> Result<i64, String> {
    parse_rate_limit(raw).map_err(|err| err.to_string())
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Command line URLs followed by those from the input file.
    pub fn collect_urls(&self) -> anyhow::Result<Vec<String>> {
        let mut urls = self.urls.clone();
        if let Some(path) = &self.input_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read input file {}", path.display()))?;
            urls.extend(parse_input_list(&text));
        }
        if urls.is_empty() {
            bail!("missing URL");
        }
        Ok(urls)
    }

    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let reject = pattern_entries(&self.reject);
        let exclude = pattern_entries(&self.exclude);
        PathFilter::new(&reject, &exclude).context("invalid reject or exclude list")?;
        let mut config = EngineConfig::default_with_output(self.directory_prefix.clone());
        config.rate_limit = self.limit_rate.unwrap_or_default();
        config.suffix_style = match self.suffix_style {
            SuffixArg::Parenthesized => SuffixStyle::Parenthesized,
            SuffixArg::Appended => SuffixStyle::Appended,
        };
        config.mirror = MirrorOptions {
            convert_links: self.convert_links,
            reject,
            exclude,
            concurrency: self.jobs,
            max_depth: self.level,
            span_hosts: self.span_hosts,
            follow_assets: self.follow_assets,
            ..MirrorOptions::default()
        };
        Ok(config)
    }
}

/// Entries of every occurrence of a repeatable `a,b,c` option.
fn pattern_entries(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|raw| split_pattern_list(raw))
        .collect()
}

/// Non-empty lines that are not `#` comments.
pub fn parse_input_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_flags_reach_the_engine_config() {
        let cli = Cli::try_parse_from([
            "sitegrab",
            "--mirror",
            "-k",
            "-R",
            "jpg,gif",
            "-X",
            "/tmp",
            "--limit-rate",
            "200k",
            "-P",
            "out",
            "http://example.com/",
        ])
        .unwrap();
        let config = cli.engine_config().unwrap();
        assert!(cli.mirror);
        assert_eq!(config.rate_limit, 200 * 1024);
        assert_eq!(config.save_dir, PathBuf::from("out"));
        assert!(config.mirror.convert_links);
        assert_eq!(config.mirror.reject, vec!["jpg", "gif"]);
        assert_eq!(config.mirror.exclude, vec!["/tmp"]);
        assert_eq!(config.mirror.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn repeated_lists_are_merged_and_trimmed() {
        let cli =
            Cli::try_parse_from(["sitegrab", "-R", "jpg, .gif", "-R", "*.mp4,", "x"]).unwrap();
        let config = cli.engine_config().unwrap();
        assert_eq!(config.mirror.reject, vec!["jpg", ".gif", "*.mp4"]);
    }

    #[test]
    fn bad_rate_is_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["sitegrab", "--limit-rate", "fast", "x"]).is_err());
    }

    #[test]
    fn input_list_skips_blank_lines_and_comments() {
        let text = "http://a.example/\n\n# note\n  http://b.example/x  \n";
        assert_eq!(
            parse_input_list(text),
            vec!["http://a.example/", "http://b.example/x"]
        );
    }

    #[test]
    fn no_urls_at_all_is_an_error() {
        let cli = Cli::try_parse_from(["sitegrab"]).unwrap();
        assert!(cli.collect_urls().is_err());
    }
}
