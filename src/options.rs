use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const MEBIBYTE: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Options {
    pub retry: RetryPolicy,
    pub collector: CollectorSettings,
    pub tools: ToolPaths,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    /// extra request headers supplied by the caller, sent with every fragment request
    pub headers: Vec<(String, String)>,
    pub skip_cleanup: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            collector: CollectorSettings::default(),
            tools: ToolPaths::default(),
            temp_dir: PathBuf::from("./temp_segments"),
            output_dir: PathBuf::from("./videos"),
            headers: Vec::new(),
            skip_cleanup: false,
        }
    }
}

/// Retry behaviour of a single fragment fetch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// retries after the first attempt, so a fetch makes at most `max_retries + 1` requests
    pub max_retries: usize,
    pub backoff_unit: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Sleep before retry number `attempt` (0 based): grows linearly, `(1 + attempt)` units.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let units = u32::try_from(attempt).unwrap_or(u32::MAX).saturating_add(1);
        self.backoff_unit.saturating_mul(units)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub start_index: u32,
    /// exclusive upper bound on fragment indices
    pub max_segments: u32,
    pub failure_threshold: u32,
    pub request_delay: Duration,
    /// how many indices past pattern discovery are fetched at once
    pub parallel: usize,
    pub whole_asset: WholeAssetPolicy,
    /// extension for fragment files when the base url has none
    pub extension: String,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            start_index: 0,
            max_segments: 500,
            failure_threshold: 5,
            request_delay: Duration::from_millis(200),
            parallel: 1,
            whole_asset: WholeAssetPolicy::default(),
            extension: "ts".to_string(),
        }
    }
}

/// Decides whether the first fragment already is the complete asset, in which case
/// no further fragments are probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WholeAssetPolicy {
    Never,
    SizeAbove(u64),
    /// only applies the size rule when the url contains `needle`
    HostSizeAbove { needle: String, bytes: u64 },
}

impl WholeAssetPolicy {
    pub fn from_megabytes(megabytes: u64) -> Self {
        if megabytes == 0 {
            WholeAssetPolicy::Never
        } else {
            WholeAssetPolicy::SizeAbove(megabytes.saturating_mul(MEBIBYTE))
        }
    }

    pub fn is_whole_asset(&self, url: &Url, size: u64) -> bool {
        match self {
            WholeAssetPolicy::Never => false,
            WholeAssetPolicy::SizeAbove(bytes) => size > *bytes,
            WholeAssetPolicy::HostSizeAbove { needle, bytes } => {
                url.as_str().to_lowercase().contains(&needle.to_lowercase()) && size > *bytes
            }
        }
    }
}

impl Default for WholeAssetPolicy {
    fn default() -> Self {
        WholeAssetPolicy::SizeAbove(50 * MEBIBYTE)
    }
}

#[derive(Debug, Clone)]
pub struct ToolPaths {
    /// explicit multiplexer location, searched for when absent
    pub ffmpeg: Option<PathBuf>,
    pub mkvmerge: PathBuf,
    pub recoder: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: None,
            mkvmerge: PathBuf::from("mkvmerge"),
            recoder: PathBuf::from("yt-dlp"),
        }
    }
}
