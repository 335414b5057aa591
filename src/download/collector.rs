use std::path::{Path, PathBuf};

use futures::future::join_all;
use url::Url;

use crate::download::client::HttpClient;
use crate::download::fetcher::{FetchOutcome, Fetcher, FragmentRequest};
use crate::download::pattern::{discover_pattern, NumberingPattern};
use crate::error::DownloadError;
use crate::options::CollectorSettings;

/// A fetched fragment on disk. `index` is its position in the sequence: 0 for the base url,
/// then the number substituted into the url by the numbering pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub index: u32,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    FetchingFirst,
    DiscoveringPattern,
    FetchingRest,
    Done,
}

#[derive(Debug)]
pub struct SequenceState {
    pub phase: Phase,
    pub pattern: Option<NumberingPattern>,
    pub fragments: Vec<Fragment>,
    pub consecutive_failures: u32,
    pub next_index: u32,
}

impl SequenceState {
    fn new() -> Self {
        Self {
            phase: Phase::Init,
            pattern: None,
            fragments: Vec::new(),
            consecutive_failures: 0,
            next_index: 0,
        }
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!("Collector {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn accept(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
        self.consecutive_failures = 0;
    }

    fn finish(mut self) -> Vec<Fragment> {
        self.enter(Phase::Done);
        tracing::info!("Fragment download finished: {} fragments", self.fragments.len());
        self.fragments
    }
}

/// Walks a fragment sequence starting at a known url until the server runs out of fragments.
pub struct Collector<'a, C: HttpClient> {
    fetcher: &'a Fetcher<C>,
    settings: &'a CollectorSettings,
    temp_dir: &'a Path,
}

impl<'a, C: HttpClient> Collector<'a, C> {
    pub fn new(
        fetcher: &'a Fetcher<C>,
        settings: &'a CollectorSettings,
        temp_dir: &'a Path,
    ) -> Self {
        Self { fetcher, settings, temp_dir }
    }

    /// Fetches `base` as fragment 0, discovers the numbering of the following fragments by
    /// probing index 1 and fetches index 2 onwards in order.
    ///
    /// `start_index` only labels the fragment files: fragment `i` is stored as
    /// `segment_<start_index + i>`. The returned list is never empty and strictly ascending
    /// by index. Failing to fetch `base` itself is the only error.
    pub async fn collect(&self, base: &Url) -> Result<Vec<Fragment>, DownloadError> {
        let extension = self.extension(base);
        let mut state = SequenceState::new();

        state.enter(Phase::FetchingFirst);
        let first = self.fragment(state.next_index, &extension);
        tracing::info!("Fetching first fragment: {}", base);

        let request = FragmentRequest::new(base.clone(), &first.path);
        let size = match self.fetcher.fetch(&request).await {
            FetchOutcome::Success(size) => size,
            outcome => {
                tracing::error!("Could not fetch the first fragment {}: {}", base, outcome);
                return Err(DownloadError::FirstFragmentUnavailable {
                    url: base.to_string(),
                    outcome,
                });
            }
        };
        state.accept(first);
        state.next_index += 1;

        if self.settings.whole_asset.is_whole_asset(base, size) {
            tracing::info!(
                "First fragment is {:.2} MB, treating it as the complete video",
                size as f64 / (1024.0 * 1024.0)
            );
            return Ok(state.finish());
        }

        if state.next_index >= self.settings.max_segments {
            return Ok(state.finish());
        }

        state.enter(Phase::DiscoveringPattern);
        let probe = self.fragment(state.next_index, &extension);
        state.pattern = discover_pattern(self.fetcher, base, probe.index, &probe.path).await;

        let Some(pattern) = state.pattern else {
            tracing::info!("No numbering pattern matched, using only the first fragment");
            return Ok(state.finish());
        };
        state.accept(probe);
        state.next_index += 1;

        state.enter(Phase::FetchingRest);
        let window = u32::try_from(self.settings.parallel.max(1)).unwrap_or(u32::MAX);

        while state.next_index < self.settings.max_segments
            && state.consecutive_failures < self.settings.failure_threshold
        {
            let end = state.next_index.saturating_add(window).min(self.settings.max_segments);
            let outcomes = join_all(
                (state.next_index..end)
                    .map(|index| self.fetch_index(base, pattern, index, &extension)),
            )
            .await;

            for (fragment, outcome) in outcomes {
                if state.consecutive_failures >= self.settings.failure_threshold {
                    // fetched ahead of the point where the sequence ended
                    if outcome.is_success() {
                        discard(&fragment.path);
                    }
                    continue;
                }

                if outcome.is_success() {
                    state.accept(fragment);
                } else {
                    state.consecutive_failures += 1;
                    tracing::info!(
                        "Failure {} of {} at fragment {}",
                        state.consecutive_failures,
                        self.settings.failure_threshold,
                        fragment.index
                    );
                }
            }

            state.next_index = end;
            tokio::time::sleep(self.settings.request_delay).await;
        }

        Ok(state.finish())
    }

    async fn fetch_index(
        &self,
        base: &Url,
        pattern: NumberingPattern,
        index: u32,
        extension: &str,
    ) -> (Fragment, FetchOutcome) {
        let fragment = self.fragment(index, extension);
        let Some(url) = pattern.url_for(base, index) else {
            return (fragment, FetchOutcome::NotFound(404));
        };

        tracing::info!("Fetching fragment {}: {}", index, url);
        let outcome = self.fetcher.fetch(&FragmentRequest::new(url, &fragment.path)).await;
        (fragment, outcome)
    }

    fn fragment(&self, index: u32, extension: &str) -> Fragment {
        let label = u64::from(self.settings.start_index) + u64::from(index);
        Fragment {
            index,
            path: self.temp_dir.join(format!("segment_{:03}.{}", label, extension)),
        }
    }

    fn extension(&self, base: &Url) -> String {
        base.path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(stem, ext)| (stem, ext.to_ascii_lowercase()))
            .filter(|(stem, ext)| {
                !stem.is_empty()
                    && !ext.is_empty()
                    && ext.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .map(|(_, ext)| ext)
            .unwrap_or_else(|| self.settings.extension.clone())
    }
}

fn discard(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        tracing::warn!("Could not remove {}: {}", path.display(), err);
    }
}
