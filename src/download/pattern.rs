use std::fmt;
use std::path::Path;

use url::Url;

use crate::download::client::HttpClient;
use crate::download::fetcher::{Fetcher, FragmentRequest};

/// Rule that builds the url of fragment `index` from the url of the first fragment.
///
/// All rules rewrite the last path segment only; the query string is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberingPattern {
    /// `quality_720.ts` -> `quality_720_001.ts`
    ZeroPadded,
    /// `quality_720.ts` -> `quality_720_1.ts`
    Numeric,
    /// `seg_000.ts` -> `seg_001.ts`, the trailing number of the name is replaced in place
    TrailingNumber,
    /// `segment.ts` -> `segment1.ts`
    Appended,
    /// `chunk.ts` -> `chunk-1.ts`
    Dashed,
}

/// Trial order, most structured first. Several rules can reach the same server, so the
/// order decides which one wins.
pub const CATALOG: [NumberingPattern; 5] = [
    NumberingPattern::ZeroPadded,
    NumberingPattern::Numeric,
    NumberingPattern::TrailingNumber,
    NumberingPattern::Appended,
    NumberingPattern::Dashed,
];

impl NumberingPattern {
    pub fn url_for(&self, base: &Url, index: u32) -> Option<Url> {
        let (dir, name) = base.path().rsplit_once('/')?;
        if name.is_empty() {
            return None;
        }

        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
            _ => (name, String::new()),
        };

        let name = match self {
            NumberingPattern::ZeroPadded => format!("{}_{:03}{}", stem, index, ext),
            NumberingPattern::Numeric => format!("{}_{}{}", stem, index, ext),
            NumberingPattern::TrailingNumber => {
                let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
                if digits == 0 {
                    return None;
                }
                let prefix = &stem[..stem.len() - digits];
                format!("{}{:0width$}{}", prefix, index, ext, width = digits)
            }
            NumberingPattern::Appended => format!("{}{}{}", stem, index, ext),
            NumberingPattern::Dashed => format!("{}-{}{}", stem, index, ext),
        };

        let mut url = base.clone();
        url.set_path(&format!("{}/{}", dir, name));
        Some(url)
    }
}

impl fmt::Display for NumberingPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            NumberingPattern::ZeroPadded => "name_001",
            NumberingPattern::Numeric => "name_1",
            NumberingPattern::TrailingNumber => "name with trailing number replaced",
            NumberingPattern::Appended => "name1",
            NumberingPattern::Dashed => "name-1",
        };
        write!(f, "{}", name)
    }
}

/// Probes fragment `index` with every catalog rule in order and returns the first rule
/// whose url could be fetched. The fetched fragment stays at `destination`; failed
/// probes leave nothing behind.
pub async fn discover_pattern<C: HttpClient>(
    fetcher: &Fetcher<C>,
    base: &Url,
    index: u32,
    destination: &Path,
) -> Option<NumberingPattern> {
    for pattern in CATALOG {
        let Some(url) = pattern.url_for(base, index) else {
            continue;
        };

        tracing::info!("Testing pattern {}: {}", pattern, url);

        let request = FragmentRequest::new(url, destination);
        let outcome = fetcher.fetch(&request).await;
        if outcome.is_success() {
            tracing::info!("Pattern found, using {}", request.url);
            return Some(pattern);
        }

        if destination.exists() {
            if let Err(err) = std::fs::remove_file(destination) {
                tracing::warn!("Could not remove {}: {}", destination.display(), err);
            }
        }
    }

    None
}
