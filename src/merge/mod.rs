//! Turns the ordered fragment files of a run into one output container.
//!
//! Strategies are tried in order until one succeeds:
//!
//! - single fragment: remux with ffmpeg, copy if the header already says MP4, remux with mkvmerge
//! - any count: ffmpeg concat demuxer, byte concatenation then ffmpeg remux
//! - last resort: raw copy (plus a recode attempt) or raw concatenation, which always succeeds
//!   unless the file system fails

pub mod sniff;
pub mod strategy;
pub mod tools;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::options::Options;
use strategy::{
    BinaryConcat, ConcatDemuxer, ExternalMuxFallback, ExternalRecode, HeaderSniffCopy, MuxContext,
    ReassemblyStrategy, RemuxSingle,
};
use tools::Toolchain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    RemuxSingle,
    HeaderSniffCopy,
    ExternalMuxFallback,
    ConcatDemuxer,
    BinaryConcat,
    ExternalRecode,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            StrategyKind::RemuxSingle => "ffmpeg remux",
            StrategyKind::HeaderSniffCopy => "MP4 header copy",
            StrategyKind::ExternalMuxFallback => "mkvmerge remux",
            StrategyKind::ConcatDemuxer => "ffmpeg concat demuxer",
            StrategyKind::BinaryConcat => "binary concatenation with ffmpeg remux",
            StrategyKind::ExternalRecode => "raw copy with recode",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassemblyAttempt {
    pub strategy: StrategyKind,
    pub outcome: AttemptOutcome,
}

/// Every strategy tried by one [`Reassembler::combine`] call, in order.
#[derive(Debug, Clone, Default)]
pub struct Reassembly {
    pub attempts: Vec<ReassemblyAttempt>,
}

impl Reassembly {
    pub fn succeeded(&self) -> bool {
        self.winner().is_some()
    }

    pub fn winner(&self) -> Option<StrategyKind> {
        self.attempts
            .iter()
            .find(|attempt| attempt.outcome == AttemptOutcome::Success)
            .map(|attempt| attempt.strategy)
    }

    /// The output came from the last resort, no muxer has looked at it.
    pub fn unverified(&self) -> bool {
        self.winner() == Some(StrategyKind::ExternalRecode)
    }
}

pub struct Reassembler {
    strategies: Vec<Box<dyn ReassemblyStrategy>>,
    context: MuxContext,
}

impl Reassembler {
    /// The standard strategy chain, with the multiplexer at `ffmpeg`.
    pub fn new(options: &Options, ffmpeg: PathBuf, toolchain: Arc<dyn Toolchain>) -> Self {
        let context = MuxContext {
            toolchain,
            ffmpeg,
            mkvmerge: options.tools.mkvmerge.clone(),
            recoder: options.tools.recoder.clone(),
            work_dir: options.temp_dir.clone(),
        };

        let strategies: Vec<Box<dyn ReassemblyStrategy>> = vec![
            Box::new(RemuxSingle(context.clone())),
            Box::new(HeaderSniffCopy),
            Box::new(ExternalMuxFallback(context.clone())),
            Box::new(ConcatDemuxer(context.clone())),
            Box::new(BinaryConcat(context.clone())),
            Box::new(ExternalRecode(context.clone())),
        ];

        Self { strategies, context }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.context.manifest_path()
    }

    pub fn intermediate_path(&self) -> PathBuf {
        self.context.intermediate_path()
    }

    pub async fn combine(&self, fragments: &[PathBuf], output: &Path) -> Reassembly {
        let mut reassembly = Reassembly::default();

        if fragments.is_empty() {
            tracing::error!("No fragments to combine");
            return reassembly;
        }

        tracing::info!("Combining {} fragments into {}", fragments.len(), output.display());

        for strategy in &self.strategies {
            if !strategy.applies_to(fragments) {
                continue;
            }

            tracing::info!("Trying {}", strategy.kind());
            match strategy.attempt(fragments, output).await {
                Ok(_) => {
                    tracing::info!("{} succeeded", strategy.kind());
                    reassembly.attempts.push(ReassemblyAttempt {
                        strategy: strategy.kind(),
                        outcome: AttemptOutcome::Success,
                    });
                    break;
                }
                Err(err) => {
                    tracing::warn!("{} failed: {}", strategy.kind(), err);
                    reassembly.attempts.push(ReassemblyAttempt {
                        strategy: strategy.kind(),
                        outcome: AttemptOutcome::Failure(err.to_string()),
                    });
                    remove_partial_output(output).await;
                }
            }
        }

        reassembly
    }
}

async fn remove_partial_output(output: &Path) {
    if tokio::fs::try_exists(output).await.unwrap_or(false) {
        if let Err(err) = tokio::fs::remove_file(output).await {
            tracing::warn!("Could not remove partial output {}: {}", output.display(), err);
        }
    }
}
