mod cleanup;
mod download;
mod error;
mod file;
mod merge;
mod options;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::download::client::parse_header;
use crate::merge::AttemptOutcome;
use crate::options::{
    CollectorSettings, Options, RetryPolicy, ToolPaths, WholeAssetPolicy, MEBIBYTE,
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[clap(subcommand)]
    subcmd: SubCmd,

    #[clap(short, long, default_value = "1")]
    /// set how many fragments are fetched at once once the numbering is known
    parallel: usize,

    #[clap(short, long, default_value = "3")]
    /// set the maximum number of retries per fragment
    retries: usize,

    #[clap(long, default_value = "30")]
    /// set the timeout of a single request in seconds
    timeout: u64,

    #[clap(long = "header", value_name = "NAME: VALUE")]
    /// add a header to every fragment request, may be repeated
    headers: Vec<String>,

    #[clap(long)]
    /// provide the path of the ffmpeg executable
    ffmpeg_path: Option<PathBuf>,

    #[clap(long, default_value = "mkvmerge")]
    mkvmerge_path: PathBuf,

    #[clap(long, default_value = "yt-dlp")]
    recoder_path: PathBuf,

    #[clap(long, default_value = "./temp_segments")]
    /// directory for downloaded fragments
    temp_dir: PathBuf,

    #[clap(long, default_value = "./videos")]
    /// directory for finished videos
    output_dir: PathBuf,

    #[clap(long)]
    /// do not delete the temporary fragments
    skip_cleanup: bool,

    #[clap(long)]
    /// enable debug logging
    debug: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about)]
enum SubCmd {
    /// Download files from a json file
    File {
        #[clap(default_value = "download.json")]
        /// provide a formated json file that contains the download links
        file: PathBuf,
    },
    /// Download a fragment sequence starting at the url of its first fragment
    Download {
        #[clap(value_parser = url_parser)]
        /// provide the url of the first fragment, e.g. site.com/video/quality_720.ts
        url: String,

        /// provide a output file name, derived from the url if omitted
        output: Option<String>,

        #[clap(short, long, default_value = "0")]
        /// number the fragment files starting at this index
        start: u32,

        #[clap(short, long, default_value = "500")]
        /// set the maximum number of fragments
        max: u32,

        #[clap(long, default_value = "5")]
        /// stop after this many fragments in a row could not be fetched
        failure_threshold: u32,

        #[clap(long, default_value = "200")]
        /// pause between fragment requests in milliseconds
        delay: u64,

        #[clap(long, default_value = "50")]
        /// treat a first fragment larger than this many megabytes as the whole video, 0 disables
        whole_asset_mb: u64,

        #[clap(long)]
        /// only apply the whole video size rule to urls containing this text
        whole_asset_host: Option<String>,
    },
}

fn url_parser(url: &str) -> Result<String, String> {
    if url.starts_with("http") {
        Ok(url.to_string())
    } else {
        Err("URL must start with http or https".to_string())
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn build_options(args: &Args) -> anyhow::Result<Options> {
    let headers = args
        .headers
        .iter()
        .map(|raw| parse_header(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let mut collector = CollectorSettings {
        parallel: args.parallel,
        ..CollectorSettings::default()
    };

    if let SubCmd::Download {
        start,
        max,
        failure_threshold,
        delay,
        whole_asset_mb,
        whole_asset_host,
        ..
    } = &args.subcmd
    {
        collector.start_index = *start;
        collector.max_segments = *max;
        collector.failure_threshold = *failure_threshold;
        collector.request_delay = Duration::from_millis(*delay);
        collector.whole_asset = match whole_asset_host {
            Some(needle) if *whole_asset_mb > 0 => WholeAssetPolicy::HostSizeAbove {
                needle: needle.clone(),
                bytes: whole_asset_mb.saturating_mul(MEBIBYTE),
            },
            _ => WholeAssetPolicy::from_megabytes(*whole_asset_mb),
        };
    }

    Ok(Options {
        retry: RetryPolicy {
            max_retries: args.retries,
            timeout: Duration::from_secs(args.timeout),
            ..RetryPolicy::default()
        },
        collector,
        tools: ToolPaths {
            ffmpeg: args.ffmpeg_path.clone(),
            mkvmerge: args.mkvmerge_path.clone(),
            recoder: args.recoder_path.clone(),
        },
        temp_dir: args.temp_dir.clone(),
        output_dir: args.output_dir.clone(),
        headers,
        skip_cleanup: args.skip_cleanup,
    })
}

fn file_size_mb(path: &Path) -> f64 {
    std::fs::metadata(path).map(|meta| meta.len() as f64 / MEBIBYTE as f64).unwrap_or(0.0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let options = build_options(&args)?;
    tracing::debug!("Options: {:?}", options);

    match &args.subcmd {
        SubCmd::File { file } => {
            let summary = file::download_file(file, &options).await?;
            println!(
                "Finished reading file {}: {} downloaded, {} skipped, {} failed",
                file.display(),
                summary.finished,
                summary.skipped,
                summary.failed
            );
        }
        SubCmd::Download { url, output, .. } => {
            let report = download::session::download(url, output.as_deref(), &options).await?;

            for attempt in &report.reassembly.attempts {
                if let AttemptOutcome::Failure(reason) = &attempt.outcome {
                    tracing::debug!("{} was rejected: {}", attempt.strategy, reason);
                }
            }

            println!("Combined {} fragments", report.fragments);
            println!("Video saved to: {}", report.output.display());
            println!("File size: {:.2} MB", file_size_mb(&report.output));
            if report.reassembly.unverified() {
                println!("The fragments were joined without ffmpeg, the video may not play.");
            }
            if report.kept_fragments {
                println!("Temporary fragments kept in: {}", options.temp_dir.display());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_options_from_arguments() {
        let args = Args::parse_from([
            "segment_fetcher",
            "--retries",
            "5",
            "--header",
            "Cookie: a=b",
            "--ffmpeg-path",
            "/opt/ffmpeg",
            "download",
            "https://cdn.example/video/quality_720.ts",
            "lecture",
            "--max",
            "40",
            "--whole-asset-mb",
            "0",
        ]);

        let options = build_options(&args).unwrap();

        assert_eq!(options.retry.max_retries, 5);
        assert_eq!(options.collector.max_segments, 40);
        assert_eq!(options.collector.whole_asset, WholeAssetPolicy::Never);
        assert_eq!(options.headers, vec![("Cookie".to_string(), "a=b".to_string())]);
        assert_eq!(options.tools.ffmpeg, Some(PathBuf::from("/opt/ffmpeg")));
    }

    #[test]
    fn rejects_non_http_urls() {
        let args = ["segment_fetcher", "download", "ftp://cdn.example/a.ts"];
        assert!(Args::try_parse_from(args).is_err());
    }

    #[test]
    fn scopes_whole_asset_rule_to_host() {
        let args = Args::parse_from([
            "segment_fetcher",
            "download",
            "https://cdn.example/a.ts",
            "--whole-asset-host",
            "ebradi",
        ]);

        assert_eq!(
            build_options(&args).unwrap().collector.whole_asset,
            WholeAssetPolicy::HostSizeAbove { needle: "ebradi".to_string(), bytes: 50 * MEBIBYTE }
        );
    }
}
