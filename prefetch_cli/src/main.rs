use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio_util::sync::CancellationToken;

use prefetch_core::cancellation::with_deadline;
use prefetch_core::progress::format_bytes;
use prefetch_core::service::http_content_service::HttpContentService;
use prefetch_core::{ContentLoader, HttpServiceConfig, LoaderConfig};

mod terminal_observer;
use terminal_observer::TerminalProgressObserver;

#[derive(Parser)]
#[command(name = "prefetch", about = "Download every missing key of a content manifest")]
struct Args {
    /// Manifest listing keys and their URLs (default: $PREFETCH_MANIFEST or ./manifest.json)
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Cache directory (default: $PREFETCH_CACHE_DIR or <temp>/prefetch)
    #[arg(short, long)]
    cache_dir: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Delay between progress polls, in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Only print how much would be downloaded
    #[arg(long)]
    size_only: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut service_config = HttpServiceConfig::from_env();
    if let Some(manifest) = args.manifest {
        service_config.manifest_path = manifest;
    }
    if let Some(cache_dir) = args.cache_dir {
        service_config.cache_dir = cache_dir;
    }
    let mut loader_config = LoaderConfig::from_env();
    if let Some(ms) = args.poll_interval_ms {
        loader_config.poll_interval = Duration::from_millis(ms);
    }

    let service = match HttpContentService::new(service_config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            eprintln!("Cannot create content service: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let root = CancellationToken::new();
    let token = match args.timeout {
        Some(secs) => with_deadline(&root, Duration::from_secs(secs)),
        None => root.clone(),
    };

    if args.size_only {
        let total = ContentLoader::new(service, loader_config)
            .get_total_download_size(&token)
            .await;
        println!("{} to download", format_bytes(total));
        return ExitCode::SUCCESS;
    }

    let mut loader = ContentLoader::new(service, loader_config);
    loader.add_observer(Arc::new(TerminalProgressObserver::new()));
    let loader = Arc::new(loader);

    // Ctrl-C cancels the run; the loader releases its handles on the way out.
    {
        let loader = Arc::clone(&loader);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("interrupt received, cancelling");
                loader.cancel_download();
            }
        });
    }

    let start = Instant::now();
    let succeeded = loader.load_all(&token).await;
    loader.shutdown();

    if succeeded {
        println!("All content available ({:.2}s)", start.elapsed().as_secs_f64());
        ExitCode::SUCCESS
    } else {
        eprintln!("Download incomplete, see log for details (RUST_LOG=info)");
        ExitCode::FAILURE
    }
}
