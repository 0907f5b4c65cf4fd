//! Frame Provider CLI
//!
//! Runs a frame provider on the software capture backend and consumes the
//! freshest frames the way an inference loop would: take the latest frame,
//! describe it as a tensor, compute a statistic over it and hand it back.

use clap::Parser;
use frame_provider::{
    capture::{FrameHandle, MockBackend},
    config::FileConfig,
    mapping::{BufferMap, TensorDescriptor},
    provider::{FrameProvider, ProviderError},
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Command-line arguments. Flags override values from the config file.
#[derive(Parser, Debug)]
#[command(name = "frame-provider", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Requested frame width
    #[arg(long)]
    width: Option<u32>,

    /// Requested frame height
    #[arg(long)]
    height: Option<u32>,

    /// Number of recent frames kept for the consumer
    #[arg(short, long)]
    queue_depth: Option<usize>,

    /// Frames to process before exiting (0 runs until interrupted)
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Simulated capture rate
    #[arg(long)]
    fps: Option<u32>,

    /// Metrics server port (0 disables it)
    #[arg(long)]
    metrics_port: Option<u16>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Frame Provider v{}", frame_provider::VERSION);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let backend = MockBackend::from_config(&config.mock);
    let provider = match FrameProvider::new(backend, &config.provider) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            eprintln!("Failed to create frame provider: {}", e);
            std::process::exit(1);
        }
    };

    install_interrupt_handler(&provider);

    #[cfg(feature = "metrics")]
    let metrics = match config.output.metrics_port {
        0 => None,
        port => telemetry::spawn_server(port),
    };

    if let Err(e) = provider.start() {
        eprintln!("Failed to start frame provider: {}", e);
        std::process::exit(1);
    }

    info!(
        resolution = %provider.resolution(),
        format = %provider.format(),
        "Processing frames..."
    );

    let tensors: BufferMap<TensorDescriptor> = BufferMap::new();
    let limit = config.output.frame_count;
    let mut processed = 0u64;

    while limit == 0 || processed < limit {
        let frame = match provider.latest_frame() {
            Ok(frame) => frame,
            Err(ProviderError::InvalidState { .. }) => {
                info!("Provider stopped, leaving consumer loop");
                break;
            }
            Err(e) => {
                error!(error = %e, "Failed to get frame");
                break;
            }
        };

        let meta = frame.metadata().clone();
        let tensor = tensors.get_or_try_insert_with(frame.id(), || {
            TensorDescriptor::from_metadata(&meta)
        });

        match tensor.and_then(|t| t.check_buffer(frame.data()).map(|()| t)) {
            Ok(tensor) => {
                let mean = mean_value(&frame.data()[..tensor.byte_size()]);
                let age_ms = (chrono::Utc::now() - meta.captured_at).num_milliseconds();
                debug!(
                    id = %frame.id(),
                    sequence = meta.sequence,
                    layout = %tensor.layout,
                    mean,
                    age_ms,
                    "Frame processed"
                );
                processed += 1;
                if processed % 30 == 0 {
                    info!(processed, sequence = meta.sequence, mean, "Progress");
                }

                #[cfg(feature = "metrics")]
                if let Some(state) = &metrics {
                    telemetry::publish(state, &provider, Some(age_ms as f64 / 1000.0));
                }
            }
            Err(e) => warn!(id = %frame.id(), error = %e, "Skipping undescribable frame"),
        }

        if let Err(e) = provider.return_frame(frame) {
            warn!(error = %e, "Failed to return frame");
        }
    }

    if let Err(e) = provider.stop() {
        warn!(error = %e, "Provider did not stop cleanly");
    }
    tensors.clear();

    #[cfg(feature = "metrics")]
    if let Some(state) = &metrics {
        telemetry::publish(state, &provider, None);
    }

    let stats = provider.stats();
    info!("Processed {} frames", processed);
    println!(
        "fetched={} taken={} returned={} recycled_processed={} recycled_delivered={} \
         fetch_failures={} recycle_failures={}",
        stats.frames_fetched,
        stats.frames_taken,
        stats.frames_returned,
        stats.recycled_processed,
        stats.recycled_delivered,
        stats.fetch_failures,
        stats.recycle_failures,
    );
}

fn load_config(args: &Args) -> Result<FileConfig, frame_provider::ConfigError> {
    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    if let Some(width) = args.width {
        config.provider.width = width;
    }
    if let Some(height) = args.height {
        config.provider.height = height;
    }
    if let Some(depth) = args.queue_depth {
        config.provider.queue_depth = depth;
    }
    if let Some(frames) = args.frames {
        config.output.frame_count = frames;
    }
    if let Some(fps) = args.fps {
        config.mock.fps = fps;
    }
    if let Some(port) = args.metrics_port {
        config.output.metrics_port = port;
    }

    config.provider.validate()?;
    config.mock.validate()?;
    Ok(config)
}

/// First interrupt stops the provider, which ends the consumer loop.
/// A second one exits immediately.
fn install_interrupt_handler(provider: &Arc<FrameProvider<MockBackend>>) {
    let provider = Arc::downgrade(provider);
    let interrupts = AtomicUsize::new(0);

    let result = ctrlc::set_handler(move || {
        if interrupts.fetch_add(1, Ordering::SeqCst) > 0 {
            eprintln!("Interrupted again, exiting");
            std::process::exit(130);
        }
        info!("Interrupted, stopping (press Ctrl-C again to force)");
        if let Some(provider) = provider.upgrade() {
            if let Err(e) = provider.stop() {
                warn!(error = %e, "Provider did not stop cleanly");
            }
        }
    });

    if let Err(e) = result {
        warn!(error = %e, "Could not install interrupt handler");
    }
}

fn mean_value(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let sum: u64 = data.iter().map(|&b| u64::from(b)).sum();
    sum as f64 / data.len() as f64
}

#[cfg(feature = "metrics")]
mod telemetry {
    use frame_provider::capture::MockBackend;
    use frame_provider::metrics::{
        MetricsRegistry, MetricsServer, MetricsServerConfig, MetricsSnapshot, MetricsState,
    };
    use frame_provider::provider::FrameProvider;
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tracing::error;

    /// Pushes the provider's current state to the exporter.
    pub fn publish(
        state: &RwLock<MetricsState>,
        provider: &FrameProvider<MockBackend>,
        frame_age: Option<f64>,
    ) {
        let mut snapshot = MetricsSnapshot::from_stats(&provider.stats(), provider.state());
        if let Some(age) = frame_age {
            snapshot = snapshot.with_frame_age(age);
        }
        state.blocking_write().update(&snapshot);
    }

    /// Runs the metrics server on its own runtime thread.
    pub fn spawn_server(port: u16) -> Option<Arc<RwLock<MetricsState>>> {
        let registry = match MetricsRegistry::new() {
            Ok(registry) => registry,
            Err(e) => {
                error!(error = %e, "Failed to create metrics registry");
                return None;
            }
        };
        let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
        let state = server.state();

        let spawned = std::thread::Builder::new()
            .name("metrics-http".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "Failed to build metrics runtime");
                        return;
                    }
                };
                if let Err(e) = runtime.block_on(server.run()) {
                    error!(error = %e, "Metrics server failed");
                }
            });

        match spawned {
            Ok(_) => Some(state),
            Err(e) => {
                error!(error = %e, "Failed to spawn metrics thread");
                None
            }
        }
    }
}
