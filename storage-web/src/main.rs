use anyhow::Result;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use http_body_util::Full;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::Encoder;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storage_web::config::StorageArgs;
use storage_web::http_ui::HttpUiService;
use storage_web::metrics::PrometheusMetrics;
use storage_web::uploader::{upload_directory, UploadConfig};

#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
pub struct ServerConfig {
    #[command(flatten)]
    storage: StorageArgs,

    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value = "8080")]
    port: u16,

    #[arg(long, default_value = "localhost")]
    metric_host: String,

    #[arg(long, default_value = "9100")]
    metric_port: u16,

    #[arg(
        long,
        default_value = "1073741824",
        help = "Largest uncompressed size a zip download may reach, in bytes"
    )]
    max_zip_bytes: u64,

    #[arg(
        long,
        default_value = "info",
        help = "Log level (error, warn, info, debug, trace). Can also be set via RUST_LOG env var"
    )]
    log_level: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload the files of a local directory into the blob container
    Upload {
        #[command(flatten)]
        storage: StorageArgs,

        #[command(flatten)]
        upload: UploadConfig,
    },

    /// List blobs in the blob container
    List {
        #[command(flatten)]
        storage: StorageArgs,

        #[arg(long, help = "Only names starting with this prefix")]
        prefix: Option<String>,

        #[arg(long, help = "List every blob instead of grouping at '/'")]
        flat: bool,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the HTTP storage browser
    Server(ServerConfig),
}

fn setup_tracing(log_level: &str) {
    // RUST_LOG wins over the flag
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to 'info'", log_level);
            EnvFilter::new("info")
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let log_level = match &cli.command {
        Command::Server(config) => config.log_level.as_str(),
        _ => "info",
    };

    setup_tracing(log_level);

    match cli.command {
        Command::Upload { storage, upload } => run_upload(storage, upload)?,
        Command::List {
            storage,
            prefix,
            flat,
            limit,
        } => run_list(storage, prefix, flat, limit)?,
        Command::Server(config) => run(config)?,
    }
    Ok(())
}

#[tokio::main]
async fn run_upload(storage: StorageArgs, upload: UploadConfig) -> Result<()> {
    let store = storage.settings()?.blob_store(PrometheusMetrics::shared())?;
    let report = upload_directory(&store, &upload).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn run_list(
    storage: StorageArgs,
    prefix: Option<String>,
    flat: bool,
    limit: Option<usize>,
) -> Result<()> {
    let store = storage.settings()?.blob_store(PrometheusMetrics::shared())?;
    let entries = store.list_files(prefix.as_deref(), flat, limit).await?;
    for entry in &entries {
        match (entry.is_directory, entry.size) {
            (true, _) => println!("{}/", entry.name),
            (false, Some(size)) => println!("{}\t{size}", entry.name),
            (false, None) => println!("{}", entry.name),
        }
    }
    println!("Total: {}", entries.len());
    Ok(())
}

#[tokio::main]
async fn run(args: ServerConfig) -> Result<()> {
    let settings = args.storage.settings()?;
    let metrics = PrometheusMetrics::shared();

    let blobs = match &settings.blob {
        Some(blob) => {
            info!("Using blob container {} at {}", blob.container, blob.url);
            Some(settings.blob_store(metrics.clone())?)
        }
        None => None,
    };
    let files = match &settings.file {
        Some(file) => {
            info!("Using file share {} under {}", file.share, file.root.display());
            Some(settings.file_share(metrics.clone()).await?)
        }
        None => None,
    };

    if blobs.is_none() && files.is_none() {
        anyhow::bail!(
            "No storage configured.\n\
             Pass --blob-url and/or --file-root, or a --config file with [blob] or [file] sections."
        );
    }

    let service = HttpUiService::new(blobs, files).with_max_archive_bytes(args.max_zip_bytes);
    run_server(args, service).await
}

async fn run_server(args: ServerConfig, http_ui_service: HttpUiService) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    let local_addr = listener.local_addr()?;

    let metrics_listener =
        tokio::net::TcpListener::bind((args.metric_host.as_str(), args.metric_port)).await?;
    let metrics_addr = metrics_listener.local_addr()?;

    info!("metrics server is running at http://{metrics_addr}");

    let metrics_service = hyper::service::service_fn(
        move |req: hyper::Request<hyper::body::Incoming>| async move {
            match (req.method(), req.uri().path()) {
                (&hyper::Method::GET, "/metrics") => {
                    let mut buffer = Vec::new();
                    let encoder = prometheus::TextEncoder::new();
                    let metric_families = prometheus::gather();
                    encoder.encode(&metric_families, &mut buffer).unwrap();

                    Ok::<_, std::convert::Infallible>(
                        hyper::Response::builder()
                            .status(200)
                            .header(hyper::header::CONTENT_TYPE, "text/plain; version=0.0.4")
                            .body(Full::new(Bytes::from(buffer)))
                            .unwrap(),
                    )
                }
                _ => Ok::<_, std::convert::Infallible>(
                    hyper::Response::builder()
                        .status(404)
                        .body(Full::new(Bytes::from("Not Found")))
                        .unwrap(),
                ),
            }
        },
    );

    let http_server = ConnBuilder::new(TokioExecutor::new());
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();

    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());

    info!("storage browser is running at http://{local_addr}");

    loop {
        tokio::select! {
            res = listener.accept() => {
                match res {
                    Ok((socket, _)) => {
                        let service = http_ui_service.clone();
                        let handler = hyper::service::service_fn(move |req| {
                            let service = service.clone();
                            async move { service.handle_request(req).await }
                        });
                        let conn = http_server.serve_connection(TokioIo::new(socket), handler);
                        let conn = graceful.watch(conn.into_owned());
                        tokio::spawn(async move {
                            let _ = conn.await;
                        });
                    }
                    Err(err) => {
                        tracing::error!("error accepting connection: {err}");
                    }
                }
            }
            res = metrics_listener.accept() => {
                match res {
                    Ok((socket, _)) => {
                        let conn = http_server.serve_connection(TokioIo::new(socket), metrics_service);
                        let conn = graceful.watch(conn.into_owned());
                        tokio::spawn(async move {
                            let _ = conn.await;
                        });
                    }
                    Err(err) => {
                        tracing::error!("error accepting metrics connection: {err}");
                    }
                }
            }
            _ = ctrl_c.as_mut() => {
                break;
            }
        };
    }

    tokio::select! {
        () = graceful.shutdown() => {
             tracing::debug!("Gracefully shutdown!");
        },
        () = tokio::time::sleep(std::time::Duration::from_secs(10)) => {
             tracing::debug!("Waited 10 seconds for graceful shutdown, aborting...");
        }
    }

    info!("server is stopped");
    Ok(())
}
