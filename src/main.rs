//! DS Image Proxy - access-controlled proxy for IIP, IIIF and DeepZoom image servers.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ds_image_proxy::{
    access::{AccessGate, LicenseClient, OpenAccess, Placeholders, RightsService},
    config::{Config, ConfigHandle, ServiceConfig},
    proxy::ImageProxy,
    server::{create_router, CorsPolicy, RouterConfig},
    service::ImageService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let handle = match ConfigHandle::from_file(&config.config) {
        Ok(handle) => handle,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let service_config = handle.snapshot();

    print_configuration(&config, &service_config);

    let placeholders = match Placeholders::load(&service_config.images) {
        Ok(placeholders) => placeholders,
        Err(e) => {
            error!("Failed to load placeholder images: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Timeouts are fixed for the lifetime of the client
    let proxy = match ImageProxy::new(&service_config.proxy) {
        Ok(proxy) => proxy,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let router_config = build_router_config(&config);

    match (service_config.rights.enabled, service_config.rights.url.as_deref()) {
        (true, Some(url)) => {
            let rights = LicenseClient::new(proxy.client().clone(), url);
            let gate = AccessGate::new(rights, placeholders);
            serve(&config, handle, gate, proxy, router_config).await
        }
        _ => {
            let gate = AccessGate::new(OpenAccess, placeholders);
            serve(&config, handle, gate, proxy, router_config).await
        }
    }
}

async fn serve<R: RightsService>(
    config: &Config,
    handle: ConfigHandle,
    gate: AccessGate<R>,
    proxy: ImageProxy,
    router_config: RouterConfig,
) -> ExitCode {
    let _autoupdate = handle.spawn_autoupdate();

    let service = ImageService::new(handle, gate, proxy);
    let router = create_router(service, router_config);

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl 'http://{}/iip?FIF=<image>&WID=200&HEI=200&CVT=jpeg'", addr);
    info!("    curl http://{}/iiif/<image>/info.json", addr);
    info!("    curl http://{}/deepzoom/<image>.dzi", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Log the effective configuration.
fn print_configuration(config: &Config, service: &ServiceConfig) {
    let servers = &service.imageservers;
    let backends = service.backends();
    let unset = "(not configured)";

    info!("DS Image Proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("");
    info!("Configuration:");
    info!("  Config file: {}", config.config.display());
    info!("  IIP server: {}", servers.iip.as_deref().unwrap_or(unset));
    info!("  IIIF server: {}", servers.iiif.as_deref().unwrap_or(unset));
    match &backends.deepzoom {
        Some(deepzoom) => info!(
            "  DeepZoom server: {} ({} addressing)",
            deepzoom.base(),
            deepzoom.mode.as_str()
        ),
        None => info!("  DeepZoom server: {}", unset),
    }
    info!(
        "  Thumbnail limit: {}x{}",
        service.thumbnail.max_width, service.thumbnail.max_height
    );

    // Rights status with warning if disabled
    if service.rights.enabled {
        info!(
            "  Rights service: {}",
            service.rights.url.as_deref().unwrap_or(unset)
        );
    } else {
        warn!("  Rights check: DISABLED - all images are publicly accessible");
        warn!("        Enable for production: [rights] enabled = true, url = \"...\"");
    }

    match (service.proxy.connect_timeout_ms, service.proxy.read_timeout_ms) {
        (None, None) => info!("  Upstream timeouts: none"),
        (connect, read) => info!(
            "  Upstream timeouts: connect {:?} ms, read {:?} ms",
            connect, read
        ),
    }

    if service.autoupdate.enabled {
        info!("  Autoupdate: every {} ms", service.autoupdate.interval_ms);
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "ds_image_proxy=debug,tower_http=debug"
    } else {
        "ds_image_proxy=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Router settings from the command line. Without `--cors-origins` any origin is allowed.
fn build_router_config(config: &Config) -> RouterConfig {
    let cors = match &config.cors_origins {
        Some(origins) => CorsPolicy::from_origins(origins.as_slice()),
        None => CorsPolicy::AnyOrigin,
    };

    RouterConfig::new()
        .with_cors(cors)
        .with_tracing(!config.no_tracing)
}
