use std::{process, sync::Arc};

use pagefit::{
    application::{
        crawl::CrawlService, error::AppError, reduce::ContentReducer, session::FetchSession,
    },
    config::{self, CrawlArgs},
    domain::types::{FetchOptions, FilterThreshold, parse_target_url},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        renderer::StaticRenderer,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let crawler = build_crawler(&settings);

    match command {
        config::Command::Serve(_) => run_serve(settings, crawler).await,
        config::Command::Crawl(args) => run_crawl(crawler, args).await,
    }
}

fn build_crawler(settings: &config::Settings) -> Arc<CrawlService> {
    let backend = Arc::new(StaticRenderer::new());
    let session = Arc::new(FetchSession::new(backend, settings.browser.clone()));
    Arc::new(CrawlService::new(session, ContentReducer::default()))
}

async fn run_serve(settings: config::Settings, crawler: Arc<CrawlService>) -> Result<(), AppError> {
    let session = crawler.session().clone();
    session.start().await?;

    let router = http::build_router(HttpState::new(crawler));
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    match tokio::time::timeout(settings.server.graceful_shutdown, session.stop()).await {
        Ok(stopped) => stopped?,
        Err(_) => warn!(
            timeout_secs = settings.server.graceful_shutdown.as_secs(),
            "fetch session did not stop within the graceful shutdown window"
        ),
    }

    served
}

async fn run_crawl(crawler: Arc<CrawlService>, args: CrawlArgs) -> Result<(), AppError> {
    let options = FetchOptions::new(parse_target_url(&args.url)?)
        .with_threshold(FilterThreshold::new(args.threshold)?)
        .with_raw_text(args.include_raw)
        .with_wait_for_selector(args.wait_for);

    let session = crawler.session().clone();
    session.start().await?;
    let outcome = crawler.crawl(options).await;
    session.stop().await?;

    let record = outcome?;
    let rendered = serde_json::to_string_pretty(&record)
        .map_err(|err| AppError::unexpected(format!("failed to encode record: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining requests");
}
