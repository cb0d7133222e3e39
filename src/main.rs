use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use md2pdf::{
    application::{
        convert::{self, ConvertPlan},
        error::AppError,
        render::{JobRegistry, RenderDriver},
    },
    config::{self, Command, ConvertArgs, Settings},
    infra::{
        chromium::ChromiumEngine,
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
};
use tokio::{sync::Notify, time::timeout};
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        Command::Serve(_) => run_serve(settings).await,
        Command::Convert(args) => run_convert(settings, args).await,
    }
}

fn build_driver(settings: &Settings, session_budget: Duration) -> RenderDriver {
    let engine = ChromiumEngine::new(settings.render.chrome_path.as_deref())
        .with_request_timeout(session_budget);
    RenderDriver::new(
        Arc::new(engine),
        JobRegistry::new(),
        settings.render.driver_config(session_budget),
    )
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let driver = build_driver(&settings, settings.server.session_budget);
    let state = AppState::new(driver, settings.server.default_resolution)
        .with_public_dir(settings.server.public_dir.clone());
    let body_limit = usize::try_from(settings.server.body_limit_bytes.get()).unwrap_or(usize::MAX);
    let router = http::build_router(state, body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "md2pdf::serve",
        addr = %settings.server.addr,
        assets = %settings.render.assets_dir.display(),
        "listening"
    );

    let stop = Arc::new(Notify::new());
    let server = {
        let stop = Arc::clone(&stop);
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move { stop.notified().await })
            .into_future()
    };
    let mut server = tokio::spawn(server);

    tokio::select! {
        joined = &mut server => return server_result(joined),
        () = shutdown_signal() => {
            info!(target = "md2pdf::serve", "shutdown requested, draining connections");
            stop.notify_one();
        }
    }

    match timeout(settings.server.graceful_shutdown, server).await {
        Ok(joined) => server_result(joined),
        Err(_) => {
            warn!(
                target = "md2pdf::serve",
                grace_seconds = settings.server.graceful_shutdown.as_secs(),
                "connections still open after the grace period; exiting"
            );
            Ok(())
        }
    }
}

fn server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "md2pdf::serve", error = %err, "failed to listen for ctrl-c");
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
                warn!(target = "md2pdf::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn run_convert(settings: Settings, args: ConvertArgs) -> Result<(), AppError> {
    let plan = ConvertPlan::from_args(&args, &settings.cli)?;
    let driver = build_driver(&settings, settings.cli.session_budget);

    info!(
        target = "md2pdf::convert",
        source = %plan.source.display(),
        themes = plan.themes.len(),
        resolution = %plan.resolution,
        output_dir = %plan.output_dir.display(),
        "starting conversion"
    );
    let written = convert::run(&driver, &plan).await?;
    for path in &written {
        println!("{}", path.display());
    }
    Ok(())
}
