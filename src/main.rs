use apiprobe::error::AppError;
use axum::http::StatusCode;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,apiprobe=debug")),
        )
        .json()
        .init();

    if let Err(err) = run().await {
        eprintln!("error: {}", err.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let state = apiprobe::app::load_state()?;
    tracing::info!(
        listen = %state.runtime.listen,
        timeout_ms = state.runtime.request_timeout_ms,
        gemini_base_url = %state.runtime.gemini_base_url,
        "starting apiprobe"
    );

    let app = apiprobe::app::build_app(state.clone());
    let addr: std::net::SocketAddr = state
        .runtime
        .listen
        .parse()
        .map_err(startup_error("listen_invalid"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(startup_error("listen_failed"))?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app)
        .await
        .map_err(startup_error("serve_failed"))?;
    Ok(())
}

fn startup_error<E: std::fmt::Display>(code: &'static str) -> impl Fn(E) -> AppError {
    move |err| AppError::new(StatusCode::BAD_REQUEST, code, err.to_string())
}
