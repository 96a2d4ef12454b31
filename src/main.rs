use tokio::net::TcpListener;

use gridnotes::config::Config;
use gridnotes::server::CommentServer;
use gridnotes::store::CommentLog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // .env next to the binary wins over the working directory's.
    match std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")))
    {
        Some(env_path) if env_path.exists() => {
            dotenvy::from_path(&env_path).ok();
        }
        _ => {
            dotenvy::dotenv().ok();
        }
    }

    let config = Config::load()?;
    let addr = config.listen_addr()?;
    let log = CommentLog::open(&config).await?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gridnotes listening");

    let server = CommentServer::new(log, config.max_request_bytes);
    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("cannot listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
        .inspect_err(|e| tracing::error!("serving error: {e}"))?;

    tracing::info!("gridnotes stopped");
    Ok(())
}
