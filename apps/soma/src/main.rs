use anyhow::Context;
use soma_app::{Outcome, Shell, Soma, SomaConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,soma=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting soma");

    let config = SomaConfig::load().context("Failed to load configuration")?;
    let soma = Soma::new(config).context("Failed to create completion client")?;

    let report = soma.load_configured_manifests();
    tracing::info!(
        registered = report.registered.len(),
        errors = report.errors.len(),
        "User modules loaded"
    );
    soma.start();

    let mut shell = Shell::new(&soma);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match shell.run_line(&line).await {
            Outcome::Quit => break,
            Outcome::Continue(output) if output.is_empty() => {}
            Outcome::Continue(output) => {
                stdout.write_all(output.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }
    }

    soma.shutdown();
    tracing::info!("Bye");
    Ok(())
}
