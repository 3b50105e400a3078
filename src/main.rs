use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use tracing::{error, info, warn};

use invoice_mailer::config::Config;
use invoice_mailer::delivery::SmtpDeliverer;
use invoice_mailer::events::TracingSink;
use invoice_mailer::mailbox::ImapSession;
use invoice_mailer::pipeline::Pipeline;
use invoice_mailer::render::ChromeRenderer;
use invoice_mailer::transform::{HtmlTransformer, HttpImageFetcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let path = Config::resolve_path(std::env::args().nth(1), |key| std::env::var(key).ok());
    let config = Config::load(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    info!(
        imap = %config.imap.host,
        smtp = %config.smtp.host,
        mailbox = %config.imap.mailbox,
        window = config.filter.count,
        "Invoice mailer v{}",
        env!("CARGO_PKG_VERSION")
    );

    let imap = config.imap_config();
    let session = tokio::task::spawn_blocking(move || ImapSession::open(&imap))
        .await
        .context("IMAP connect task failed")?
        .context("failed to open IMAP session")?;

    let fetcher = HttpImageFetcher::new(config.image_timeout())
        .context("failed to build image fetcher")?;
    let pipeline = Pipeline::new(
        config.run_settings(),
        HtmlTransformer::new(fetcher, config.vendor.clone()),
        ChromeRenderer::new(config.render.clone()),
        SmtpDeliverer::new(&config.smtp_config()),
        Arc::new(TracingSink),
    );

    tokio::select! {
        result = pipeline.run(session, Local::now()) => {
            let report = result.inspect_err(|e| error!(error = %e, "Run failed"))?;
            info!(
                run_id = %report.run_id,
                scanned = report.scanned,
                candidates = report.candidates,
                attachments = report.artifacts.len(),
                failures = report.failures.len(),
                delivered = report.delivered,
                "Run complete"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, run abandoned");
            anyhow::bail!("interrupted");
        }
    }

    Ok(())
}
