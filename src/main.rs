use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use kairos::channels::CliChannel;
use kairos::config::KairosConfig;
use kairos::conversation::{Ending, Orchestrator};
use kairos::donation::{DonationVerifier, TokioClock};
use kairos::guidance::LlmGuidanceGenerator;
use kairos::ledger::XrplClient;
use kairos::llm::create_provider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = KairosConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  export WALLET_ADDRESS=r... and OPENAI_API_KEY=sk-... (or ANTHROPIC_API_KEY)");
        std::process::exit(1);
    });

    // Initialize tracing: stderr plus an append-only log file
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .with_context(|| format!("failed to open log file {}", config.log_file.display()))?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .init();

    let req = &config.requirement;
    eprintln!("🔮 Kairos v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Ledger: {}", config.rpc_endpoint);
    eprintln!("   Wallet: {}", req.recipient());
    eprintln!(
        "   Donation: {} {} minimum, {} for premium",
        req.min_amount(),
        req.currency(),
        req.premium_threshold()
    );
    eprintln!(
        "   Verification: every {}s for up to {}s\n",
        req.poll_interval().as_secs(),
        req.timeout().as_secs()
    );

    let llm = create_provider(&config.llm)?;
    let generator = Arc::new(LlmGuidanceGenerator::new(llm, config.prompts.clone()));
    let ledger = Arc::new(XrplClient::new(config.rpc_endpoint.clone())?);
    let verifier = DonationVerifier::new(ledger, Arc::new(TokioClock), config.max_query_failures);

    // Ctrl-c during a donation wait ends the wait; anywhere else it exits
    let cancel = verifier.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if cancel.cancel() {
                tracing::info!("Interrupt received, cancelling donation wait");
            } else {
                std::process::exit(130);
            }
        }
    });

    let orchestrator = Orchestrator::new(
        config.requirement.clone(),
        config.orchestrator.clone(),
        generator,
        verifier,
        Box::new(CliChannel::new()),
    );
    let report = orchestrator.run().await;

    tracing::info!(
        session_id = %report.session_id,
        ending = %report.ending,
        rounds = report.state.round(),
        "Run complete"
    );

    if let Ending::Aborted(reason) = &report.ending {
        eprintln!("Error: {}", reason);
    }
    if report.exit_code() != 0 {
        std::process::exit(report.exit_code());
    }
    Ok(())
}
