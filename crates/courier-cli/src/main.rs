use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use courier_daemon::Service;
use courier_gateway::loopback::LoopbackGateway;
use courier_gateway::AuthMode;
use courier_types::CourierConfig;

/// Courier -- persistent messaging-gateway bot.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about)]
struct Cli {
    /// Path to courier.toml (built-in defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the auth directory
    #[arg(long)]
    auth_dir: Option<PathBuf>,

    /// Authenticate with a pairing code instead of a QR artifact
    #[arg(long, env = "COURIER_PAIRING_CODE")]
    pairing_code: bool,

    /// Phone number for pairing-code auth; prompted for when omitted
    #[arg(long, env = "COURIER_PHONE")]
    phone: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CourierConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CourierConfig::default_for("./auth"),
    };
    if let Some(auth_dir) = cli.auth_dir {
        config.auth_dir = auth_dir;
    }
    config.validate().context("invalid configuration")?;

    let auth_mode = if cli.pairing_code {
        let phone = match cli.phone {
            Some(phone) => phone,
            None => prompt_phone()?,
        };
        AuthMode::PairingCode { phone }
    } else {
        AuthMode::QrCode
    };

    // The loopback backend stands in for the external gateway transport.
    // Deployments wire their own `Gateway` implementation here.
    let (gateway, controller) = LoopbackGateway::new();
    controller.set_auto_open(true);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(Service::new(config, gateway, auth_mode).run())?;
    Ok(())
}

fn prompt_phone() -> anyhow::Result<String> {
    print!("Phone number in international format (digits only, no '+'): ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let phone = line.trim().to_string();
    anyhow::ensure!(
        !phone.is_empty(),
        "a phone number is required for pairing-code auth"
    );
    Ok(phone)
}
