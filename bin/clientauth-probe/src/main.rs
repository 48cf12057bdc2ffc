use anyhow::{Context, Result};
use clientauth_core::ClientAuthSettings;
use clientauth_http::{ClientAuthAdaptor, EnableOutcome, PoolRequest, TransportSlots};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "CLIENTAUTH_CONFIG";
const KEYPASS_ENV: &str = "CLIENTAUTH_KEYPASS";
const KEYSTORE_ENV: &str = "CLIENTAUTH_KEYSTORE";
const ALGORITHM_ENV: &str = "CLIENTAUTH_ALGORITHM";
const VERIFY_ENV: &str = "CLIENTAUTH_VERIFY_SERVER_CERT";
const LOG_FORMAT_ENV: &str = "CLIENTAUTH_LOG_FORMAT";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings = load_settings()?;
    let url = std::env::args().nth(1);

    info!("Starting clientauth-probe...");
    info!("  - Passphrase file: {}", settings.client_auth.passphrase_path.display());
    info!("  - Keystore file: {}", settings.client_auth.keystore_path.display());
    info!("  - Algorithm: {}", settings.client_auth.algorithm);
    info!("  - Verify server certificate: {}", settings.client_auth.verify_server_cert);

    let adaptor = ClientAuthAdaptor::with_defaults(settings.client_auth, settings.timeouts);
    let slots = TransportSlots::new();

    match adaptor.enable(&slots).context("Failed to enable client authentication")? {
        EnableOutcome::Enabled => info!("Client authentication enabled"),
        EnableOutcome::AlreadyEnabled => info!("Client authentication was already enabled"),
    }

    let outcome = match url {
        Some(url) => probe(&slots, &url).await,
        None => {
            info!("No URL given, client pools were built and will now be closed");
            Ok(())
        }
    };

    adaptor.shutdown();
    outcome
}

/// GET `url` through the active transport
async fn probe(slots: &TransportSlots, url: &str) -> Result<()> {
    let pool = slots
        .active_client()
        .context("No client pool installed in the active transport slot")?;

    info!("Requesting {} through the {} pool", url, pool.kind());
    let response = pool
        .execute(PoolRequest::get(url))
        .await
        .with_context(|| format!("Request to {} failed", url))?;

    if response.is_success() {
        info!("{} responded {}", url, response.status);
    } else {
        warn!("{} responded {}", url, response.status);
    }
    println!("{}", response.body);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Load settings from the YAML file named by the environment, then apply per-field overrides
fn load_settings() -> Result<ClientAuthSettings> {
    let settings = match std::env::var(CONFIG_ENV) {
        Ok(path) => ClientAuthSettings::from_yaml_file(&PathBuf::from(&path))
            .with_context(|| format!("Failed to load settings from {}", path))?,
        Err(_) => ClientAuthSettings::default(),
    };

    let settings = apply_overrides(settings, |name| std::env::var(name).ok())?;
    settings.validate().context("Invalid client auth settings")?;
    Ok(settings)
}

fn apply_overrides(
    mut settings: ClientAuthSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ClientAuthSettings> {
    if let Some(path) = lookup(KEYPASS_ENV) {
        settings.client_auth.passphrase_path = PathBuf::from(path);
    }
    if let Some(path) = lookup(KEYSTORE_ENV) {
        settings.client_auth.keystore_path = PathBuf::from(path);
    }
    if let Some(algorithm) = lookup(ALGORITHM_ENV) {
        settings.client_auth.algorithm = algorithm;
    }
    if let Some(flag) = lookup(VERIFY_ENV) {
        settings.client_auth.verify_server_cert = parse_flag(&flag)
            .with_context(|| format!("{} must be true or false, got '{}'", VERIFY_ENV, flag))?;
    }
    Ok(settings)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
