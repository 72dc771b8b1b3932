use anyhow::{Context, Result};
use avax_hw_wallet::blockchain::avalanche::utxo::encode_checksummed_hex;
use avax_hw_wallet::blockchain::avalanche::{AvalancheClient, UnsignedTransaction};
use avax_hw_wallet::blockchain::{Broadcaster, ChainQuery};
use avax_hw_wallet::cli::{Cli, Commands};
use avax_hw_wallet::core::bip44::{Bip32Path, Branch, KeyDeriver};
use avax_hw_wallet::core::config::WalletConfig;
use avax_hw_wallet::core::domain::{format_avax, AppVersion};
use avax_hw_wallet::core::WalletManager;
use avax_hw_wallet::hardware::{HardwareSigner, MockSigner, SignerSession};
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How long the device may wait for the user to confirm.
#[cfg_attr(not(feature = "ledger"), allow(dead_code))]
const DEVICE_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let mut config = WalletConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);
    let manager = WalletManager::new(config).context("invalid configuration")?;

    match &cli.command {
        Commands::ListDevices => list_devices()?,
        Commands::GetDeviceModel => device_model()?,
        Commands::GetWalletId => wallet_id()?,
        Commands::GetAppVersion => {
            let mut session = open_session(&cli)?;
            println!("{}", session.app_version().await?);
        }
        Commands::GetExtendedPublicKey { path } => {
            let path: Bip32Path = path.parse()?;
            let mut session = open_session(&cli)?;
            let key = session.account_key(&path).await?;
            println!("{}", hex::encode(key.public_key().serialize()));
            println!("{}", hex::encode(key.chain_code()));
        }
        Commands::GetAddress { chain, path } => {
            let mut session = open_session(&cli)?;
            let deriver = manager.account_deriver(&mut session).await?;
            println!("{}", manager.derive_address(&deriver, *chain, path)?);
        }
        Commands::GetNewReceiveAddress => {
            let client = client(&manager)?;
            let mut session = open_session(&cli)?;
            let deriver: KeyDeriver = manager.account_deriver(&mut session).await?;
            let result = manager.discover(&deriver, cli.chain, &client).await?;
            let (path, address) = result.next_unused_address(Branch::NonChange)?;
            tracing::info!(path = %path, "Next unused receive address");
            println!("{}", address);
        }
        Commands::GetBalance { list_addresses } => {
            let client = client(&manager)?;
            let mut session = open_session(&cli)?;
            let report = manager.discover_balance(&mut session, cli.chain, &client).await?;
            if *list_addresses {
                for entry in &report.per_address {
                    println!("{} {} {}", entry.path, entry.address, format_avax(entry.amount));
                }
            }
            println!("{} AVAX", report.total_avax());
        }
        Commands::GetUtxos { address } => {
            let client = client(&manager)?;
            let (chain, _) = manager.codec().address_to_chain(address)?;
            let utxos = client.get_utxos(chain, std::slice::from_ref(address)).await?;
            println!("{}", serde_json::to_string_pretty(&utxos)?);
        }
        Commands::PrepareTransfer => {
            let client = client(&manager)?;
            let mut session = open_session(&cli)?;
            let plan = manager.discover_for_transfer(&mut session, cli.chain, &client).await?;
            println!("{}", serde_json::to_string_pretty(&plan.summary())?);
        }
        Commands::SignUnsigned { tx, broadcast } => {
            let content = tokio::fs::read_to_string(tx)
                .await
                .with_context(|| format!("failed to read {}", tx.display()))?;
            let unsigned = UnsignedTransaction::from_json(&content)?;

            let client = client(&manager)?;
            let mut session = open_session(&cli)?;
            let plan = manager
                .discover_for_transfer(&mut session, unsigned.chain, &client)
                .await?;
            let signed = manager.sign_unsigned(&unsigned, &plan.record, &mut session).await?;
            drop(session);

            if *broadcast {
                let tx_id = client.issue_tx(unsigned.chain, &signed).await?;
                println!("{}", tx_id);
            } else {
                println!("{}", encode_checksummed_hex(&signed.to_bytes()?));
            }
        }
    }

    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn client(manager: &WalletManager) -> Result<AvalancheClient> {
    Ok(AvalancheClient::new(&manager.config().node, manager.network())?)
}

fn open_session(cli: &Cli) -> Result<SignerSession> {
    if let Some(seed) = &cli.mock_seed {
        let seed = hex::decode(seed.trim_start_matches("0x")).context("mock seed must be hex")?;
        tracing::warn!("Using a software signer; keys are derived on this host");
        let signer: Box<dyn HardwareSigner> = Box::new(MockSigner::from_seed(&seed, AppVersion::new(0, 5, 0))?);
        return Ok(SignerSession::new(signer));
    }
    open_device()
}

#[cfg(feature = "ledger")]
fn open_device() -> Result<SignerSession> {
    let (_, app) = avax_hw_wallet::hardware::ledger::device::open_first(DEVICE_TIMEOUT)?;
    Ok(SignerSession::new(Box::new(app)))
}

#[cfg(not(feature = "ledger"))]
fn open_device() -> Result<SignerSession> {
    Err(anyhow::anyhow!("built without Ledger support; rebuild with --features ledger"))
}

#[cfg(feature = "ledger")]
fn list_devices() -> Result<()> {
    let devices = avax_hw_wallet::hardware::ledger::device::list_devices()?;
    if devices.is_empty() {
        tracing::warn!("No Ledger devices found");
    }
    for device in devices {
        println!(
            "{} {}",
            device.model.name(),
            device.serial_number.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

#[cfg(feature = "ledger")]
fn device_model() -> Result<()> {
    let (info, _) = avax_hw_wallet::hardware::ledger::device::open_first(DEVICE_TIMEOUT)?;
    println!("{}", info.model.name());
    Ok(())
}

#[cfg(feature = "ledger")]
fn wallet_id() -> Result<()> {
    let (_, mut app) = avax_hw_wallet::hardware::ledger::device::open_first(DEVICE_TIMEOUT)?;
    let id = app.wallet_id();
    app.close();
    println!("{}", hex::encode(id?));
    Ok(())
}

#[cfg(not(feature = "ledger"))]
fn list_devices() -> Result<()> {
    Err(anyhow::anyhow!("built without Ledger support; rebuild with --features ledger"))
}

#[cfg(not(feature = "ledger"))]
fn device_model() -> Result<()> {
    list_devices()
}

#[cfg(not(feature = "ledger"))]
fn wallet_id() -> Result<()> {
    list_devices()
}
