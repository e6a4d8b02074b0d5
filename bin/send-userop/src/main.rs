//! Builds, signs and submits one Daimo user operation with a seed phrase key.

use std::path::PathBuf;

use alloy_primitives::{Address, B256, U256};
use clap::{Parser, Subcommand, ValueEnum};
use daimo_primitives::{
    ActiveKey, KeySlot, NonceMetadata, NonceType, SlotType, contracts::Call, key_slot::label,
};
use daimo_signer::{MnemonicSigner, Signer};
use daimo_userop::{
    Account, AccountChain, Config, RpcAccountChain, RpcBundler, UserOperationBuilder,
    calls::{erc20_transfer, plan_add_key, plan_remove_key},
};
use eyre::{OptionExt, Result, WrapErr};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "send-userop")]
#[command(about = "Sign and submit a Daimo account operation")]
struct Args {
    /// Path to the TOML config
    #[arg(long, env = "DAIMO_CONFIG", default_value = "daimo.toml")]
    config: PathBuf,

    /// Daimo account address
    #[arg(long, env = "DAIMO_ACCOUNT")]
    account: Address,

    /// Seed phrase of a key registered on the account
    #[arg(long, env = "DAIMO_MNEMONIC", hide_env_values = true)]
    mnemonic: Option<String>,

    /// Application identifier stored in the nonce metadata
    #[arg(long, default_value = "0")]
    nonce_id: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the account's active keys
    Keys,
    /// Transfer ERC-20 tokens
    Transfer {
        #[arg(long)]
        token: Address,
        #[arg(long)]
        to: Address,
        /// Amount in the token's smallest unit
        #[arg(long)]
        amount: U256,
    },
    /// Register a new device key in the next free slot
    AddKey {
        #[arg(long, value_enum)]
        slot_type: SlotKind,
        /// Public key x coordinate
        #[arg(long)]
        x: B256,
        /// Public key y coordinate
        #[arg(long)]
        y: B256,
    },
    /// Remove the key in `slot`
    RemoveKey {
        #[arg(long)]
        slot: KeySlot,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SlotKind {
    Phone,
    Computer,
    PasskeyBackup,
}

impl From<SlotKind> for SlotType {
    fn from(kind: SlotKind) -> Self {
        match kind {
            SlotKind::Phone => Self::Phone,
            SlotKind::Computer => Self::Computer,
            SlotKind::PasskeyBackup => Self::PasskeyBackup,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("send_userop=info".parse()?))
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .wrap_err_with(|| format!("Failed to load config from {}", args.config.display()))?;
    info!(
        chain_id = config.chain.chain_id,
        account = %args.account,
        "Loaded config"
    );

    let chain = RpcAccountChain::new(&config.chain.rpc_url, config.chain.entry_point)?;
    let active_keys = chain
        .active_keys(args.account)
        .await
        .wrap_err("Failed to fetch active signing keys")?;

    if let Command::Keys = args.command {
        print_keys(&active_keys)?;
        return Ok(());
    }

    let phrase = args
        .mnemonic
        .as_deref()
        .ok_or_eyre("A seed phrase is required to sign, set DAIMO_MNEMONIC")?;
    let signer = MnemonicSigner::locate(
        phrase,
        args.account,
        &active_keys,
        config.webauthn.origin.clone(),
    )?;
    info!(key_slot = signer.key_slot(), "Signing with seed phrase key");

    let (nonce_type, calls) = plan(&args, &active_keys)?;
    let metadata = NonceMetadata::new(nonce_type, args.nonce_id)?;

    let bundler = RpcBundler::new(&config.chain.bundler_url)?;
    let account = Account {
        address: args.account,
        init: None,
    };
    let builder =
        UserOperationBuilder::new(&config, account, Signer::Mnemonic(signer), chain, bundler);

    let op_hash = builder
        .send(metadata, calls)
        .await
        .wrap_err("Failed to send user operation")?;

    info!(%op_hash, "Operation accepted by bundler");
    println!("{op_hash}");

    Ok(())
}

fn plan(args: &Args, active_keys: &[ActiveKey]) -> Result<(NonceType, Vec<Call>)> {
    let active: Vec<KeySlot> = active_keys.iter().map(|key| key.slot).collect();

    Ok(match &args.command {
        Command::Keys => eyre::bail!("listing keys does not build an operation"),
        Command::Transfer { token, to, amount } => {
            (NonceType::Send, vec![erc20_transfer(*token, *to, *amount)])
        }
        Command::AddKey { slot_type, x, y } => {
            let (slot, call) = plan_add_key(args.account, &active, (*slot_type).into(), [*x, *y])?;
            let name = label(slot.into())?;
            info!(slot, label = %name, "Adding key");
            (NonceType::AddKey, vec![call])
        }
        Command::RemoveKey { slot } => {
            let call = plan_remove_key(args.account, &active, *slot)?;
            let name = label((*slot).into())?;
            info!(slot, label = %name, "Removing key");
            (NonceType::RemoveKey, vec![call])
        }
    })
}

fn print_keys(active_keys: &[ActiveKey]) -> Result<()> {
    for key in active_keys {
        println!(
            "{:>3}  {:<18}  {} {}",
            key.slot,
            label(key.slot.into())?,
            key.public_key[0],
            key.public_key[1]
        );
    }
    Ok(())
}
