use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use orchestration_primitives::hash::RequestId;
use orchestration_primitives::Address;
use orchestration_sdk::amount::{TokenAmount, USDC_DECIMALS};
use orchestration_sdk::authorization::{sign_transfer_authorization, AuthorizationParams};
use orchestration_sdk::config::{load_config, SdkConfig};
use orchestration_sdk::deposit::{deposit_funds, DepositRequest};
use orchestration_sdk::modules::{ModuleConfig, ModuleKind, ModulesClient};
use orchestration_sdk::orchestration::{
    poll_orchestration_status, LoggingObserver, OrchestrationClient,
};
use orchestration_sdk::signer::{LocalSigner, Signer};
use orchestration_sdk::stealth::{self, DerivationMessage, RawKeyShape};
use serde_json::json;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::logging::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "orchestration-cli")]
#[command(about = "Client for cross-chain orchestrations")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[arg(long, value_enum, env("ORCHESTRATION_LOG_FORMAT"), default_value = "plain")]
    pub log_format: LogFormat,
    #[clap(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Derives stealth addresses for the given nonces from a wallet signature
    DeriveKeys(DeriveKeysCmd),
    /// Signs an EIP-3009 transfer authorization for a gasless deposit
    SignAuthorization(SignAuthorizationCmd),
    /// Sends a signed transfer to an orchestration's source-chain account and waits for it
    Deposit(DepositCmd),
    /// Encodes a module configuration and prints its commitment
    EncodeModule(EncodeModuleCmd),
    /// Fetches the current status of an orchestration once
    Status(StatusCmd),
    /// Polls an orchestration until it completes, fails or the attempts run out
    Poll(PollCmd),
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// YAML file with backend, RPC and polling settings.
    #[arg(long, env("ORCHESTRATION_CONFIG"))]
    pub config: PathBuf,
}

impl ConfigArgs {
    fn load(&self) -> anyhow::Result<SdkConfig> {
        load_config(&self.config)
    }
}

#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Hex-encoded secp256k1 private key of the wallet.
    #[arg(long, env("ORCHESTRATION_PRIVATE_KEY"), hide_env_values = true)]
    pub private_key: String,
}

impl KeyArgs {
    fn signer(&self) -> anyhow::Result<LocalSigner> {
        LocalSigner::from_raw(RawKeyShape::HexString(self.private_key.clone()))
            .context("Decode private key")
    }
}

#[derive(Args, Debug)]
pub struct DeriveKeysCmd {
    #[clap(flatten)]
    pub key: KeyArgs,
    #[arg(long)]
    pub chain_id: u64,
    #[arg(long, value_delimiter = ',', required = true)]
    pub nonces: Vec<u64>,
    /// Overrides the default derivation message.
    #[arg(long)]
    pub message: Option<String>,
}

#[derive(Args, Debug)]
pub struct SignAuthorizationCmd {
    #[clap(flatten)]
    pub config: ConfigArgs,
    #[clap(flatten)]
    pub key: KeyArgs,
    #[arg(long)]
    pub chain_id: u64,
    /// Token contract implementing `transferWithAuthorization`.
    #[arg(long)]
    pub token: Address,
    #[arg(long)]
    pub to: Address,
    /// Human readable amount, e.g. `0.1`.
    #[arg(long)]
    pub amount: String,
    #[arg(long, default_value_t = USDC_DECIMALS)]
    pub decimals: u8,
}

#[derive(Args, Debug)]
pub struct DepositCmd {
    #[clap(flatten)]
    pub config: ConfigArgs,
    #[clap(flatten)]
    pub key: KeyArgs,
    #[arg(long)]
    pub chain_id: u64,
    /// Omit for the chain's native asset.
    #[arg(long)]
    pub token: Option<Address>,
    /// The account address on the source chain the backend returned.
    #[arg(long)]
    pub to: Address,
    /// Human readable amount, e.g. `0.1`.
    #[arg(long)]
    pub amount: String,
    #[arg(long, default_value_t = USDC_DECIMALS)]
    pub decimals: u8,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ModuleKindArg {
    Erc4626Vault,
    AaveV3Supply,
    Transfer,
}

impl From<ModuleKindArg> for ModuleKind {
    fn from(value: ModuleKindArg) -> Self {
        match value {
            ModuleKindArg::Erc4626Vault => ModuleKind::Erc4626Vault,
            ModuleKindArg::AaveV3Supply => ModuleKind::AaveV3Supply,
            ModuleKindArg::Transfer => ModuleKind::Transfer,
        }
    }
}

#[derive(Args, Debug)]
pub struct EncodeModuleCmd {
    #[arg(long, value_enum)]
    pub kind: ModuleKindArg,
    #[arg(long)]
    pub chain_id: u64,
    /// Omit for the chain's native asset.
    #[arg(long)]
    pub token: Option<Address>,
    #[arg(long)]
    pub target: Address,
    /// Ask the modules service for the encoding, falling back to the local one.
    #[arg(long, requires = "config")]
    pub remote: bool,
    #[arg(long, env("ORCHESTRATION_CONFIG"))]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StatusCmd {
    #[clap(flatten)]
    pub config: ConfigArgs,
    #[arg(long)]
    pub request_id: RequestId,
}

#[derive(Args, Debug)]
pub struct PollCmd {
    #[clap(flatten)]
    pub config: ConfigArgs,
    #[arg(long)]
    pub request_id: RequestId,
    /// Overrides the configured interval, e.g. `5s`.
    #[arg(long)]
    pub interval: Option<humantime::Duration>,
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            CliCommand::DeriveKeys(cmd) => cmd.run().await,
            CliCommand::SignAuthorization(cmd) => cmd.run().await,
            CliCommand::Deposit(cmd) => cmd.run().await,
            CliCommand::EncodeModule(cmd) => cmd.run().await,
            CliCommand::Status(cmd) => cmd.run().await,
            CliCommand::Poll(cmd) => cmd.run().await,
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl DeriveKeysCmd {
    async fn run(self) -> anyhow::Result<()> {
        let signer = self.key.signer()?;
        let message = match self.message {
            Some(text) => DerivationMessage::custom(text),
            None => DerivationMessage::for_chain(self.chain_id),
        };
        let tree = stealth::key_tree(&signer, &message)
            .await
            .context("Sign derivation message")?;
        let addresses = self
            .nonces
            .iter()
            .map(|nonce| {
                let key = tree.derive(*nonce, self.chain_id)?;
                Ok(json!({
                    "nonce": key.nonce,
                    "address": key.address.to_string(),
                    "ephemeralPublicKey": key.ephemeral_public_key_hex(),
                }))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        print_json(&json!({
            "metaAddress": tree.meta_address().encode(),
            "chainId": self.chain_id,
            "addresses": addresses,
        }))
    }
}

impl SignAuthorizationCmd {
    async fn run(self) -> anyhow::Result<()> {
        let config = self.config.load()?;
        let signer = self.key.signer()?;
        let from = signer.address().context("Signer has no address")?;
        let value = TokenAmount::from_decimal_str(&self.amount, self.decimals)
            .with_context(|| format!("Parse amount {}", self.amount))?;
        let chain = config
            .connect_chain(self.chain_id)
            .await
            .context("Connect to chain RPC")?;
        let signed = sign_transfer_authorization(
            &AuthorizationParams {
                from,
                to: self.to,
                value,
                token: self.token,
                chain_id: self.chain_id,
            },
            &signer,
            &chain,
            config.authorization_validity(),
        )
        .await
        .context("Sign transfer authorization")?;
        print_json(&signed)
    }
}

impl DepositCmd {
    async fn run(self) -> anyhow::Result<()> {
        let config = self.config.load()?;
        let signer = self.key.signer()?;
        let from = signer.address().context("Signer has no address")?;
        let amount = TokenAmount::from_decimal_str(&self.amount, self.decimals)
            .with_context(|| format!("Parse amount {}", self.amount))?;
        let chain = config
            .connect_chain(self.chain_id)
            .await
            .context("Connect to chain RPC")?;
        let request = DepositRequest {
            from,
            destination: self.to,
            token: self.token,
            amount,
        };
        let receipt = deposit_funds(&chain, &signer, &request, config.explorer(self.chain_id))
            .await
            .map_err(|failure| match failure.transaction_hash.clone() {
                Some(hash) => anyhow::Error::new(failure).context(format!("Deposit {hash}")),
                None => anyhow::Error::new(failure).context("Deposit"),
            })?;
        print_json(&json!({
            "transactionHash": receipt.transaction_hash,
            "blockNumber": receipt.block_number,
            "gasUsed": receipt.gas_used.to_string(),
            "explorerUrl": receipt.explorer_url,
        }))
    }
}

impl EncodeModuleCmd {
    async fn run(self) -> anyhow::Result<()> {
        let module = ModuleConfig::new(self.kind.into(), self.chain_id, self.token, self.target);
        let encoded = match (self.remote, &self.config) {
            (true, Some(path)) => {
                let config = load_config(path)?;
                ModulesClient::new(config.modules_url().clone(), config.request_timeout())?
                    .build(&module)
                    .await?
            }
            _ => module.encode()?,
        };
        print_json(&encoded)
    }
}

impl StatusCmd {
    async fn run(self) -> anyhow::Result<()> {
        let config = self.config.load()?;
        let client = OrchestrationClient::from_config(&config)?;
        let snapshot = client
            .status(&self.request_id)
            .await
            .with_context(|| format!("Fetch status of {}", self.request_id))?;
        print_json(&snapshot)
    }
}

impl PollCmd {
    async fn run(self) -> anyhow::Result<()> {
        let config = self.config.load()?;
        let client = OrchestrationClient::from_config(&config)?;
        let mut options = config.polling.options_for(self.request_id.clone());
        if let Some(interval) = self.interval {
            options.interval = interval.into();
        }
        if let Some(max_attempts) = self.max_attempts {
            options.max_attempts = max_attempts;
        }

        let cancel = CancellationToken::new();
        let on_ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received ctrl-c, stopping");
                on_ctrl_c.cancel();
            }
        });

        let snapshot =
            poll_orchestration_status(client.backend(), &options, &mut LoggingObserver, &cancel)
                .await
                .with_context(|| format!("Poll orchestration {}", options.request_id))?;
        print_json(&snapshot)
    }
}
