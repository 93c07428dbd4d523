//! `glyphs` command line interface.
//!
//! Exit codes: 0 on success, 1 on a runtime error, 2 on a usage error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use bitcoin::key::XOnlyPublicKey;
use bitcoin::{OutPoint, PublicKey, Txid};
use clap::{Args, Parser, Subcommand};

use bitcoin_utils::htlc::{self, HtlcParams};
use glyph_engine::{
    Auth, BuildOptions, BuildResult, CoreRpc, EngineConfig, GlyphProtocol, HtlcOnChain,
    TransferDestination,
};
use glyphs_types::{GlyphEtching, GlyphId, MintTerms, Network, DEFAULT_DIVISIBILITY};
use glyphs_utils::{decode_varint, encode_varint};
use glyphstone::{int_to_name, name_to_int};

#[derive(Parser)]
#[command(name = "glyphs", version, about = "Glyphs fungible-token protocol")]
struct Cli {
    /// Bitcoin network to operate on.
    #[arg(long, global = true, default_value = "testnet4")]
    network: Network,

    /// Bitcoin Core JSON-RPC endpoint.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8332")]
    rpc_url: String,

    /// RPC user; combined with --rpc-pass.
    #[arg(long, global = true)]
    rpc_user: Option<String>,

    /// RPC password.
    #[arg(long, global = true)]
    rpc_pass: Option<String>,

    /// Path to the node's .cookie file.
    #[arg(long, global = true)]
    rpc_cookie: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue (etch) a new glyph.
    Issue {
        /// Name of the glyph, e.g. "TEST•COIN".
        name: String,
        /// Number of decimal places.
        #[arg(long, default_value_t = DEFAULT_DIVISIBILITY)]
        divisibility: u8,
        /// Currency symbol; pass an empty string to omit it.
        #[arg(long, default_value = "¤")]
        symbol: String,
        /// Glyphs premined to the destination address.
        #[arg(long, default_value_t = 0)]
        premine: u64,
        /// Cap on the number of mints allowed.
        #[arg(long = "mint_cap")]
        mint_cap: Option<u64>,
        /// Fixed amount of glyphs minted per transaction.
        #[arg(long = "mint_amount")]
        mint_amount: Option<u64>,
        /// Block height at which the open mint begins.
        #[arg(long = "start_height")]
        start_height: Option<u64>,
        /// Block height at which the open mint ends.
        #[arg(long = "end_height")]
        end_height: Option<u64>,
        /// Offset from the etch block at which the open mint begins.
        #[arg(long = "start_offset")]
        start_offset: Option<u64>,
        /// Offset from the etch block at which the open mint ends.
        #[arg(long = "end_offset")]
        end_offset: Option<u64>,
        /// Destination for premined glyphs (required if premine > 0).
        #[arg(long = "destination_address")]
        destination_address: Option<String>,
        #[command(flatten)]
        common: CommonTxArgs,
    },

    /// Mint new units of an existing glyph.
    Mint {
        /// Glyph id in BLOCK:TX format.
        glyph_id: GlyphId,
        /// Amount of glyphs to mint.
        amount: u64,
        /// Destination address for the minted glyphs.
        destination_address: String,
        #[command(flatten)]
        common: CommonTxArgs,
    },

    /// Transfer glyphs held by a specific output.
    Transfer {
        /// Glyph id in BLOCK:TX format.
        glyph_id: GlyphId,
        /// Transaction id of the input UTXO.
        input_txid: Txid,
        /// Output index of the input UTXO.
        input_vout: u32,
        /// Amount of glyphs to transfer.
        amount: u64,
        /// Destination address, or "OP_RETURN" to burn.
        destination_address: String,
        #[command(flatten)]
        common: CommonTxArgs,
    },

    /// Encode or decode a glyph name.
    Symbol {
        #[command(subcommand)]
        action: CodecAction,
    },

    /// Encode or decode a varint.
    Varint {
        #[command(subcommand)]
        action: CodecAction,
    },

    /// Atomic swap operations.
    Swap {
        #[command(subcommand)]
        action: SwapCommand,
    },
}

#[derive(Subcommand)]
enum CodecAction {
    Encode { value: String },
    Decode { value: String },
}

#[derive(Subcommand)]
enum SwapCommand {
    /// Open a swap by publishing an HTLC.
    Initiate {
        /// Glyph id in BLOCK:TX format.
        glyph_id: GlyphId,
        /// Amount of glyphs to lock.
        amount: u64,
        /// Your address; its key becomes the refund key.
        destination_address: String,
        /// Counterparty public key (hex).
        counterparty_pubkey: String,
        /// Secret preimage; keep it safe until you claim.
        secret: String,
        /// Absolute block height for the refund path.
        timelock: u64,
        #[command(flatten)]
        common: CommonTxArgs,
    },

    /// Answer a swap by publishing the mirror HTLC.
    Participate {
        /// Glyph id in BLOCK:TX format.
        glyph_id: GlyphId,
        /// Amount of glyphs to lock.
        amount: u64,
        /// Funding outpoint of the counterparty HTLC, TXID:VOUT.
        counterparty_outpoint: String,
        /// Counterparty secret hash (hex, 32 bytes).
        secret_hash: String,
        /// Receiver key of the counterparty HTLC (hex).
        receiver_pubkey: String,
        /// Sender key of the counterparty HTLC (hex).
        sender_pubkey: String,
        /// Counterparty timelock height.
        timelock: u64,
        /// Your address; its key becomes the mirror refund key.
        destination_address: String,
        #[command(flatten)]
        common: CommonTxArgs,
    },

    /// Claim an HTLC with the secret preimage.
    Claim {
        /// Funding outpoint of the HTLC, TXID:VOUT.
        outpoint: String,
        /// Secret preimage.
        secret: String,
        /// Receiver key the HTLC commits to (hex).
        receiver_pubkey: String,
        /// Sender key the HTLC commits to (hex).
        sender_pubkey: String,
        /// Timelock height the HTLC commits to.
        timelock: u64,
        /// Address receiving the claimed glyphs.
        destination_address: String,
        #[command(flatten)]
        common: CommonTxArgs,
    },

    /// Refund an expired HTLC.
    Refund {
        /// Funding outpoint of the HTLC, TXID:VOUT.
        outpoint: String,
        /// Secret hash the HTLC commits to (hex, 32 bytes).
        secret_hash: String,
        /// Receiver key the HTLC commits to (hex).
        receiver_pubkey: String,
        /// Sender key the HTLC commits to (hex).
        sender_pubkey: String,
        /// Timelock height the HTLC commits to.
        timelock: u64,
        /// Address receiving the refunded glyphs.
        destination_address: String,
        #[command(flatten)]
        common: CommonTxArgs,
    },
}

#[derive(Args, Clone)]
struct CommonTxArgs {
    /// Address receiving bitcoin change.
    #[arg(long = "change_address")]
    change_address: Option<String>,

    /// Transaction fee in satoshis per byte.
    #[arg(long, default_value_t = 1)]
    fee: u64,

    /// Broadcast the transaction instead of printing it.
    #[arg(long)]
    live: bool,

    /// Auxiliary Nostr public key (hex) bound into the destination.
    #[arg(long = "nostr_pubkey")]
    nostr_pubkey: Option<String>,
}

impl CommonTxArgs {
    fn build_options(&self) -> Result<BuildOptions> {
        let aux = self
            .nostr_pubkey
            .as_deref()
            .map(XOnlyPublicKey::from_str)
            .transpose()
            .context("invalid nostr public key")?;
        Ok(BuildOptions {
            change_address: self.change_address.clone(),
            fee_rate: Some(self.fee),
            broadcast: self.live,
            input: None,
            aux_pubkey: aux,
        })
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        network,
        rpc_url,
        rpc_user,
        rpc_pass,
        rpc_cookie,
        command,
    } = cli;

    match command {
        Command::Symbol { action } => match action {
            CodecAction::Encode { value } => println!("{}", name_to_int(&value)?),
            CodecAction::Decode { value } => {
                let n: u128 = value.parse().context("expected an integer")?;
                println!("{}", int_to_name(n)?);
            }
        },
        Command::Varint { action } => match action {
            CodecAction::Encode { value } => {
                let n: u64 = value.parse().context("expected an integer")?;
                println!("{}", hex::encode(encode_varint(n)));
            }
            CodecAction::Decode { value } => {
                let bytes = hex::decode(&value).context("expected hex")?;
                let (n, _) = decode_varint(&bytes)?;
                println!("{n}");
            }
        },
        command => {
            let proto = connect(network, &rpc_url, rpc_user, rpc_pass, rpc_cookie)?;
            run_online(&proto, command)?;
        }
    }
    Ok(())
}

fn connect(
    network: Network,
    rpc_url: &str,
    rpc_user: Option<String>,
    rpc_pass: Option<String>,
    rpc_cookie: Option<PathBuf>,
) -> Result<GlyphProtocol<CoreRpc>> {
    let auth = match (rpc_user, rpc_pass, rpc_cookie) {
        (Some(user), Some(pass), _) => Auth::UserPass(user, pass),
        (_, _, Some(cookie)) => Auth::CookieFile(cookie),
        _ => Auth::None,
    };
    let rpc = CoreRpc::connect(rpc_url, auth, network)?;
    Ok(GlyphProtocol::new(rpc, EngineConfig::for_network(network)))
}

fn run_online(proto: &GlyphProtocol<CoreRpc>, command: Command) -> Result<()> {
    match command {
        Command::Issue {
            name,
            divisibility,
            symbol,
            premine,
            mint_cap,
            mint_amount,
            start_height,
            end_height,
            start_offset,
            end_offset,
            destination_address,
            common,
        } => {
            let terms = MintTerms {
                cap: mint_cap,
                amount: mint_amount,
                height_start: start_height,
                height_end: end_height,
                offset_start: start_offset,
                offset_end: end_offset,
            };
            let etching = GlyphEtching {
                name,
                divisibility,
                symbol: parse_symbol(&symbol)?,
                premine,
                terms: if terms.is_empty() { None } else { Some(terms) },
            };
            let result = proto.etch(&etching, destination_address.as_deref(), &common.build_options()?)?;
            report(&result);
        }

        Command::Mint {
            glyph_id,
            amount,
            destination_address,
            common,
        } => {
            let result = proto.mint(&glyph_id, amount, &destination_address, &common.build_options()?)?;
            report(&result);
        }

        Command::Transfer {
            glyph_id,
            input_txid,
            input_vout,
            amount,
            destination_address,
            common,
        } => {
            let destination = if destination_address.starts_with("OP_RETURN") {
                TransferDestination::Burn
            } else {
                TransferDestination::Address(destination_address)
            };
            let input = OutPoint {
                txid: input_txid,
                vout: input_vout,
            };
            let result = proto.transfer(&glyph_id, input, amount, &destination, &common.build_options()?)?;
            report(&result);
        }

        Command::Swap { action } => run_swap(proto, action)?,

        Command::Symbol { .. } | Command::Varint { .. } => unreachable!("handled offline"),
    }
    Ok(())
}

fn run_swap(proto: &GlyphProtocol<CoreRpc>, command: SwapCommand) -> Result<()> {
    match command {
        SwapCommand::Initiate {
            glyph_id,
            amount,
            destination_address,
            counterparty_pubkey,
            secret,
            timelock,
            common,
        } => {
            let counterparty = parse_pubkey(&counterparty_pubkey)?;
            let offer = proto.swap_initiate(
                &glyph_id,
                amount,
                &destination_address,
                &counterparty,
                secret.as_bytes(),
                timelock,
                &common.build_options()?,
            )?;
            report(&offer.build);
            eprintln!("secret hash: {}", hex::encode(offer.secret_hash));
            eprintln!("timelock: {}", offer.timelock);
            eprintln!("sender pubkey: {}", offer.sender_pubkey);
        }

        SwapCommand::Participate {
            glyph_id,
            amount,
            counterparty_outpoint,
            secret_hash,
            receiver_pubkey,
            sender_pubkey,
            timelock,
            destination_address,
            common,
        } => {
            let counterparty = HtlcOnChain {
                outpoint: parse_outpoint(&counterparty_outpoint)?,
                params: HtlcParams {
                    secret_hash: parse_hash(&secret_hash)?,
                    receiver: parse_pubkey(&receiver_pubkey)?,
                    sender: parse_pubkey(&sender_pubkey)?,
                    timelock,
                },
            };
            let offer = proto.swap_participate(
                &glyph_id,
                amount,
                &counterparty,
                &destination_address,
                &common.build_options()?,
            )?;
            report(&offer.build);
            eprintln!("timelock: {}", offer.timelock);
            eprintln!("sender pubkey: {}", offer.sender_pubkey);
        }

        SwapCommand::Claim {
            outpoint,
            secret,
            receiver_pubkey,
            sender_pubkey,
            timelock,
            destination_address,
            common,
        } => {
            let htlc_output = HtlcOnChain {
                outpoint: parse_outpoint(&outpoint)?,
                params: HtlcParams {
                    secret_hash: htlc::secret_hash(secret.as_bytes()),
                    receiver: parse_pubkey(&receiver_pubkey)?,
                    sender: parse_pubkey(&sender_pubkey)?,
                    timelock,
                },
            };
            let result = proto.swap_claim(
                &htlc_output,
                secret.as_bytes(),
                &destination_address,
                &common.build_options()?,
            )?;
            report(&result);
        }

        SwapCommand::Refund {
            outpoint,
            secret_hash,
            receiver_pubkey,
            sender_pubkey,
            timelock,
            destination_address,
            common,
        } => {
            let htlc_output = HtlcOnChain {
                outpoint: parse_outpoint(&outpoint)?,
                params: HtlcParams {
                    secret_hash: parse_hash(&secret_hash)?,
                    receiver: parse_pubkey(&receiver_pubkey)?,
                    sender: parse_pubkey(&sender_pubkey)?,
                    timelock,
                },
            };
            let result = proto.swap_refund(
                &htlc_output,
                &destination_address,
                &common.build_options()?,
            )?;
            report(&result);
        }
    }
    Ok(())
}

/// Print warnings to stderr and the txid (when broadcast) or the raw
/// transaction hex to stdout.
fn report(result: &BuildResult) {
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    match result.txid {
        Some(txid) => println!("{txid}"),
        None => println!("{}", result.raw_hex()),
    }
}

fn parse_symbol(symbol: &str) -> Result<Option<char>> {
    if symbol.is_empty() {
        return Ok(None);
    }
    let mut chars = symbol.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Some(c)),
        _ => bail!("symbol must be a single character"),
    }
}

fn parse_pubkey(hex_key: &str) -> Result<PublicKey> {
    PublicKey::from_str(hex_key).with_context(|| format!("invalid public key {hex_key:?}"))
}

fn parse_outpoint(s: &str) -> Result<OutPoint> {
    OutPoint::from_str(s).with_context(|| format!("invalid outpoint {s:?}, expected TXID:VOUT"))
}

fn parse_hash(hex_hash: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_hash).context("secret hash must be hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("secret hash must be 32 bytes"))
}
