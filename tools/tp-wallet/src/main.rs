//! TP-Wallet: TyPoints command-line wallet
//!
//! Runs a local two-party simulation or inspects the configured overlay and
//! message relay.

mod commands;

use clap::{Parser, Subcommand};

use tp_telemetry::{init_telemetry, TelemetryConfig};

/// TP-Wallet: TyPoints command-line wallet
#[derive(Parser, Debug)]
#[command(name = "tp-wallet")]
#[command(about = "Mint, send and inspect TyPoints tokens")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mint for Alice, send part to Bob and reconcile both, all in memory
    Simulate {
        /// Points to mint
        #[arg(long, default_value = "100")]
        mint: u64,

        /// Points to send to Bob
        #[arg(long, default_value = "30")]
        send: u64,

        /// Print the Prometheus metrics collected during the run
        #[arg(long)]
        metrics: bool,
    },

    /// Ask the overlay whether an output is indexed
    Lookup {
        /// Transaction id (hex)
        #[arg(long)]
        txid: String,

        /// Output index
        #[arg(long, default_value = "0")]
        vout: u32,
    },

    /// List undelivered token messages for `TP_ROOT_KEY`
    Inbox,

    /// Print the identity key for `TP_ROOT_KEY`
    Identity,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _telemetry = init_telemetry(TelemetryConfig::for_service("tp-wallet"))?;

    match args.command {
        Command::Simulate {
            mint,
            send,
            metrics,
        } => {
            let outcome = commands::simulate(mint, send).await?;
            println!("alice  {}  balance {}", outcome.alice, outcome.alice_balance);
            println!("bob    {}  balance {}", outcome.bob, outcome.bob_balance);
            println!("send   {}", outcome.send_txid);
            if metrics {
                print!("{}", commands::metrics_text()?);
            }
        }
        Command::Lookup { txid, vout } => {
            let matches = commands::lookup(&txid, vout).await?;
            if matches.is_empty() {
                println!("{txid}.{vout} is not indexed");
            } else {
                println!("{}", serde_json::to_string_pretty(&matches)?);
            }
        }
        Command::Inbox => {
            let messages = commands::inbox().await?;
            if messages.is_empty() {
                println!("No messages");
            }
            for message in messages {
                println!("{}  from {}", message.message_id, message.sender);
            }
        }
        Command::Identity => {
            println!("{}", commands::identity()?);
        }
    }

    Ok(())
}
