use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "gossip-ledger")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a ledger node")]
    StartNode {
        #[arg(long, help = "TOML file with node settings")]
        config: Option<PathBuf>,
        #[arg(long, help = "Address to accept peers on")]
        listen: Option<String>,
        #[arg(long, help = "Address to accept clients on")]
        client: Option<String>,
        #[arg(long = "peer", help = "Peer to connect to (repeatable)")]
        peers: Vec<String>,
        #[arg(long, help = "Leading zeros required in a block hash")]
        difficulty: Option<u32>,
        #[arg(long = "no-mining", help = "Relay and validate only")]
        no_mining: bool,
    },
    #[command(name = "keygen", about = "Generate a key pair and print it")]
    Keygen,
    #[command(name = "send", about = "Sign a transfer with a PKCS#8 key and submit it")]
    Send {
        #[arg(help = "Client address of the node")]
        node: String,
        #[arg(help = "Hex PKCS#8 key of the sender (as printed by keygen)")]
        key: String,
        #[arg(help = "Base58 public key of the receiver")]
        to: String,
        #[arg(help = "Amount to send")]
        amount: f64,
    },
    #[command(name = "history", about = "List every transaction touching a public key")]
    History {
        #[arg(help = "Client address of the node")]
        node: String,
        #[arg(help = "Base58 public key")]
        public_key: String,
    },
}
