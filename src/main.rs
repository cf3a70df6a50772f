// Entry point for the node binary: start a node, or talk to one as a client
use clap::Parser;
use data_encoding::HEXLOWER;
use gossip_ledger::{
    request_history, send_transactions, Command, LedgerNode, NodeConfig, Opt, ReconcileOutcome,
    Transaction, Wallet,
};
use log::{error, info, LevelFilter};
use std::io::{self, BufRead};
use std::process;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::StartNode {
            config,
            listen,
            client,
            peers,
            difficulty,
            no_mining,
        } => {
            // file and environment first, flags win
            let mut settings = NodeConfig::load(config.as_deref())?;
            if let Some(addr) = listen {
                settings.listen_addr = addr;
            }
            if let Some(addr) = client {
                settings.client_addr = addr;
            }
            if !peers.is_empty() {
                settings.peers = peers;
            }
            if let Some(difficulty) = difficulty {
                settings.difficulty = difficulty;
            }
            if no_mining {
                settings.mining = false;
            }
            settings.validate()?;

            let node = LedgerNode::start(&settings)?;
            control_loop(&node);
        }
        Command::Keygen => {
            let wallet = Wallet::new()?;
            println!("Public key: {}", wallet.get_address());
            println!("PKCS#8:     {}", HEXLOWER.encode(wallet.get_pkcs8()));
        }
        Command::Send {
            node,
            key,
            to,
            amount,
        } => {
            let pkcs8 = HEXLOWER
                .decode(key.as_bytes())
                .map_err(|e| format!("Invalid key: {e}"))?;
            let wallet = Wallet::from_pkcs8(&pkcs8)?;
            let mut tx = Transaction::new(&wallet.get_address(), &to, amount)?;
            tx.sign(&wallet)?;
            send_transactions(&node, &[tx.clone()])?;
            println!("Submitted {}", tx.get_id());
        }
        Command::History { node, public_key } => match request_history(&node, &public_key)? {
            Some(history) => {
                for tx in history {
                    println!(
                        "{} {} -> {} : {} ({})",
                        tx.get_id(),
                        tx.get_sender(),
                        tx.get_receiver(),
                        tx.get_amount(),
                        if tx.is_confirmed() { "confirmed" } else { "pending" }
                    );
                }
            }
            None => println!("Node is frozen, try again later"),
        },
    }
    Ok(())
}

// Each line on stdin flips the node between frozen and awake
fn control_loop(node: &LedgerNode) {
    let hub = node.get_hub();
    info!("Press enter to freeze or wake the node");
    for line in io::stdin().lock().lines() {
        if line.is_err() {
            break;
        }
        if hub.is_frozen() {
            match hub.wakeup() {
                ReconcileOutcome::NoProposals => info!("Awake; no peer offered a chain"),
                ReconcileOutcome::Unchanged => info!("Awake; local chain kept"),
                ReconcileOutcome::Adopted { blocks, requeued } => info!(
                    "Awake; adopted a chain of {blocks} blocks, {requeued} transactions requeued"
                ),
            }
        } else {
            hub.freeze();
        }
    }
    // stdin closed: keep serving until the process is killed
    loop {
        std::thread::park();
    }
}
