mod store;

use anyhow::{Context, Result};
use shade_config::ShadeConfig;
use shade_note::{
    Address, CommitmentScheme, IssuedNote, Ledger, Pool, TreeSnapshot, WithdrawalReceipt,
    WithdrawalRequest,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::{env, fs, fs::OpenOptions};

use store::{LedgerStore, open_client};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let cmd = &args[1];

    let result = match cmd.as_str() {
        "deposit" => deposit(parse_deposit_args(&args[2..])).await,
        "withdraw" => {
            if args.len() < 4 {
                println!("Usage: withdraw <note> <recipient> [--relayer <addr>] [--fee <n>] [--refund <n>]");
                return;
            }
            match parse_withdraw_args(&args[2..]) {
                Ok(parsed) => withdraw(parsed).await,
                Err(e) => Err(e),
            }
        }
        "inspect" => {
            if args.len() < 3 {
                println!("Usage: inspect <note>");
                return;
            }
            inspect(&args[2]).await
        }
        "root" => root().await,
        "init-config" => init_config(args.get(2).map(PathBuf::from)),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        _ => {
            println!("❌ Unknown command: {}", cmd);
            println!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Shade CLI - Fixed-Denomination Shielded Pool");
    println!();
    println!("USAGE:");
    println!("  shade <command> [args]");
    println!();
    println!("NOTE COMMANDS:");
    println!("  deposit [--out <file>]             Create a note and deposit its commitment");
    println!("  withdraw <note> <recipient> [opts] Withdraw a note to an address");
    println!("  inspect <note>                     Show a note's pool, commitment and status");
    println!();
    println!("POOL COMMANDS:");
    println!("  root                               Show the current root and deposit count");
    println!("  init-config [path]                 Write a sample config (default: ./shade.toml)");
    println!();
    println!("OTHER COMMANDS:");
    println!("  help                               Show this help message");
    println!();
    println!("WITHDRAW OPTIONS:");
    println!("  --relayer <address>                Relayer receiving the fee (default: none)");
    println!("  --fee <amount>                     Fee paid to the relayer (default: 0)");
    println!("  --refund <amount>                  Refund forwarded to the recipient (default: 0)");
    println!();
    println!("EXAMPLES:");
    println!("  shade deposit --out note.txt");
    println!("  shade withdraw \"$(cat note.txt)\" 0x94462e71a887756704f0fb1c0905264d487972fe");
    println!("  shade inspect shade-eth-0.1-1-0x...");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("  SHADE_CONFIG         Path to config file");
    println!("  SHADE_LEDGER_PATH    Ledger state file");
    println!("  SHADE_TREE_HEIGHT    Commitment tree height");
    println!("  RUST_LOG             Log level (debug/info/warn/error)");
}

#[derive(Debug, Default, PartialEq, Eq)]
struct DepositArgs {
    out: Option<PathBuf>,
}

fn parse_deposit_args(args: &[String]) -> DepositArgs {
    let mut parsed = DepositArgs::default();

    let mut i = 0;
    while i < args.len() {
        if args[i] == "--out" {
            if let Some(path) = args.get(i + 1) {
                parsed.out = Some(PathBuf::from(path));
                i += 1;
            }
        }
        i += 1;
    }

    parsed
}

#[derive(Debug, PartialEq, Eq)]
struct WithdrawArgs {
    note: String,
    request: WithdrawalRequest,
}

fn parse_withdraw_args(args: &[String]) -> Result<WithdrawArgs> {
    let note = args.first().context("missing note")?.clone();
    let recipient = args.get(1).context("missing recipient")?;
    let mut request = WithdrawalRequest::direct(
        Address::from_hex(recipient).context("recipient must be a 0x-prefixed 20-byte address")?,
    );

    let mut i = 2;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--relayer", Some(v)) => {
                request.relayer =
                    Address::from_hex(v).context("relayer must be a 0x-prefixed 20-byte address")?;
                i += 1;
            }
            ("--fee", Some(v)) => {
                request.fee = v.parse().context("fee must be a non-negative integer")?;
                i += 1;
            }
            ("--refund", Some(v)) => {
                request.refund = v.parse().context("refund must be a non-negative integer")?;
                i += 1;
            }
            (flag, _) => anyhow::bail!("unexpected argument {flag}"),
        }
        i += 1;
    }

    Ok(WithdrawArgs { note, request })
}

fn ledger_store(config: &ShadeConfig) -> LedgerStore {
    LedgerStore::new(&config.ledger.state_path)
}

async fn deposit(args: DepositArgs) -> Result<()> {
    let config = ShadeConfig::load()?;
    let out = args.out.clone();
    let issued = run_deposit(&config, args).await?;

    let pool = Pool::new(
        config.pool.asset.clone(),
        config.pool.denomination.clone(),
        config.pool.network_id,
    );
    println!("✅ Deposited into {pool}");
    println!("   Leaf index:  {}", issued.leaf_index);
    println!("   Commitment:  {}", issued.deposit.commitment());

    match out {
        Some(path) => println!("🔐 Note written to {}", path.display()),
        None => {
            println!();
            println!("🔐 Keep this note secret. Anyone holding it can withdraw:");
            println!("{}", issued.token);
        }
    }
    Ok(())
}

/// Store the note before its commitment reaches the ledger
///
/// The note file is created exclusively first. If the deposit then fails the
/// file is removed again, so a note on disk always matches a funded leaf.
async fn run_deposit(config: &ShadeConfig, args: DepositArgs) -> Result<IssuedNote> {
    if let Some(path) = &args.out {
        if path.exists() {
            anyhow::bail!(
                "File {} already exists. Remove it first or use a different path.",
                path.display()
            );
        }
    }

    let store = ledger_store(config);
    let client = open_client(config, &store)?;
    let pending = client.create_note(&mut rand::thread_rng())?;

    if let Some(path) = &args.out {
        write_note(path, &pending.token)?;
    }

    match client.submit_deposit(pending).await {
        Ok(issued) => Ok(issued),
        Err(e) => {
            if let Some(path) = &args.out {
                if let Err(rm) = fs::remove_file(path) {
                    log::warn!("Failed to remove unused note {}: {rm}", path.display());
                }
            }
            Err(e).context("Deposit was not recorded")
        }
    }
}

/// Write a note token readable only by the owner
fn write_note(path: &Path, token: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    #[cfg(unix)]
    {
        // chmod 600 (rw-------)
        let mut perms = f.metadata()?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    f.write_all(token.as_bytes())?;
    f.write_all(b"\n")?;
    Ok(())
}

async fn withdraw(args: WithdrawArgs) -> Result<()> {
    let config = ShadeConfig::load()?;

    println!("⏳ Building witness and proof...");
    let receipt = run_withdraw(&config, args).await?;

    println!("✅ Withdrawal settled");
    println!("   Recipient:      {}", receipt.recipient);
    if !receipt.relayer.is_zero() {
        println!("   Relayer:        {}", receipt.relayer);
        println!("   Fee:            {}", receipt.fee);
    }
    println!("   Nullifier hash: {}", receipt.nullifier_hash);
    Ok(())
}

/// Settle a withdrawal; the receipt is only returned once the spent
/// nullifier hash is on disk
async fn run_withdraw(config: &ShadeConfig, args: WithdrawArgs) -> Result<WithdrawalReceipt> {
    let store = ledger_store(config);
    let client = open_client(config, &store)?;
    Ok(client.withdraw(args.note.trim(), &args.request).await?)
}

async fn inspect(token: &str) -> Result<()> {
    let config = ShadeConfig::load()?;
    let store = ledger_store(&config);
    let client = open_client(&config, &store)?;

    let parsed = client.codec().parse(token.trim())?;
    let deposit = parsed.deposit(&CommitmentScheme::new());

    println!("Pool:            {}", parsed.pool);
    println!("Commitment:      {}", deposit.commitment());
    println!("Nullifier hash:  {}", deposit.nullifier_hash());

    if parsed.pool != client.context().pool {
        println!("Status:          belongs to another pool");
        return Ok(());
    }

    let events = client.ledger().deposit_events().await?;
    let tree = TreeSnapshot::build(
        config.tree.height,
        events.into_iter().map(|e| (e.leaf_index, e.commitment)),
    )?;
    let spent = client.ledger().is_spent(&deposit.nullifier_hash()).await?;
    let status = match tree.locate(&deposit.commitment()) {
        Ok(index) if spent => format!("spent (leaf {index})"),
        Ok(index) => format!("unspent (leaf {index})"),
        Err(_) => "not deposited".to_string(),
    };
    println!("Status:          {}", status);
    Ok(())
}

async fn root() -> Result<()> {
    let config = ShadeConfig::load()?;
    let store = ledger_store(&config);
    let client = open_client(&config, &store)?;

    let events = client.ledger().deposit_events().await?;
    println!("Pool:      {}", client.context().pool);
    println!("Ledger:    {}", store.path().display());
    println!("Deposits:  {}", events.len());
    println!("Root:      {}", client.ledger().current_root().await);
    Ok(())
}

fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from("shade.toml"));
    if path.exists() {
        anyhow::bail!(
            "File {} already exists. Remove it first or use a different path.",
            path.display()
        );
    }
    fs::write(&path, ShadeConfig::generate_sample())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("✅ Wrote sample config to {}", path.display());
    Ok(())
}
