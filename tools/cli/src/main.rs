//! NanoVault CLI - Command line interface for the credential vault.
//!
//! This tool provides a command-line interface for setting up a vault,
//! storing and reading credentials, and running an interactive session
//! that locks itself when idle.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use nanovault_common::{EntryId, Error};
use nanovault_crypto::KdfParams;
use nanovault_keywrap::KeyWrapCapability;
use nanovault_storage::{LocalEntryStore, LocalPreferenceStore};
use nanovault_vault::{
    check_password_strength, config::CONFIG_FILENAME, generate_strong_password,
    ChangePasswordOptions, IdleMonitor, LifecycleState, NewEntry, SessionConfig, VaultSession,
};

#[derive(Parser)]
#[command(name = "nanovault")]
#[command(about = "NanoVault - Encrypted credential storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Vault directory (default: platform data dir).
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up the master password for a new vault.
    Init {
        /// KDF strength: "interactive", "moderate", or "sensitive".
        #[arg(short, long)]
        strength: Option<String>,
    },

    /// Add a credential.
    Add {
        /// Service name, e.g. a domain.
        #[arg(short, long)]
        service: String,

        /// Account username.
        #[arg(short, long)]
        username: String,

        /// Optional notes, stored encrypted.
        #[arg(short, long)]
        notes: Option<String>,

        /// Generate a strong password instead of prompting.
        #[arg(short, long)]
        generate: bool,
    },

    /// List credentials, newest first.
    List,

    /// Show one credential including its password.
    Show {
        /// Entry id.
        id: String,
    },

    /// Remove a credential.
    Remove {
        /// Entry id.
        id: String,
    },

    /// Change the master password and re-encrypt every entry.
    ChangePassword,

    /// Print a generated strong password.
    Generate {
        /// Password length.
        #[arg(short, long, default_value_t = 16)]
        length: usize,
    },

    /// Show vault information.
    Status,

    /// Start an interactive session that locks when idle.
    Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let vault_dir = match cli.vault {
        Some(dir) => dir,
        None => default_vault_dir(),
    };

    match cli.command {
        Commands::Init { strength } => cmd_init(&vault_dir, strength.as_deref()).await,

        Commands::Add {
            service,
            username,
            notes,
            generate,
        } => cmd_add(&vault_dir, service, username, notes, generate).await,

        Commands::List => cmd_list(&vault_dir).await,

        Commands::Show { id } => cmd_show(&vault_dir, &id).await,

        Commands::Remove { id } => cmd_remove(&vault_dir, &id).await,

        Commands::ChangePassword => cmd_change_password(&vault_dir).await,

        Commands::Generate { length } => cmd_generate(length),

        Commands::Status => cmd_status(&vault_dir).await,

        Commands::Shell => cmd_shell(&vault_dir).await,
    }
}

/// Password prompts before giving up.
const UNLOCK_ATTEMPTS: u32 = 3;

fn default_vault_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("nanovault"))
        .unwrap_or_else(|| PathBuf::from(".nanovault"))
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

/// Prompt twice and require both to match.
fn prompt_new_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm password: ")?;

    if *password != *confirm {
        anyhow::bail!("Passwords do not match");
    }
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let report = check_password_strength(&password);
    if !report.is_strong {
        println!("Warning: weak password.");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    }
    Ok(password)
}

/// Open a session over the local stores in `dir`. Biometric unlock is not
/// available from a terminal.
async fn open_session(dir: &Path) -> Result<VaultSession> {
    let config = SessionConfig::load_or_default(dir).context("Failed to load config")?;
    let entries = LocalEntryStore::new(dir).context("Failed to open entry store")?;
    let prefs = LocalPreferenceStore::new(dir).context("Failed to open preference store")?;

    VaultSession::new(
        config,
        Arc::new(entries),
        Arc::new(prefs),
        KeyWrapCapability::Unavailable,
    )
    .await
    .context("Failed to open vault")
}

/// Open and unlock with a prompted master password.
async fn unlock(dir: &Path) -> Result<VaultSession> {
    let session = open_session(dir).await?;
    if session.state().await == LifecycleState::NoMasterSecret {
        anyhow::bail!("No vault at {}. Run `nanovault init` first.", dir.display());
    }

    let mut attempt = 1;
    loop {
        let password = prompt_password("Master password: ")?;
        match session.unlock_with_password(&password).await {
            Ok(()) => return Ok(session),
            Err(e) if e.is_retryable() && attempt < UNLOCK_ATTEMPTS => {
                println!("{}. Try again.", e);
                attempt += 1;
            }
            Err(e) => return Err(e).context("Failed to unlock vault"),
        }
    }
}

fn parse_id(id: &str) -> Result<EntryId> {
    id.parse().context("Invalid entry id")
}

/// Set up a new vault.
async fn cmd_init(dir: &Path, strength: Option<&str>) -> Result<()> {
    info!("Initializing vault at: {}", dir.display());

    if open_session(dir).await?.is_master_password_set().await? {
        anyhow::bail!("Vault already initialized at {}", dir.display());
    }

    if let Some(preset) = strength {
        let config = SessionConfig {
            kdf: KdfParams::from_preset(preset)?,
            ..SessionConfig::load_or_default(dir)?
        };
        std::fs::write(dir.join(CONFIG_FILENAME), config.to_json()?)
            .context("Failed to write config")?;
    }

    let session = open_session(dir).await?;

    let password = prompt_new_password("New master password: ")?;
    session
        .setup_master_password(&password)
        .await
        .context("Failed to set up master password")?;

    println!("Vault created successfully!");
    println!("  Location: {}", dir.display());

    Ok(())
}

/// Add a credential.
async fn cmd_add(
    dir: &Path,
    service: String,
    username: String,
    notes: Option<String>,
    generate: bool,
) -> Result<()> {
    let session = unlock(dir).await?;

    let password = if generate {
        Zeroizing::new(generate_strong_password(16))
    } else {
        prompt_password("Entry password: ")?
    };

    let id = session
        .add_entry(NewEntry {
            service_name: service,
            username,
            password: password.to_string(),
            notes,
        })
        .await
        .context("Failed to add entry")?;

    println!("Entry added: {}", id);
    if generate {
        println!("  Password: {}", password.as_str());
    }

    Ok(())
}

/// List credentials.
async fn cmd_list(dir: &Path) -> Result<()> {
    let session = unlock(dir).await?;
    print_listing(&session).await
}

async fn print_listing(session: &VaultSession) -> Result<()> {
    let listing = session.list_entries().await.context("Failed to list entries")?;

    if listing.entries.is_empty() {
        println!("Vault is empty.");
    } else {
        for entry in &listing.entries {
            println!(
                "  {}  {}  {}  ({})",
                entry.id,
                entry.service_name,
                entry.username,
                entry.timestamp.format("%Y-%m-%d %H:%M")
            );
        }
    }

    if !listing.unreadable.is_empty() {
        println!("{} entries could not be decrypted.", listing.unreadable.len());
    }

    Ok(())
}

/// Show one credential.
async fn cmd_show(dir: &Path, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let session = unlock(dir).await?;
    print_entry(&session, &id).await
}

async fn print_entry(session: &VaultSession, id: &EntryId) -> Result<()> {
    let entry = session.get_entry(id).await.context("Failed to read entry")?;

    println!("Service:  {}", entry.service_name);
    println!("Username: {}", entry.username);
    println!("Password: {}", entry.password);
    if let Some(notes) = &entry.notes {
        println!("Notes:    {}", notes);
    }
    println!("Updated:  {}", entry.timestamp.to_rfc3339());

    Ok(())
}

/// Remove a credential.
async fn cmd_remove(dir: &Path, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let session = unlock(dir).await?;

    session
        .delete_entry(&id)
        .await
        .context("Failed to remove entry")?;

    println!("Entry removed: {}", id);

    Ok(())
}

/// Change the master password.
async fn cmd_change_password(dir: &Path) -> Result<()> {
    let session = open_session(dir).await?;

    let old = prompt_password("Current master password: ")?;
    session
        .unlock_with_password(&old)
        .await
        .context("Failed to unlock vault")?;

    let new = prompt_new_password("New master password: ")?;

    println!("Re-encrypting entries...");
    let outcome = session
        .change_master_password(&old, &new, ChangePasswordOptions::default())
        .await
        .context("Failed to change password")?;

    println!("Password changed successfully!");
    println!("  Entries re-encrypted: {}", outcome.reencrypted);
    if !outcome.skipped.is_empty() {
        println!("  Skipped (unreadable): {}", outcome.skipped.len());
        for id in &outcome.skipped {
            println!("    {}", id);
        }
    }

    Ok(())
}

fn cmd_generate(length: usize) -> Result<()> {
    let password = Zeroizing::new(generate_strong_password(length));
    println!("{}", password.as_str());
    Ok(())
}

/// Show vault information.
async fn cmd_status(dir: &Path) -> Result<()> {
    let session = open_session(dir).await?;
    let config = session.config();

    println!("Vault: {}", dir.display());
    println!(
        "  Initialized: {}",
        if session.is_master_password_set().await? { "yes" } else { "no" }
    );
    println!(
        "  Biometric unlock: {}",
        if session.is_biometric_enabled().await? { "enabled" } else { "unavailable" }
    );
    println!("  Idle timeout: {}s", config.idle_timeout_secs);
    println!(
        "  KDF: Argon2id, {} KiB, {} iterations, {} lanes",
        config.kdf.memory_cost, config.kdf.time_cost, config.kdf.parallelism
    );
    println!("  Re-encryption policy: {:?}", config.reencrypt_policy);

    Ok(())
}

type ShellLines = Lines<BufReader<Stdin>>;

const SHELL_HELP: &str = "\
Commands:
  list               List entries
  show <id>          Show an entry
  add                Add an entry
  remove <id>        Remove an entry
  generate [length]  Generate a password
  lock               Lock the vault
  unlock             Unlock the vault
  status             Show lock state
  help               Show this help
  quit               Exit";

/// Interactive session with idle auto-lock.
async fn cmd_shell(dir: &Path) -> Result<()> {
    let session = Arc::new(unlock(dir).await?);
    let monitor = IdleMonitor::spawn(&session);

    println!(
        "Vault unlocked. Locks after {}s idle. Type `help` for commands.",
        session.config().idle_timeout_secs
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("nanovault> ");
        std::io::Write::flush(&mut std::io::stdout())?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let arg = parts.next();

        if session.state().await == LifecycleState::Locked
            && !matches!(command, "unlock" | "status" | "help" | "quit" | "exit" | "generate")
        {
            println!("Vault is locked. Type `unlock`.");
            continue;
        }
        session.touch().await;

        let result = match (command, arg) {
            ("list", _) => print_listing(&session).await,
            ("show", Some(id)) => match parse_id(id) {
                Ok(id) => print_entry(&session, &id).await,
                Err(e) => Err(e),
            },
            ("add", _) => shell_add(&session, &mut lines).await,
            ("remove", Some(id)) => match parse_id(id) {
                Ok(id) => session
                    .delete_entry(&id)
                    .await
                    .map(|_| println!("Entry removed."))
                    .context("Failed to remove entry"),
                Err(e) => Err(e),
            },
            ("generate", length) => {
                let length = length.and_then(|l| l.parse().ok()).unwrap_or(16);
                cmd_generate(length)
            }
            ("lock", _) => {
                session.lock().await;
                println!("Vault locked.");
                Ok(())
            }
            ("unlock", _) => shell_unlock(&session).await,
            ("status", _) => {
                println!("State: {:?}", session.state().await);
                Ok(())
            }
            ("help", _) => {
                println!("{}", SHELL_HELP);
                Ok(())
            }
            ("quit", _) | ("exit", _) => break,
            _ => {
                println!("Unknown command. Type `help`.");
                Ok(())
            }
        };

        if let Err(e) = result {
            match e.downcast_ref::<Error>() {
                Some(Error::Locked) => println!("Vault is locked. Type `unlock`."),
                _ => println!("Error: {:#}", e),
            }
        }
    }

    monitor.stop().await;
    session.lock().await;
    Ok(())
}

async fn shell_unlock(session: &VaultSession) -> Result<()> {
    if session.state().await == LifecycleState::Unlocked {
        println!("Vault is already unlocked.");
        return Ok(());
    }
    let password = prompt_password("Master password: ")?;
    session
        .unlock_with_password(&password)
        .await
        .context("Failed to unlock vault")?;
    println!("Vault unlocked.");
    Ok(())
}

async fn shell_add(session: &VaultSession, lines: &mut ShellLines) -> Result<()> {
    let service = prompt_line(lines, "Service: ").await?;
    let username = prompt_line(lines, "Username: ").await?;
    let password = prompt_password("Password (empty to generate): ")?;
    let notes = prompt_line(lines, "Notes (optional): ").await?;

    let generated = password.is_empty();
    let password = if generated {
        Zeroizing::new(generate_strong_password(16))
    } else {
        password
    };

    let id = session
        .add_entry(NewEntry {
            service_name: service,
            username,
            password: password.to_string(),
            notes: if notes.is_empty() { None } else { Some(notes) },
        })
        .await
        .context("Failed to add entry")?;

    println!("Entry added: {}", id);
    if generated {
        println!("  Password: {}", password.as_str());
    }
    Ok(())
}

/// Read one line from the shell input.
async fn prompt_line(lines: &mut ShellLines, prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::Write::flush(&mut std::io::stdout())?;

    let line = lines
        .next_line()
        .await
        .context("Failed to read input")?
        .unwrap_or_default();
    Ok(line.trim().to_string())
}
