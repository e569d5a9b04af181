use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
mod auth;
mod clipboard;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use trezorpass::oracle::{
    CommandOracle, DeviceFeatures, Oracle, OracleError, OracleReply, OracleRequest, SoftwareOracle,
};
use trezorpass::{
    Config, DeviceSession, Entry, PasswordManager, SessionState, Vault, VaultError,
    default_vault_dir, entry, locate_vault,
};

#[derive(Debug, Parser)]
#[command(name = "trezorpass")]
#[command(
    version,
    about = "Read-only access to TREZOR Password Manager vaults from the terminal."
)]
struct Cli {
    /// Directory holding the synced vault files
    #[arg(long, global = true, value_name = "DIR", env = "TREZORPASS_VAULT_DIR")]
    vault_dir: Option<PathBuf>,

    /// Seconds to wait for each device answer, 0 waits forever
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        env = "TREZORPASS_TIMEOUT",
        default_value_t = 120
    )]
    timeout: u64,

    /// Helper program bridging to the device
    #[arg(long, global = true, value_name = "PROG", env = "TREZORPASS_ORACLE_CMD")]
    oracle_cmd: Option<PathBuf>,

    /// Argument passed to the helper program (repeatable)
    #[arg(
        long = "oracle-arg",
        global = true,
        value_name = "ARG",
        allow_hyphen_values = true
    )]
    oracle_args: Vec<String>,

    /// Use the software device with this hex seed instead of a real one
    #[arg(
        long,
        global = true,
        hide = true,
        value_name = "HEX",
        env = "TREZORPASS_EMULATOR_SEED",
        conflicts_with = "oracle_cmd"
    )]
    emulator_seed: Option<String>,

    /// Log filter, e.g. `info` or `trezorpass=debug`
    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        env = "TREZORPASS_LOG",
        default_value = "warn"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Prints the vault file name derived from the device
    Filename,

    /// Lists the entries of the vault
    List {
        /// Only entries carrying this tag
        #[arg(long, value_name = "NAME")]
        tag: Option<String>,
    },

    /// Decrypts one entry
    #[command(arg_required_else_help = true)]
    Show {
        id: String,

        /// Copy the password to the clipboard instead of printing it
        #[arg(short, long, default_value_t = false)]
        copy: bool,

        /// Seconds before the copied password is cleared
        #[arg(long, value_name = "SECS", default_value_t = 20)]
        clear_after: u64,
    },
}

/// The device backends selectable from the command line.
enum DeviceOracle {
    Command(CommandOracle),
    Emulator(SoftwareOracle),
}

impl Oracle for DeviceOracle {
    async fn connect(&mut self) -> Result<DeviceFeatures, OracleError> {
        match self {
            DeviceOracle::Command(oracle) => oracle.connect().await,
            DeviceOracle::Emulator(oracle) => oracle.connect().await,
        }
    }

    async fn send(&mut self, request: OracleRequest) -> Result<OracleReply, OracleError> {
        match self {
            DeviceOracle::Command(oracle) => oracle.send(request).await,
            DeviceOracle::Emulator(oracle) => oracle.send(request).await,
        }
    }

    fn release(&mut self) {
        match self {
            DeviceOracle::Command(oracle) => oracle.release(),
            DeviceOracle::Emulator(oracle) => oracle.release(),
        }
    }
}

fn resolve_oracle(cli: &Cli) -> Result<DeviceOracle> {
    if let Some(seed) = &cli.emulator_seed {
        let seed = hex::decode(seed).context("--emulator-seed must be hex")?;
        return Ok(DeviceOracle::Emulator(SoftwareOracle::new(&seed)));
    }

    match &cli.oracle_cmd {
        Some(program) => Ok(DeviceOracle::Command(
            CommandOracle::new(program).with_args(cli.oracle_args.iter().cloned()),
        )),
        None => Err(VaultError::OracleUnavailable(
            "no device configured, pass --oracle-cmd or set TREZORPASS_ORACLE_CMD".to_string(),
        )
        .into()),
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let vault_dir = match &cli.vault_dir {
        Some(dir) => dir.clone(),
        None => default_vault_dir()
            .context("cannot determine the home directory, pass --vault-dir")?,
    };
    Ok(Config::new(vault_dir).with_timeout_secs(cli.timeout))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version print to stdout and are not failures
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };
    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<VaultError>()
                .map_or(1, VaultError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let oracle = resolve_oracle(&cli)?;
    let mut session = DeviceSession::new(
        oracle,
        Box::new(auth::TerminalPrompter),
        config.oracle_timeout(),
    );
    debug!(vault_dir = %config.vault_dir().display(), "configuration resolved");

    match cli.command {
        Some(Commands::Filename) => {
            let storage = locate_vault(&mut session, &config).await?;
            session.close();
            println!("{}", storage.file_name().unwrap_or_default());
            println!("{}", storage.path().display());
            if !storage.exists() {
                eprintln!("note: the file does not exist yet");
            }
        }
        Some(Commands::List { tag }) => {
            let manager = PasswordManager::unlock(session, &config).await?;
            let vault = manager.vault();
            match tag.as_deref() {
                Some(title) => print_entries(vault, vault.entries_tagged(title).collect()),
                None => print_entries(vault, vault.entries().collect()),
            }
            manager.close();
        }
        Some(Commands::Show {
            id,
            copy,
            clear_after,
        }) => {
            let mut manager = PasswordManager::unlock(session, &config).await?;
            let secrets = manager.view_entry(&id).await?;
            let vault = manager.vault();
            let entry = vault
                .get(&id)
                .ok_or_else(|| VaultError::NotFound(id.clone()))?;

            print_entry(vault, entry, (!copy).then(|| secrets.password()));
            println!("Safe note: {}", secrets.safe_note());
            manager.close();

            if copy {
                clipboard::copy_for(secrets.password(), Duration::from_secs(clear_after))
                    .await?;
            }
        }
        None => interactive(session, &config).await?,
    }

    Ok(())
}

async fn interactive(session: DeviceSession<DeviceOracle>, config: &Config) -> Result<()> {
    let mut manager = PasswordManager::unlock(session, config).await?;
    print_entries(manager.vault(), manager.vault().entries().collect());

    while let Some(id) = auth::read_selection("Entry id (empty to quit): ")? {
        match manager.view_entry(&id).await {
            Ok(secrets) => {
                if let Some(entry) = manager.vault().get(&id) {
                    print_entry(manager.vault(), entry, Some(secrets.password()));
                }
                println!("Safe note: {}", secrets.safe_note());
                println!();
            }
            Err(err) if manager.session().state() == SessionState::Closed => {
                return Err(err.into());
            }
            Err(err) => eprintln!("error: {err}"),
        }
    }

    manager.close();
    Ok(())
}

fn print_entries(vault: &Vault, entries: Vec<&Entry>) {
    if entries.is_empty() {
        println!("No entries.");
        return;
    }

    let rows: Vec<[String; 4]> = entries
        .iter()
        .map(|e| {
            [
                e.id().to_string(),
                entry::display_label(e).to_string(),
                e.username().to_string(),
                vault.tag_titles(e).join(", "),
            ]
        })
        .collect();

    let header = ["Id", "Entry", "Username", "Tags"];
    let widths: Vec<usize> = (0..header.len())
        .map(|col| {
            rows.iter()
                .map(|row| row[col].chars().count())
                .chain(std::iter::once(header[col].len()))
                .max()
                .unwrap_or_default()
        })
        .collect();
    let (id_w, entry_w, user_w, tags_w) = (widths[0], widths[1], widths[2], widths[3]);

    println!(
        "{:<id_w$}  {:<entry_w$}  {:<user_w$}  {}",
        header[0], header[1], header[2], header[3]
    );
    println!(
        "{:-<id_w$}  {:-<entry_w$}  {:-<user_w$}  {:-<tags_w$}",
        "", "", "", ""
    );

    for [id, label, username, tags] in &rows {
        println!("{id:<id_w$}  {label:<entry_w$}  {username:<user_w$}  {tags}");
    }
}

fn print_entry(vault: &Vault, entry: &Entry, password: Option<&str>) {
    println!("Entry:     {}", entry::display_label(entry));
    println!("Username:  {}", entry.username());
    if let Some(password) = password {
        println!("Password:  {password}");
    }
    if let Some(note) = entry.note().filter(|note| !note.is_empty()) {
        println!("Note:      {note}");
    }
    let tags = vault.tag_titles(entry);
    if !tags.is_empty() {
        println!("Tags:      {}", tags.join(", "));
    }
}
