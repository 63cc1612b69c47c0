//! pg2lite CLI - PostgreSQL to SQLite schema and data migration.

use clap::{Parser, Subcommand};
use pg2lite::{Config, HostKeyPolicy, MigrateError, Migrator};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Config file picked up from the home directory when `--config` is absent.
const HOME_CONFIG_FILE: &str = ".pgmigrate.yaml";

#[derive(Parser)]
#[command(name = "pg2lite")]
#[command(about = "Migrate a PostgreSQL schema and its data into a SQLite file")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file [default: ~/.pgmigrate.yaml if present]
    #[arg(short, long, env = "PGMIGRATE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// PostgreSQL connection string; overrides the individual fields
    #[arg(long, env = "PGMIGRATE_PG", hide_env_values = true, global = true)]
    pg: Option<String>,

    /// PostgreSQL host [default: localhost]
    #[arg(long, env = "PGMIGRATE_HOST", global = true)]
    host: Option<String>,

    /// PostgreSQL port [default: 5432]
    #[arg(long, env = "PGMIGRATE_PORT", global = true)]
    port: Option<u16>,

    /// PostgreSQL database name
    #[arg(long, env = "PGMIGRATE_DB", global = true)]
    db: Option<String>,

    /// PostgreSQL user
    #[arg(long, env = "PGMIGRATE_USER", global = true)]
    user: Option<String>,

    /// PostgreSQL password
    #[arg(long, env = "PGMIGRATE_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// TLS mode: disable, require, verify-full [default: require]
    #[arg(long, env = "PGMIGRATE_SSL_MODE", global = true)]
    ssl_mode: Option<String>,

    /// SSH private key; setting it enables the tunnel
    #[arg(long, env = "PGMIGRATE_SSHKEY", global = true)]
    sshkey: Option<String>,

    /// Passphrase for an encrypted SSH private key
    #[arg(long, env = "PGMIGRATE_SSHKEY_PASSPHRASE", hide_env_values = true, global = true)]
    sshkey_passphrase: Option<String>,

    /// SSH user on the bastion host
    #[arg(long, env = "PGMIGRATE_SSHUSER", global = true)]
    sshuser: Option<String>,

    /// SSH bastion host
    #[arg(long, env = "PGMIGRATE_SSHHOST", global = true)]
    sshhost: Option<String>,

    /// SSH port [default: 22]
    #[arg(long, env = "PGMIGRATE_SSHPORT", global = true)]
    sshport: Option<u16>,

    /// SSH host key policy: known_hosts, fingerprint:<SHA256>, insecure [default: known_hosts]
    #[arg(long, env = "PGMIGRATE_SSH_HOST_KEY", global = true)]
    ssh_host_key: Option<HostKeyPolicy>,

    /// Log format: text or json
    #[arg(long, env = "PGMIGRATE_LOG_FORMAT", default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, env = "PGMIGRATE_VERBOSITY", default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a SQLite database from the PostgreSQL schema
    Migrate {
        /// Output SQLite file; replaced if it exists [default: output.db]
        #[arg(long)]
        sqlite: Option<PathBuf>,

        /// Copy row data as well as the schema
        #[arg(long)]
        with_data: bool,

        /// Also create non-primary key indexes
        #[arg(long)]
        create_indexes: bool,

        /// Rows per insert transaction [default: 1000]
        #[arg(long)]
        batch_size: Option<usize>,

        /// Output JSON result to stdout
        #[arg(long)]
        output_json: bool,
    },

    /// Check the configuration and that the database is reachable
    Validate,

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    // Values from .env become environment variables before clap reads them
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("pg2lite {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = load_config(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);

    match cli.command {
        Commands::Version => unreachable!(), // Handled above
        Commands::Migrate {
            sqlite,
            with_data,
            create_indexes,
            batch_size,
            output_json,
        } => {
            if let Some(path) = sqlite {
                config.migration.output = path;
            }
            if with_data {
                config.migration.with_data = true;
            }
            if create_indexes {
                config.migration.create_indexes = true;
            }
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            config.validate()?;

            let mut migrator = Migrator::open(&config).await?;
            let result = migrator
                .migrate(&config.migration.output, config.migration.with_data)
                .await;
            migrator.close().await;
            let result = result?;

            if output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Output: {}", result.destination.display());
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Tables: {}", result.tables_total);
                if result.with_data {
                    println!("  Rows: {}", result.rows_transferred);
                    println!("  Throughput: {} rows/sec", result.rows_per_second);
                }
            }
        }

        Commands::Validate => {
            let migrator = Migrator::open(&config).await?;
            let checked = migrator.validate().await;
            migrator.close().await;
            checked?;
            println!("Configuration is valid and database is accessible");
        }
    }

    Ok(())
}

/// Load the explicit config file, else `~/.pgmigrate.yaml`, else defaults.
fn load_config(explicit: Option<&Path>) -> Result<Config, MigrateError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(MigrateError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = Config::load(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    match dirs::home_dir().map(|home| home.join(HOME_CONFIG_FILE)) {
        Some(path) if path.exists() => {
            let config = Config::load(&path)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        _ => Ok(Config::default()),
    }
}

/// Apply flags and environment variables over the file configuration.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(ref pg) = cli.pg {
        config.source.connection_string = Some(pg.clone());
    }
    if let Some(ref host) = cli.host {
        config.source.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.source.port = port;
    }
    if let Some(ref db) = cli.db {
        config.source.database = db.clone();
    }
    if let Some(ref user) = cli.user {
        config.source.user = user.clone();
    }
    if let Some(ref password) = cli.password {
        config.source.password = password.clone();
    }
    if let Some(ref ssl_mode) = cli.ssl_mode {
        config.source.ssl_mode = ssl_mode.clone();
    }

    if let Some(ref key) = cli.sshkey {
        config.ssh.key_path = Some(PathBuf::from(key));
    }
    if let Some(ref passphrase) = cli.sshkey_passphrase {
        config.ssh.key_passphrase = Some(passphrase.clone());
    }
    if let Some(ref user) = cli.sshuser {
        config.ssh.user = user.clone();
    }
    if let Some(ref host) = cli.sshhost {
        config.ssh.host = host.clone();
    }
    if let Some(port) = cli.sshport {
        config.ssh.port = port;
    }
    if let Some(ref policy) = cli.ssh_host_key {
        config.ssh.host_key = policy.clone();
    }

    // Keys from the file and from flags may both use ~/
    if let Some(key) = config.ssh.key_path.take() {
        config.ssh.key_path = Some(expand_tilde(&key.to_string_lossy()));
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json keeps stdout clean
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("Invalid log format '{}'. Valid values: text, json", other)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pg2lite").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_file() {
        let mut config = Config::from_yaml("source:\n  host: from-file\n  port: 6000\n").unwrap();
        let cli = parse(&["--host", "from-flag", "--db", "app", "validate"]);
        apply_overrides(&mut config, &cli);

        assert_eq!(config.source.host, "from-flag");
        assert_eq!(config.source.port, 6000);
        assert_eq!(config.source.database, "app");
    }

    #[test]
    fn test_ssh_flags() {
        let mut config = Config::default();
        let cli = parse(&[
            "validate",
            "--sshkey",
            "/keys/id_ed25519",
            "--sshuser",
            "deploy",
            "--ssh-host-key",
            "insecure",
        ]);
        apply_overrides(&mut config, &cli);

        assert_eq!(config.ssh.key_path, Some(PathBuf::from("/keys/id_ed25519")));
        assert_eq!(config.ssh.user, "deploy");
        assert_eq!(config.ssh.host_key, HostKeyPolicy::Insecure);
        assert!(config.ssh.enabled());
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/key"), PathBuf::from("/abs/key"));
        assert_eq!(expand_tilde("relative/key"), PathBuf::from("relative/key"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/.ssh/id_rsa"), home.join(".ssh/id_rsa"));
        }
    }
}
