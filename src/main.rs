// Entrypoint for the CLI application.
// - Parses arguments, sets up logging, loads the config and renews the
//   access token when the command needs one.
// - Transfers get a renderer thread fed by the client's signal channel.
// - Returns `anyhow::Result`; any error ends the process with status 1.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use driveup_cli::cli::{Cli, Command, Requirements};
use driveup_cli::config::{self, Config};
use driveup_cli::items::HashKind;
use driveup_cli::signal::Signals;
use driveup_cli::{ui, Client};

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let path = config::resolve_path(cli.config.as_deref()).context("Could not determine config path")?;
    debug!(command = cli.command.name(), config = %path.display(), "starting");

    let requirements = cli.command.requirements();
    let quiet = cli.quiet;
    let open = || open_client(&path, requirements, quiet);

    match cli.command {
        Command::Config => configure(&path, quiet)?,
        Command::Login => {
            let mut client = open()?;
            ui::print_login_prompt(&client.login_url()?);
            client.login().context("Login failed")?;
            if !quiet {
                println!("Login successful, tokens saved to {}", path.display());
            }
        }
        Command::Mkdir { path } => {
            let item = open()?.create_dir(&path)?;
            if !quiet {
                println!("Created folder {}", item.name);
            }
        }
        Command::Ls { path } => ui::print_items(&open()?.list(&path)?),
        Command::Rm { path } => {
            open()?.delete(&path)?;
            if !quiet {
                println!("Deleted {}", path);
            }
        }
        Command::Info { path } => ui::print_item(&open()?.info(&path)?),
        Command::Sha1 { path } => println!("{}", open()?.hash(&path, HashKind::Sha1)?),
        Command::Sha256 { path } => println!("{}", open()?.hash(&path, HashKind::Sha256)?),
        Command::Upload { local, path } => {
            with_renderer(&mut open()?, quiet, "Uploading", |c| c.upload(&local, &path))
                .with_context(|| format!("Upload of {} failed", local.display()))?;
        }
        Command::Download { source, local_dir } => {
            let written: PathBuf = with_renderer(&mut open()?, quiet, "Downloading", |c| c.download(&source, &local_dir))
                .with_context(|| format!("Download of {} failed", source))?;
            if !quiet {
                println!("Saved to {}", written.display());
            }
        }
    }
    Ok(())
}

/// Load the config and build a client, renewing the access token first when
/// the command needs one and it is about to expire.
fn open_client(path: &Path, requirements: Requirements, quiet: bool) -> Result<Client> {
    let config = Config::load(path).with_context(|| {
        format!(
            "Could not load config from {} (run `driveup config` to create one)",
            path.display()
        )
    })?;
    let mut client = Client::new(config)?;

    if requirements.token && client.should_renew_access_token() {
        let spinner = ui::spinner("Renewing access token...", quiet);
        let renewed = client.renew_access_token();
        spinner.finish_and_clear();
        renewed.context("Could not renew the access token (try `driveup login`)")?;
    }
    Ok(client)
}

fn configure(path: &Path, quiet: bool) -> Result<()> {
    let written = ui::run_config_wizard(path)?;
    if !quiet {
        println!("Config written to {}", written.display());
    }
    Ok(())
}

/// Run a transfer with a progress renderer attached unless `quiet` is set.
/// The renderer is joined before returning so the bar is finished before
/// any error is printed.
fn with_renderer<T>(
    client: &mut Client,
    quiet: bool,
    label: &str,
    transfer: impl FnOnce(&Client) -> driveup_cli::Result<T>,
) -> driveup_cli::Result<T> {
    if quiet {
        return transfer(client);
    }
    let (signals, rx) = Signals::channel();
    client.set_signals(signals);
    let renderer = ui::spawn_transfer_renderer(rx, label);

    let result = transfer(client);
    // Dropping the sender lets the renderer exit even if no Finish arrived.
    client.set_signals(Signals::disabled());
    if renderer.join().is_err() {
        debug!("progress renderer panicked");
    }
    result
}
