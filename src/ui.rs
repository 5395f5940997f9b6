// UI layer: the interactive config wizard built on `dialoguer`, and the
// `indicatif` renderers that turn transfer signals into a progress bar.
// Nothing in here calls back into the client.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use crossterm::style::Stylize;
use dialoguer::{Input, Password, Select};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

use crate::config::{self, Config};
use crate::items::DriveItem;
use crate::signal::TransferSignal;

/// How often the renderer checks for new progress.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} [{bar:20}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
        .map(|s| s.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// A spinner for short blocking steps such as token renewal. Hidden when
/// `quiet` is set.
pub fn spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Spawn the observer for one transfer. It shows a spinner until the size
/// is known, then a byte bar, and exits on `Finish` or when the sender is
/// dropped.
pub fn spawn_transfer_renderer(rx: Receiver<TransferSignal>, label: &str) -> JoinHandle<()> {
    let label = label.to_string();
    thread::spawn(move || render_transfer(rx, &label))
}

fn render_transfer(rx: Receiver<TransferSignal>, label: &str) {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(label.to_string());

    let mut started = false;
    // A signal pulled off the queue while coalescing progress, handled next.
    let mut pending: Option<TransferSignal> = None;
    loop {
        let next = match pending.take() {
            Some(signal) => Ok(signal),
            None => rx.recv_timeout(POLL_INTERVAL),
        };
        match next {
            Ok(TransferSignal::Start(None)) => {
                pb.enable_steady_tick(Duration::from_millis(80));
            }
            Ok(TransferSignal::Start(Some(info))) => {
                pb.disable_steady_tick();
                pb.set_style(bar_style());
                pb.set_length(info.size);
                pb.set_message(format!("{} {}", label, info.name));
                started = true;
            }
            Ok(TransferSignal::Progress(bytes)) => {
                let (latest, rest) = coalesce(bytes, &rx);
                pending = rest;
                pb.set_position(latest);
            }
            Ok(TransferSignal::Finish) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    if started {
        pb.finish();
    } else {
        pb.finish_and_clear();
    }
}

/// Drain queued progress after `first`, returning the latest total and the
/// first non-progress signal met on the way, if any.
fn coalesce(first: u64, rx: &Receiver<TransferSignal>) -> (u64, Option<TransferSignal>) {
    let mut latest = first;
    while let Ok(signal) = rx.try_recv() {
        match signal {
            TransferSignal::Progress(n) => latest = n,
            other => return (latest, Some(other)),
        }
    }
    (latest, None)
}

/// Print a folder listing, one item per line.
pub fn print_items(items: &[DriveItem]) {
    for item in items {
        let modified = item
            .file_system_info
            .as_ref()
            .and_then(|f| f.last_modified_date_time)
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        if item.is_folder() {
            println!("{:<5} {:>10} {:<16} {}", "dir", "", modified, format!("{}/", item.name).blue());
        } else {
            println!("{:<5} {:>10} {:<16} {}", "file", HumanBytes(item.size).to_string(), modified, item.name);
        }
    }
}

/// Print the metadata of a single item.
pub fn print_item(item: &DriveItem) {
    println!("{:<14} {}", "Name:".bold(), item.name);
    println!("{:<14} {}", "Size:".bold(), HumanBytes(item.size));
    if let Some(folder) = &item.folder {
        println!("{:<14} folder ({} children)", "Type:".bold(), folder.child_count);
    }
    if let Some(file) = &item.file {
        println!("{:<14} file", "Type:".bold());
        println!("{:<14} {}", "MIME type:".bold(), file.mime_type);
        if let Some(h) = &file.hashes.sha1_hash {
            println!("{:<14} {}", "SHA1:".bold(), h);
        }
        if let Some(h) = &file.hashes.sha256_hash {
            println!("{:<14} {}", "SHA256:".bold(), h);
        }
        if let Some(h) = &file.hashes.quick_xor_hash {
            println!("{:<14} {}", "QuickXOR:".bold(), h);
        }
    }
    if let Some(fs) = &item.file_system_info {
        if let Some(t) = fs.created_date_time {
            println!("{:<14} {}", "Created:".bold(), t.with_timezone(&Local));
        }
        if let Some(t) = fs.last_modified_date_time {
            println!("{:<14} {}", "Modified:".bold(), t.with_timezone(&Local));
        }
    }
}

/// Print the consent URL the user has to open.
pub fn print_login_prompt(url: &str) {
    println!("------------------------------------");
    println!("Open a browser and go to:");
    println!("{}", url.underlined());
    println!("------------------------------------");
    println!("Waiting for code...");
}

/// Interactive config creation. Prompts for every field, then writes the
/// config to the path the user confirms (defaulting to `target`).
pub fn run_config_wizard(target: &Path) -> Result<PathBuf> {
    let mut config = Config::default();

    config.client_id = Input::new()
        .with_prompt("Client ID")
        .validate_with(|s: &String| if s.trim().is_empty() { Err("required") } else { Ok(()) })
        .interact_text()?;
    config.client_secret = Password::new().with_prompt("Client secret").interact()?;

    let scope_choices = [
        "Default (Files.Read, Files.ReadWrite, Files.Read.All, Files.ReadWrite.All, offline_access)",
        "App folder (Files.ReadWrite.AppFolder, offline_access)",
        "Custom",
    ];
    config.scopes = match Select::new()
        .with_prompt("Scopes")
        .items(&scope_choices)
        .default(0)
        .interact()?
    {
        0 => config::default_scopes(),
        1 => config::app_folder_scopes(),
        _ => {
            let raw: String = Input::new()
                .with_prompt("Scopes (comma or space separated)")
                .interact_text()?;
            split_scopes(&raw)
        }
    };

    let root_choices = ["Default (/drive/root)", "App root (/drive/special/approot)", "Custom"];
    let root = match Select::new()
        .with_prompt("Drive root")
        .items(&root_choices)
        .default(0)
        .interact()?
    {
        0 => config::DEFAULT_ROOT.to_string(),
        1 => config::APP_ROOT.to_string(),
        _ => Input::<String>::new().with_prompt("Custom drive root").interact_text()?,
    };
    config.root = config::normalize_root(&root);

    config.redirect_url = Input::new()
        .with_prompt("Redirect URL")
        .default(config::DEFAULT_REDIRECT_URL.to_string())
        .interact_text()?;

    config.upload_chunk_size = Input::new()
        .with_prompt("Upload chunk size in KiB (multiple of 320)")
        .default(config::DEFAULT_CHUNK_SIZE_KIB)
        .validate_with(|kib: &u64| {
            config::validate_chunk_size(*kib)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()?;

    let save: String = Input::new()
        .with_prompt("Save config to")
        .default(target.display().to_string())
        .interact_text()?;
    let path = PathBuf::from(save);
    config
        .save_to(&path)
        .with_context(|| format!("Could not write config to {}", path.display()))?;
    Ok(path)
}

/// Split a user-entered scope list on commas and whitespace.
pub fn split_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
