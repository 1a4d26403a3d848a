mod alarm;
mod api;
mod controller;
mod service;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use crate::alarm::engine::AlarmEngine;
use crate::alarm::list::AlarmRow;
use crate::alarm::model::AppIdentity;
use crate::api::{ApiServer, ApiServerConfig, REFRESH_ROUTE};
use crate::controller::AlarmController;
use crate::service::scheduler::{AlarmScheduler, FileScheduler, MemoryScheduler};
use crate::service::settings::{FileSettings, MemorySettings, SettingsStore};
use crate::service::sound::{CommandPlayer, SoundPreview};
use crate::ui::app::GuiOptions;

#[derive(Parser, Debug)]
#[command(
    name = "pocketalarm",
    version,
    about = "Alarm clock with enable/disable support on top of a persistent alarm queue"
)]
struct Cli {
    /// Alarm queue file shared with other processes.
    #[arg(long, default_value = "alarm-queue.json")]
    queue: PathBuf,

    /// Settings file holding the original times of disabled alarms.
    #[arg(long, default_value = "alarm-settings.json")]
    settings: PathBuf,

    /// Keep alarms in memory only; nothing is read from or written to disk.
    #[arg(long)]
    ephemeral: bool,

    /// Print the current alarms and exit without opening a window.
    #[arg(long)]
    list: bool,

    #[arg(long, default_value = "127.0.0.1")]
    api_bind: String,

    #[arg(long, default_value_t = 8098)]
    api_port: u16,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    api_enabled: bool,

    /// Program used to preview alarm sounds; it receives the sound file path.
    #[arg(long, default_value = "paplay")]
    sound_command: String,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "pocketalarm=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let identity = AppIdentity::default();
    if cli.ephemeral {
        let engine = AlarmEngine::new(MemoryScheduler::new(), MemorySettings::new(), identity);
        run_with(cli, engine)
    } else {
        let engine = AlarmEngine::new(
            FileScheduler::new(&cli.queue),
            FileSettings::new(&cli.settings),
            identity,
        );
        run_with(cli, engine)
    }
}

fn run_with<S, K>(cli: Cli, engine: AlarmEngine<S, K>) -> Result<()>
where
    S: AlarmScheduler + 'static,
    K: SettingsStore + 'static,
{
    let mut controller = AlarmController::new(engine);
    if cli.list {
        controller
            .refresh()
            .with_context(|| format!("failed to load alarms from {}", cli.queue.display()))?;
        print_rows(controller.rows());
        return Ok(());
    }

    let identity = controller.engine().identity().clone();
    let api_server = if cli.api_enabled {
        let server = ApiServer::start(ApiServerConfig {
            bind_addr: cli.api_bind.clone(),
            port: cli.api_port,
            delivery_route: identity.delivery_route(),
        })
        .with_context(|| {
            format!(
                "failed to start local API at {}:{}",
                cli.api_bind, cli.api_port
            )
        })?;
        Some(server)
    } else {
        None
    };
    let api_state = api_server.as_ref().map(|server| Arc::clone(&server.state));
    let api_label = api_server.as_ref().map(|server| {
        let addr = server
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", cli.api_bind, cli.api_port));
        format!("Refresh signal: POST http://{addr}{REFRESH_ROUTE}")
    });

    let preview = SoundPreview::new(CommandPlayer::new(cli.sound_command));
    let ui_result = ui::app::run_gui(
        controller,
        preview,
        GuiOptions {
            title: identity.title,
            api_state,
            api_label,
        },
    );

    drop(api_server);
    ui_result
}

fn print_rows(rows: &[AlarmRow]) {
    if rows.is_empty() {
        println!("No alarms scheduled.");
        return;
    }
    for row in rows {
        let enabled = if row.is_enabled() { "x" } else { " " };
        println!(
            "{:>6}  {} [{enabled}] {}  {:<6}  {}",
            row.cookie.get(),
            row.snooze_marker(),
            row.time_text(),
            row.repeat_text(),
            row.record.message
        );
    }
}
