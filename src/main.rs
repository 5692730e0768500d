use clap::Parser;
use iap_bridge::application::coordinator::PurchaseCoordinator;
use iap_bridge::config::BillingConfig;
use iap_bridge::domain::event::CallbackId;
use iap_bridge::infrastructure::in_memory::{ChannelHost, InMemoryPlayStore};
use iap_bridge::interfaces::csv::command_reader::CommandReader;
use iap_bridge::interfaces::json::event_writer::EventWriter;
use iap_bridge::interfaces::session::Session;
use iap_bridge::telemetry;
use miette::{IntoDiagnostic, Result};
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host command script (CSV: command, arg, extra)
    script: PathBuf,

    /// JSON array of product detail payloads offered by the store
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Callback registration to use before the script sets one
    #[arg(long)]
    callback_id: Option<i64>,

    /// Leave successful purchases unconsumed
    #[arg(long)]
    no_auto_consume: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let mut config = BillingConfig::from_env();
    if let Some(id) = cli.callback_id {
        config.callback_id = Some(CallbackId(id));
    }
    if cli.no_auto_consume {
        config.auto_consume = false;
    }

    let store = InMemoryPlayStore::new();
    if let Some(path) = cli.catalog {
        let raw = fs::read_to_string(path).into_diagnostic()?;
        let loaded = store.load_catalog(&raw).into_diagnostic()?;
        tracing::info!(products = loaded, "catalog loaded");
    }

    let (host, mut delivered) = ChannelHost::new();
    let coordinator = PurchaseCoordinator::spawn(&config, store.adapter_factory(), Box::new(host));

    let stdout = io::stdout();
    let mut writer = EventWriter::new(stdout.lock());

    // Replay the script
    let file = File::open(cli.script).into_diagnostic()?;
    let reader = CommandReader::new(file);
    {
        let mut session = Session::new(&coordinator, &store, &mut writer);
        for command_result in reader.commands() {
            match command_result {
                Ok(command) => {
                    if let Err(e) = session.execute(command).await {
                        tracing::warn!("Error executing command: {e}");
                    }
                }
                Err(e) => {
                    tracing::warn!("Error reading command: {e}");
                }
            }
        }
    }

    // Flush every pending callback before writing them out
    coordinator.shutdown().await.into_diagnostic()?;

    let mut events = Vec::new();
    while let Some(event) = delivered.recv().await {
        events.push(event);
    }
    writer.write_events(events).into_diagnostic()?;

    Ok(())
}
