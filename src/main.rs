use clap::Parser;
use pitchpool::adapters::api_server::start_api_server;
use pitchpool::api::AppState;
use pitchpool::bootstrap::Services;
use pitchpool::cli::{Cli, Commands};
use pitchpool::config::AppConfig;
use pitchpool::coordination::{install_signal_handlers, GracefulShutdown, ShutdownPhase};
use pitchpool::error::{PitchError, Result};
use pitchpool::settlement::PayoutLedger;
use std::sync::Arc;
use tracing::{error, info, warn};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir)?;

    match cli.command {
        Commands::Serve { port } => {
            init_logging(&config.logging);
            run_serve(config, port).await?;
        }
        Commands::Run => {
            init_logging(&config.logging);
            run_single_pass(config).await?;
        }
        Commands::Status => {
            init_logging_simple();
            show_status(config).await?;
        }
        Commands::SyncFixtures => {
            init_logging(&config.logging);
            sync_fixtures(config).await?;
        }
        Commands::Migrate => {
            init_logging(&config.logging);
            run_migrations(config).await?;
        }
    }

    Ok(())
}

async fn run_serve(mut config: AppConfig, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.api.port = port;
    }

    let services = Services::build(config).await?;
    if let Some(store) = &services.pool_store {
        store.migrate().await?;
    }

    let scheduler = services.scheduler()?;
    let shutdown = Arc::new(GracefulShutdown::with_defaults());
    install_signal_handlers(shutdown.clone());

    let mut state = AppState::new(scheduler.clone(), services.authority_address())
        .with_admin_token(services.config.api.admin_token.clone());
    if let Some(store) = &services.pool_store {
        state = state.with_db(store.pool().clone());
    }

    let phase_shutdown = shutdown.clone();
    let mut phase_token = shutdown.token();
    tokio::spawn(async move {
        phase_token.wait_for_shutdown().await;
        phase_shutdown.set_phase(ShutdownPhase::DrainingSettlement);
    });

    let api_port = services.config.api.port;
    let api_token = shutdown.token();
    let api = tokio::spawn(async move { start_api_server(state, api_port, api_token).await });

    info!("pitchpool serving (api port {})", api_port);
    scheduler
        .clone()
        .run(shutdown.token(), shutdown.drain_timeout())
        .await;

    shutdown.set_phase(ShutdownPhase::StoppingApi);
    match api.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("API server error: {}", e),
        Err(e) => error!("API server task failed: {}", e),
    }

    shutdown.set_phase(ShutdownPhase::Complete);
    info!("Shutdown complete");
    Ok(())
}

async fn run_single_pass(config: AppConfig) -> Result<()> {
    let services = Services::build(config).await?;
    let summary = services.orchestrator.run_once().await;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    match summary.error {
        Some(err) => Err(PitchError::Internal(format!("settlement pass aborted: {}", err))),
        None => Ok(()),
    }
}

async fn show_status(config: AppConfig) -> Result<()> {
    let services = Services::build(config).await?;
    let schedule = services.scheduler()?.schedule();

    println!("Settlement authority: {}", services.authority_address().unwrap_or_else(|| "not configured".into()));
    println!("Schedule:             {}", schedule);
    println!("Run on startup:       {}", services.config.settlement.run_on_startup);
    println!("Ledger RPC:           {}", services.config.ledger.rpc_url);

    match services.connection.chain_id().await {
        Ok(chain_id) => println!("Chain id:             {}", chain_id),
        Err(e) => println!("Chain id:             unavailable ({})", e),
    }

    if services.authority.is_some() {
        let payout_ledger = pitchpool::adapters::ContractPayoutLedger::new(
            services.connection.clone(),
            &services.config.ledger,
        )?;
        match payout_ledger.preflight().await {
            Ok(()) => println!("Preflight:            ok"),
            Err(e) => println!("Preflight:            {}", e),
        }
    }

    match &services.pool_store {
        Some(store) => match sqlx::query("SELECT 1").execute(store.pool()).await {
            Ok(_) => println!("Pool ledger DB:       connected"),
            Err(e) => println!("Pool ledger DB:       disconnected ({})", e),
        },
        None => println!("Pool ledger DB:       disabled"),
    }

    Ok(())
}

async fn sync_fixtures(config: AppConfig) -> Result<()> {
    let services = Services::build(config).await?;
    let Some(ledger) = services.pool_ledger() else {
        warn!("No database configured, nothing to sync into");
        return Err(PitchError::InvalidConfig("database.url is required for sync-fixtures".into()));
    };

    let synced = ledger.sync_from_feed(services.feed.as_ref()).await?;
    info!("Synced {} fixtures from feed", synced);
    println!("Synced {} fixtures", synced);
    Ok(())
}

async fn run_migrations(config: AppConfig) -> Result<()> {
    let Some(db) = &config.database else {
        return Err(PitchError::InvalidConfig("database.url is required for migrate".into()));
    };

    let store = pitchpool::adapters::PostgresPoolStore::new(&db.url, db.max_connections).await?;
    store.migrate().await?;
    println!("Migrations applied");
    Ok(())
}
