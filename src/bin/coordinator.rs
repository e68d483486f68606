use std::{path::PathBuf, process, sync::Arc};

use structopt::StructOpt;
use tokio::signal;
use tracing_subscriber::*;

use ledger_fl::{
    coordinator::Coordinator,
    ledger::{Ledger, RpcLedger},
    proof::{ProofVerifier, VerificationMode},
    rest,
    settings::{ApiSettings, LedgerSettings, Settings, StorageBackend},
    storage::{FileStore, InMemoryStore, Storage, Store},
    training::LinearRegression,
};

#[macro_use]
extern crate tracing;

#[derive(Debug, StructOpt)]
#[structopt(name = "Coordinator")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    let settings = Settings::new(opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });
    let Settings {
        api: api_settings,
        log: log_settings,
        storage: storage_settings,
        training: training_settings,
        ledger: ledger_settings,
    } = settings;

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(log_settings.filter)
        .with_ansi(true)
        .init();

    if sodiumoxide::init().is_err() {
        error!("failed to initialize the crypto library");
        process::exit(1);
    }

    let verifier = verifier(&ledger_settings).await.unwrap_or_else(|err| {
        error!("failed to initialize the ledger: {:#}", err);
        process::exit(1);
    });
    let trainer = LinearRegression::new(training_settings);

    match storage_settings.backend {
        StorageBackend::File => {
            let files = FileStore::new(storage_settings.path.clone())
                .await
                .unwrap_or_else(|err| {
                    error!("failed to initialize the storage: {:#}", err);
                    process::exit(1);
                });
            info!("storing data in {}", storage_settings.path.display());
            run(api_settings, Store::new(files.clone(), files), verifier, trainer).await
        }
        StorageBackend::Memory => {
            warn!("storing data in memory, everything is lost on shutdown");
            let memory = InMemoryStore::new();
            run(api_settings, Store::new(memory.clone(), memory), verifier, trainer).await
        }
    }
}

/// Creates the proof verifier of the configured mode and checks that its ledger is reachable.
async fn verifier(settings: &LedgerSettings) -> anyhow::Result<ProofVerifier> {
    match (settings.mode, &settings.rpc) {
        (VerificationMode::TrustAll, _) => {
            warn!("ledger verification is disabled, every record is trusted");
            Ok(ProofVerifier::trust_all())
        }
        (VerificationMode::Verified, Some(rpc)) => {
            let ledger = RpcLedger::new(rpc.clone())?;
            ledger.is_ready().await?;
            info!("verifying records against the ledger at {}", rpc.url);
            Ok(ProofVerifier::with_ledger(
                Arc::new(ledger),
                settings.timeout(),
                settings.concurrency,
            ))
        }
        (VerificationMode::Verified, None) => {
            anyhow::bail!("the verified mode requires the [ledger.rpc] settings")
        }
    }
}

async fn run<S>(
    api_settings: ApiSettings,
    mut store: S,
    verifier: ProofVerifier,
    trainer: LinearRegression,
) where
    S: Storage,
{
    if let Err(err) = Storage::is_ready(&mut store).await {
        error!("storage is not ready: {:#}", err);
        process::exit(1);
    }

    let coordinator = Coordinator::new(store, verifier, trainer);
    info!(
        "starting the coordinator, verification mode: {}",
        coordinator.verification_mode()
    );

    tokio::select! {
        result = rest::serve(api_settings, coordinator) => {
            if let Err(err) = result {
                error!("{}", err);
            }
            warn!("shutting down: REST server terminated");
        }
        _ = signal::ctrl_c() => {
            info!("shutting down");
        }
    }
}
