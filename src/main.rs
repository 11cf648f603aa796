//! airq-sync CLI
//!
//! Classification service for air-quality sensor readings.

use airq_sync::{
    config::Config,
    core::reading::Reading,
    core::sync::{classify_manual, Classifier, DateScope, RecordStore, SyncEngine},
    model::OnnxClassifier,
    server::{run, AppState, ServerConfig},
    store::{FirebaseStore, StoreConfig},
    VERSION,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "airq-sync")]
#[command(version = VERSION)]
#[command(about = "Air-quality classification and store reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Port to bind (overrides PORT from the environment)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one reconciliation pass against the store
    Sync {
        /// Only consider readings whose date starts with this token (YYYY-MM-DD)
        #[arg(long, conflicts_with = "today")]
        date: Option<String>,

        /// Only consider today's readings
        #[arg(long)]
        today: bool,
    },

    /// Classify one reading supplied on the command line
    Predict {
        #[arg(long)]
        gas: f64,

        #[arg(long)]
        humidity: f64,

        #[arg(long)]
        light: f64,

        #[arg(long)]
        dust: f64,

        #[arg(long)]
        temperature: f64,

        /// Persist the result to the store (best-effort)
        #[arg(long)]
        save: bool,
    },

    /// Show resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => cmd_serve(port).await,
        Commands::Sync { date, today } => cmd_sync(date, today).await,
        Commands::Predict {
            gas,
            humidity,
            light,
            dust,
            temperature,
            save,
        } => cmd_predict(gas, humidity, light, dust, temperature, save).await,
        Commands::Config => cmd_config(),
    }
}

async fn cmd_serve(port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = Arc::new(FirebaseStore::new(StoreConfig::new(
        config.database_url.clone(),
        config.auth_token.clone(),
    )));

    // Mirror the hosted deployment: a model that fails to load leaves the
    // service up, with classification endpoints answering 500 until restart.
    let classifier: Option<Arc<dyn Classifier>> =
        match OnnxClassifier::load(&config.model_path, config.labels_path.as_deref()) {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                tracing::error!("could not load model: {e}");
                None
            }
        };

    let state = Arc::new(AppState::new(classifier, store));
    let (addr, shutdown_tx) = run(ServerConfig::new(port.unwrap_or(config.port)), state).await?;
    println!("airq-sync v{VERSION} listening on http://{addr}");
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    println!();
    println!("Shutting down...");
    let _ = shutdown_tx.send(());

    Ok(())
}

async fn cmd_sync(date: Option<String>, today: bool) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = FirebaseStore::new(StoreConfig::new(
        config.database_url.clone(),
        config.auth_token.clone(),
    ));
    let classifier = OnnxClassifier::load(&config.model_path, config.labels_path.as_deref())
        .map_err(|e| anyhow::anyhow!("could not load model: {e}"))?;

    let scope = if today {
        Some(DateScope::today())
    } else {
        date.map(DateScope::new)
    };

    let engine = SyncEngine::new(&store, &classifier);
    let report = engine
        .run(scope.as_ref())
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_predict(
    gas: f64,
    humidity: f64,
    light: f64,
    dust: f64,
    temperature: f64,
    save: bool,
) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let classifier = OnnxClassifier::load(&config.model_path, config.labels_path.as_deref())
        .map_err(|e| anyhow::anyhow!("could not load model: {e}"))?;

    let store = save.then(|| {
        FirebaseStore::new(StoreConfig::new(
            config.database_url.clone(),
            config.auth_token.clone(),
        ))
    });

    let reading = Reading {
        date: None,
        gas: Some(gas),
        humidity: Some(humidity),
        light: Some(light),
        dust: Some(dust),
        temperature: Some(temperature),
    };

    let prediction = classify_manual(
        &classifier,
        store.as_ref().map(|s| s as &dyn RecordStore),
        &reading,
    )
    .await
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Database URL: {}", config.database_url);
    println!(
        "Auth token: {}",
        if config.auth_token.is_some() {
            "set (redacted)"
        } else {
            "not set"
        }
    );
    println!("Model path: {:?}", config.model_path);
    match &config.labels_path {
        Some(path) => println!("Labels path: {:?}", path),
        None => println!("Labels path: <model sidecar or built-in table>"),
    }
    println!("Port: {}", config.port);

    Ok(())
}
