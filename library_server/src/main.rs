//! Library API server: serves the resources under `RESOURCES_PATH` and manages their tables.
//!
//! Run from repo root: `cargo run -p library-server -- serve`

use clap::{Parser, Subcommand};
use rest_scaffold::{
    app, drop_database, ensure_database_exists, load_registry, route_table, seed, telemetry, AppState,
    MemoryStore, PgStore, RecordStore, ResourceRegistry, Settings, StoreKind,
};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tokio::net::TcpListener;

type BoxError = Box<dyn std::error::Error>;

#[derive(Parser)]
#[command(name = "library-server")]
#[command(version, about = "Library API server", long_about = None)]
struct Cli {
    /// Overrides the STORE setting (postgres or memory).
    #[arg(long, global = true)]
    store: Option<StoreKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server on HOST:PORT
    Serve {
        /// Insert seed rows before serving
        #[arg(long)]
        seed: bool,
    },
    /// Print every route with its methods and resource
    Routes,
    /// Database operations
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Create missing resource tables
    Create {
        #[arg(long)]
        seed: bool,
    },
    /// Drop resource tables
    Drop {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Drop the whole database instead of the tables
        #[arg(long)]
        database: bool,
    },
    /// Drop and create the resource tables again
    Recreate {
        #[arg(long)]
        seed: bool,
        #[arg(long)]
        yes: bool,
    },
    /// Insert seed rows that are not present yet
    Seed,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "library-server failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let mut settings = Settings::from_env()?;
    if let Some(store) = cli.store {
        settings.store = store;
    }
    telemetry::init(&telemetry::default_directives("library_server", settings.sql_echo));

    let registry = load_registry(&settings.resources_path).await?;
    tracing::info!(
        resources = registry.resources().len(),
        path = %settings.resources_path.display(),
        "resources loaded"
    );

    match cli.command {
        Commands::Serve { seed: with_seed } => {
            let store = open_store(&settings).await?;
            store.create_tables(registry.resources()).await?;
            if with_seed {
                seed(store.as_ref(), registry.resources()).await?;
            }
            serve(store, registry, settings).await
        }
        Commands::Routes => {
            let state = AppState::new(Arc::new(MemoryStore::new()), registry, settings);
            for r in route_table(&state) {
                println!("{:<12} {:<32} {}", r.methods, r.path, r.resource);
            }
            Ok(())
        }
        Commands::Db { command } => db(command, &settings, &registry).await,
    }
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn RecordStore>, BoxError> {
    match settings.store {
        StoreKind::Memory => {
            tracing::warn!("memory store: data is lost when the process exits");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Postgres => {
            let url = database_url(settings)?;
            ensure_database_exists(url).await?;
            let store = PgStore::connect(url, settings.max_connections, settings.sql_echo).await?;
            Ok(Arc::new(store))
        }
    }
}

fn database_url(settings: &Settings) -> Result<&str, BoxError> {
    settings
        .database_url
        .as_deref()
        .ok_or_else(|| "DATABASE_URL is not set".into())
}

async fn serve(store: Arc<dyn RecordStore>, registry: ResourceRegistry, settings: Settings) -> Result<(), BoxError> {
    let addr = settings.bind_addr();
    let state = AppState::new(store, registry, settings);
    let router = app(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "library-server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

async fn db(command: DbCommands, settings: &Settings, registry: &ResourceRegistry) -> Result<(), BoxError> {
    match command {
        DbCommands::Create { seed: with_seed } => {
            let store = open_store(settings).await?;
            store.create_tables(registry.resources()).await?;
            if with_seed {
                seed(store.as_ref(), registry.resources()).await?;
            }
        }
        DbCommands::Drop { yes, database } => {
            if !confirmed(yes, "Are you sure you want to lose all your data")? {
                return Ok(());
            }
            if database {
                drop_database(database_url(settings)?).await?;
            } else {
                open_store(settings).await?.drop_tables(registry.resources()).await?;
            }
        }
        DbCommands::Recreate { seed: with_seed, yes } => {
            if !confirmed(yes, "Are you sure you want to lose all your data")? {
                return Ok(());
            }
            let store = open_store(settings).await?;
            store.drop_tables(registry.resources()).await?;
            store.create_tables(registry.resources()).await?;
            if with_seed {
                seed(store.as_ref(), registry.resources()).await?;
            }
        }
        DbCommands::Seed => {
            let store = open_store(settings).await?;
            let created = seed(store.as_ref(), registry.resources()).await?;
            println!("{} rows seeded", created);
        }
    }
    Ok(())
}

fn confirmed(yes: bool, question: &str) -> Result<bool, BoxError> {
    if yes {
        return Ok(true);
    }
    print!("{} [y/N]: ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
