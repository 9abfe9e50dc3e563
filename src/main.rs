use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use mithril::callbacks::ServerCallbacks;
use mithril::config::{load_opcode_table, Config};
use mithril::handlers::HandlerTable;
use mithril::store::{
    load_definitions, load_item_locations, load_npc_locations, load_object_locations,
    PasswordHasher, SqlPlayerStore, Stores,
};
use mithril::tick::Engine;
use mithril_network::{self as network, NetworkSettings, SharedNetwork};
use mithril_world::triggers::Triggers;
use mithril_world::{CollisionMap, World};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mithril", about = "An authoritative tile-world game server")]
struct Flags {
    /// Display more verbose output.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// The TCP port for the game to listen on; websockets use the port
    /// directly above it.
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// The TOML configuration file to load game settings from.
    #[arg(short = 'c', long = "config", default_value = "config.toml")]
    config: PathBuf,

    /// Enable opcode encryption on accepted sessions.
    #[arg(short = 'e', long = "encryption")]
    encryption: bool,
}

fn main() -> ExitCode {
    let start = Instant::now();

    let flags = match Flags::try_parse() {
        Ok(flags) => flags,
        Err(e)
            if matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            print!("{e}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };

    init_tracing(flags.verbose);

    let mut config = match Config::load(&flags.config) {
        Ok(config) => config,
        Err(e) => {
            error!("error decoding server config: {e:#}");
            return ExitCode::from(2);
        }
    };
    if let Some(port) = flags.port {
        config.port = port;
    }
    if config.port >= 65534 {
        // The websocket listener needs the port directly above.
        error!("invalid port {}; valid ports are 1-65533", config.port);
        return ExitCode::from(2);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start runtime: {e}");
            return ExitCode::from(2);
        }
    };

    let stores = match runtime.block_on(Stores::open(&config.database)) {
        Ok(stores) => stores,
        Err(e) => {
            error!("error opening databases: {e:#}");
            return ExitCode::from(3);
        }
    };

    // Three load phases, in order: definitions, then collision masks, then
    // entity spawns. Spawns placed before the masks exist would land in a
    // world with no solid geometry.
    let defs = Arc::new(runtime.block_on(load_definitions(&stores.world_db)));
    let collision = load_collision(&config);
    let world = Arc::new(World::with_parts(defs, collision, Triggers::default()));
    runtime.block_on(async {
        load_object_locations(&world, &stores.world_db).await;
        load_npc_locations(&world, &stores.world_db).await;
        load_item_locations(&world, &stores.world_db).await;
    });

    let hasher = match PasswordHasher::new(&config.crypto) {
        Ok(hasher) => hasher,
        Err(e) => {
            error!("bad crypto configuration: {e:#}");
            return ExitCode::from(2);
        }
    };

    let player_store = Arc::new(SqlPlayerStore::new(stores.player_db.clone()));
    if let Err(e) = runtime.block_on(player_store.init()) {
        error!("error preparing player database: {e:#}");
        return ExitCode::from(3);
    }

    let callbacks = Arc::new(ServerCallbacks::new(
        world.clone(),
        player_store.clone(),
        hasher,
        config.max_players,
    ));

    let settings = NetworkSettings {
        port: config.port,
        max_connections: config.max_players * 2,
        version: config.version,
        cipher_enabled: flags.encryption,
        tls_cert: config.tls_cert(),
        tls_key: config.tls_key(),
    };
    let (shared, login_rx) = match SharedNetwork::new(settings, callbacks) {
        Ok(built) => built,
        Err(e) => {
            error!("failed to build network state: {e:#}");
            return ExitCode::from(2);
        }
    };

    let handlers = HandlerTable::new(&load_opcode_table(&config.packet_handler_file));
    info!(handlers = handlers.handler_count(), "bound packet handlers");

    let engine = Engine::new(
        world.clone(),
        handlers,
        login_rx,
        player_store,
        runtime.handle().clone(),
    );

    let shutdown = engine.shutdown_handle();
    {
        let shared = shared.clone();
        let shutdown = shutdown.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down");
                shared.close();
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    runtime.spawn(async move {
        if let Err(e) = network::listen(shared).await {
            error!("listener failed: {e:#}");
        }
    });

    info!(
        elapsed = ?start.elapsed(),
        "world initialized; the game is ready"
    );

    // The tick loop owns the main thread until shutdown.
    engine.run();
    ExitCode::SUCCESS
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_owned()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Loads terrain collision sectors from `<DataDir>/sectors/`, 48x48 mask
/// bytes per file named `sector_<x>_<y>.dat`. A missing directory logs and
/// leaves the terrain open.
fn load_collision(config: &Config) -> CollisionMap {
    use mithril_world::{Sector, SECTOR_SIZE};

    let map = CollisionMap::new();
    let dir = config.data_dir.join("sectors");
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!("couldn't read collision data from {}: {e}", dir.display());
            return map;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(coords) = name
            .to_str()
            .and_then(|n| n.strip_prefix("sector_"))
            .and_then(|n| n.strip_suffix(".dat"))
        else {
            continue;
        };
        let Some((x, y)) = coords.split_once('_') else {
            continue;
        };
        let (Ok(x), Ok(y)) = (x.parse::<i32>(), y.parse::<i32>()) else {
            continue;
        };

        match std::fs::read(entry.path()) {
            Ok(bytes) if bytes.len() == (SECTOR_SIZE * SECTOR_SIZE) as usize => {
                map.insert_sector(x, y, Sector::from_base(bytes));
            }
            Ok(bytes) => error!(
                "sector file {} has {} bytes, expected {}",
                entry.path().display(),
                bytes.len(),
                SECTOR_SIZE * SECTOR_SIZE
            ),
            Err(e) => error!("couldn't read {}: {e}", entry.path().display()),
        }
    }

    info!(sectors = map.sector_count(), "loaded collision data");
    map
}
