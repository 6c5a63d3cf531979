use anyhow::{bail, Context};
use skinmotion::config::{settings_path, Settings, WorkerPool, WorkerPoolConfig};
use skinmotion::storage::SkinStorage;
use skinmotion::sync::{SkinApiClient, SkinSource};
use skinmotion::utils::{init_logging, log_system_info};
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

const USAGE: &str = "Usage: skinmotion [--config <file>] [--fetch <uuid>]";

struct Args {
    config: Option<PathBuf>,
    fetch: Option<Uuid>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        fetch: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(PathBuf::from(iter.next().context(USAGE)?)),
            "--fetch" => {
                let raw = iter.next().context(USAGE)?;
                args.fetch = Some(raw.parse().with_context(|| format!("Invalid UUID '{}'", raw))?);
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => bail!("Unknown argument '{}'\n{}", other, USAGE),
        }
    }
    Ok(args)
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    let config_path = args.config.or_else(settings_path);
    let settings = Settings::load(config_path.as_deref()).context("Failed to load settings")?;

    init_logging(&settings.logging);
    log_system_info();
    if let Some(path) = &config_path {
        info!("Settings: {}", path.display());
    }

    let db_path = settings.storage.database_path();
    let storage = SkinStorage::open(&db_path).with_context(|| format!("Failed to open {}", db_path.display()))?;
    info!("💾 Storage schema v{}", storage.schema_version()?);

    let pool = WorkerPool::new(WorkerPoolConfig::default())?;
    let client = SkinApiClient::new(
        &settings.api.url,
        &settings.api.plugin_api_key,
        &settings.api.server_id,
        settings.api.timeout(),
    )?;

    pool.block_on(async {
        if client.is_healthy().await {
            info!("🌐 Skin API reachable at {}", client.base_url());
        } else {
            warn!("🌐 Skin API unreachable at {}", client.base_url());
        }

        let Some(subject) = args.fetch else {
            return Ok(());
        };
        match client.fetch_skin_config(subject).await? {
            Some(config) => {
                info!(
                    "🎨 {}: {} frame(s), {} every {} ticks",
                    config.minecraft_username,
                    config.frame_count(),
                    config.loop_mode,
                    config.frame_duration_ticks()
                );
                storage.save_skin(&config)?;
                info!("💾 Cached config for {}", subject);
            }
            None => info!("No skin configured for {}", subject),
        }
        anyhow::Ok(())
    })
}
