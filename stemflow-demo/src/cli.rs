use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stemflow::{
    AssetFetcher, EngineDesc, FileFetcher, HttpFetcher, MusicConfig, SoundEngine, SoundManager,
};

const UPDATE_INTERVAL: Duration = Duration::from_millis(20);
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Plays a music state machine config and fires a timed event script at it.
#[derive(Parser, Debug)]
#[command(name = "stemflow-demo")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Options {
    /// Music state machine config (JSON)
    #[arg(value_name = "CONFIG", default_value = "stemflow-demo/asset/battle.json")]
    config_path: PathBuf,

    /// Directory stream URLs are resolved against
    #[arg(long = "assets", value_name = "DIR", default_value = "stemflow-demo/asset")]
    asset_root: PathBuf,

    /// Fetch streams over HTTP from this base URL instead of the asset directory
    #[arg(long = "http", value_name = "BASE_URL")]
    http_base: Option<String>,

    /// Skip states marked as disabled in replay
    #[arg(long)]
    replay: bool,

    /// Fire EVENT at SECS seconds after playback starts (repeatable)
    #[arg(long = "at", num_args = 2, value_names = ["SECS", "EVENT"])]
    at: Vec<String>,
}

impl Options {
    /// `(seconds after start, event)` pairs in firing order.
    fn script(&self) -> Result<Vec<(f64, String)>> {
        let mut script = self
            .at
            .chunks_exact(2)
            .map(|pair| {
                let secs: f64 = pair[0]
                    .parse()
                    .with_context(|| format!("--at expects seconds, got '{}'", pair[0]))?;
                Ok((secs, pair[1].clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        if script.is_empty() {
            script = vec![(20.0, "danger".to_string()), (40.0, "win".to_string())];
        }
        script.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(script)
    }
}

pub fn run(options: Options) -> Result<()> {
    let script = options.script()?;
    let json = std::fs::read_to_string(&options.config_path)
        .with_context(|| format!("reading {}", options.config_path.display()))?;
    let config = MusicConfig::from_json(&json)?;

    let fetcher: Arc<dyn AssetFetcher> = match &options.http_base {
        Some(base) => Arc::new(HttpFetcher::new().with_base_url(base.clone())),
        None => Arc::new(FileFetcher::new(&options.asset_root)),
    };

    let desc = EngineDesc::default();
    let mut manager = SoundManager::new(desc.clone(), fetcher);
    let mut engine = SoundEngine::new(desc, manager.renderer()?);
    engine.start()?;

    let mut music = manager.create_music_state_machine(&config)?;
    music.set_replay_mode(options.replay);
    log::info!("Loading {} ...", options.config_path.display());
    if !music.wait_for_load(LOAD_TIMEOUT) {
        log::warn!("Some streams failed to load and will stay silent");
    }

    music.play();
    log::info!("Playing, state {:?}", music.active_state());

    let started = Instant::now();
    let end = script.last().map_or(30.0, |(at, _)| at + 15.0);
    let mut script = script.into_iter().peekable();

    while started.elapsed().as_secs_f64() < end {
        let elapsed = started.elapsed().as_secs_f64();
        while let Some((_, event)) = script.next_if(|(at, _)| *at <= elapsed) {
            let changed = music.handle_event(&event);
            log::info!(
                "[{:6.2}s] event '{}' -> {:?}{}",
                elapsed,
                event,
                music.active_state(),
                if changed { "" } else { " (ignored)" }
            );
        }
        music.update();
        manager.update();
        std::thread::sleep(UPDATE_INTERVAL);
    }

    music.stop(0.0);
    std::thread::sleep(Duration::from_millis(200));
    engine.stop()?;
    log::info!("Rendered {} frames", engine.frames_processed());
    Ok(())
}
