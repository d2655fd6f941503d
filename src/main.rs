use std::path::PathBuf;
use std::time::Duration;

use artwork_resolver::config::{load_config_file, load_or_default};
use artwork_resolver::{ArtworkConfig, ArtworkItem, PriorityTier, Provenance, ResolutionEngine};
use log::{error, info, warn};

const USAGE: &str = "usage: artwork-probe [--config <path>] <artist> <track> [<artist> <track> ...]";
const DISPLAY_REFERENCE_CHARS: usize = 72;

struct ProbeArgs {
    config_path: Option<PathBuf>,
    pairs: Vec<(String, String)>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<ProbeArgs, String> {
    let mut config_path = None;
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args.next().ok_or("--config needs a path")?;
            config_path = Some(PathBuf::from(path));
        } else {
            positional.push(arg);
        }
    }
    if positional.is_empty() || positional.len() % 2 != 0 {
        return Err(USAGE.to_string());
    }
    let pairs = positional
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    Ok(ProbeArgs { config_path, pairs })
}

/// Upper bound on one lookup including throttling, search and preload.
fn worst_case_lookup_time(config: &ArtworkConfig) -> Duration {
    let throttle = Duration::from_millis(
        config
            .throttle
            .min_spacing_ms
            .saturating_add(config.throttle.batch_pause_ms),
    );
    let preload = if config.preload.enabled {
        config.preload.timeout()
    } else {
        Duration::ZERO
    };
    throttle
        .saturating_add(config.lookup.request_timeout())
        .saturating_add(preload)
}

/// Deadline for the whole probe run.
fn probe_deadline(config: &ArtworkConfig, pairs: usize) -> Duration {
    let pairs = u32::try_from(pairs.max(1)).unwrap_or(u32::MAX);
    worst_case_lookup_time(config).saturating_mul(pairs)
}

fn shorten_reference(reference: &str) -> String {
    if reference.chars().count() <= DISPLAY_REFERENCE_CHARS {
        return reference.to_string();
    }
    let head: String = reference.chars().take(DISPLAY_REFERENCE_CHARS).collect();
    format!("{head}...")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };
    let config = match args.config_path.as_deref() {
        Some(path) => load_config_file(path),
        None => load_or_default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    runtime.block_on(async move {
        let deadline = probe_deadline(&config, args.pairs.len());
        let engine = ResolutionEngine::new(config);
        let items: Vec<ArtworkItem> = args
            .pairs
            .iter()
            .enumerate()
            .map(|(index, (artist, track))| ArtworkItem::new(index.to_string(), artist, track))
            .collect();

        let mut handles = Vec::new();
        for item in &items {
            let engine = engine.clone();
            let item = item.clone();
            handles.push(tokio::spawn(async move {
                let result = engine
                    .resolve_one(&item.artist, &item.track, PriorityTier::High)
                    .await;
                (item, result)
            }));
        }

        let results = tokio::time::timeout(deadline, async {
            let mut results = Vec::new();
            for handle in handles {
                match handle.await {
                    Ok(result) => results.push(result),
                    Err(join_error) => error!("Probe task failed: {join_error}"),
                }
            }
            results
        })
        .await;
        let Ok(results) = results else {
            warn!("Probe gave up after {deadline:?}");
            return;
        };

        for (item, result) in results {
            match result {
                Ok(entry) => {
                    let label = match entry.provenance {
                        Provenance::Exact => "EXACT",
                        Provenance::Fallback => "FALLBACK",
                    };
                    println!(
                        "{label:<8} {} - {}: {}",
                        item.artist,
                        item.track,
                        shorten_reference(entry.image.as_str())
                    );
                }
                Err(resolve_error) => {
                    println!("SKIPPED  {} - {}: {resolve_error}", item.artist, item.track)
                }
            }
        }
        info!(
            "Resolved {:.0}% of {} items ({} cached)",
            engine.progress(&items),
            items.len(),
            engine.cache_len()
        );
    });
    Ok(())
}
