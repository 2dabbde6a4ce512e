//! MarkSynth CLI - run, live-edit and check engine configurations

use clap::{Parser, Subcommand};
use marksynth::config::{ConfigValue, SynthConfig};
use marksynth::live::LiveSession;
use marksynth::memory_bank::MemoryBank;
use marksynth::raster::Raster;
use marksynth::registry::{NodeRegistry, Resources};
use marksynth::synth::Synth;
use marksynth::value::PortMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "marksynth")]
#[command(about = "MarkSynth generative node graph engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a configuration headless for a number of frames
    Run {
        /// Config file (.toml or .json)
        config: PathBuf,

        /// Frames to run (default: 600)
        #[arg(short, long, default_value = "600")]
        frames: u64,

        /// Frame rate the clock advances at (default: 60)
        #[arg(long, default_value = "60")]
        fps: f32,

        /// Seed for memory recall and unseeded random nodes
        #[arg(short, long)]
        seed: Option<u64>,

        /// Keep memories and snapshots in the user data folder when the config names none
        #[arg(long)]
        persist: bool,
    },

    /// Run in real time and reload the config whenever it is saved
    Live {
        config: PathBuf,

        #[arg(long, default_value = "60")]
        fps: f32,

        /// Stop after this many seconds (default: run until killed)
        #[arg(long)]
        seconds: Option<f32>,

        #[arg(long)]
        persist: bool,
    },

    /// Load a config and report problems without running it
    Validate { config: PathBuf },

    /// List node types and their ports
    Types,
}

/// Where memories live when the config does not say
fn default_memory_folder() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("marksynth").join("memories"))
}

fn default_snapshot_folder() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("marksynth").join("snapshots"))
}

/// Shared payloads every run offers to node constructors
fn default_resources() -> Resources {
    let mut resources = Resources::new();
    resources.insert("image", Arc::new(gradient(256, 256)));
    resources
}

fn gradient(width: u32, height: u32) -> Raster {
    let mut raster = Raster::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            raster.set_pixel(x, y, [r, g, 128, 255]);
        }
    }
    raster
}

fn load_config(path: &Path, seed: Option<u64>, persist: bool) -> Result<SynthConfig, Box<dyn std::error::Error>> {
    let mut config = SynthConfig::load(path)?;
    if let Some(seed) = seed {
        config.memory.seed = Some(seed);
        for (i, node) in config.nodes.iter_mut().enumerate() {
            node.config
                .entry("seed".to_string())
                .or_insert_with(|| ConfigValue::Num(seed.wrapping_add(i as u64) as f64));
        }
    }
    if persist && config.memory.folder.is_none() {
        config.memory.folder = default_memory_folder();
    }
    if persist && config.snapshot_folder.is_none() {
        config.snapshot_folder = default_snapshot_folder();
    }
    Ok(config)
}

fn describe_ports(map: PortMap) -> String {
    map.iter()
        .map(|(name, id)| format!("{}({})", name, id))
        .collect::<Vec<_>>()
        .join(", ")
}

fn save_memories(synth: &Synth) {
    match synth.save_memories() {
        Ok(true) => info!(
            "Saved memories to {}",
            synth.memory_folder().map(|p| p.display().to_string()).unwrap_or_default()
        ),
        Ok(false) => {}
        Err(e) => warn!("Could not save memories: {}", e),
    }
}

fn save_snapshots(synth: &Synth) {
    if let Err(e) = synth.save_snapshots() {
        warn!("Could not save snapshots: {}", e);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let registry = NodeRegistry::with_builtins();

    match cli.command {
        Commands::Run {
            config,
            frames,
            fps,
            seed,
            persist,
        } => {
            let synth_config = load_config(&config, seed, persist)?;
            let bank = match seed {
                Some(seed) => MemoryBank::with_seed(seed),
                None => MemoryBank::new(),
            };
            let mut synth = Synth::new(bank);
            synth.load(&synth_config, &registry, &default_resources())?;

            let fps = fps.max(1.0);
            let per_status = fps.round().max(1.0) as u64;
            for frame in 0..frames {
                synth.update(1.0 / fps);
                if (frame + 1) % per_status == 0 {
                    info!("{}", synth.status_line());
                }
            }
            if let Some(shift) = synth.host().agency_state().last_register_shift() {
                info!(
                    "Last register shift at {:.2}s: {} node(s) fired",
                    shift.time, shift.count
                );
            }
            println!("{}", synth.status_line());
            save_memories(&synth);
            save_snapshots(&synth);
        }

        Commands::Live {
            config,
            fps,
            seconds,
            persist,
        } => {
            let stop = Arc::new(AtomicBool::new(false));
            if let Some(seconds) = seconds {
                let stop = stop.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_secs_f32(seconds.max(0.0)));
                    stop.store(true, Ordering::Relaxed);
                });
            }
            let mut session = LiveSession::new(&config, Synth::default(), registry, default_resources())?;
            if persist {
                session.set_memory_folder(default_memory_folder());
                session.set_snapshot_folder(default_snapshot_folder());
            }
            session.run(fps, stop)?;
            save_memories(session.synth());
            save_snapshots(session.synth());
        }

        Commands::Validate { config } => {
            let synth_config = SynthConfig::load(&config)?;
            synth_config.validate()?;
            let mut synth = Synth::new(MemoryBank::with_seed(0));
            let report = synth.load(&synth_config, &registry, &default_resources())?;

            println!("Config:      {}", synth_config.name);
            println!("Nodes:       {} built", report.nodes);
            for name in &report.skipped_nodes {
                println!("  skipped:   {}", name);
            }
            println!(
                "Connections: {} of {} resolved",
                report.connections, report.connection_lines
            );
            let cycles = synth.graph().feedback_cycles();
            if cycles.is_empty() {
                println!("Feedback:    none");
            } else {
                for cycle in cycles {
                    println!("Feedback:    {}", cycle.join(" <-> "));
                }
            }
            if !report.skipped_nodes.is_empty() || report.unresolved_connections() > 0 {
                return Err("config has unresolved nodes or connections".into());
            }
        }

        Commands::Types => {
            let resources = default_resources();
            for type_name in registry.type_names() {
                let Some(node) = registry.create(type_name, type_name, &Default::default(), &resources) else {
                    println!("{}", type_name);
                    continue;
                };
                println!("{}", type_name);
                println!("  sinks:   {}", describe_ports(node.sinks()));
                println!("  sources: {}", describe_ports(node.sources()));
            }
        }
    }

    Ok(())
}
