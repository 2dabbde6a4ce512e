//! Live session: drive the engine and hot-reload its config on save
//!
//! The config file's directory is watched (editors often replace the file
//! rather than write it in place). A change that fails to parse or
//! validate leaves the running configuration untouched; fix the file and
//! save again.

use crate::config::{ConfigError, SynthConfig};
use crate::registry::{NodeRegistry, Resources};
use crate::synth::Synth;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{error, info, warn};

/// Ignore change bursts closer together than this
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(200);

/// Seconds between status lines
const STATUS_INTERVAL_SEC: f32 = 1.0;

pub struct LiveSession {
    current_file: PathBuf,
    synth: Synth,
    registry: NodeRegistry,
    resources: Resources,
    last_modified: Option<SystemTime>,
    /// Used when the config names no memory folder
    memory_folder: Option<PathBuf>,
    snapshot_folder: Option<PathBuf>,
    events: Receiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
}

impl LiveSession {
    pub fn new(
        file_path: &Path,
        synth: Synth,
        registry: NodeRegistry,
        resources: Resources,
    ) -> Result<Self, String> {
        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(tx, Config::default())
            .map_err(|e| format!("Failed to create watcher: {}", e))?;
        let dir = match file_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| format!("Failed to watch {}: {}", dir.display(), e))?;

        Ok(Self {
            current_file: file_path.to_path_buf(),
            synth,
            registry,
            resources,
            last_modified: None,
            memory_folder: None,
            snapshot_folder: None,
            events: rx,
            _watcher: watcher,
        })
    }

    pub fn set_memory_folder(&mut self, folder: Option<PathBuf>) {
        self.memory_folder = folder;
    }

    pub fn set_snapshot_folder(&mut self, folder: Option<PathBuf>) {
        self.snapshot_folder = folder;
    }

    pub fn synth(&self) -> &Synth {
        &self.synth
    }

    /// Read, validate and switch to the config file
    pub fn load_file(&mut self) -> Result<(), ConfigError> {
        info!("Loading {}", self.current_file.display());
        let mut config = SynthConfig::load(&self.current_file)?;
        if config.memory.folder.is_none() {
            config.memory.folder = self.memory_folder.clone();
        }
        if config.snapshot_folder.is_none() {
            config.snapshot_folder = self.snapshot_folder.clone();
        }
        let report = self
            .synth
            .switch_config(&config, &self.registry, &self.resources)?;
        if report.unresolved_connections() > 0 {
            warn!("{} connection(s) did not resolve", report.unresolved_connections());
        }
        self.last_modified = modified_time(&self.current_file);
        Ok(())
    }

    /// Drain watcher events; true if the config file itself changed
    fn config_touched(&self) -> bool {
        let mut touched = false;
        while let Ok(event) = self.events.try_recv() {
            match event {
                Ok(event) => {
                    touched |= event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == self.current_file.file_name());
                }
                Err(e) => warn!("Watch error: {}", e),
            }
        }
        touched
    }

    fn check_file_modified(&self) -> bool {
        match (modified_time(&self.current_file), self.last_modified) {
            (Some(now), Some(before)) => now > before,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Run at `fps` until `stop` is set
    pub fn run(&mut self, fps: f32, stop: Arc<AtomicBool>) -> Result<(), String> {
        self.load_file().map_err(|e| e.to_string())?;
        info!("Live session started, editing {}", self.current_file.display());

        let frame = Duration::from_secs_f32(1.0 / fps.max(1.0));
        let mut last_frame = Instant::now();
        let mut last_reload = Instant::now();
        let mut since_status = 0.0;

        while !stop.load(Ordering::Relaxed) {
            if self.config_touched()
                && last_reload.elapsed() > RELOAD_DEBOUNCE
                && self.check_file_modified()
            {
                last_reload = Instant::now();
                match self.load_file() {
                    Ok(()) => info!("Reloaded {}", self.current_file.display()),
                    Err(e) => error!("Reload failed, keeping previous config: {}", e),
                }
            }

            let dt = last_frame.elapsed().as_secs_f32();
            last_frame = Instant::now();
            self.synth.update(dt);

            since_status += dt;
            if since_status >= STATUS_INTERVAL_SEC {
                since_status = 0.0;
                info!("{}", self.synth.status_line());
            }

            if let Some(rest) = frame.checked_sub(last_frame.elapsed()) {
                thread::sleep(rest);
            }
        }

        info!("Live session stopped");
        Ok(())
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
