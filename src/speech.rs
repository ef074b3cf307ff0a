//! Spoken announcements.
//!
//! Synthesis is delegated to a `SpeechEngine`. The `Announcer` runs every
//! announcement on its own detached thread so the capture loop never waits
//! for speech; overlapping announcements are not ordered.

use anyhow::{anyhow, Context, Result};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Default external synthesizer.
pub const DEFAULT_SPEECH_COMMAND: &[&str] = &["espeak-ng"];

/// Blocking text-to-speech engine.
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Speak `text`, returning once the utterance has finished.
    fn speak(&self, text: &str) -> Result<()>;
}

/// Runs an external synthesizer with the text as its last argument.
#[derive(Clone, Debug)]
pub struct CommandSpeechEngine {
    program: String,
    args: Vec<String>,
}

impl CommandSpeechEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a `[program, args...]` vector.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("speech command must name a program"))?;
        if program.trim().is_empty() {
            return Err(anyhow!("speech command must name a program"));
        }
        Ok(Self::new(program.clone(), args.to_vec()))
    }
}

impl SpeechEngine for CommandSpeechEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn speak(&self, text: &str) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .with_context(|| format!("failed to run speech command {}", self.program))?;
        if !status.success() {
            return Err(anyhow!("speech command {} exited with {}", self.program, status));
        }
        Ok(())
    }
}

/// Logs announcements instead of speaking them.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSpeechEngine;

impl SpeechEngine for LogSpeechEngine {
    fn name(&self) -> &str {
        "log"
    }

    fn speak(&self, text: &str) -> Result<()> {
        log::info!("speech: {}", text);
        Ok(())
    }
}

/// Text spoken for one detection.
pub fn announcement_text(label: &str, meters: f32) -> String {
    format!(
        "Detected {} at a distance of approximately {:.2} meters",
        label, meters
    )
}

/// Counters shared with announcement threads.
#[derive(Debug, Default)]
struct AnnouncerCounters {
    spawned: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicUsize,
}

/// Snapshot of announcer counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnnouncerStats {
    pub spawned: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: usize,
}

/// Fire-and-forget speech dispatcher.
#[derive(Clone)]
pub struct Announcer {
    engine: Arc<dyn SpeechEngine>,
    max_in_flight: Option<usize>,
    counters: Arc<AnnouncerCounters>,
}

impl Announcer {
    /// Unbounded announcer: every call spawns a thread.
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            max_in_flight: None,
            counters: Arc::new(AnnouncerCounters::default()),
        }
    }

    /// Drop announcements while `max` are still being spoken.
    pub fn with_max_in_flight(mut self, max: Option<usize>) -> Self {
        self.max_in_flight = max;
        self
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Speak `text` on a new thread. Returns false when the announcement was
    /// dropped because of the in-flight cap or a failed thread spawn.
    pub fn announce(&self, text: String) -> bool {
        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = self.max_in_flight {
            if in_flight >= max {
                self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("announcement dropped ({} in flight): {}", in_flight, text);
                return false;
            }
        }

        let engine = Arc::clone(&self.engine);
        let counters = Arc::clone(&self.counters);
        let spawned = thread::Builder::new()
            .name("announce".to_string())
            .spawn(move || {
                match engine.speak(&text) {
                    Ok(()) => {
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        log::warn!("announcement failed: {:#}", err);
                    }
                }
                counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            });

        match spawned {
            Ok(_) => {
                self.counters.spawned.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(err) => {
                self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("could not spawn announcement thread: {}", err);
                false
            }
        }
    }

    pub fn stats(&self) -> AnnouncerStats {
        AnnouncerStats {
            spawned: self.counters.spawned.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
        }
    }
}
