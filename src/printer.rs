//! Periodic terminal summaries of the event stream. Each key's latency
//! window is a capped `VecDeque`, kept small so the rolling average stays
//! cheap to recompute on every print tick.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use clap::ValueEnum;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::event::Event;

const LATENCY_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PrintMode {
    Table,
    Log,
}

#[derive(Default)]
struct Stats {
    counts: HashMap<String, u64>,
    errors: HashMap<String, u64>,
    latencies: HashMap<String, VecDeque<Duration>>,
}

impl Stats {
    fn record(&mut self, event: &Event) {
        let key = format!("{}:{}", event.workflow, event.name);

        if event.is_err() {
            *self.errors.entry(key.clone()).or_insert(0) += 1;
        } else {
            *self.counts.entry(key.clone()).or_insert(0) += 1;
        }

        let window = self.latencies.entry(key).or_default();
        window.push_back(event.duration);
        if window.len() > LATENCY_WINDOW {
            window.pop_front();
        }
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.counts.keys().chain(self.errors.keys()).cloned().collect();
        keys.sort();
        keys.dedup();
        keys
    }

    fn average_latency(&self, key: &str) -> Duration {
        match self.latencies.get(key) {
            Some(window) if !window.is_empty() => window.iter().sum::<Duration>() / window.len() as u32,
            _ => Duration::ZERO,
        }
    }
}

pub struct Printer {
    mode: PrintMode,
    clear: bool,
}

impl Printer {
    pub fn new(mode: PrintMode, clear: bool) -> Self {
        Printer { mode, clear }
    }

    fn clear_screen(&self) {
        if self.clear {
            print!("\x1b[H\x1b[2J");
        }
    }

    fn print(&self, stats: &Stats) {
        self.clear_screen();
        match self.mode {
            PrintMode::Log => self.print_log(stats),
            PrintMode::Table => self.print_table(stats),
        }
    }

    fn print_log(&self, stats: &Stats) {
        for key in stats.keys() {
            if key.starts_with('*') {
                continue;
            }
            tracing::info!(
                key = %key,
                counts = stats.counts.get(&key).copied().unwrap_or(0),
                errors = stats.errors.get(&key).copied().unwrap_or(0),
                avg_latency = ?stats.average_latency(&key),
            );
        }
    }

    fn print_table(&self, stats: &Stats) {
        println!("Setup queries");
        println!("=============\n");
        print_section(stats, |k| k.starts_with('*'));

        println!("\nQueries");
        println!("=======\n");
        print_section(stats, |k| !k.starts_with('*'));
    }

    /// Emits the whole config, one block per workflow, for `--dry-run`
    /// inspection before any query runs.
    pub fn print_config(&self, config: &Config) {
        self.clear_screen();
        for (name, workflow) in &config.workflows {
            tracing::info!("workflow: {name}");
            tracing::info!("\tvus: {}", workflow.vus);

            tracing::info!("\tsetup queries:");
            for query in &workflow.setup_queries {
                tracing::info!("\t\t- {query}");
            }

            tracing::info!("\tworkflow queries:");
            for query in &workflow.queries {
                tracing::info!("\t\t- {} ({})", query.name, query.rate);
            }
        }
    }
}

fn print_section(stats: &Stats, filter: impl Fn(&str) -> bool) {
    println!("Query\tRequests\tErrors\tAverage Latency");
    println!("-----\t--------\t------\t---------------");

    for key in stats.keys().into_iter().filter(|k| filter(k)) {
        let counts = stats.counts.get(&key).copied().unwrap_or(0);
        let errors = stats.errors.get(&key).copied().unwrap_or(0);
        let avg = stats.average_latency(&key);
        println!("{}\t{counts}\t{errors}\t{:?}", key.trim_start_matches('*'), avg);
    }
}

/// Drains `events`, accumulating per-key stats, and prints a fresh summary
/// on every tick.
pub async fn run(printer: Printer, mut events: mpsc::Receiver<Event>, interval: Duration) {
    let mut stats = Stats::default();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => stats.record(&event),
                    None => break,
                }
            }
            _ = ticker.tick() => {
                printer.print(&stats);
            }
        }
    }
}
