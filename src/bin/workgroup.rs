//! workgroup CLI: fan-out, chaining, and a comparison against a
//! hand-rolled tokio pool.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tracing::info;
use workgroup::telemetry::{TelemetryConfig, init_telemetry};
use workgroup::{Generator, Options, Sink, Source, Summary, WorkGroup};

#[derive(Parser)]
#[command(name = "workgroup", about = "Composable worker pools")]
struct Cli {
    /// Print group summaries as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fan a generator of integers out to a pool of workers
    FanOut {
        /// Number of workers (0 = one per CPU)
        #[arg(long, default_value_t = 0)]
        workers: usize,
        /// Number of items to generate
        #[arg(long, default_value_t = 100)]
        items: u64,
        /// Upper bound on the simulated per-item work
        #[arg(long, default_value_t = 1000)]
        max_delay_ms: u64,
    },
    /// Run the workgroup version and a hand-rolled pool side by side
    Compare {
        #[arg(long, default_value_t = 0)]
        workers: usize,
        #[arg(long, default_value_t = 100)]
        items: u64,
        #[arg(long, default_value_t = 1000)]
        max_delay_ms: u64,
    },
    /// Fan out, then fan the results back in to a running sum
    Chain {
        #[arg(long, default_value_t = 8)]
        workers: usize,
        #[arg(long, default_value_t = 100)]
        items: u64,
        #[arg(long, default_value_t = 100)]
        max_delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _guard = init_telemetry(TelemetryConfig::from_env())?;

    match cli.command {
        Command::FanOut {
            workers,
            items,
            max_delay_ms,
        } => {
            let summary = using_workgroup(workers, items, max_delay_ms).await?;
            report(cli.json, &summary)?;
        }
        Command::Compare {
            workers,
            items,
            max_delay_ms,
        } => {
            let (grouped, hand_rolled) = tokio::join!(
                using_workgroup(workers, items, max_delay_ms),
                using_hand_rolled_pool(workers, items, max_delay_ms),
            );
            let grouped = grouped?;
            report(cli.json, &grouped)?;
            println!(
                "workgroup: {:?}  hand-rolled: {:?}",
                grouped.elapsed, hand_rolled
            );
        }
        Command::Chain {
            workers,
            items,
            max_delay_ms,
        } => {
            let (summary, total) = chained(workers, items, max_delay_ms).await?;
            report(cli.json, &summary)?;
            println!("sum of 0..{items} = {total}");
        }
    }

    Ok(())
}

fn report(json: bool, summary: &Summary) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!(
            "{}: {} received, {} processed, {} panicked, {} idle timeouts in {:?}",
            summary.group,
            summary.received,
            summary.processed,
            summary.panicked,
            summary.idle_timeouts,
            summary.elapsed
        );
    }
    Ok(())
}

/// Deterministic stand-in for random per-item work.
fn simulated_work(item: u64, max_delay_ms: u64) -> Duration {
    if max_delay_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(item.wrapping_mul(2_654_435_761) % max_delay_ms)
}

fn numbers(items: u64) -> impl Source<u64> {
    Generator::new(move |sink: Sink<u64>| async move {
        for i in 0..items {
            if !sink.send(i).await {
                break;
            }
        }
    })
}

async fn using_workgroup(
    workers: usize,
    items: u64,
    max_delay_ms: u64,
) -> anyhow::Result<Summary> {
    let group = WorkGroup::<u64>::new(Options::workers(workers).name("demo"));
    group.drain(numbers(items))?.with(move |worker, item: u64| async move {
        tokio::time::sleep(simulated_work(item, max_delay_ms)).await;
        info!(worker, item, "workgroup handled work");
    })?;
    Ok(group.start().await?)
}

/// The same job written directly against tokio primitives.
async fn using_hand_rolled_pool(workers: usize, items: u64, max_delay_ms: u64) -> Duration {
    let started = Instant::now();
    let workers = if workers == 0 { num_cpus::get() } else { workers };
    let (tx, rx) = mpsc::channel::<u64>(1);
    let rx = Arc::new(Mutex::new(rx));

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let rx = Arc::clone(&rx);
        handles.push(tokio::spawn(async move {
            loop {
                let next = rx.lock().await.recv().await;
                let Some(item) = next else { break };
                tokio::time::sleep(simulated_work(item, max_delay_ms)).await;
                info!(worker, item, "hand-rolled pool handled work");
            }
        }));
    }

    for i in 0..items {
        if tx.send(i).await.is_err() {
            break;
        }
    }
    drop(tx);

    for handle in handles {
        let _ = handle.await;
    }
    started.elapsed()
}

async fn chained(
    workers: usize,
    items: u64,
    max_delay_ms: u64,
) -> anyhow::Result<(Summary, u64)> {
    let fan_out = WorkGroup::<u64>::fan_out_named(workers, "fan-out");
    fan_out
        .drain(numbers(items))?
        .with(move |worker, item: u64| async move {
            tokio::time::sleep(simulated_work(item, max_delay_ms)).await;
            info!(worker, item, "fan-out done");
        })?;

    let total = Arc::new(AtomicU64::new(0));
    let sum = Arc::clone(&total);
    let fan_in = WorkGroup::<u64>::fan_in_with(Options::default().name("fan-in"));
    fan_in.drain(fan_out)?.with(move |_, item: u64| {
        let sum = Arc::clone(&sum);
        async move {
            let running = sum.fetch_add(item, Ordering::Relaxed) + item;
            info!(item, running, "fan-in done");
        }
    })?;

    let summary = fan_in.start().await?;
    Ok((summary, total.load(Ordering::Relaxed)))
}
