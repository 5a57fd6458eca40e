//! Watch mode: stay resident and deliver the backlog on reconnect.

use anyhow::{Context, Result};
use mixlite_core::HttpTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::Host;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const TICK: Duration = Duration::from_millis(100);

/// Poll connectivity every `interval` until Ctrl+C.
///
/// Fires the ready trigger once at start and the reconnect trigger on every
/// offline to online transition.
pub fn run(host: &Host, interval: Duration) -> Result<()> {
    // Set up signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let probe = HttpTransport::new(PROBE_TIMEOUT).context("failed to create probe client")?;
    let probe_url = host.client.endpoints().tracking;
    let forced_offline = host.offline;

    println!(
        "Watch mode active (probe every {}s). Press Ctrl+C to stop.",
        interval.as_secs()
    );
    println!();

    host.runtime.block_on(async {
        let mut online = !forced_offline && probe.probe(&probe_url).await;
        host.environment.set_online(online);
        print_transition(online, host.client.pending().len());

        host.client.on_ready();

        while running.load(Ordering::SeqCst) {
            sleep_while(&running, interval).await;
            if !running.load(Ordering::SeqCst) {
                break;
            }

            let now_online = !forced_offline && probe.probe(&probe_url).await;
            host.environment.set_online(now_online);

            if now_online != online {
                print_transition(now_online, host.client.pending().len());
                if now_online {
                    host.client.on_online();
                }
            }
            online = now_online;
        }

        // let an in-flight drain settle before exiting
        if online {
            host.client.flush().await;
        }
    });

    let stats = host.client.stats();
    println!(
        "Delivered {} transaction(s) in {} drain(s); {} pending.",
        stats.delivered,
        stats.drains,
        host.client.pending().len()
    );
    tracing::info!(
        delivered = stats.delivered,
        failed = stats.failed,
        drains = stats.drains,
        "Watch mode stopped"
    );

    Ok(())
}

fn print_transition(online: bool, pending: usize) {
    let timestamp = chrono::Local::now().format("%H:%M:%S");
    if online {
        println!("[{}] Online, delivering {} pending", timestamp, pending);
    } else {
        println!("[{}] Offline, {} pending", timestamp, pending);
    }
}

/// Sleep for `duration` in short ticks so Ctrl+C is honored promptly.
async fn sleep_while(running: &AtomicBool, duration: Duration) {
    let mut remaining = duration;
    while !remaining.is_zero() && running.load(Ordering::SeqCst) {
        let step = remaining.min(TICK);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
}
