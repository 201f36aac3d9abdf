//! Watch command - stream real-time events until interrupted.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use nimbus_realtime::EventKind;

use super::GlobalArgs;

#[derive(Args)]
pub struct WatchArgs {
    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Send a ping every N seconds
    #[arg(long)]
    ping: Option<u64>,
}

const WATCHED: [EventKind; 6] = [
    EventKind::AgentUpdate,
    EventKind::TaskUpdate,
    EventKind::Notification,
    EventKind::Welcome,
    EventKind::Pong,
    EventKind::Error,
];

pub async fn execute(global: &GlobalArgs, args: WatchArgs) -> Result<()> {
    let console = global.console()?;

    for kind in WATCHED {
        console.router().on(kind, |event| {
            println!("📡 [{}] {}", event.kind, event.data);
        });
    }
    console.connection().on_state_change(|state| {
        println!("🔌 connection: {:?}", state);
    });

    console.init().await;
    println!("Watching {} (Ctrl+C to stop)", console.config().ws_url);

    let pinger = args.ping.map(|secs| {
        let connection = console.connection().clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
            loop {
                interval.tick().await;
                // Not connected yet; the next tick retries
                let _ = connection.ping();
            }
        })
    });

    match args.duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    if let Some(pinger) = pinger {
        pinger.abort();
    }
    console.dispose();
    Ok(())
}
