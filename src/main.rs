//! Shipwreck Match Server
//!
//! Runs a scripted demo match through the full service stack and logs
//! every published message.

use std::sync::Arc;
use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use shipwreck::{
    GameService, Player, Position, ServerConfig, VERSION,
    game::{rules::FuelAction, task::{Task, TaskBehavior}},
    network::{BroadcastSink, ChannelSink, LogSink},
};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid SHIPWRECK_* configuration")?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("invalid log filter")?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Shipwreck Server v{}", VERSION);
    info!(
        "Match: {}s, fuel cycle {}s, {} players minimum",
        config.match_config.match_duration_seconds,
        config.match_config.fuel_window_cycle_seconds,
        config.match_config.min_players,
    );

    // Transports would subscribe here; the demo just logs what they would receive
    let sink = ChannelSink::new(config.broadcast_capacity);
    let mut rx = sink.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => LogSink.publish(&envelope.code, envelope.message),
                Err(RecvError::Lagged(skipped)) => warn!("Log consumer skipped {} messages", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let service = GameService::new(&config, Arc::new(sink));
    service.start_cleanup_loop().await;
    demo_match(&service).await?;

    let removed = service.cleanup_finished().await;
    info!("Cleanup removed {} finished matches", removed);

    service.shutdown().await;
    drop(service);
    logger.await.context("log consumer panicked")?;
    Ok(())
}

/// Play a short match: lobby, start, a task, a meeting and an elimination.
async fn demo_match(service: &GameService) -> anyhow::Result<()> {
    info!("=== Starting Demo Match ===");

    let names = ["ana", "ben", "cai", "dia", "eli"];
    let players: Vec<Player> = names
        .iter()
        .enumerate()
        .map(|(i, name)| Player::new(i as u64 + 1, *name, format!("skin-{}", i), Position::ORIGIN))
        .collect();

    let handle = service.create_match(players[0].clone()).await;
    info!("Match code: {}", handle.code);
    for player in &players[1..] {
        service.join_match(&handle.code, player.clone()).await?;
    }
    service.start_match(&handle.code, names[0]).await?;

    let (infiltrator, humans, repair, npc) = {
        let state = handle.state.read().await;
        let infiltrator = state
            .infiltrator()
            .map(|p| p.username.clone())
            .context("match started without an infiltrator")?;
        let humans: Vec<String> = state
            .players()
            .iter()
            .filter(|p| p.is_alive_human())
            .map(|p| p.username.clone())
            .collect();
        let repair = state
            .tasks()
            .iter()
            .find(|t| matches!(t, Task::Progress(_)))
            .map(|t| t.id());
        let npc = state.npcs().first().map(|n| n.id);
        (infiltrator, humans, repair, npc)
    };
    info!("{} humans against one infiltrator", humans.len());

    if let Some(task) = repair {
        service.start_task(&handle.code, &humans[0], task).await?;
        service.progress_task(&handle.code, &humans[0], task, 60).await?;
        service.progress_task(&handle.code, &humans[1], task, 60).await?;
    }

    // The window is closed during the first cycle
    if let Err(e) = service.modify_fuel(&handle.code, &humans[0], FuelAction::Fill, None).await {
        warn!("Fuel rejected: {}", e);
    }

    if let Some(npc) = npc {
        service.start_vote(&handle.code, &humans[0]).await?;
        service.send_chat(&handle.code, &humans[1], "I saw that one by the boat").await?;
        for voter in &humans {
            if let Some(result) = service.submit_vote(&handle.code, voter, npc).await? {
                info!("Verdict: {}", result.message);
            }
        }
    }

    let target = handle
        .state
        .read()
        .await
        .player_by_username(&humans[0])
        .map(|p| p.id)
        .context("missing player")?;
    match service.eliminate(&handle.code, &infiltrator, target).await {
        Ok(e) => info!("Player {} eliminated", e.target_id),
        Err(e) => warn!("Elimination rejected: {}", e),
    }

    service.end_match(&handle.code).await?;
    let snapshot = service.snapshot(&handle.code).await?;
    info!("=== Match Results ===");
    info!("{}", snapshot.winner_message.unwrap_or_default());
    info!("Fuel: {:.0}%, {}s left", snapshot.fuel_percentage, snapshot.timer_seconds);
    Ok(())
}
