mod config;
mod main_lib;

use config::Config;
use main_lib::{build_simulation, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(config.log_format);

    let simulation = build_simulation(&config);
    let logger = simulation.spawn_event_logger();

    tracing::info!(
        "Starting map sync simulation: {} records for {:?}",
        config.record_count,
        config.run_for
    );
    simulation.orchestrator.start().await?;

    let drivers = [
        simulation.spawn_frames(),
        simulation.spawn_gestures(),
        simulation.spawn_user(),
        simulation.spawn_feed(),
    ];

    tokio::select! {
        _ = tokio::time::sleep(config.run_for) => {
            tracing::info!("Simulation time elapsed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
        }
    }

    for driver in &drivers {
        driver.abort();
    }
    simulation.orchestrator.dispose().await;

    let counts = simulation.surface.counts();
    tracing::info!(
        "Surface calls: {} create, {} update, {} delete, {} camera moves",
        counts.create_calls,
        counts.update_calls,
        counts.delete_calls,
        counts.camera_moves
    );

    drop(simulation);
    logger.abort();
    Ok(())
}
