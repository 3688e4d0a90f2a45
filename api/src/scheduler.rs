use crate::state::AppState;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawns the periodic batch runner. Each tick runs the deadline monitor,
/// both scrapers and the gazette change check; a failing job is logged and
/// retried on the next tick.
pub fn spawn(state: AppState, every: Duration) -> JoinHandle<()> {
    log::info!("Scheduler enabled, running jobs every {}s", every.as_secs());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            run_once(&state).await;
        }
    })
}

pub async fn run_once(state: &AppState) {
    match state.deadline_monitor().run(Utc::now().date_naive()).await {
        Ok(report) => log::info!("Deadline monitor: {}", report.message),
        Err(e) => log::error!("Deadline monitor failed: {:#}", e),
    }

    match state.gaceta_scraper().run().await {
        Ok(run) => log::info!("Gaceta scraper: {}", run.message),
        Err(e) => log::error!("Gaceta scraper failed: {:#}", e),
    }

    match state.fallo_scraper().run().await {
        Ok(run) => log::info!("Organo Judicial scraper: {}", run.message),
        Err(e) => log::error!("Organo Judicial scraper failed: {:#}", e),
    }

    match state.change_monitor().check_publications().await {
        Ok(check) if check.update_detected => {
            log::info!("Gaceta publications changed ({} found)", check.publications_count)
        }
        Ok(_) => log::info!("No change in Gaceta publications"),
        Err(e) => log::error!("Gaceta change check failed: {:#}", e),
    }
}
