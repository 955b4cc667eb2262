//! Dispatch engine HTTP server.
//!
//! Boots the database, wires the service graph, mounts the HTTP surface,
//! and spawns the single periodic optimization ticker: no background
//! worker pool other than that one agent task.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use last_mile_dispatch::config::Config;
use last_mile_dispatch::identity::{StaticIdentityService, User};
use last_mile_dispatch::models::ActorRole;
use last_mile_dispatch::notification::LoggingNotificationSink;
use last_mile_dispatch::services::Services;
use last_mile_dispatch::{api, db};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .init();

    let config = Config::from_env();
    let db = db::connect(&config.db_path).await?;
    db::init_schema(&db).await?;

    // Identity/notification providers are out of scope; these stand-ins
    // keep every request attributed to a single warehouse-staff actor until
    // a real IdentityService is wired in.
    let identity = Arc::new(StaticIdentityService {
        user: User {
            user_id: "staff-demo".to_string(),
            role: ActorRole::WarehouseStaff,
            sme_id: None,
        },
    });
    let notifications = Arc::new(LoggingNotificationSink);

    let services = Arc::new(Services::build(db, config, identity, notifications));

    let tick_interval = Duration::from_secs(services.config.agent_tick_interval_secs);
    let ticker_agent = services.agent.clone();
    let ticker_journeys = services.journeys.clone();
    let ticker_warehouses = services.warehouses.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        loop {
            interval.tick().await;
            match ticker_agent.run_tick().await {
                Ok(report) => tracing::info!(
                    areas = report.phase_one.len(),
                    "optimization tick completed"
                ),
                Err(err) => tracing::error!(error = %err, "optimization tick failed"),
            }

            // Warehouse current_load sync: the sole writer of this
            // column, run alongside the agent tick rather than as a second
            // background task.
            match ticker_journeys.count_completed_pickups_by_warehouse().await {
                Ok(counts) => {
                    if let Err(err) = ticker_warehouses.sync_current_load(&counts).await {
                        tracing::error!(error = %err, "warehouse load sync failed");
                    }
                }
                Err(err) => tracing::error!(error = %err, "warehouse load sync query failed"),
            }
        }
    });

    let port = services.config.http_port;
    let app = api::router(services);
    let addr = format!("0.0.0.0:{port}");
    tracing::info!(%addr, "starting dispatch engine server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
