//! Constructor-injected service graph: no implicit global singletons, every
//! component receives its collaborators through its constructor.
//! Binaries build one [`Services`] at startup and share it behind an
//! `Arc` with every HTTP handler and the optimization ticker.

use std::sync::Arc;

use crate::config::Config;
use crate::db::DbConn;
use crate::dispatch::Dispatcher;
use crate::identity::IdentityService;
use crate::incident::IncidentHandler;
use crate::lock::LockTable;
use crate::notification::NotificationSink;
use crate::repo::{AreaRepo, CourierRepo, JourneyRepo, SmeRepo, WarehouseRepo};
use crate::routing::{FakeRoutingProvider, HttpRoutingProvider, RoutingGateway};
use crate::scan::ScanStateMachine;
use crate::agent::OptimizationAgent;

pub struct Services {
    pub config: Config,
    pub areas: AreaRepo,
    pub warehouses: WarehouseRepo,
    pub sme: SmeRepo,
    pub couriers: CourierRepo,
    pub journeys: JourneyRepo,
    pub gateway: Arc<RoutingGateway>,
    pub identity: Arc<dyn IdentityService>,
    pub notifications: Arc<dyn NotificationSink>,
    pub dispatcher: Arc<Dispatcher>,
    pub scans: Arc<ScanStateMachine>,
    pub incidents: Arc<IncidentHandler>,
    pub agent: Arc<OptimizationAgent>,
}

impl Services {
    /// Wires every component from a database connection and the process
    /// config, following the teacher's `build_app_state` constructor shape
    /// in `api/service.rs`.
    pub fn build(
        db: DbConn,
        config: Config,
        identity: Arc<dyn IdentityService>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        let areas = AreaRepo::new(db.clone());
        let warehouses = WarehouseRepo::new(db.clone());
        let sme = SmeRepo::new(db.clone());
        let couriers = CourierRepo::new(db.clone());
        let journeys = JourneyRepo::new(db.clone());
        let locks = LockTable::new();

        let provider = match HttpRoutingProvider::from_config(&config) {
            Ok(Some(provider)) => Arc::new(provider) as Arc<dyn crate::routing::RoutingProvider>,
            Ok(None) => {
                tracing::warn!("ROUTING_PROVIDER_BASE_URL not set, using haversine-only fallback provider");
                Arc::new(FakeRoutingProvider::default()) as Arc<dyn crate::routing::RoutingProvider>
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to build routing provider, falling back to haversine-only");
                Arc::new(FakeRoutingProvider::default()) as Arc<dyn crate::routing::RoutingProvider>
            }
        };
        let gateway = Arc::new(RoutingGateway::new(provider));

        let dispatcher = Arc::new(Dispatcher::new(
            journeys.clone(),
            warehouses.clone(),
            couriers.clone(),
            sme.clone(),
            gateway.clone(),
            locks.clone(),
        ));
        let scans = Arc::new(ScanStateMachine::new(
            journeys.clone(),
            couriers.clone(),
            notifications.clone(),
            locks.clone(),
        ));
        let incidents = Arc::new(IncidentHandler::new(journeys.clone(), couriers.clone(), locks.clone()));
        let agent = Arc::new(OptimizationAgent::new(
            areas.clone(),
            warehouses.clone(),
            couriers.clone(),
            journeys.clone(),
            gateway.clone(),
            dispatcher.clone(),
            incidents.clone(),
        ));

        Self {
            config,
            areas,
            warehouses,
            sme,
            couriers,
            journeys,
            gateway,
            identity,
            notifications,
            dispatcher,
            scans,
            incidents,
            agent,
        }
    }
}
