//! Repository layer (C1 Journey Model plus the thin reference-data repos it
//! depends on). Each repo wraps a cloned `DbConn` handle (SurrealDB
//! connections are cheap to clone — they are a handle onto a shared
//! session) and speaks raw SurrealQL, following the teacher's style in
//! `api/service.rs` and `db.rs` rather than the typed CRUD builder methods.

pub mod area;
pub mod courier;
pub mod journey;
pub mod sme;
pub mod warehouse;

pub use area::AreaRepo;
pub use courier::CourierRepo;
pub use journey::JourneyRepo;
pub use sme::SmeRepo;
pub use warehouse::WarehouseRepo;
