pub mod actor;
pub mod application;
pub mod fleet;
pub mod location;
pub mod shipment;
