pub mod acceptance;
pub mod fleet;
pub mod gateway;
pub mod lifecycle;
pub mod reconciliation;
pub mod shipment_machine;

#[cfg(test)]
pub(crate) mod testing;
