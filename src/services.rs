pub mod auth;
pub mod audit_service;
pub mod tenant_guard;
pub mod sequence_service;
pub mod approval_service;
pub mod contract_service;
pub mod attachment_service;

#[cfg(test)]
pub mod testing;
