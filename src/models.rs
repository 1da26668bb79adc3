pub mod auth;
pub mod tenancy;
pub mod contract;
pub mod approval;
pub mod attachment;
pub mod audit;
