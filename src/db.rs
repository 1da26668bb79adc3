pub mod user_repo;
pub use user_repo::UserRepository;
pub mod tenancy_repo;
pub use tenancy_repo::TenantRepository;
pub mod contract_repo;
pub use contract_repo::ContractRepository;
pub mod approval_repo;
pub use approval_repo::ApprovalRepository;
pub mod sequence_repo;
pub use sequence_repo::SequenceRepository;
pub mod attachment_repo;
pub use attachment_repo::AttachmentRepository;
pub mod audit_repo;
pub use audit_repo::AuditRepository;
