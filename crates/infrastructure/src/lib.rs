//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_audit_repository;
mod in_memory_security_repository;
mod in_memory_task_repository;
mod postgres_audit_repository;
mod postgres_security_repository;
mod postgres_task_repository;

#[cfg(test)]
mod postgres_test_support;

pub use in_memory_audit_repository::InMemoryAuditRepository;
pub use in_memory_security_repository::InMemorySecurityRepository;
pub use in_memory_task_repository::InMemoryTaskRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_security_repository::PostgresSecurityRepository;
pub use postgres_task_repository::PostgresTaskRepository;
