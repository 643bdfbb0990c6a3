pub mod execution_repository;
pub mod memory;
pub mod postgres_execution_repository;
pub mod postgres_usage_repository;
pub mod usage_repository;
