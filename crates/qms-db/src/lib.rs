//! # qms-db
//!
//! Database layer for QMS RS.
//!
//! This crate provides PostgreSQL access using SQLx, including:
//!
//! - Connection pool management and embedded migrations
//! - Store traits per aggregate with PostgreSQL repositories
//! - An in-memory store implementing the same traits
//!
//! ## Example
//!
//! ```ignore
//! use qms_db::{Database, DatabaseConfig, Stores};
//!
//! let db = Database::connect(&DatabaseConfig::with_url(url)).await?;
//! db.migrate().await?;
//!
//! let stores = Stores::postgres(db.pool().clone());
//! let overdue = stores.tasks.mark_overdue(today).await?;
//! ```

use sqlx::PgPool;
use std::sync::Arc;

pub mod accounts;
pub mod documents;
pub mod memory;
pub mod members;
pub mod otp;
pub mod pool;
pub mod quality;
pub mod reports;
pub mod repository;
pub mod store;
pub mod tasks;

// Re-exports
pub use accounts::{AccountApprovalRepository, AccountApprovalRow};
pub use documents::{DocumentRepository, DocumentRow, HierarchyRow, RevisionRow};
pub use memory::MemoryStore;
pub use members::{DepartmentRepository, DepartmentRow, TeamMemberRepository, TeamMemberRow};
pub use otp::{OtpCodeRepository, OtpCodeRow};
pub use pool::{Database, DatabaseConfig, PoolStats};
pub use quality::{AuditRepository, AuditRow, NonConformanceRepository, NonConformanceRow};
pub use reports::{DashboardStats, DepartmentTaskCount, ReportRepository, TableCount};
pub use repository::{Repository, RepositoryError, RepositoryResult};
pub use store::*;
pub use tasks::{TaskRepository, TaskRow};

/// Every store the services need, behind trait objects
#[derive(Clone)]
pub struct Stores {
    pub tasks: Arc<dyn TaskStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub otp: Arc<dyn OtpStore>,
    pub members: Arc<dyn MemberStore>,
    pub departments: Arc<dyn DepartmentStore>,
    pub audits: Arc<dyn AuditStore>,
    pub non_conformances: Arc<dyn NonConformanceStore>,
    pub reports: Arc<dyn ReportStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            tasks: Arc::new(TaskRepository::new(pool.clone())),
            documents: Arc::new(DocumentRepository::new(pool.clone())),
            accounts: Arc::new(AccountApprovalRepository::new(pool.clone())),
            otp: Arc::new(OtpCodeRepository::new(pool.clone())),
            members: Arc::new(TeamMemberRepository::new(pool.clone())),
            departments: Arc::new(DepartmentRepository::new(pool.clone())),
            audits: Arc::new(AuditRepository::new(pool.clone())),
            non_conformances: Arc::new(NonConformanceRepository::new(pool.clone())),
            reports: Arc::new(ReportRepository::new(pool)),
        }
    }

    /// All stores backed by one shared in-memory state
    pub fn memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    pub fn from_memory(store: MemoryStore) -> Self {
        Self {
            tasks: Arc::new(store.clone()),
            documents: Arc::new(store.clone()),
            accounts: Arc::new(store.clone()),
            otp: Arc::new(store.clone()),
            members: Arc::new(store.clone()),
            departments: Arc::new(store.clone()),
            audits: Arc::new(store.clone()),
            non_conformances: Arc::new(store.clone()),
            reports: Arc::new(store),
        }
    }
}
