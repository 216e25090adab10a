//! # qms-hrone
//!
//! REST client for the HROne HR system and the mapping between HROne
//! employees/departments and QMS team members/departments.

pub mod client;
pub mod types;

pub use client::{HrOneClient, HrOneError, HrOneResult};
pub use types::{HrDepartment, HrEmployee, HrEmployeePush};
