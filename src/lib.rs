//! Scholaris - multi-tenant school management
//!
//! One platform database holds the registry of schools, the super-admin
//! accounts and all login sessions. Every school keeps its records in a
//! database of its own, reached through [`tenancy::TenantRouter`].

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod site;
pub mod tenancy;
