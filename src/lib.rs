//! shelter-reconcile - catalog reconciliation and legacy schema migration
//!
//! Collapses the legacy per-kind catalog tables into one deduplicated
//! `catalogs` table with a species → breed hierarchy, then migrates
//! medications, animals, prescriptions and prescription tasks onto it
//! through a persistent legacy → canonical ID mapping.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod dependents;
pub mod error;
pub mod mapping;
pub mod migrations;
pub mod models;
pub mod normalize;
pub mod services;
pub mod snapshot;
pub mod store;
