//! CyberGuard - live security threat dashboard and audit reports.
//!
//! # Overview
//!
//! CyberGuard consumes threat records produced by an external detection
//! backend. It merges the backend's bulk snapshot with a stream of pushed
//! live events into one ordered timeline with aggregate counters, and renders
//! any subset of that timeline into paginated PDF reports.
//!
//! # Producer Trust
//!
//! The detection backend is opaque and its records are read-only here.
//! Malformed or partial records are accepted and rendered with placeholders;
//! they never fail reconciliation or rendering.
//!
//! # Modules
//!
//! - [`model`]: Threat records, severity levels and wire envelopes
//! - [`reconciler`]: Snapshot and live-event reconciliation
//! - [`report`]: Incident and audit report layout, PDF output
//! - [`feed`]: The single-consumer live feed
//! - [`dashboard`]: Dashboard and history views
//! - [`backend`]: Detection backend client
//! - [`storage`]: SQLite report archive
//! - [`api`]: HTTP API handlers
//! - [`config`]: Environment configuration
//! - [`error`]: Error types

pub mod api;
pub mod backend;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod feed;
pub mod model;
pub mod reconciler;
pub mod report;
pub mod storage;
