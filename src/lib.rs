//! datapulse - Live Analytics Dashboard
//!
//! Simulated research, clinical and integration datasets kept in memory,
//! refreshed by a periodic live tick and filtered per open view.

pub mod config;
pub mod data;
pub mod scheduler;
pub mod view;
pub mod web;
