//! Domain services used by HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own session resolution, gating, and account logic so
//! route handlers can stay focused on protocol translation and rendering.

pub mod account;
pub mod gate;
pub mod guides;
pub mod session;
