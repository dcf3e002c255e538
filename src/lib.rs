//! Room assignment and scheduling core for multi-branch clinics.
//!
//! Providers claim rooms through weekly recurring assignments; the engine
//! keeps those claims free of overlaps, carries room and provider state
//! changes onto them, and turns them into bookable start times.

pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod tenant;

pub use config::{EngineConfig, ReactivationPolicy, SlotBoundary};
pub use engine::{Engine, EngineError};
pub use tenant::TenantManager;
