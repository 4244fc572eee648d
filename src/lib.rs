//! Workspace placeholder crate.
//!
//! This crate exists to expose a single feature flag that pulls in the sync
//! core together with the desktop bridge adapters (`core-sync`,
//! `bridge-desktop`). Host applications can depend on `pdfsync-workspace`
//! with `desktop-shims` enabled instead of wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
#[cfg(feature = "desktop-shims")]
pub use core_sync;
