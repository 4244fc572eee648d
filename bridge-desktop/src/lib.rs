//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FileSystemAccess` using `tokio::fs`
//! - `LibraryStore` using a SQLite-backed reference library
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{SqliteLibraryStore, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let fs = TokioFileSystem::new();
//!     let library = SqliteLibraryStore::new(
//!         SqliteLibraryStore::default_database_path(),
//!         "/home/me/Library/storage".into(),
//!     )
//!     .await
//!     .unwrap();
//!
//!     // Hand both to the sync engine
//! }
//! ```

mod filesystem;
mod library;

pub use filesystem::TokioFileSystem;
pub use library::{NewItem, SqliteLibraryStore};
