//! Ripple Core
//!
//! This crate provides a fine-grained reactive engine. It implements:
//!
//! - Tracked objects with automatic dependency collection
//! - Effects with branch-aware cleanup, lazy runs and custom scheduling
//! - Cached computed cells
//! - Refs and watchers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `config`: Engine configuration
//! - `error`: Error types shared by the fallible operations
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{Object, Runtime};
//!
//! let runtime = Runtime::new();
//! let state = runtime.reactive(Object::new().with("count", 0));
//!
//! // Create a derived value
//! let s = state.clone();
//! let doubled = runtime.computed(move || s.get("count").as_i64().unwrap_or(0) * 2);
//!
//! // Create an effect
//! let (s, d) = (state.clone(), doubled.clone());
//! let _effect = runtime.effect(move || {
//!     println!("Count: {:?}, Doubled: {}", s.get("count"), d.get());
//! });
//!
//! // Update the field
//! state.set("count", 5)?;
//! // Effect automatically runs, prints: "Count: Int(5), Doubled: 10"
//! assert_eq!(doubled.get(), 10);
//! # Ok::<(), ripple_core::ReactiveError>(())
//! ```

pub mod config;
pub mod error;
pub mod reactive;

pub use config::EngineConfig;
pub use error::{ReactiveError, Result};
