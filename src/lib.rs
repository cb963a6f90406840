//! # Conveyor
//!
//! A continuous-integration pipeline compiler, usable both as a
//! standalone server and as a library.
//!
//! The compiler turns a declarative pipeline configuration into a fully
//! resolved build graph in four phases: parse, template expansion,
//! environment substitution, and validation. Compiled configurations
//! are persisted compressed, keyed by repository and revision.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use conveyor::compiler::{Compiler, MemoryRegistry, Registry};
//!
//! let compiler = Compiler::new(Registry::Memory(MemoryRegistry::default()))
//!     .with_repo("octocat", "app")
//!     .with_ref("main");
//!
//! let mut doc = compiler.parse(raw_config)?;
//! compiler.expand_pipeline(&mut doc, true).await?;
//! compiler.validate(&doc)?;
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;
