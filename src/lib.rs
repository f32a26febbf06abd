//! A self-describing, step-indexed storage engine for large distributed multidimensional arrays.
//!
//! A producer declares typed variables (globally shaped arrays decomposed into per-contributor blocks, local arrays, or single values) in a [`Catalog`](catalog::Catalog),
//! optionally attaches [operators](operator) that transform each block's bytes (e.g. compression), and writes successive *steps* through a write-mode [`Engine`](engine::Engine).
//! A consumer opens a read-mode [`Engine`](engine::Engine) over the same [transport](transport), discovers the variables, selects an arbitrary rectangular region and reads it back.
//! Operators are inverted transparently on read.
//!
//! ## Example
//! ```rust
//! # use std::sync::Arc;
//! use steparray::{
//!     catalog::Catalog,
//!     engine::{Engine, StepStatus},
//!     operator::OperatorRegistry,
//!     transport::memory::MemoryTransport,
//! };
//!
//! let registry = Arc::new(OperatorRegistry::with_builtin());
//! let transport = Arc::new(MemoryTransport::new());
//!
//! let mut catalog = Catalog::new(registry.clone());
//! let floats = catalog.define_variable::<f32>("floats", &[10], &[0], &[10], true)?;
//! let mut writer = Engine::new_writer(catalog, transport.clone());
//! writer.open()?;
//! writer.begin_step()?;
//! writer.put(&floats, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0])?;
//! writer.end_step()?;
//! writer.close()?;
//!
//! let mut reader = Engine::new_reader(Catalog::new(registry), transport);
//! reader.open()?;
//! assert_eq!(reader.begin_step()?, StepStatus::Ok);
//! let floats = reader.catalog().inquire_variable::<f32>("floats")?.unwrap();
//! let mut values = Vec::new();
//! reader.get(&floats, &mut values)?;
//! reader.end_step()?;
//! assert_eq!(values[9], 9.0);
//! assert_eq!(reader.begin_step()?, StepStatus::EndOfStream);
//! reader.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - Operators: `bitround`, `gzip`, `png`, `zstd`.
//!
//! The `shuffle` and `crc32c` operators are always available.
//!
//! ## Licence
//! `steparray` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod array_subset;
pub mod catalog;
pub mod config;
pub mod data_type;
pub mod engine;
pub mod operator;
pub mod shape;
pub mod transport;
