// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Safe handles over the DAOS distributed filesystem (DFS) client.
//!
//! The native client hands out opaque pointers and reports every failure as an integer code.
//! This crate wraps both in owned, typed values:
//!
//! 1. **Sessions.** A [`Namespace`] is a live attachment to a (pool, container) pair, created by
//!    [`Namespace::mount`] or [`Namespace::connect`] and closed by [`Namespace::unmount`] or
//!    [`Namespace::disconnect`]. A namespace cannot be closed while objects opened from it are
//!    still open.
//!
//! 2. **Objects.** An [`Object`] is an open entity (regular, directory or symlink) inside a
//!    namespace, produced by [`Namespace::open`] from a set of [`OpenParams`]. Objects are
//!    released exactly once, explicitly or on drop.
//!
//! 3. **Scatter-gather I/O.** Reads deposit bytes into an [`SgList`] of caller buffers, in
//!    order, without copying. The list borrows the buffers for the duration of the call.
//!    [`Object::read_async`] takes ownership of its buffers instead and returns them on
//!    completion, so no borrow has to outlive a future.
//!
//! 4. **Errors.** Every backend code is translated once, by [`translate`], into an [`Error`]
//!    carrying an [`ErrorKind`], the raw code and the failed operation.
//!
//! # Quick start
//!
//! ```no_run
//! use dfs::{EntityKind, Namespace, OpenParams, SgList};
//!
//! let ns = Namespace::mount("pool-A", "cont-1")?;
//!
//! let mut params = OpenParams::new("data");
//! params.kind(EntityKind::Directory);
//! let mut dir = ns.open(None, &params)?;
//!
//! let mut params = OpenParams::new("hello.txt");
//! params.read(true);
//! let mut file = ns.open(Some(&dir), &params)?;
//!
//! let mut buf = vec![0_u8; 4096];
//! let n = file.read(&mut SgList::from(buf.as_mut_slice()), 0, 4096)?;
//! println!("{}", String::from_utf8_lossy(&buf[..n]));
//!
//! file.release()?;
//! dir.release()?;
//! ns.unmount()?;
//! # Ok::<(), dfs::Error>(())
//! ```
//!
//! # Backends
//!
//! With the `native` feature, the crate links `libdaos` and `libdfs`. Without it, every
//! operation fails with [`ErrorKind::Unsupported`], which keeps dependent crates buildable on
//! hosts without a DAOS installation.
//!
//! The `fakes` feature adds [`fake::FakeDfs`], an in-memory backend with failure injection,
//! and the `*_fake` constructors on [`Namespace`].
//!
//! # Logging
//!
//! Lifecycle transitions are emitted as `tracing` events at `debug` level. Failures that cannot
//! be returned, such as a release that fails while an [`Object`] is dropped, are emitted at
//! `warn` level.

pub mod bindings;
pub mod sys;

mod connect_options;
mod dispatcher;
mod error;
mod marshal;
mod namespace;
mod object;
mod open_params;

#[cfg(any(test, feature = "fakes"))]
pub mod fake;

pub use bindings::{Bindings, NativeBindings, RawEvent, RawNamespace, RawObject};
pub use connect_options::{ConnectOptions, ConsistencyMode, ContainerAttributes};
pub use error::{Error, ErrorKind, Result, kind_of, translate};
pub use marshal::SgList;
pub use namespace::Namespace;
pub use object::Object;
pub use open_params::{EntityKind, ObjectClass, OpenFlags, OpenParams};
