// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::bindings::{Bindings, BindingsFacade, RawNamespace, RawObject};
use crate::connect_options::ConnectOptions;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, ErrorKind, Result, translate};
#[cfg(any(test, feature = "fakes"))]
use crate::fake::FakeDfs;
use crate::marshal::c_string;
use crate::object::Object;
use crate::open_params::{EntityKind, OpenParams};

/// How a session was attached, which decides how it is detached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Attachment {
    Mounted,
    Connected,
}

#[derive(Clone, Copy, Debug)]
enum State {
    Live(RawNamespace),
    Closed,
}

/// State shared by a [`Namespace`] and every [`Object`] opened from it.
pub(crate) struct Session {
    bindings: BindingsFacade,
    attachment: Attachment,
    state: RwLock<State>,
    open_objects: AtomicUsize,
    dispatcher: OnceLock<Dispatcher>,
    pool: String,
    system: Option<String>,
    container: String,
}

impl Session {
    pub(crate) const fn bindings(&self) -> &BindingsFacade {
        &self.bindings
    }

    /// Workers for the async read path, started on first use.
    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        self.dispatcher.get_or_init(Dispatcher::new)
    }

    pub(crate) fn is_live(&self) -> bool {
        matches!(*self.state.read(), State::Live(_))
    }

    pub(crate) fn object_released(&self) {
        let _ = self.open_objects.fetch_sub(1, Ordering::AcqRel);
    }

    fn identity(&self) -> String {
        match &self.system {
            Some(system) => format!("pool={}, system={system}, container={}", self.pool, self.container),
            None => format!("pool={}, container={}", self.pool, self.container),
        }
    }

    fn teardown(&self, namespace: RawNamespace) -> libc::c_int {
        match self.attachment {
            Attachment::Mounted => self.bindings.umount(namespace),
            Attachment::Connected => self.bindings.disconnect(namespace),
        }
    }

    fn close(&self, operation: &str) -> Result<()> {
        let context = || format!("{operation}: {}", self.identity());

        let mut state = self.state.write();
        let State::Live(namespace) = *state else {
            return Err(Error::invalid_argument(format!("{}: namespace is already closed", context())));
        };

        // Opens hold the read lock while they register, so the count is stable here.
        let outstanding = self.open_objects.load(Ordering::Acquire);
        if outstanding > 0 {
            return Err(Error::busy(format!("{}: {outstanding} objects still open", context())));
        }

        translate(self.teardown(namespace), context)?;
        *state = State::Closed;

        tracing::debug!(pool = %self.pool, container = %self.container, operation, "detached dfs namespace");
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("pool", &self.pool)
            .field("system", &self.system)
            .field("container", &self.container)
            .field("attachment", &self.attachment)
            .field("state", &*self.state.read())
            .field("open_objects", &self.open_objects.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let state = std::mem::replace(self.state.get_mut(), State::Closed);
        if let State::Live(namespace) = state
            && let Err(error) = translate(self.teardown(namespace), || format!("drop: {}", self.identity()))
        {
            tracing::warn!(%error, "failed to detach dfs namespace on drop");
        }
    }
}

/// A live attachment to one container of a DAOS pool.
///
/// A namespace is created by [`mount`](Self::mount) or [`connect`](Self::connect) and produces
/// [`Object`] handles through [`open`](Self::open). It is a cheap, cloneable handle: all clones
/// refer to the same attachment and can be used concurrently from multiple threads.
///
/// # Lifecycle
///
/// A namespace is either live or closed. [`unmount`](Self::unmount) (or its alias
/// [`disconnect`](Self::disconnect)) closes it, which fails with
/// [`Busy`](ErrorKind::Busy) while objects opened from it are still open. Once closed it is
/// never reopened and every further operation fails with
/// [`InvalidArgument`](ErrorKind::InvalidArgument).
///
/// If the last clone and the last object are dropped while the namespace is still live, it is
/// closed automatically. Failures on that path can only be logged.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Clone)]
pub struct Namespace {
    session: Arc<Session>,
}

impl Namespace {
    /// Attaches to an existing container using the default system.
    ///
    /// # Errors
    ///
    /// [`NotFound`](ErrorKind::NotFound) if the pool or container does not resolve,
    /// [`PermissionDenied`](ErrorKind::PermissionDenied) if access is refused, or another kind
    /// for any other backend failure.
    pub fn mount(pool: &str, container: &str) -> Result<Self> {
        Self::mount_with(BindingsFacade::native(), pool, container)
    }

    /// Attaches to a container of an explicit system, optionally creating it.
    ///
    /// `system` of `None` selects the default system. The container is created with the
    /// attributes of `options` if it does not exist and `options` requests creation.
    ///
    /// # Errors
    ///
    /// As for [`mount`](Self::mount); attribute validation failures are
    /// [`InvalidArgument`](ErrorKind::InvalidArgument).
    pub fn connect(pool: &str, system: Option<&str>, container: &str, options: &ConnectOptions) -> Result<Self> {
        Self::connect_with(BindingsFacade::native(), pool, system, container, options)
    }

    /// Like [`mount`](Self::mount), against an in-memory backend.
    ///
    /// # Errors
    ///
    /// As for [`mount`](Self::mount).
    #[cfg(any(test, feature = "fakes"))]
    pub fn mount_fake(fake: &Arc<FakeDfs>, pool: &str, container: &str) -> Result<Self> {
        Self::mount_with(BindingsFacade::from_fake(Arc::clone(fake)), pool, container)
    }

    /// Like [`connect`](Self::connect), against an in-memory backend.
    ///
    /// # Errors
    ///
    /// As for [`connect`](Self::connect).
    #[cfg(any(test, feature = "fakes"))]
    pub fn connect_fake(
        fake: &Arc<FakeDfs>,
        pool: &str,
        system: Option<&str>,
        container: &str,
        options: &ConnectOptions,
    ) -> Result<Self> {
        Self::connect_with(BindingsFacade::from_fake(Arc::clone(fake)), pool, system, container, options)
    }

    fn mount_with(bindings: BindingsFacade, pool: &str, container: &str) -> Result<Self> {
        let context = || format!("mount: pool={pool}, container={container}");

        let c_pool = c_string(pool, context)?;
        let c_container = c_string(container, context)?;

        let mut raw = None;
        translate(bindings.mount(&c_pool, &c_container, &mut raw), context)?;
        let raw = raw.ok_or_else(|| missing_handle(context()))?;

        tracing::debug!(pool, container, "mounted dfs namespace");
        Ok(Self::attached(bindings, Attachment::Mounted, raw, pool, None, container))
    }

    fn connect_with(
        bindings: BindingsFacade,
        pool: &str,
        system: Option<&str>,
        container: &str,
        options: &ConnectOptions,
    ) -> Result<Self> {
        let context = || {
            format!(
                "connect: pool={pool}, system={}, container={container}, flags={}",
                system.unwrap_or("default"),
                options.to_raw()
            )
        };

        let c_pool = c_string(pool, context)?;
        let c_system = system.map(|s| c_string(s, context)).transpose()?;
        let c_container = c_string(container, context)?;
        let attributes = options.get_attributes().map(|a| a.to_sys(context)).transpose()?;

        let mut raw = None;
        let rc = bindings.connect(
            &c_pool,
            c_system.as_deref(),
            &c_container,
            options.to_raw(),
            attributes.as_ref(),
            &mut raw,
        );
        translate(rc, context)?;
        let raw = raw.ok_or_else(|| missing_handle(context()))?;

        tracing::debug!(pool, system, container, flags = options.to_raw(), "connected dfs namespace");
        Ok(Self::attached(bindings, Attachment::Connected, raw, pool, system, container))
    }

    fn attached(
        bindings: BindingsFacade,
        attachment: Attachment,
        raw: RawNamespace,
        pool: &str,
        system: Option<&str>,
        container: &str,
    ) -> Self {
        Self {
            session: Arc::new(Session {
                bindings,
                attachment,
                state: RwLock::new(State::Live(raw)),
                open_objects: AtomicUsize::new(0),
                dispatcher: OnceLock::new(),
                pool: pool.to_string(),
                system: system.map(str::to_string),
                container: container.to_string(),
            }),
        }
    }

    /// Opens (and depending on `params`, creates) an entity.
    ///
    /// The entity is looked up by name inside `parent`, or inside the root directory of the
    /// namespace when `parent` is `None`. An empty name with no parent opens the root itself.
    ///
    /// # Errors
    ///
    /// * [`InvalidArgument`](ErrorKind::InvalidArgument) if `params` is inconsistent, the
    ///   namespace is closed, or `parent` is released, belongs to another namespace or is not a
    ///   directory.
    /// * [`AlreadyExists`](ErrorKind::AlreadyExists) on exclusive creation of an existing entity.
    /// * [`NotFound`](ErrorKind::NotFound) if the entity does not exist and creation was not
    ///   requested.
    /// * [`PermissionDenied`](ErrorKind::PermissionDenied) if the requested access is refused.
    pub fn open(&self, parent: Option<&Object>, params: &OpenParams) -> Result<Object> {
        let context = || params.context();

        params.validate(parent.is_some())?;
        let parent = parent.map(|p| self.check_parent(p, context)).transpose()?;

        let c_name = c_string(params.name(), context)?;
        let c_target = params.symlink_target().map(|t| c_string(t, context)).transpose()?;

        let state = self.session.state.read();
        let State::Live(namespace) = *state else {
            return Err(Error::invalid_argument(format!("{}: namespace is closed", context())));
        };

        let bindings = self.session.bindings();
        let mut raw = None;
        let rc = bindings.open(
            namespace,
            parent,
            &c_name,
            params.raw_mode(),
            params.flags().to_raw(),
            params.get_object_class().id(),
            params.get_chunk_size(),
            c_target.as_deref(),
            &mut raw,
        );
        translate(rc, context)?;
        let raw = raw.ok_or_else(|| missing_handle(context()))?;

        let kind = match self.query_kind(raw, context) {
            Ok(kind) => kind,
            Err(error) => {
                if let Err(release_error) = translate(bindings.release(raw), context) {
                    tracing::warn!(error = %release_error, "failed to release dfs object after open failure");
                }
                return Err(error);
            }
        };

        // Registered under the read lock, so close() cannot miss it.
        let _ = self.session.open_objects.fetch_add(1, Ordering::AcqRel);
        drop(state);

        tracing::debug!(name = params.name(), %kind, flags = %params.flags(), "opened dfs object");
        Ok(Object::new(
            Arc::clone(&self.session),
            namespace,
            raw,
            kind,
            params.flags(),
            params.name().to_string(),
        ))
    }

    fn check_parent(&self, parent: &Object, context: impl Fn() -> String) -> Result<RawObject> {
        if !Arc::ptr_eq(parent.session(), &self.session) {
            return Err(Error::invalid_argument(format!("{}: parent belongs to another namespace", context())));
        }
        if parent.kind() != EntityKind::Directory {
            return Err(Error::invalid_argument(format!(
                "{}: parent is a {} entity, not a directory",
                context(),
                parent.kind()
            )));
        }
        parent
            .raw()
            .ok_or_else(|| Error::invalid_argument(format!("{}: parent is released", context())))
    }

    fn query_kind(&self, raw: RawObject, context: impl Fn() -> String) -> Result<EntityKind> {
        let mut mode = 0;
        translate(self.session.bindings().get_mode(raw, &mut mode), &context)?;
        EntityKind::from_mode(mode).ok_or_else(|| {
            Error::new(
                ErrorKind::Unsupported,
                libc::ENOTSUP,
                format!("{}: unsupported entity type {:#o}", context(), mode & libc::S_IFMT),
            )
        })
    }

    /// Closes a namespace attached by [`mount`](Self::mount).
    ///
    /// All clones observe the closed state.
    ///
    /// # Errors
    ///
    /// * [`Busy`](ErrorKind::Busy) if objects opened from this namespace are still open. The
    ///   namespace stays live.
    /// * [`InvalidArgument`](ErrorKind::InvalidArgument) if the namespace is already closed.
    /// * Any backend failure. The namespace stays live and the call may be retried.
    pub fn unmount(&self) -> Result<()> {
        self.session.close("unmount")
    }

    /// Closes a namespace attached by [`connect`](Self::connect).
    ///
    /// Either name may be used for either kind of attachment; the matching backend call is
    /// always made.
    ///
    /// # Errors
    ///
    /// As for [`unmount`](Self::unmount).
    pub fn disconnect(&self) -> Result<()> {
        self.session.close("disconnect")
    }

    /// Whether the namespace is still live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.session.is_live()
    }

    /// Number of objects opened from this namespace that have not been released yet.
    #[must_use]
    pub fn open_objects(&self) -> usize {
        self.session.open_objects.load(Ordering::Acquire)
    }

    /// The pool identifier used to attach.
    #[must_use]
    pub fn pool(&self) -> &str {
        &self.session.pool
    }

    /// The system identifier used to attach, if one was given.
    #[must_use]
    pub fn system(&self) -> Option<&str> {
        self.session.system.as_deref()
    }

    /// The container identifier used to attach.
    #[must_use]
    pub fn container(&self) -> &str {
        &self.session.container
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace").field("session", &self.session).finish()
    }
}

fn missing_handle(context: String) -> Error {
    Error::new(ErrorKind::IoFailure, libc::EIO, format!("{context}: backend reported success without a handle"))
}
