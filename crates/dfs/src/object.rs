// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::IoSlice;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bindings::{Bindings, RawNamespace, RawObject};
use crate::error::{Error, ErrorKind, Result, translate};
use crate::marshal::{SgList, describe_owned, describe_slices};
use crate::namespace::Session;
use crate::open_params::{EntityKind, OpenFlags};
use crate::sys::daos_size_t;

/// An open entity inside a [`Namespace`](crate::Namespace).
///
/// Objects are produced by [`Namespace::open`](crate::Namespace::open) and must be released
/// exactly once, either explicitly through [`release`](Self::release), which reports failures,
/// or implicitly when dropped, which can only log them. While an object is open its namespace
/// cannot be closed.
///
/// Reads and writes are positional and take `&self`, so an object can be shared between threads
/// and used concurrently. Release takes `&mut self` and therefore cannot overlap with them. It
/// waits for asynchronous reads that are already running in the background.
///
/// # Examples
///
/// ```no_run
/// use dfs::{Namespace, OpenParams, SgList};
///
/// let ns = Namespace::mount("pool", "cont")?;
/// let mut params = OpenParams::new("greeting");
/// params.read(true);
/// let mut object = ns.open(None, &params)?;
///
/// let mut head = [0_u8; 5];
/// let mut tail = [0_u8; 16];
/// let mut sgl = SgList::new().with(&mut head).with(&mut tail);
///
/// let n = object.read(&mut sgl, 0, 21)?;
/// println!("read {n} bytes");
///
/// object.release()?;
/// ns.unmount()?;
/// # Ok::<(), dfs::Error>(())
/// ```
#[derive(Debug)]
pub struct Object {
    session: Arc<Session>,
    namespace: RawNamespace,
    // Shared with asynchronous reads, which hold the read lock while the backend uses it.
    raw: Arc<RwLock<Option<RawObject>>>,
    kind: EntityKind,
    flags: OpenFlags,
    name: String,
}

impl Object {
    /// The caller has already registered the object with `session`.
    pub(crate) fn new(
        session: Arc<Session>,
        namespace: RawNamespace,
        raw: RawObject,
        kind: EntityKind,
        flags: OpenFlags,
        name: String,
    ) -> Self {
        Self {
            session,
            namespace,
            raw: Arc::new(RwLock::new(Some(raw))),
            kind,
            flags,
            name,
        }
    }

    pub(crate) const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub(crate) fn raw(&self) -> Option<RawObject> {
        *self.raw.read()
    }

    /// The kind of the entity, as reported by the backend when it was opened.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// The name the entity was opened with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The flags the entity was opened with.
    #[must_use]
    pub const fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Whether the object has not been released yet.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.raw.read().is_some()
    }

    fn open_raw(&self, context: impl FnOnce() -> String) -> Result<RawObject> {
        self.raw()
            .ok_or_else(|| Error::invalid_argument(format!("{}: object is released", context())))
    }

    /// Checks everything a read needs before anything is marshalled.
    fn readable(&self, capacity: usize, requested: usize, context: impl Fn() -> String) -> Result<RawObject> {
        let raw = self.open_raw(&context)?;
        if self.kind != EntityKind::Regular {
            return Err(Error::invalid_argument(format!("{}: cannot read a {} entity", context(), self.kind)));
        }
        if requested > capacity {
            return Err(Error::invalid_argument(format!(
                "{}: buffers hold only {capacity} bytes",
                context()
            )));
        }
        Ok(raw)
    }

    /// Reads up to `requested` bytes at `offset` into the buffers of `sgl`, in order.
    ///
    /// Returns the number of bytes read. A count below `requested`, including zero, means the
    /// end of the entity was reached. Buffers beyond the count are not modified, and nothing
    /// is touched when `requested` is zero.
    ///
    /// # Errors
    ///
    /// [`InvalidArgument`](crate::ErrorKind::InvalidArgument) if the object is released, is not
    /// a regular entity, or `requested` exceeds the capacity of `sgl`. Any backend failure is
    /// reported with its translated kind.
    pub fn read(&self, sgl: &mut SgList<'_>, offset: u64, requested: usize) -> Result<usize> {
        let context = || format!("read: name={}, offset={offset}, requested={requested}", self.name);

        let raw = self.readable(sgl.capacity(), requested, context)?;
        if requested == 0 {
            return Ok(0);
        }

        let mut described = sgl.describe(requested, context)?;
        let mut read_size: daos_size_t = 0;
        let rc = described.with_sys(|sys| {
            // SAFETY: The regions point into `sgl`, which `described` borrows mutably for the
            // whole synchronous call. No event is passed, so nothing is retained afterwards.
            unsafe {
                self.session
                    .bindings()
                    .read(self.namespace, raw, sys, offset, &mut read_size, None)
            }
        });
        translate(rc, context)?;

        Ok(clamp_count(read_size, requested))
    }

    /// Like [`read`](Self::read), but the blocking backend call runs on a worker thread.
    ///
    /// The buffers are handed over for the duration of the call and returned, in order, with
    /// the byte count. If the future is dropped or leaked before it completes, the buffers are
    /// freed once the backend call has returned; the caller never sees them again.
    ///
    /// # Errors
    ///
    /// As for [`read`](Self::read). [`IoFailure`](crate::ErrorKind::IoFailure) if no worker
    /// thread can be started. The buffers are dropped on error.
    pub async fn read_async(&self, mut buffers: Vec<Vec<u8>>, offset: u64, requested: usize) -> Result<(usize, Vec<Vec<u8>>)> {
        let context = || format!("read: name={}, offset={offset}, requested={requested}", self.name);

        let capacity = buffers.iter().map(Vec::len).sum();
        self.readable(capacity, requested, context)?;
        if requested == 0 {
            return Ok((0, buffers));
        }

        let handle = Arc::clone(&self.raw);
        let bindings = self.session.bindings().clone();
        let namespace = self.namespace;
        let label = context();

        let future = self
            .session
            .dispatcher()
            .dispatch(move || -> Result<(usize, Vec<Vec<u8>>)> {
                // Release waits for this guard, so the handle stays valid for the backend call.
                let guard = handle.read();
                let raw = (*guard).ok_or_else(|| Error::invalid_argument(format!("{label}: object is released")))?;

                let mut read_size: daos_size_t = 0;
                let rc = describe_owned(&mut buffers, requested, || label.clone())?.with_sys(|sys| {
                    // SAFETY: The regions point into `buffers`, which this closure owns until the
                    // backend call returns. No event is passed, so nothing is retained afterwards.
                    unsafe { bindings.read(namespace, raw, sys, offset, &mut read_size, None) }
                });
                drop(guard);
                translate(rc, || label)?;

                Ok((clamp_count(read_size, requested), buffers))
            })
            .map_err(|e| Error::new(ErrorKind::IoFailure, libc::EIO, format!("{}: cannot start dispatcher worker: {e}", context())))?;

        future.await
    }

    /// Writes all bytes of `slices`, in order, starting at `offset`.
    ///
    /// Writing past the end extends the entity; any gap reads back as zeroes. Returns the number
    /// of bytes written.
    ///
    /// # Errors
    ///
    /// [`InvalidArgument`](crate::ErrorKind::InvalidArgument) if the object is released or is not
    /// a regular entity. [`PermissionDenied`](crate::ErrorKind::PermissionDenied) if it was not
    /// opened for writing.
    pub fn write_at(&self, slices: &[IoSlice<'_>], offset: u64) -> Result<usize> {
        let context = || format!("write: name={}, offset={offset}, slices={}", self.name, slices.len());

        let raw = self.open_raw(context)?;
        if self.kind != EntityKind::Regular {
            return Err(Error::invalid_argument(format!("{}: cannot write a {} entity", context(), self.kind)));
        }

        let mut described = describe_slices(slices, context)?;
        let len = described.described_len();
        if len == 0 {
            return Ok(0);
        }

        let rc = described.with_sys(|sys| {
            // SAFETY: The regions point into `slices`, which outlive this synchronous call.
            unsafe { self.session.bindings().write(self.namespace, raw, sys, offset, None) }
        });
        translate(rc, context)?;

        Ok(len)
    }

    /// Current size of the entity in bytes.
    ///
    /// For symlinks this is the length of the target.
    ///
    /// # Errors
    ///
    /// [`InvalidArgument`](crate::ErrorKind::InvalidArgument) if the object is released, or any
    /// backend failure.
    pub fn size(&self) -> Result<u64> {
        let context = || format!("size: name={}", self.name);

        let raw = self.open_raw(context)?;
        let mut size: daos_size_t = 0;
        translate(self.session.bindings().get_size(self.namespace, raw, &mut size), context)?;
        Ok(size)
    }

    /// Releases the object.
    ///
    /// # Errors
    ///
    /// [`InvalidArgument`](crate::ErrorKind::InvalidArgument) if the object was already
    /// released or its namespace is closed. If the backend fails, the object stays open and the
    /// release may be retried.
    pub fn release(&mut self) -> Result<()> {
        let context = || format!("release: name={}", self.name);

        let mut guard = self.raw.write();
        let raw = (*guard).ok_or_else(|| Error::invalid_argument(format!("{}: object is released", context())))?;
        if !self.session.is_live() {
            return Err(Error::invalid_argument(format!("{}: namespace is closed", context())));
        }

        translate(self.session.bindings().release(raw), context)?;
        *guard = None;
        drop(guard);
        self.session.object_released();

        tracing::debug!(name = %self.name, "released dfs object");
        Ok(())
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        let raw = self.raw.write().take();
        if let Some(raw) = raw {
            if let Err(error) = translate(self.session.bindings().release(raw), || format!("drop: name={}", self.name)) {
                tracing::warn!(%error, "failed to release dfs object on drop");
            }
            self.session.object_released();
        }
    }
}

fn clamp_count(read_size: daos_size_t, requested: usize) -> usize {
    usize::try_from(read_size).map_or(requested, |n| n.min(requested))
}
