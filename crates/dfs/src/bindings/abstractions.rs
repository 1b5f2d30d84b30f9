// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ffi::CStr;
use std::fmt::Debug;
use std::ptr::NonNull;

use libc::{c_int, mode_t};

use crate::sys::{d_sg_list_t, daos_event_t, daos_oclass_id_t, daos_off_t, daos_size_t, dfs_attr_t, dfs_obj_t, dfs_t};

/// Opaque handle to a mounted namespace, as produced by the backend.
///
/// The facade never dereferences it; it is only passed back to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawNamespace(NonNull<dfs_t>);

/// Opaque handle to an open object, as produced by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawObject(NonNull<dfs_obj_t>);

/// Opaque asynchronous completion event owned by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawEvent(NonNull<daos_event_t>);

// SAFETY: The handles are opaque tokens. The DFS client is thread-safe and accepts them from any
// thread; the facade never reads or writes through them.
unsafe impl Send for RawNamespace {}
// SAFETY: See `Send` above.
unsafe impl Sync for RawNamespace {}
// SAFETY: See `RawNamespace`.
unsafe impl Send for RawObject {}
// SAFETY: See `RawNamespace`.
unsafe impl Sync for RawObject {}
// SAFETY: Events are only handed to the backend, which owns completion signalling.
unsafe impl Send for RawEvent {}
// SAFETY: See `Send` above.
unsafe impl Sync for RawEvent {}

impl RawNamespace {
    /// Wraps a backend pointer, returning `None` for null.
    #[must_use]
    pub fn new(ptr: *mut dfs_t) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// The backend pointer.
    #[must_use]
    pub const fn as_ptr(self) -> *mut dfs_t {
        self.0.as_ptr()
    }
}

impl RawObject {
    /// Wraps a backend pointer, returning `None` for null.
    #[must_use]
    pub fn new(ptr: *mut dfs_obj_t) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// The backend pointer.
    #[must_use]
    pub const fn as_ptr(self) -> *mut dfs_obj_t {
        self.0.as_ptr()
    }
}

impl RawEvent {
    /// Wraps a backend event pointer, returning `None` for null.
    #[must_use]
    pub fn new(ptr: *mut daos_event_t) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// The backend pointer.
    #[must_use]
    pub const fn as_ptr(self) -> *mut daos_event_t {
        self.0.as_ptr()
    }
}

/// The entry points of the native DFS client.
///
/// All backend calls made by the facade go through this trait, enabling them to be replaced by
/// the in-memory backend. Every method returns the raw zero-on-success code;
/// results are delivered through the `&mut` out-parameters, which are only meaningful on success.
pub trait Bindings: Debug + Send + Sync + 'static {
    /// Attaches to an existing container using the default system.
    fn mount(&self, pool: &CStr, container: &CStr, namespace: &mut Option<RawNamespace>) -> c_int;

    /// Detaches a namespace produced by [`mount`](Self::mount).
    fn umount(&self, namespace: RawNamespace) -> c_int;

    /// Attaches to a container on an explicit system, optionally creating it.
    fn connect(
        &self,
        pool: &CStr,
        system: Option<&CStr>,
        container: &CStr,
        flags: c_int,
        attributes: Option<&dfs_attr_t>,
        namespace: &mut Option<RawNamespace>,
    ) -> c_int;

    /// Detaches a namespace produced by [`connect`](Self::connect).
    fn disconnect(&self, namespace: RawNamespace) -> c_int;

    /// Opens (and possibly creates) the entity `name` below `parent`, or below the root when
    /// `parent` is `None`.
    #[expect(clippy::too_many_arguments, reason = "mirrors dfs_open")]
    fn open(
        &self,
        namespace: RawNamespace,
        parent: Option<RawObject>,
        name: &CStr,
        mode: mode_t,
        flags: c_int,
        object_class: daos_oclass_id_t,
        chunk_size: daos_size_t,
        value: Option<&CStr>,
        object: &mut Option<RawObject>,
    ) -> c_int;

    /// Reads from `offset` into the regions of `sgl`, in order, storing the byte count in
    /// `read_size`.
    ///
    /// # Safety
    ///
    /// Every region of `sgl` must be valid for writes of `iov_buf_len` bytes until the call
    /// returns or, when `event` is provided, until the event completes.
    unsafe fn read(
        &self,
        namespace: RawNamespace,
        object: RawObject,
        sgl: &mut d_sg_list_t,
        offset: daos_off_t,
        read_size: &mut daos_size_t,
        event: Option<RawEvent>,
    ) -> c_int;

    /// Writes the valid bytes (`iov_len`) of each region of `sgl` at `offset`.
    ///
    /// # Safety
    ///
    /// Every region of `sgl` must be valid for reads of `iov_len` bytes until the call returns
    /// or, when `event` is provided, until the event completes.
    unsafe fn write(
        &self,
        namespace: RawNamespace,
        object: RawObject,
        sgl: &mut d_sg_list_t,
        offset: daos_off_t,
        event: Option<RawEvent>,
    ) -> c_int;

    /// Reports the mode bits (including the `S_IFMT` type) of an open object.
    fn get_mode(&self, object: RawObject, mode: &mut mode_t) -> c_int;

    /// Reports the size in bytes of an open object.
    fn get_size(&self, namespace: RawNamespace, object: RawObject, size: &mut daos_size_t) -> c_int;

    /// Releases an open object.
    fn release(&self, object: RawObject) -> c_int;
}
