// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Raw C types of the DAOS filesystem client (`daos_fs.h`, `daos_types.h`).
//!
//! Layouts follow the DAOS 2.4 headers. The `extern` block is only compiled with the `native`
//! feature; the types are always available because the [`Bindings`](crate::Bindings) trait is
//! expressed in terms of them.

#![expect(non_camel_case_types, reason = "mirrors C type names")]

use libc::{c_char, c_int, c_void, size_t};

/// Maximum length of the container hint string, including the terminator.
pub const DAOS_CONT_HINT_MAX_LEN: usize = 128;

/// Object class identifier.
pub type daos_oclass_id_t = u32;
/// Byte count.
pub type daos_size_t = u64;
/// Byte offset.
pub type daos_off_t = u64;

/// Opaque DFS mount.
#[repr(C)]
pub struct dfs_t {
    _private: [u8; 0],
}

/// Opaque open DFS object.
#[repr(C)]
pub struct dfs_obj_t {
    _private: [u8; 0],
}

/// Opaque asynchronous completion event.
#[repr(C)]
pub struct daos_event_t {
    _private: [u8; 0],
}

/// Opaque container property list.
#[repr(C)]
pub struct daos_prop_t {
    _private: [u8; 0],
}

/// One memory region of a scatter-gather list.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct d_iov_t {
    /// Start of the region.
    pub iov_buf: *mut c_void,
    /// Capacity of the region.
    pub iov_buf_len: size_t,
    /// Number of valid bytes in the region.
    pub iov_len: size_t,
}

/// A scatter-gather list.
#[repr(C)]
#[derive(Debug)]
pub struct d_sg_list_t {
    /// Number of entries in `sg_iovs`.
    pub sg_nr: u32,
    /// Number of entries filled in by the backend.
    pub sg_nr_out: u32,
    /// The regions.
    pub sg_iovs: *mut d_iov_t,
}

/// Container creation attributes passed to `dfs_connect`.
#[repr(C)]
#[derive(Debug)]
pub struct dfs_attr_t {
    /// Optional user object id for the container.
    pub da_id: u64,
    /// Default object class for all objects.
    pub da_oclass_id: daos_oclass_id_t,
    /// Default object class for directories.
    pub da_dir_oclass_id: daos_oclass_id_t,
    /// Default object class for files.
    pub da_file_oclass_id: daos_oclass_id_t,
    /// Default chunk size for files.
    pub da_chunk_size: daos_size_t,
    /// Extra container properties.
    pub da_props: *mut daos_prop_t,
    /// Consistency mode, one of [`DFS_RELAXED`] or [`DFS_BALANCED`].
    pub da_mode: c_int,
    /// Zero-terminated hint string.
    pub da_hints: [c_char; DAOS_CONT_HINT_MAX_LEN],
}

/// Relaxed consistency mode.
pub const DFS_RELAXED: c_int = 0;
/// Balanced consistency mode.
pub const DFS_BALANCED: c_int = 1;

#[cfg(feature = "native")]
#[link(name = "daos")]
#[link(name = "dfs")]
unsafe extern "C" {
    pub fn dfs_init() -> c_int;
    pub fn dfs_fini() -> c_int;
    pub fn dfs_connect(
        pool: *const c_char,
        sys: *const c_char,
        cont: *const c_char,
        flags: c_int,
        attr: *const dfs_attr_t,
        dfs: *mut *mut dfs_t,
    ) -> c_int;
    pub fn dfs_disconnect(dfs: *mut dfs_t) -> c_int;
    pub fn dfs_open(
        dfs: *mut dfs_t,
        parent: *mut dfs_obj_t,
        name: *const c_char,
        mode: libc::mode_t,
        flags: c_int,
        cid: daos_oclass_id_t,
        chunk_size: daos_size_t,
        value: *const c_char,
        obj: *mut *mut dfs_obj_t,
    ) -> c_int;
    pub fn dfs_read(
        dfs: *mut dfs_t,
        obj: *mut dfs_obj_t,
        sgl: *mut d_sg_list_t,
        off: daos_off_t,
        read_size: *mut daos_size_t,
        ev: *mut daos_event_t,
    ) -> c_int;
    pub fn dfs_write(dfs: *mut dfs_t, obj: *mut dfs_obj_t, sgl: *mut d_sg_list_t, off: daos_off_t, ev: *mut daos_event_t) -> c_int;
    pub fn dfs_get_mode(obj: *mut dfs_obj_t, mode: *mut libc::mode_t) -> c_int;
    pub fn dfs_get_size(dfs: *mut dfs_t, obj: *mut dfs_obj_t, size: *mut daos_size_t) -> c_int;
    pub fn dfs_release(obj: *mut dfs_obj_t) -> c_int;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iov_layout_matches_c() {
        assert_eq!(size_of::<d_iov_t>(), 3 * size_of::<usize>());
        assert_eq!(size_of::<d_sg_list_t>(), 8 + size_of::<usize>());
    }
}
