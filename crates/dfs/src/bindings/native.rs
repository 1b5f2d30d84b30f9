// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ffi::CStr;

use libc::{c_int, mode_t};

use crate::bindings::{Bindings, RawEvent, RawNamespace, RawObject};
use crate::sys::{d_sg_list_t, daos_oclass_id_t, daos_off_t, daos_size_t, dfs_attr_t};

/// Bindings that call into `libdfs`.
///
/// The client library is initialized (`dfs_init`) on first use and stays initialized for the
/// rest of the process. If initialization fails, every call reports the initialization code.
///
/// Without the `native` feature the library is not linked and every call reports `ENOSYS`.
#[derive(Debug, Default)]
pub struct NativeBindings;

#[cfg(feature = "native")]
mod imp {
    use std::ptr;
    use std::sync::OnceLock;

    use super::*;
    use crate::sys;

    static INIT: OnceLock<c_int> = OnceLock::new();

    fn ensure_init() -> c_int {
        // SAFETY: No safety requirements; guarded so it runs once per process.
        *INIT.get_or_init(|| unsafe { sys::dfs_init() })
    }

    fn ptr_or_null(value: Option<&CStr>) -> *const libc::c_char {
        value.map_or(ptr::null(), CStr::as_ptr)
    }

    impl Bindings for NativeBindings {
        #[cfg_attr(test, mutants::skip)] // Real backend behavior is not meaningful to mutate.
        fn mount(&self, pool: &CStr, container: &CStr, namespace: &mut Option<RawNamespace>) -> c_int {
            self.connect(pool, None, container, libc::O_RDWR, None, namespace)
        }

        #[cfg_attr(test, mutants::skip)] // Real backend behavior is not meaningful to mutate.
        fn umount(&self, namespace: RawNamespace) -> c_int {
            self.disconnect(namespace)
        }

        #[cfg_attr(test, mutants::skip)] // Real backend behavior is not meaningful to mutate.
        fn connect(
            &self,
            pool: &CStr,
            system: Option<&CStr>,
            container: &CStr,
            flags: c_int,
            attributes: Option<&dfs_attr_t>,
            namespace: &mut Option<RawNamespace>,
        ) -> c_int {
            let rc = ensure_init();
            if rc != 0 {
                return rc;
            }

            let mut raw = ptr::null_mut();
            // SAFETY: All strings are zero-terminated and outlive the call; `attributes` is
            // either null or a valid attribute block that outlives the call.
            let rc = unsafe {
                sys::dfs_connect(
                    pool.as_ptr(),
                    ptr_or_null(system),
                    container.as_ptr(),
                    flags,
                    attributes.map_or(ptr::null(), ptr::from_ref),
                    &raw mut raw,
                )
            };
            *namespace = RawNamespace::new(raw);
            rc
        }

        #[cfg_attr(test, mutants::skip)] // Real backend behavior is not meaningful to mutate.
        fn disconnect(&self, namespace: RawNamespace) -> c_int {
            // SAFETY: The namespace was produced by `dfs_connect`; the facade disconnects it once.
            unsafe { sys::dfs_disconnect(namespace.as_ptr()) }
        }

        #[cfg_attr(test, mutants::skip)] // Real backend behavior is not meaningful to mutate.
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
        ) -> c_int {
            let mut raw = ptr::null_mut();
            // SAFETY: Handles come from the backend and are live; strings are zero-terminated
            // and outlive the call.
            let rc = unsafe {
                sys::dfs_open(
                    namespace.as_ptr(),
                    parent.map_or(ptr::null_mut(), RawObject::as_ptr),
                    name.as_ptr(),
                    mode,
                    flags,
                    object_class,
                    chunk_size,
                    ptr_or_null(value),
                    &raw mut raw,
                )
            };
            *object = RawObject::new(raw);
            rc
        }

        #[cfg_attr(test, mutants::skip)] // Real backend behavior is not meaningful to mutate.
        unsafe fn read(
            &self,
            namespace: RawNamespace,
            object: RawObject,
            sgl: &mut d_sg_list_t,
            offset: daos_off_t,
            read_size: &mut daos_size_t,
            event: Option<RawEvent>,
        ) -> c_int {
            // SAFETY: We inherit and forward the buffer validity requirements from the trait.
            unsafe {
                sys::dfs_read(
                    namespace.as_ptr(),
                    object.as_ptr(),
                    sgl,
                    offset,
                    read_size,
                    event.map_or(ptr::null_mut(), RawEvent::as_ptr),
                )
            }
        }

        #[cfg_attr(test, mutants::skip)] // Real backend behavior is not meaningful to mutate.
        unsafe fn write(
            &self,
            namespace: RawNamespace,
            object: RawObject,
            sgl: &mut d_sg_list_t,
            offset: daos_off_t,
            event: Option<RawEvent>,
        ) -> c_int {
            // SAFETY: We inherit and forward the buffer validity requirements from the trait.
            unsafe {
                sys::dfs_write(
                    namespace.as_ptr(),
                    object.as_ptr(),
                    sgl,
                    offset,
                    event.map_or(ptr::null_mut(), RawEvent::as_ptr),
                )
            }
        }

        #[cfg_attr(test, mutants::skip)] // Real backend behavior is not meaningful to mutate.
        fn get_mode(&self, object: RawObject, mode: &mut mode_t) -> c_int {
            // SAFETY: The object is live; `mode` is a valid out-parameter.
            unsafe { sys::dfs_get_mode(object.as_ptr(), mode) }
        }

        #[cfg_attr(test, mutants::skip)] // Real backend behavior is not meaningful to mutate.
        fn get_size(&self, namespace: RawNamespace, object: RawObject, size: &mut daos_size_t) -> c_int {
            // SAFETY: Both handles are live; `size` is a valid out-parameter.
            unsafe { sys::dfs_get_size(namespace.as_ptr(), object.as_ptr(), size) }
        }

        #[cfg_attr(test, mutants::skip)] // Real backend behavior is not meaningful to mutate.
        fn release(&self, object: RawObject) -> c_int {
            // SAFETY: The object was produced by `dfs_open`; the facade releases it once.
            unsafe { sys::dfs_release(object.as_ptr()) }
        }
    }
}

#[cfg(not(feature = "native"))]
impl Bindings for NativeBindings {
    fn mount(&self, _pool: &CStr, _container: &CStr, _namespace: &mut Option<RawNamespace>) -> c_int {
        libc::ENOSYS
    }

    fn umount(&self, _namespace: RawNamespace) -> c_int {
        libc::ENOSYS
    }

    fn connect(
        &self,
        _pool: &CStr,
        _system: Option<&CStr>,
        _container: &CStr,
        _flags: c_int,
        _attributes: Option<&dfs_attr_t>,
        _namespace: &mut Option<RawNamespace>,
    ) -> c_int {
        libc::ENOSYS
    }

    fn disconnect(&self, _namespace: RawNamespace) -> c_int {
        libc::ENOSYS
    }

    fn open(
        &self,
        _namespace: RawNamespace,
        _parent: Option<RawObject>,
        _name: &CStr,
        _mode: mode_t,
        _flags: c_int,
        _object_class: daos_oclass_id_t,
        _chunk_size: daos_size_t,
        _value: Option<&CStr>,
        _object: &mut Option<RawObject>,
    ) -> c_int {
        libc::ENOSYS
    }

    unsafe fn read(
        &self,
        _namespace: RawNamespace,
        _object: RawObject,
        _sgl: &mut d_sg_list_t,
        _offset: daos_off_t,
        _read_size: &mut daos_size_t,
        _event: Option<RawEvent>,
    ) -> c_int {
        libc::ENOSYS
    }

    unsafe fn write(
        &self,
        _namespace: RawNamespace,
        _object: RawObject,
        _sgl: &mut d_sg_list_t,
        _offset: daos_off_t,
        _event: Option<RawEvent>,
    ) -> c_int {
        libc::ENOSYS
    }

    fn get_mode(&self, _object: RawObject, _mode: &mut mode_t) -> c_int {
        libc::ENOSYS
    }

    fn get_size(&self, _namespace: RawNamespace, _object: RawObject, _size: &mut daos_size_t) -> c_int {
        libc::ENOSYS
    }

    fn release(&self, _object: RawObject) -> c_int {
        libc::ENOSYS
    }
}

#[cfg(all(test, not(feature = "native")))]
mod tests {
    use super::*;

    #[test]
    fn without_native_feature_everything_is_unsupported() {
        let mut namespace = None;
        assert_eq!(NativeBindings.mount(c"pool", c"cont", &mut namespace), libc::ENOSYS);
        assert!(namespace.is_none());
    }
}
