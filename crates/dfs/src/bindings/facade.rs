// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ffi::CStr;
#[cfg(any(test, feature = "fakes"))]
use std::sync::Arc;

use libc::{c_int, mode_t};

use crate::bindings::{Bindings, NativeBindings, RawEvent, RawNamespace, RawObject};
#[cfg(any(test, feature = "fakes"))]
use crate::fake::FakeDfs;
use crate::sys::{d_sg_list_t, daos_oclass_id_t, daos_off_t, daos_size_t, dfs_attr_t};

// Hides the difference between native and fake bindings behind a common facade.
#[derive(Clone, Debug)]
pub enum BindingsFacade {
    Native(&'static NativeBindings),

    #[cfg(any(test, feature = "fakes"))]
    Fake(Arc<FakeDfs>),
}

impl BindingsFacade {
    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
    pub const fn native() -> Self {
        Self::Native(&NativeBindings)
    }

    #[cfg(any(test, feature = "fakes"))]
    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
    pub fn from_fake(fake: Arc<FakeDfs>) -> Self {
        Self::Fake(fake)
    }
}

impl Bindings for BindingsFacade {
    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
    fn mount(&self, pool: &CStr, container: &CStr, namespace: &mut Option<RawNamespace>) -> c_int {
        match self {
            Self::Native(native) => native.mount(pool, container, namespace),
            #[cfg(any(test, feature = "fakes"))]
            Self::Fake(fake) => fake.mount(pool, container, namespace),
        }
    }

    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
    fn umount(&self, namespace: RawNamespace) -> c_int {
        match self {
            Self::Native(native) => native.umount(namespace),
            #[cfg(any(test, feature = "fakes"))]
            Self::Fake(fake) => fake.umount(namespace),
        }
    }

    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
    fn connect(
        &self,
        pool: &CStr,
        system: Option<&CStr>,
        container: &CStr,
        flags: c_int,
        attributes: Option<&dfs_attr_t>,
        namespace: &mut Option<RawNamespace>,
    ) -> c_int {
        match self {
            Self::Native(native) => native.connect(pool, system, container, flags, attributes, namespace),
            #[cfg(any(test, feature = "fakes"))]
            Self::Fake(fake) => fake.connect(pool, system, container, flags, attributes, namespace),
        }
    }

    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
    fn disconnect(&self, namespace: RawNamespace) -> c_int {
        match self {
            Self::Native(native) => native.disconnect(namespace),
            #[cfg(any(test, feature = "fakes"))]
            Self::Fake(fake) => fake.disconnect(namespace),
        }
    }

    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
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
        match self {
            Self::Native(native) => native.open(namespace, parent, name, mode, flags, object_class, chunk_size, value, object),
            #[cfg(any(test, feature = "fakes"))]
            Self::Fake(fake) => fake.open(namespace, parent, name, mode, flags, object_class, chunk_size, value, object),
        }
    }

    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
    unsafe fn read(
        &self,
        namespace: RawNamespace,
        object: RawObject,
        sgl: &mut d_sg_list_t,
        offset: daos_off_t,
        read_size: &mut daos_size_t,
        event: Option<RawEvent>,
    ) -> c_int {
        match self {
            Self::Native(native) => {
                // SAFETY: Forwarding safety requirements.
                unsafe { native.read(namespace, object, sgl, offset, read_size, event) }
            }
            #[cfg(any(test, feature = "fakes"))]
            Self::Fake(fake) => {
                // SAFETY: Forwarding safety requirements.
                unsafe { fake.read(namespace, object, sgl, offset, read_size, event) }
            }
        }
    }

    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
    unsafe fn write(
        &self,
        namespace: RawNamespace,
        object: RawObject,
        sgl: &mut d_sg_list_t,
        offset: daos_off_t,
        event: Option<RawEvent>,
    ) -> c_int {
        match self {
            Self::Native(native) => {
                // SAFETY: Forwarding safety requirements.
                unsafe { native.write(namespace, object, sgl, offset, event) }
            }
            #[cfg(any(test, feature = "fakes"))]
            Self::Fake(fake) => {
                // SAFETY: Forwarding safety requirements.
                unsafe { fake.write(namespace, object, sgl, offset, event) }
            }
        }
    }

    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
    fn get_mode(&self, object: RawObject, mode: &mut mode_t) -> c_int {
        match self {
            Self::Native(native) => native.get_mode(object, mode),
            #[cfg(any(test, feature = "fakes"))]
            Self::Fake(fake) => fake.get_mode(object, mode),
        }
    }

    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
    fn get_size(&self, namespace: RawNamespace, object: RawObject, size: &mut daos_size_t) -> c_int {
        match self {
            Self::Native(native) => native.get_size(namespace, object, size),
            #[cfg(any(test, feature = "fakes"))]
            Self::Fake(fake) => fake.get_size(namespace, object, size),
        }
    }

    #[cfg_attr(test, mutants::skip)] // Low-impact layer, waste of time to mutate.
    fn release(&self, object: RawObject) -> c_int {
        match self {
            Self::Native(native) => native.release(object),
            #[cfg(any(test, feature = "fakes"))]
            Self::Fake(fake) => fake.release(object),
        }
    }
}
