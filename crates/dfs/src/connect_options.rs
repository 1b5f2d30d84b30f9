// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ptr;

use libc::{c_char, c_int};

use crate::error::{Error, Result};
use crate::open_params::ObjectClass;
use crate::sys::{DAOS_CONT_HINT_MAX_LEN, DFS_BALANCED, DFS_RELAXED, dfs_attr_t};

/// Consistency mode of a newly created container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConsistencyMode {
    /// Metadata updates are not made atomic with respect to concurrent clients.
    #[default]
    Relaxed,
    /// Metadata updates are made atomic at a performance cost.
    Balanced,
}

/// Attributes applied when [`Namespace::connect`](crate::Namespace::connect) creates a container.
///
/// Every attribute defaults to "let the backend choose".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerAttributes {
    id: u64,
    object_class: ObjectClass,
    dir_object_class: ObjectClass,
    file_object_class: ObjectClass,
    chunk_size: u64,
    consistency: ConsistencyMode,
    hints: Option<String>,
}

impl ContainerAttributes {
    /// Creates a blank set of attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// User-chosen object id of the container root.
    pub const fn id(&mut self, id: u64) -> &mut Self {
        self.id = id;
        self
    }

    /// Default object class for all entities.
    pub const fn object_class(&mut self, object_class: ObjectClass) -> &mut Self {
        self.object_class = object_class;
        self
    }

    /// Default object class for directories.
    pub const fn dir_object_class(&mut self, object_class: ObjectClass) -> &mut Self {
        self.dir_object_class = object_class;
        self
    }

    /// Default object class for files.
    pub const fn file_object_class(&mut self, object_class: ObjectClass) -> &mut Self {
        self.file_object_class = object_class;
        self
    }

    /// Default chunk size for files.
    pub const fn chunk_size(&mut self, chunk_size: u64) -> &mut Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Consistency mode.
    pub const fn consistency(&mut self, consistency: ConsistencyMode) -> &mut Self {
        self.consistency = consistency;
        self
    }

    /// Free-form placement hints, e.g. `"file:single,dir:max"`.
    pub fn hints(&mut self, hints: impl Into<String>) -> &mut Self {
        self.hints = Some(hints.into());
        self
    }

    /// Marshals into the backend attribute block.
    pub(crate) fn to_sys(&self, context: impl FnOnce() -> String) -> Result<dfs_attr_t> {
        let mut da_hints: [c_char; DAOS_CONT_HINT_MAX_LEN] = [0; DAOS_CONT_HINT_MAX_LEN];
        if let Some(hints) = &self.hints {
            let bytes = hints.as_bytes();
            if bytes.len() >= DAOS_CONT_HINT_MAX_LEN || bytes.contains(&0) {
                return Err(Error::invalid_argument(format!(
                    "{}: hints must be shorter than {DAOS_CONT_HINT_MAX_LEN} bytes without NUL",
                    context()
                )));
            }
            for (dst, src) in da_hints.iter_mut().zip(bytes) {
                *dst = c_char::from_ne_bytes([*src]);
            }
        }

        Ok(dfs_attr_t {
            da_id: self.id,
            da_oclass_id: self.object_class.id(),
            da_dir_oclass_id: self.dir_object_class.id(),
            da_file_oclass_id: self.file_object_class.id(),
            da_chunk_size: self.chunk_size,
            da_props: ptr::null_mut(),
            da_mode: match self.consistency {
                ConsistencyMode::Relaxed => DFS_RELAXED,
                ConsistencyMode::Balanced => DFS_BALANCED,
            },
            da_hints,
        })
    }
}

/// Options for [`Namespace::connect`](crate::Namespace::connect).
///
/// Defaults to read-only access to an existing container, which is the flag word `0`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    write: bool,
    create: bool,
    attributes: Option<ContainerAttributes>,
}

impl ConnectOptions {
    /// Creates options for read-only access to an existing container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests read-write access.
    pub const fn write(&mut self, write: bool) -> &mut Self {
        self.write = write;
        self
    }

    /// Creates the container if it does not exist.
    pub const fn create(&mut self, create: bool) -> &mut Self {
        self.create = create;
        self
    }

    /// Attributes used if the container is created.
    pub fn attributes(&mut self, attributes: ContainerAttributes) -> &mut Self {
        self.attributes = Some(attributes);
        self
    }

    /// The flag word passed to the backend.
    #[must_use]
    pub const fn to_raw(&self) -> c_int {
        let mut flags = if self.write { libc::O_RDWR } else { libc::O_RDONLY };
        if self.create {
            flags |= libc::O_CREAT;
        }
        flags
    }

    pub(crate) const fn get_attributes(&self) -> Option<&ContainerAttributes> {
        self.attributes.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn default_flags_are_zero() {
        assert_eq!(ConnectOptions::new().to_raw(), 0);
    }

    #[test]
    fn create_and_write_flags() {
        let mut options = ConnectOptions::new();
        options.write(true).create(true);
        assert_eq!(options.to_raw(), libc::O_RDWR | libc::O_CREAT);
    }

    #[test]
    fn attributes_marshal() {
        let mut attributes = ContainerAttributes::new();
        attributes
            .id(7)
            .chunk_size(1 << 20)
            .file_object_class(ObjectClass::new(200))
            .consistency(ConsistencyMode::Balanced)
            .hints("file:single");

        let sys = attributes.to_sys(String::new).unwrap();
        assert_eq!(sys.da_id, 7);
        assert_eq!(sys.da_chunk_size, 1 << 20);
        assert_eq!(sys.da_file_oclass_id, 200);
        assert_eq!(sys.da_oclass_id, 0);
        assert_eq!(sys.da_mode, DFS_BALANCED);
        assert!(sys.da_props.is_null());
        assert_eq!(sys.da_hints[0], c_char::from_ne_bytes([b'f']));
        assert_eq!(sys.da_hints[11], 0);
    }

    #[test]
    fn oversized_hints_are_rejected() {
        let mut attributes = ContainerAttributes::new();
        attributes.hints("x".repeat(DAOS_CONT_HINT_MAX_LEN));

        let error = attributes.to_sys(|| "connect: pool=p".to_string()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }
}
