// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use libc::{c_int, mode_t};

use crate::error::{Error, Result};

/// The class of an entity, as encoded in the `S_IFMT` bits of its mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A file-like entity holding bytes.
    Regular,
    /// A directory-like entity holding other entities.
    Directory,
    /// A symlink-like entity holding a target path.
    Symlink,
}

impl EntityKind {
    /// Decodes the entity class from mode bits. Returns `None` for types DFS does not create.
    #[must_use]
    pub const fn from_mode(mode: mode_t) -> Option<Self> {
        match mode & libc::S_IFMT {
            libc::S_IFREG => Some(Self::Regular),
            libc::S_IFDIR => Some(Self::Directory),
            libc::S_IFLNK => Some(Self::Symlink),
            _ => None,
        }
    }

    /// The `S_IFMT` bits for this class.
    #[must_use]
    pub const fn type_bits(self) -> mode_t {
        match self {
            Self::Regular => libc::S_IFREG,
            Self::Directory => libc::S_IFDIR,
            Self::Symlink => libc::S_IFLNK,
        }
    }

    const fn default_permissions(self) -> mode_t {
        match self {
            Self::Regular => 0o644,
            Self::Directory => 0o755,
            Self::Symlink => 0o777,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Regular => "regular",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
        })
    }
}

/// Backend placement and redundancy class for newly created entities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ObjectClass(u32);

impl ObjectClass {
    /// Lets the backend choose (`OC_UNKNOWN`).
    pub const DEFAULT: Self = Self(0);

    /// Wraps a backend object class identifier.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The backend identifier.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

/// Access and creation flags of an [`OpenParams`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[expect(clippy::struct_excessive_bools, reason = "mirrors open(2) flags")]
pub struct OpenFlags {
    read: bool,
    write: bool,
    create: bool,
    exclusive: bool,
    truncate: bool,
}

impl OpenFlags {
    /// Whether read access was requested.
    #[must_use]
    pub const fn is_read(self) -> bool {
        self.read
    }

    /// Whether write access was requested.
    #[must_use]
    pub const fn is_write(self) -> bool {
        self.write
    }

    /// Whether the entity may be created.
    #[must_use]
    pub const fn is_create(self) -> bool {
        self.create || self.exclusive
    }

    /// Whether creation must fail if the entity exists.
    #[must_use]
    pub const fn is_exclusive(self) -> bool {
        self.exclusive
    }

    /// Whether an existing regular entity is truncated.
    #[must_use]
    pub const fn is_truncate(self) -> bool {
        self.truncate
    }

    /// The `open(2)`-style flag word passed to the backend.
    #[must_use]
    pub const fn to_raw(self) -> c_int {
        let mut raw = match (self.read, self.write) {
            (_, false) => libc::O_RDONLY,
            (false, true) => libc::O_WRONLY,
            (true, true) => libc::O_RDWR,
        };
        if self.is_create() {
            raw |= libc::O_CREAT;
        }
        if self.exclusive {
            raw |= libc::O_EXCL;
        }
        if self.truncate {
            raw |= libc::O_TRUNC;
        }
        raw
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.read, "read"),
            (self.write, "write"),
            (self.create, "create"),
            (self.exclusive, "exclusive"),
            (self.truncate, "truncate"),
        ];

        let mut first = true;
        for (_, name) in names.iter().filter(|(set, _)| *set) {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }

        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Describes how an entity is opened by [`Namespace::open`](crate::Namespace::open).
///
/// Generally you call [`OpenParams::new`] with the entity name, chain calls to set each option,
/// and pass the result to `open`. All flags start out `false`, the entity kind starts out
/// [`Regular`](EntityKind::Regular) and the object class and chunk size start out as backend
/// defaults.
///
/// # Examples
///
/// ```
/// use dfs::{EntityKind, OpenParams};
///
/// let mut params = OpenParams::new("results.bin");
/// params.read(true).write(true).create(true).chunk_size(1 << 20);
///
/// let mut dir = OpenParams::new("logs");
/// dir.kind(EntityKind::Directory).create(true);
///
/// let mut link = OpenParams::new("latest");
/// link.symlink("logs/2024-06-01.log").create(true);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenParams {
    name: String,
    permissions: Option<mode_t>,
    flags: OpenFlags,
    kind: EntityKind,
    object_class: ObjectClass,
    chunk_size: u64,
    symlink_target: Option<String>,
}

impl OpenParams {
    /// Options for the entity `name` inside its parent.
    ///
    /// `name` is a single path component. An empty name with no parent refers to the root
    /// directory of the namespace.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: None,
            flags: OpenFlags::default(),
            kind: EntityKind::Regular,
            object_class: ObjectClass::DEFAULT,
            chunk_size: 0,
            symlink_target: None,
        }
    }

    /// Sets the option for read access.
    pub const fn read(&mut self, read: bool) -> &mut Self {
        self.flags.read = read;
        self
    }

    /// Sets the option for write access.
    pub const fn write(&mut self, write: bool) -> &mut Self {
        self.flags.write = write;
        self
    }

    /// Sets the option to create the entity if it does not exist, or open it if it does and has
    /// a compatible kind.
    pub const fn create(&mut self, create: bool) -> &mut Self {
        self.flags.create = create;
        self
    }

    /// Sets the option to always create the entity, failing with
    /// [`AlreadyExists`](crate::ErrorKind::AlreadyExists) if it exists.
    ///
    /// Implies [`create`](Self::create). When the entity exists, exclusivity wins over opening.
    pub const fn exclusive(&mut self, exclusive: bool) -> &mut Self {
        self.flags.exclusive = exclusive;
        self
    }

    /// Sets the option to truncate an existing regular entity. Requires write access.
    pub const fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.flags.truncate = truncate;
        self
    }

    /// Permission bits applied when the entity is created. Ignored otherwise.
    ///
    /// Defaults to `0o644` for regular entities, `0o755` for directories and `0o777` for symlinks.
    pub const fn mode(&mut self, permissions: mode_t) -> &mut Self {
        self.permissions = Some(permissions & !libc::S_IFMT);
        self
    }

    /// The kind of entity to create or expect.
    pub const fn kind(&mut self, kind: EntityKind) -> &mut Self {
        self.kind = kind;
        self
    }

    /// Placement class for a newly created entity.
    pub const fn object_class(&mut self, object_class: ObjectClass) -> &mut Self {
        self.object_class = object_class;
        self
    }

    /// Striping unit in bytes for a newly created entity. Zero selects the backend default.
    pub const fn chunk_size(&mut self, chunk_size: u64) -> &mut Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Makes this a symlink with the given target.
    pub fn symlink(&mut self, target: impl Into<String>) -> &mut Self {
        self.kind = EntityKind::Symlink;
        self.symlink_target = Some(target.into());
        self
    }

    /// The entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The access and creation flags.
    #[must_use]
    pub const fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// The object class for creation.
    #[must_use]
    pub const fn get_object_class(&self) -> ObjectClass {
        self.object_class
    }

    /// The chunk size for creation.
    #[must_use]
    pub const fn get_chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// The symlink target, if any.
    #[must_use]
    pub fn symlink_target(&self) -> Option<&str> {
        self.symlink_target.as_deref()
    }

    /// Full mode word (type and permission bits) passed to the backend.
    #[must_use]
    pub fn raw_mode(&self) -> mode_t {
        self.kind.type_bits() | self.permissions.unwrap_or_else(|| self.kind.default_permissions())
    }

    pub(crate) fn context(&self) -> String {
        format!("open: name={}, flags={}", self.name, self.flags)
    }

    /// Checks the combination of options before anything reaches the backend.
    pub(crate) fn validate(&self, has_parent: bool) -> Result<()> {
        if self.name.contains('/') {
            return Err(Error::invalid_argument(format!("{}: name must be a single component", self.context())));
        }
        if self.name.is_empty() && (has_parent || self.flags.is_create()) {
            return Err(Error::invalid_argument(format!("{}: empty name", self.context())));
        }
        if self.flags.truncate && !self.flags.write {
            return Err(Error::invalid_argument(format!("{}: truncate requires write access", self.context())));
        }

        let symlink = self.kind == EntityKind::Symlink;
        match self.symlink_target.as_deref() {
            Some(_) if !symlink => Err(Error::invalid_argument(format!(
                "{}: symlink target given for a {} entity",
                self.context(),
                self.kind
            ))),
            Some("") | None if symlink && self.flags.is_create() => {
                Err(Error::invalid_argument(format!("{}: symlink creation requires a target", self.context())))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn read_only_by_default() {
        let params = OpenParams::new("a");
        assert_eq!(params.flags().to_raw(), libc::O_RDONLY);
        assert_eq!(params.raw_mode(), libc::S_IFREG | 0o644);
    }

    #[test]
    fn raw_flags() {
        let mut params = OpenParams::new("a");
        params.read(true).write(true).create(true).truncate(true);
        assert_eq!(params.flags().to_raw(), libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC);

        let mut params = OpenParams::new("a");
        params.write(true).exclusive(true);
        assert_eq!(params.flags().to_raw(), libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL);
        assert!(params.flags().is_create());
    }

    #[test]
    fn flags_display() {
        let mut params = OpenParams::new("foo");
        assert_eq!(params.context(), "open: name=foo, flags=none");

        params.read(true);
        assert_eq!(params.context(), "open: name=foo, flags=read");

        params.create(true).exclusive(true);
        assert_eq!(params.flags().to_string(), "read|create|exclusive");
    }

    #[test]
    fn mode_strips_type_bits() {
        let mut params = OpenParams::new("d");
        params.kind(EntityKind::Directory).mode(libc::S_IFREG | 0o700);
        assert_eq!(params.raw_mode(), libc::S_IFDIR | 0o700);
    }

    #[test]
    fn kind_round_trips_through_mode() {
        for kind in [EntityKind::Regular, EntityKind::Directory, EntityKind::Symlink] {
            assert_eq!(EntityKind::from_mode(kind.type_bits() | 0o600), Some(kind));
        }
        assert_eq!(EntityKind::from_mode(libc::S_IFIFO), None);
    }

    #[test]
    fn symlink_creation_requires_target() {
        let mut params = OpenParams::new("l");
        params.kind(EntityKind::Symlink).create(true);
        let error = params.validate(false).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);

        params.symlink("");
        assert_eq!(params.validate(false).unwrap_err().kind(), ErrorKind::InvalidArgument);

        params.symlink("target");
        params.validate(false).unwrap();
    }

    #[test]
    fn opening_existing_symlink_needs_no_target() {
        let mut params = OpenParams::new("l");
        params.kind(EntityKind::Symlink).read(true);
        params.validate(false).unwrap();
    }

    #[test]
    fn target_without_symlink_kind_is_rejected() {
        let mut params = OpenParams::new("f");
        params.symlink("t").kind(EntityKind::Regular).create(true).write(true);
        assert_eq!(params.validate(false).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn truncate_requires_write() {
        let mut params = OpenParams::new("f");
        params.read(true).truncate(true);
        assert_eq!(params.validate(false).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn name_rules() {
        OpenParams::new("").validate(false).unwrap();
        assert!(OpenParams::new("").validate(true).is_err());
        assert!(OpenParams::new("a/b").validate(false).is_err());
    }
}
