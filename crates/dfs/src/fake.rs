// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An in-memory backend enabled by the `fakes` feature. Primarily intended to help users test
//! code built on [`Namespace`](crate::Namespace) without a DAOS deployment.
//!
//! [`FakeDfs`] honours the same entry-point contracts as the native client: handles are opaque,
//! every call returns a zero-on-success errno value, and misuse is reported through codes rather
//! than panics. Failures can be injected per entry point and every call is counted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::CStr;
use std::ptr;

use libc::{c_int, mode_t};
use parking_lot::Mutex;

use crate::bindings::{Bindings, RawEvent, RawNamespace, RawObject};
use crate::open_params::EntityKind;
use crate::sys::{d_sg_list_t, daos_oclass_id_t, daos_off_t, daos_size_t, dfs_attr_t, dfs_obj_t, dfs_t};

/// A backend entry point, used to target failure injection and to read call counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    /// `mount`
    Mount,
    /// `umount`
    Umount,
    /// `connect`
    Connect,
    /// `disconnect`
    Disconnect,
    /// `open`
    Open,
    /// `read`
    Read,
    /// `write`
    Write,
    /// `get_mode`
    GetMode,
    /// `get_size`
    GetSize,
    /// `release`
    Release,
}

#[derive(Clone, Copy, Debug)]
enum Injection {
    Once(c_int),
    Always(c_int),
}

#[derive(Debug)]
struct Entity {
    mode: mode_t,
    data: Vec<u8>,
    target: Option<String>,
    children: BTreeMap<String, usize>,
}

impl Entity {
    fn new(mode: mode_t) -> Self {
        Self {
            mode,
            data: Vec::new(),
            target: None,
            children: BTreeMap::new(),
        }
    }

    fn kind(&self) -> Option<EntityKind> {
        EntityKind::from_mode(self.mode)
    }
}

const ROOT: usize = 0;

#[derive(Debug)]
struct Container {
    entities: Vec<Entity>,
}

impl Container {
    fn new() -> Self {
        Self {
            entities: vec![Entity::new(libc::S_IFDIR | 0o755)],
        }
    }

    /// Walks `path` from the root, creating missing directories, and returns the parent
    /// directory and the final component.
    fn parent_of<'p>(&mut self, path: &'p str) -> (usize, &'p str) {
        let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let leaf = components.pop().unwrap_or_default();

        let mut dir = ROOT;
        for component in components {
            dir = match self.entities[dir].children.get(component) {
                Some(&child) => child,
                None => self.insert(dir, component, Entity::new(libc::S_IFDIR | 0o755)),
            };
        }
        (dir, leaf)
    }

    fn insert(&mut self, parent: usize, name: &str, entity: Entity) -> usize {
        let id = self.entities.len();
        self.entities.push(entity);
        let _ = self.entities[parent].children.insert(name.to_string(), id);
        id
    }

    fn lookup(&self, path: &str) -> Option<usize> {
        path.split('/')
            .filter(|c| !c.is_empty())
            .try_fold(ROOT, |dir, component| self.entities[dir].children.get(component).copied())
    }
}

type ContainerKey = (String, String);

#[derive(Debug)]
struct NamespaceState {
    container: ContainerKey,
    writable: bool,
    open_objects: usize,
}

#[derive(Debug)]
struct ObjectState {
    namespace: usize,
    entity: usize,
    flags: c_int,
}

#[derive(Debug, Default)]
struct State {
    containers: HashMap<ContainerKey, Container>,
    denied_pools: HashSet<String>,
    namespaces: HashMap<usize, NamespaceState>,
    objects: HashMap<usize, ObjectState>,
    next_handle: usize,
    injections: HashMap<EntryPoint, Injection>,
    calls: HashMap<EntryPoint, usize>,
}

impl State {
    /// Counts the call and returns an injected failure, if any.
    fn enter(&mut self, entry: EntryPoint) -> Option<c_int> {
        *self.calls.entry(entry).or_default() += 1;
        match self.injections.get(&entry).copied()? {
            Injection::Once(code) => {
                let _ = self.injections.remove(&entry);
                Some(code)
            }
            Injection::Always(code) => Some(code),
        }
    }

    fn next_handle(&mut self) -> usize {
        self.next_handle += 1;
        self.next_handle
    }

    fn attach(&mut self, pool: &str, container: &str, writable: bool, create: bool) -> Result<usize, c_int> {
        if self.denied_pools.contains(pool) {
            return Err(libc::EACCES);
        }

        let key = (pool.to_string(), container.to_string());
        if !self.containers.contains_key(&key) {
            if !create {
                return Err(libc::ENOENT);
            }
            let _ = self.containers.insert(key.clone(), Container::new());
        }

        let id = self.next_handle();
        let _ = self.namespaces.insert(
            id,
            NamespaceState {
                container: key,
                writable,
                open_objects: 0,
            },
        );
        Ok(id)
    }

    fn detach(&mut self, namespace: RawNamespace) -> c_int {
        let id = namespace.as_ptr().addr();
        match self.namespaces.get(&id) {
            None => libc::EINVAL,
            Some(ns) if ns.open_objects > 0 => libc::EBUSY,
            Some(_) => {
                let _ = self.namespaces.remove(&id);
                0
            }
        }
    }

    /// Resolves an object handle that belongs to `namespace` to its container and entity.
    fn resolve(&mut self, namespace: RawNamespace, object: RawObject) -> Result<(&mut Entity, c_int), c_int> {
        let ns_id = namespace.as_ptr().addr();
        let object = self.objects.get(&object.as_ptr().addr()).ok_or(libc::EINVAL)?;
        if object.namespace != ns_id {
            return Err(libc::EINVAL);
        }
        let ns = self.namespaces.get(&ns_id).ok_or(libc::EINVAL)?;
        let container = self.containers.get_mut(&ns.container).ok_or(libc::EIO)?;
        Ok((&mut container.entities[object.entity], object.flags))
    }
}

fn namespace_ptr(id: usize) -> Option<RawNamespace> {
    RawNamespace::new(ptr::without_provenance_mut::<dfs_t>(id))
}

fn object_ptr(id: usize) -> Option<RawObject> {
    RawObject::new(ptr::without_provenance_mut::<dfs_obj_t>(id))
}

fn to_str(value: &CStr) -> Result<&str, c_int> {
    value.to_str().map_err(|_| libc::EINVAL)
}

const fn wants_write(flags: c_int) -> bool {
    flags & libc::O_ACCMODE != libc::O_RDONLY
}

const fn wants_read(flags: c_int) -> bool {
    flags & libc::O_ACCMODE != libc::O_WRONLY
}

/// An in-memory DFS deployment.
///
/// Containers are created with [`add_container`](Self::add_container) (or by
/// [`Namespace::connect`](crate::Namespace::connect) with `create`) and populated with
/// [`add_file`](Self::add_file), [`add_dir`](Self::add_dir) and
/// [`add_symlink`](Self::add_symlink). Paths are `/`-separated and relative to the container
/// root; missing intermediate directories are created.
///
/// Asynchronous events are accepted but every call completes before it returns.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use dfs::fake::FakeDfs;
/// use dfs::{Namespace, OpenParams, SgList};
///
/// let fake = Arc::new(FakeDfs::new());
/// fake.add_file("pool", "cont", "data/hello.txt", b"hello");
///
/// let ns = Namespace::mount_fake(&fake, "pool", "cont")?;
/// let mut dir = ns.open(None, OpenParams::new("data").kind(dfs::EntityKind::Directory))?;
/// let mut file = ns.open(Some(&dir), OpenParams::new("hello.txt").read(true))?;
///
/// let mut buf = [0_u8; 8];
/// let n = file.read(&mut SgList::from(&mut buf), 0, 8)?;
/// assert_eq!(&buf[..n], b"hello");
///
/// file.release()?;
/// dir.release()?;
/// ns.unmount()?;
/// # Ok::<(), dfs::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct FakeDfs {
    state: Mutex<State>,
}

impl FakeDfs {
    /// Creates a deployment with no containers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty container, if it does not exist yet.
    pub fn add_container(&self, pool: &str, container: &str) {
        let mut state = self.state.lock();
        let _ = state
            .containers
            .entry((pool.to_string(), container.to_string()))
            .or_insert_with(Container::new);
    }

    /// Creates (or replaces the contents of) a regular entity.
    pub fn add_file(&self, pool: &str, container: &str, path: &str, data: impl AsRef<[u8]>) {
        self.add_entity(pool, container, path, libc::S_IFREG | 0o644, |entity| {
            entity.data = data.as_ref().to_vec();
        });
    }

    /// Creates a regular entity with explicit permission bits.
    pub fn add_file_with_mode(&self, pool: &str, container: &str, path: &str, permissions: mode_t, data: impl AsRef<[u8]>) {
        self.add_entity(pool, container, path, libc::S_IFREG | (permissions & !libc::S_IFMT), |entity| {
            entity.data = data.as_ref().to_vec();
        });
    }

    /// Creates a directory.
    pub fn add_dir(&self, pool: &str, container: &str, path: &str) {
        self.add_entity(pool, container, path, libc::S_IFDIR | 0o755, |_| {});
    }

    /// Creates a symlink.
    pub fn add_symlink(&self, pool: &str, container: &str, path: &str, target: &str) {
        self.add_entity(pool, container, path, libc::S_IFLNK | 0o777, |entity| {
            entity.target = Some(target.to_string());
        });
    }

    fn add_entity(&self, pool: &str, container: &str, path: &str, mode: mode_t, fill: impl FnOnce(&mut Entity)) {
        let mut state = self.state.lock();
        let container = state
            .containers
            .entry((pool.to_string(), container.to_string()))
            .or_insert_with(Container::new);

        let (parent, leaf) = container.parent_of(path);
        let id = match container.entities[parent].children.get(leaf) {
            Some(&id) => {
                container.entities[id].mode = mode;
                id
            }
            None => container.insert(parent, leaf, Entity::new(mode)),
        };
        fill(&mut container.entities[id]);
    }

    /// The bytes of a regular entity, or `None` if it does not exist.
    #[must_use]
    pub fn contents(&self, pool: &str, container: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let container = state.containers.get(&(pool.to_string(), container.to_string()))?;
        let id = container.lookup(path)?;
        Some(container.entities[id].data.clone())
    }

    /// The target of a symlink, or `None` if the entity does not exist or is not a symlink.
    #[must_use]
    pub fn symlink_target(&self, pool: &str, container: &str, path: &str) -> Option<String> {
        let state = self.state.lock();
        let container = state.containers.get(&(pool.to_string(), container.to_string()))?;
        let id = container.lookup(path)?;
        container.entities[id].target.clone()
    }

    /// Whether the container exists.
    #[must_use]
    pub fn has_container(&self, pool: &str, container: &str) -> bool {
        self.state.lock().containers.contains_key(&(pool.to_string(), container.to_string()))
    }

    /// Makes every `mount` and `connect` against `pool` fail with `EACCES`.
    pub fn deny_pool(&self, pool: &str) {
        let _ = self.state.lock().denied_pools.insert(pool.to_string());
    }

    /// Makes the next call to `entry` return `code` without any effect.
    pub fn inject(&self, entry: EntryPoint, code: c_int) {
        let _ = self.state.lock().injections.insert(entry, Injection::Once(code));
    }

    /// Makes every call to `entry` return `code` without any effect, until cleared.
    pub fn inject_always(&self, entry: EntryPoint, code: c_int) {
        let _ = self.state.lock().injections.insert(entry, Injection::Always(code));
    }

    /// Removes all injected failures.
    pub fn clear_injections(&self) {
        self.state.lock().injections.clear();
    }

    /// How many times `entry` has been called, including failed calls.
    #[must_use]
    pub fn calls(&self, entry: EntryPoint) -> usize {
        self.state.lock().calls.get(&entry).copied().unwrap_or_default()
    }

    /// Number of namespaces currently attached.
    #[must_use]
    pub fn live_namespaces(&self) -> usize {
        self.state.lock().namespaces.len()
    }

    /// Number of objects currently open across all namespaces.
    #[must_use]
    pub fn open_objects(&self) -> usize {
        self.state.lock().objects.len()
    }

    fn open_inner(
        state: &mut State,
        namespace: RawNamespace,
        parent: Option<RawObject>,
        name: &str,
        mode: mode_t,
        flags: c_int,
        value: Option<&str>,
    ) -> Result<usize, c_int> {
        let ns_id = namespace.as_ptr().addr();
        let (container_key, writable) = {
            let ns = state.namespaces.get(&ns_id).ok_or(libc::EINVAL)?;
            (ns.container.clone(), ns.writable)
        };

        let parent_entity = match parent {
            None => ROOT,
            Some(parent) => {
                let parent = state.objects.get(&parent.as_ptr().addr()).ok_or(libc::EINVAL)?;
                if parent.namespace != ns_id {
                    return Err(libc::EINVAL);
                }
                parent.entity
            }
        };

        let container = state.containers.get_mut(&container_key).ok_or(libc::EIO)?;
        if container.entities[parent_entity].kind() != Some(EntityKind::Directory) {
            return Err(libc::ENOTDIR);
        }

        let requested = EntityKind::from_mode(mode).ok_or(libc::EINVAL)?;
        let create = flags & libc::O_CREAT != 0;
        let exclusive = flags & libc::O_EXCL != 0;

        let existing = if name.is_empty() {
            if parent.is_some() {
                return Err(libc::EINVAL);
            }
            Some(ROOT)
        } else {
            container.entities[parent_entity].children.get(name).copied()
        };

        let entity = match existing {
            Some(_) if create && exclusive => return Err(libc::EEXIST),
            Some(id) => {
                let entity = &mut container.entities[id];
                match (entity.kind(), requested) {
                    (Some(actual), wanted) if actual == wanted => {}
                    (Some(EntityKind::Directory), _) => return Err(libc::EISDIR),
                    (_, EntityKind::Directory) => return Err(libc::ENOTDIR),
                    _ => return Err(libc::EINVAL),
                }

                if wants_write(flags) && !writable {
                    return Err(libc::EPERM);
                }
                if (wants_write(flags) && entity.mode & 0o200 == 0) || (wants_read(flags) && entity.mode & 0o400 == 0) {
                    return Err(libc::EACCES);
                }
                if flags & libc::O_TRUNC != 0 && requested == EntityKind::Regular {
                    entity.data.clear();
                }
                id
            }
            None if !create => return Err(libc::ENOENT),
            None => {
                if !writable {
                    return Err(libc::EPERM);
                }
                let mut entity = Entity::new(mode);
                if requested == EntityKind::Symlink {
                    match value {
                        Some(target) if !target.is_empty() => entity.target = Some(target.to_string()),
                        _ => return Err(libc::EINVAL),
                    }
                }
                container.insert(parent_entity, name, entity)
            }
        };

        let id = state.next_handle();
        let _ = state.objects.insert(
            id,
            ObjectState {
                namespace: ns_id,
                entity,
                flags,
            },
        );
        if let Some(ns) = state.namespaces.get_mut(&ns_id) {
            ns.open_objects += 1;
        }
        Ok(id)
    }
}

impl Bindings for FakeDfs {
    fn mount(&self, pool: &CStr, container: &CStr, namespace: &mut Option<RawNamespace>) -> c_int {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(EntryPoint::Mount) {
            return code;
        }

        let attached = to_str(pool)
            .and_then(|pool| Ok((pool, to_str(container)?)))
            .and_then(|(pool, container)| state.attach(pool, container, true, false));
        match attached {
            Ok(id) => {
                *namespace = namespace_ptr(id);
                0
            }
            Err(code) => code,
        }
    }

    fn umount(&self, namespace: RawNamespace) -> c_int {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(EntryPoint::Umount) {
            return code;
        }
        state.detach(namespace)
    }

    fn connect(
        &self,
        pool: &CStr,
        system: Option<&CStr>,
        container: &CStr,
        flags: c_int,
        _attributes: Option<&dfs_attr_t>,
        namespace: &mut Option<RawNamespace>,
    ) -> c_int {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(EntryPoint::Connect) {
            return code;
        }
        if system.is_some_and(|s| s.to_bytes().is_empty()) {
            return libc::EINVAL;
        }

        let create = flags & libc::O_CREAT != 0;
        let attached = to_str(pool)
            .and_then(|pool| Ok((pool, to_str(container)?)))
            .and_then(|(pool, container)| state.attach(pool, container, wants_write(flags), create));
        match attached {
            Ok(id) => {
                *namespace = namespace_ptr(id);
                0
            }
            Err(code) => code,
        }
    }

    fn disconnect(&self, namespace: RawNamespace) -> c_int {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(EntryPoint::Disconnect) {
            return code;
        }
        state.detach(namespace)
    }

    fn open(
        &self,
        namespace: RawNamespace,
        parent: Option<RawObject>,
        name: &CStr,
        mode: mode_t,
        flags: c_int,
        _object_class: daos_oclass_id_t,
        _chunk_size: daos_size_t,
        value: Option<&CStr>,
        object: &mut Option<RawObject>,
    ) -> c_int {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(EntryPoint::Open) {
            return code;
        }

        let opened = to_str(name)
            .and_then(|name| Ok((name, value.map(to_str).transpose()?)))
            .and_then(|(name, value)| Self::open_inner(&mut state, namespace, parent, name, mode, flags, value));
        match opened {
            Ok(id) => {
                *object = object_ptr(id);
                0
            }
            Err(code) => code,
        }
    }

    unsafe fn read(
        &self,
        namespace: RawNamespace,
        object: RawObject,
        sgl: &mut d_sg_list_t,
        offset: daos_off_t,
        read_size: &mut daos_size_t,
        _event: Option<RawEvent>,
    ) -> c_int {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(EntryPoint::Read) {
            return code;
        }

        let entity = match state.resolve(namespace, object) {
            Ok((entity, _)) => entity,
            Err(code) => return code,
        };
        if entity.kind() != Some(EntityKind::Regular) {
            return libc::EINVAL;
        }

        let mut position = usize::try_from(offset).unwrap_or(usize::MAX).min(entity.data.len());
        let mut total = 0_usize;
        for index in 0..sgl.sg_nr as usize {
            if position >= entity.data.len() {
                break;
            }
            // SAFETY: `sg_iovs` holds `sg_nr` entries, as the trait contract requires.
            let iov = unsafe { &mut *sgl.sg_iovs.add(index) };
            let take = iov.iov_buf_len.min(entity.data.len() - position);
            // SAFETY: The region is valid for writes of `iov_buf_len` bytes per the trait contract.
            let region = unsafe { std::slice::from_raw_parts_mut(iov.iov_buf.cast::<u8>(), take) };
            region.copy_from_slice(&entity.data[position..position + take]);
            iov.iov_len = take;
            position += take;
            total += take;
            sgl.sg_nr_out = u32::try_from(index + 1).unwrap_or(u32::MAX);
        }

        *read_size = total as daos_size_t;
        0
    }

    unsafe fn write(
        &self,
        namespace: RawNamespace,
        object: RawObject,
        sgl: &mut d_sg_list_t,
        offset: daos_off_t,
        _event: Option<RawEvent>,
    ) -> c_int {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(EntryPoint::Write) {
            return code;
        }

        let (entity, flags) = match state.resolve(namespace, object) {
            Ok(resolved) => resolved,
            Err(code) => return code,
        };
        if entity.kind() != Some(EntityKind::Regular) {
            return libc::EINVAL;
        }
        if !wants_write(flags) {
            return libc::EPERM;
        }

        let Ok(mut position) = usize::try_from(offset) else {
            return libc::EFBIG;
        };
        let regions: Vec<&[u8]> = (0..sgl.sg_nr as usize)
            .map(|index| {
                // SAFETY: `sg_iovs` holds `sg_nr` entries, as the trait contract requires.
                let iov = unsafe { &*sgl.sg_iovs.add(index) };
                // SAFETY: The region is valid for reads of `iov_len` bytes per the trait contract.
                unsafe { std::slice::from_raw_parts(iov.iov_buf.cast::<u8>().cast_const(), iov.iov_len) }
            })
            .collect();

        // Nothing is written unless the whole write fits.
        let Some(end) = regions.iter().try_fold(position, |end, region| end.checked_add(region.len())) else {
            return libc::EFBIG;
        };
        if entity.data.len() < end {
            entity.data.resize(end, 0);
        }
        for region in regions {
            entity.data[position..position + region.len()].copy_from_slice(region);
            position += region.len();
        }
        0
    }

    fn get_mode(&self, object: RawObject, mode: &mut mode_t) -> c_int {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(EntryPoint::GetMode) {
            return code;
        }

        let Some(ns_id) = state.objects.get(&object.as_ptr().addr()).map(|o| o.namespace) else {
            return libc::EINVAL;
        };
        let Some(namespace) = namespace_ptr(ns_id) else {
            return libc::EINVAL;
        };
        match state.resolve(namespace, object) {
            Ok((entity, _)) => {
                *mode = entity.mode;
                0
            }
            Err(code) => code,
        }
    }

    fn get_size(&self, namespace: RawNamespace, object: RawObject, size: &mut daos_size_t) -> c_int {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(EntryPoint::GetSize) {
            return code;
        }

        match state.resolve(namespace, object) {
            Ok((entity, _)) => {
                let len = match entity.kind() {
                    Some(EntityKind::Symlink) => entity.target.as_ref().map_or(0, String::len),
                    _ => entity.data.len(),
                };
                *size = len as daos_size_t;
                0
            }
            Err(code) => code,
        }
    }

    fn release(&self, object: RawObject) -> c_int {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(EntryPoint::Release) {
            return code;
        }

        match state.objects.remove(&object.as_ptr().addr()) {
            None => libc::EINVAL,
            Some(released) => {
                if let Some(ns) = state.namespaces.get_mut(&released.namespace) {
                    ns.open_objects -= 1;
                }
                0
            }
        }
    }
}
