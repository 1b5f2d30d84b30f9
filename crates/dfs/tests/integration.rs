// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
#![allow(clippy::missing_panics_doc, reason = "Tests")]
#![allow(missing_docs, reason = "Tests")]
#![allow(clippy::assertions_on_result_states, reason = "Tests use assert!(x.is_err()) for clarity")]

//! End-to-end behavior of the facade against the in-memory backend.

use std::io::IoSlice;
use std::sync::Arc;

use dfs::fake::{EntryPoint, FakeDfs};
use dfs::{ConnectOptions, ContainerAttributes, EntityKind, ErrorKind, Namespace, Object, OpenParams, SgList};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const POOL: &str = "pool-A";
const CONTAINER: &str = "cont-1";

fn setup() -> (Arc<FakeDfs>, Namespace) {
    let fake = Arc::new(FakeDfs::new());
    fake.add_file(POOL, CONTAINER, "hello.txt", b"0123456789");
    fake.add_dir(POOL, CONTAINER, "docs");
    fake.add_file(POOL, CONTAINER, "docs/readme.md", b"# readme");
    let ns = Namespace::mount_fake(&fake, POOL, CONTAINER).unwrap();
    (fake, ns)
}

fn open_read(ns: &Namespace, name: &str) -> Object {
    let mut params = OpenParams::new(name);
    params.read(true);
    ns.open(None, &params).unwrap()
}

fn open_dir(ns: &Namespace, parent: Option<&Object>, name: &str) -> Object {
    let mut params = OpenParams::new(name);
    params.kind(EntityKind::Directory);
    ns.open(parent, &params).unwrap()
}

// ===========================================================================
// Session lifecycle
// ===========================================================================

mod session {
    use super::*;

    #[test]
    fn mount_then_unmount_twice() {
        let (fake, ns) = setup();
        assert!(ns.is_live());

        ns.unmount().unwrap();
        assert!(!ns.is_live());

        let error = ns.unmount().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
        assert_eq!(error.code(), libc::EINVAL);
        assert_eq!(fake.calls(EntryPoint::Umount), 1);
        assert_eq!(fake.live_namespaces(), 0);
    }

    #[test]
    fn connect_then_disconnect() {
        let (fake, _) = setup();
        let ns = Namespace::connect_fake(&fake, POOL, Some("sys"), CONTAINER, &ConnectOptions::new()).unwrap();

        ns.disconnect().unwrap();
        assert_eq!(ns.disconnect().unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(fake.calls(EntryPoint::Disconnect), 1);
    }

    #[test]
    fn connect_permission_denied() {
        let fake = Arc::new(FakeDfs::new());
        fake.add_container("pool-B", "c");
        fake.deny_pool("pool-B");

        let error = Namespace::connect_fake(&fake, "pool-B", Some("sys"), "c", &ConnectOptions::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::PermissionDenied);
        assert_eq!(error.code(), libc::EACCES);
        assert!(error.context().starts_with("connect: pool=pool-B"));
    }

    #[test]
    fn mount_missing_container() {
        let (fake, _) = setup();
        let error = Namespace::mount_fake(&fake, POOL, "nope").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.context(), "mount: pool=pool-A, container=nope");
    }

    #[test]
    fn connect_creates_container_with_attributes() {
        let fake = Arc::new(FakeDfs::new());

        let mut attributes = ContainerAttributes::new();
        attributes.chunk_size(1 << 20).hints("file:single");
        let mut options = ConnectOptions::new();
        options.write(true).create(true).attributes(attributes);

        let ns = Namespace::connect_fake(&fake, POOL, None, "fresh", &options).unwrap();
        assert!(fake.has_container(POOL, "fresh"));

        let mut params = OpenParams::new("new.bin");
        params.write(true).create(true);
        let mut object = ns.open(None, &params).unwrap();
        object.release().unwrap();
        ns.disconnect().unwrap();
    }

    #[test]
    fn oversized_hints_never_reach_backend() {
        let fake = Arc::new(FakeDfs::new());

        let mut attributes = ContainerAttributes::new();
        attributes.hints("h".repeat(200));
        let mut options = ConnectOptions::new();
        options.create(true).attributes(attributes);

        let error = Namespace::connect_fake(&fake, POOL, None, "fresh", &options).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
        assert_eq!(fake.calls(EntryPoint::Connect), 0);
    }

    #[test]
    fn unmount_with_open_object_is_busy() {
        let (fake, ns) = setup();
        let mut object = open_read(&ns, "hello.txt");

        let error = ns.unmount().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Busy);
        assert_eq!(error.code(), libc::EBUSY);
        assert!(ns.is_live());
        assert_eq!(fake.calls(EntryPoint::Umount), 0);

        object.release().unwrap();
        ns.unmount().unwrap();
    }

    #[test]
    fn closed_session_rejects_open() {
        let (fake, ns) = setup();
        ns.unmount().unwrap();

        let mut params = OpenParams::new("hello.txt");
        params.read(true);
        let error = ns.open(None, &params).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
        assert_eq!(fake.calls(EntryPoint::Open), 0);
    }

    #[test]
    fn clones_share_state() {
        let (_, ns) = setup();
        let clone = ns.clone();

        clone.unmount().unwrap();
        assert!(!ns.is_live());
        assert_eq!(ns.unmount().unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn every_injected_code_surfaces() {
        for code in [libc::ENOENT, libc::EIO, libc::ENOSPC, libc::ENOMEM, -libc::EACCES, 1005] {
            let (fake, _) = setup();
            fake.inject(EntryPoint::Mount, code);

            let error = Namespace::mount_fake(&fake, POOL, CONTAINER).unwrap_err();
            assert_eq!(error.code(), code);
            assert_eq!(Some(error.kind()), dfs::kind_of(code));
        }
    }
}

// ===========================================================================
// Open and release
// ===========================================================================

mod open_release {
    use super::*;

    #[test]
    fn release_twice() {
        let (fake, ns) = setup();
        let mut object = open_read(&ns, "hello.txt");
        assert_eq!(object.kind(), EntityKind::Regular);
        assert_eq!(object.name(), "hello.txt");

        object.release().unwrap();
        let error = object.release().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
        assert_eq!(fake.calls(EntryPoint::Release), 1);
        ns.unmount().unwrap();
    }

    #[test]
    fn exclusive_create_conflict() {
        let (fake, ns) = setup();
        fake.add_file(POOL, CONTAINER, "x", b"");

        let mut params = OpenParams::new("x");
        params.write(true).create(true).exclusive(true);
        let error = ns.open(None, &params).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::AlreadyExists);
        assert_eq!(error.code(), libc::EEXIST);
        assert_eq!(error.context(), "open: name=x, flags=write|create|exclusive");
        assert_eq!(ns.open_objects(), 0);
    }

    #[test]
    fn non_exclusive_create_opens_existing() {
        let (fake, ns) = setup();

        let mut params = OpenParams::new("hello.txt");
        params.read(true).write(true).create(true);
        let mut object = ns.open(None, &params).unwrap();

        let mut buf = [0_u8; 10];
        assert_eq!(object.read(&mut SgList::from(&mut buf), 0, 10).unwrap(), 10);
        object.release().unwrap();
        assert_eq!(fake.contents(POOL, CONTAINER, "hello.txt").unwrap(), b"0123456789");
    }

    #[test]
    fn create_with_kind_mismatch_fails() {
        let (_, ns) = setup();

        let mut params = OpenParams::new("docs");
        params.write(true).create(true);
        let error = ns.open(None, &params).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::BackendFailure(code) if code == libc::EISDIR));
    }

    #[test]
    fn missing_entity() {
        let (_, ns) = setup();
        let mut params = OpenParams::new("absent");
        params.read(true);
        assert_eq!(ns.open(None, &params).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn open_below_parent() {
        let (_, ns) = setup();
        let mut dir = open_dir(&ns, None, "docs");
        assert_eq!(dir.kind(), EntityKind::Directory);

        let mut params = OpenParams::new("readme.md");
        params.read(true);
        let mut file = ns.open(Some(&dir), &params).unwrap();

        let mut buf = [0_u8; 8];
        assert_eq!(file.read(&mut SgList::from(&mut buf), 0, 8).unwrap(), 8);
        assert_eq!(&buf, b"# readme");

        file.release().unwrap();
        dir.release().unwrap();
        ns.unmount().unwrap();
    }

    #[test]
    fn parent_must_be_directory() {
        let (fake, ns) = setup();
        let file = open_read(&ns, "hello.txt");

        let error = ns.open(Some(&file), &OpenParams::new("child")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
        assert_eq!(fake.calls(EntryPoint::Open), 1);
    }

    #[test]
    fn empty_name_opens_root() {
        let (_, ns) = setup();
        let mut root = open_dir(&ns, None, "");
        assert_eq!(root.kind(), EntityKind::Directory);

        let mut docs = open_dir(&ns, Some(&root), "docs");
        docs.release().unwrap();
        root.release().unwrap();
    }

    #[test]
    fn symlink_creation() {
        let (fake, ns) = setup();

        let mut params = OpenParams::new("latest");
        params.symlink("docs/readme.md").write(true).create(true);
        let mut link = ns.open(None, &params).unwrap();

        assert_eq!(link.kind(), EntityKind::Symlink);
        assert_eq!(link.size().unwrap(), 14);
        assert_eq!(fake.symlink_target(POOL, CONTAINER, "latest").unwrap(), "docs/readme.md");
        link.release().unwrap();
    }

    #[test]
    fn symlink_without_target_never_reaches_backend() {
        let (fake, ns) = setup();

        let mut params = OpenParams::new("latest");
        params.kind(EntityKind::Symlink).write(true).create(true);
        assert_eq!(ns.open(None, &params).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(fake.calls(EntryPoint::Open), 0);
    }

    #[test]
    fn permission_bits_refuse_read() {
        let (fake, ns) = setup();
        fake.add_file_with_mode(POOL, CONTAINER, "secret", 0o200, b"s");

        let mut params = OpenParams::new("secret");
        params.read(true);
        assert_eq!(ns.open(None, &params).unwrap_err().kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn read_only_connection_refuses_creation() {
        let (fake, _) = setup();
        let ns = Namespace::connect_fake(&fake, POOL, None, CONTAINER, &ConnectOptions::new()).unwrap();

        let mut params = OpenParams::new("new");
        params.write(true).create(true);
        assert_eq!(ns.open(None, &params).unwrap_err().kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn truncate_clears_contents() {
        let (fake, ns) = setup();

        let mut params = OpenParams::new("hello.txt");
        params.write(true).truncate(true);
        let mut object = ns.open(None, &params).unwrap();

        assert_eq!(object.size().unwrap(), 0);
        object.release().unwrap();
        assert!(fake.contents(POOL, CONTAINER, "hello.txt").unwrap().is_empty());
    }

    #[tracing_test::traced_test]
    #[test]
    fn drop_logs_release_failure() {
        let (fake, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        fake.inject(EntryPoint::Release, libc::EIO);
        drop(object);

        assert!(logs_contain("failed to release dfs object on drop"));
        assert_eq!(ns.open_objects(), 0);
    }
}

// ===========================================================================
// Reads and writes
// ===========================================================================

mod read_write {
    use super::*;

    #[test]
    fn short_read() {
        let (_, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        let mut buf = [0xAA_u8; 16];
        let n = object.read(&mut SgList::from(&mut buf), 0, 16).unwrap();

        assert_eq!(n, 10);
        assert_eq!(&buf[..10], b"0123456789");
        assert!(buf[10..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn read_at_end() {
        let (_, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        let mut buf = [0_u8; 8];
        assert_eq!(object.read(&mut SgList::from(&mut buf), 10, 8).unwrap(), 0);
        assert_eq!(object.read(&mut SgList::from(&mut buf), 1000, 8).unwrap(), 0);
    }

    #[test]
    fn zero_request_touches_nothing() {
        let (fake, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        let mut buf = [0xAA_u8; 4];
        assert_eq!(object.read(&mut SgList::from(&mut buf), 0, 0).unwrap(), 0);
        assert_eq!(buf, [0xAA; 4]);
        assert_eq!(fake.calls(EntryPoint::Read), 0);
    }

    #[test]
    fn scatter_across_buffers() {
        let (_, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        let mut a = [0_u8; 3];
        let mut b = [0_u8; 0];
        let mut c = [0_u8; 4];
        let mut d = [0xAA_u8; 4];
        let mut sgl = SgList::new().with(&mut a).with(&mut b).with(&mut c).with(&mut d);

        assert_eq!(object.read(&mut sgl, 2, 7).unwrap(), 7);
        drop(sgl);
        assert_eq!(&a, b"234");
        assert_eq!(&c, b"5678");
        assert_eq!(d, [0xAA; 4]);
    }

    #[test]
    fn directory_cannot_be_read() {
        let (fake, ns) = setup();
        let dir = open_dir(&ns, None, "docs");

        let mut buf = [0_u8; 4];
        let error = dir.read(&mut SgList::from(&mut buf), 0, 4).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
        assert_eq!(fake.calls(EntryPoint::Read), 0);
    }

    #[test]
    fn write_then_read_back() {
        let (_, ns) = setup();

        let mut params = OpenParams::new("data.bin");
        params.read(true).write(true).create(true);
        let mut object = ns.open(None, &params).unwrap();

        let payload: Vec<u8> = (0..=255).collect();
        let (head, tail) = payload.split_at(100);
        assert_eq!(object.write_at(&[IoSlice::new(head), IoSlice::new(tail)], 4096).unwrap(), 256);
        assert_eq!(object.size().unwrap(), 4096 + 256);

        let mut back = vec![0_u8; 256];
        assert_eq!(object.read(&mut SgList::from(back.as_mut_slice()), 4096, 256).unwrap(), 256);
        assert_eq!(back, payload);

        let mut gap = [0xAA_u8; 16];
        assert_eq!(object.read(&mut SgList::from(&mut gap), 0, 16).unwrap(), 16);
        assert_eq!(gap, [0; 16]);

        object.release().unwrap();
        ns.unmount().unwrap();
    }

    #[test]
    fn write_needs_write_access() {
        let (_, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        let error = object.write_at(&[IoSlice::new(b"nope")], 0).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn concurrent_reads_share_object() {
        let (_, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        std::thread::scope(|scope| {
            for offset in 0..10_u64 {
                let object = &object;
                scope.spawn(move || {
                    let mut buf = [0_u8; 1];
                    assert_eq!(object.read(&mut SgList::from(&mut buf), offset, 1).unwrap(), 1);
                    assert_eq!(u64::from(buf[0] - b'0'), offset);
                });
            }
        });
    }

    #[test]
    fn concurrent_opens_on_shared_namespace() {
        let (fake, ns) = setup();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let ns = ns.clone();
                scope.spawn(move || {
                    let mut object = open_read(&ns, "hello.txt");
                    object.release().unwrap();
                });
            }
        });

        assert_eq!(fake.calls(EntryPoint::Open), 8);
        assert_eq!(fake.open_objects(), 0);
        ns.unmount().unwrap();
    }
}

// ===========================================================================
// Async reads
// ===========================================================================

mod read_async {
    use super::*;

    #[tokio::test]
    async fn completes_with_count() {
        let (_, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        let (n, buffers) = object.read_async(vec![vec![0_u8; 16]], 4, 16).await.unwrap();
        assert_eq!(n, 6);
        assert_eq!(&buffers[0][..6], b"456789");
        assert!(buffers[0][6..].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn fills_buffers_in_order() {
        let (_, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        let (n, buffers) = object.read_async(vec![vec![0_u8; 3], vec![0_u8; 3], vec![0_u8; 8]], 0, 10).await.unwrap();
        assert_eq!(n, 10);
        assert_eq!(buffers[0], b"012");
        assert_eq!(buffers[1], b"345");
        assert_eq!(&buffers[2][..4], b"6789");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn buffers_are_reused_across_reads() {
        let (_, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        let mut collected = Vec::new();
        let mut buffers = vec![vec![0_u8; 1]];
        for offset in 0..10 {
            let (n, returned) = object.read_async(buffers, offset, 1).await.unwrap();
            assert_eq!(n, 1);
            collected.extend_from_slice(&returned[0]);
            buffers = returned;
        }
        assert_eq!(collected, b"0123456789");
    }

    #[tokio::test]
    async fn errors_are_translated() {
        let (fake, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        fake.inject(EntryPoint::Read, libc::EIO);
        let error = object.read_async(vec![vec![0_u8; 4]], 0, 4).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::IoFailure);
        assert_eq!(error.context(), "read: name=hello.txt, offset=0, requested=4");
    }

    #[tokio::test]
    async fn request_beyond_capacity_is_rejected() {
        let (fake, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        let error = object.read_async(vec![vec![0_u8; 2], vec![0_u8; 2]], 0, 5).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
        assert_eq!(fake.calls(EntryPoint::Read), 0);
    }

    #[tokio::test]
    async fn zero_request_skips_backend() {
        let (fake, ns) = setup();
        let object = open_read(&ns, "hello.txt");

        let (n, buffers) = object.read_async(vec![vec![7_u8; 4]], 0, 0).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(buffers, vec![vec![7_u8; 4]]);
        assert_eq!(fake.calls(EntryPoint::Read), 0);
    }

    #[test]
    fn dropped_read_leaves_object_usable() {
        let (fake, ns) = setup();
        let mut object = open_read(&ns, "hello.txt");

        let mut future = Box::pin(object.read_async(vec![vec![0_u8; 10]], 0, 10));
        let waker = std::task::Waker::noop();
        let _ = future.as_mut().poll(&mut std::task::Context::from_waker(waker));
        drop(future);

        // Waits for a read that is still running in the background.
        object.release().unwrap();
        assert_eq!(fake.open_objects(), 0);
        ns.unmount().unwrap();
    }
}
