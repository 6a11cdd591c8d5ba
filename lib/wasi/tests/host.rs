//! Syscall-level tests driving the WASI host through a plain vector
//! memory, the way an engine adapter would from guest code.

use std::sync::{Arc, Mutex};

use futures::executor::block_on;
use wasmbox_vfs::Vfs;
use wasmbox_wasi::types::{Errno, ExitSignal};
use wasmbox_wasi::{
    pipe, ExecControl, FdTarget, GuestMemory, OutputBuffer, SharedVfs, VecMemory, WasiCtx,
};

const MEM_SIZE: usize = 64 * 1024;

/// Surface the host's `trace!`/`debug!` output under `cargo test -- --nocapture`.
fn init_tracing() {
    use tracing::metadata::LevelFilter;
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_max_level(LevelFilter::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

fn shared_vfs() -> SharedVfs {
    init_tracing();
    Arc::new(Mutex::new(Vfs::with_standard_layout()))
}

fn ctx() -> WasiCtx {
    WasiCtx::new(shared_vfs(), ExecControl::new())
}

/// Plants an iovec array at `table`, pointing at `buf` with length `len`.
fn plant_iovec(mem: &mut dyn GuestMemory, table: u32, buf: u32, len: u32) {
    mem.write_u32(table, buf).unwrap();
    mem.write_u32(table + 4, len).unwrap();
}

#[test]
fn args_round_trip_through_guest_memory() {
    let mut ctx = ctx();
    ctx.args = vec!["echo".to_string(), "hello".to_string()];
    let mut mem = VecMemory::new(MEM_SIZE);
    let m: &mut dyn GuestMemory = &mut mem;

    assert_eq!(ctx.args_sizes_get(m, 0, 4), Ok(Errno::Success));
    assert_eq!(m.read_u32(0).unwrap(), 2);
    assert_eq!(m.read_u32(4).unwrap(), 11); // "echo\0hello\0"

    assert_eq!(ctx.args_get(m, 16, 64), Ok(Errno::Success));
    assert_eq!(m.read_u32(16).unwrap(), 64);
    assert_eq!(m.read_u32(20).unwrap(), 69);
    assert_eq!(m.read_bytes(64, 11).unwrap(), b"echo\0hello\0");
}

#[test]
fn environ_round_trip() {
    let mut ctx = ctx();
    ctx.env = vec![("HOME".to_string(), "/home/user".to_string())];
    let mut mem = VecMemory::new(MEM_SIZE);
    let m: &mut dyn GuestMemory = &mut mem;

    assert_eq!(ctx.environ_sizes_get(m, 0, 4), Ok(Errno::Success));
    assert_eq!(m.read_u32(0).unwrap(), 1);
    assert_eq!(m.read_u32(4).unwrap(), 16);
    assert_eq!(ctx.environ_get(m, 16, 64), Ok(Errno::Success));
    assert_eq!(m.read_bytes(64, 16).unwrap(), b"HOME=/home/user\0");
}

#[test]
fn fd_write_to_buffer_target_gathers_iovecs() {
    let mut ctx = ctx();
    let stdout = OutputBuffer::new(None);
    ctx.fds.set_target(1, FdTarget::Buffer(stdout.clone()));

    let mut mem = VecMemory::new(MEM_SIZE);
    let m: &mut dyn GuestMemory = &mut mem;
    m.write(256, b"hello ").unwrap();
    m.write(512, b"world\n").unwrap();
    plant_iovec(m, 0, 256, 6);
    plant_iovec(m, 8, 512, 6);

    let status = block_on(ctx.fd_write(m, 1, 0, 2, 128));
    assert_eq!(status, Ok(Errno::Success));
    assert_eq!(m.read_u32(128).unwrap(), 12);
    assert_eq!(stdout.contents(), b"hello world\n");
}

#[test]
fn fd_read_from_static_target_reports_short_reads_accurately() {
    let mut ctx = ctx();
    ctx.fds.set_target(0, FdTarget::from_bytes(&b"abc"[..]));

    let mut mem = VecMemory::new(MEM_SIZE);
    let m: &mut dyn GuestMemory = &mut mem;
    plant_iovec(m, 0, 256, 8);
    plant_iovec(m, 8, 512, 8);

    let status = block_on(ctx.fd_read(m, 0, 0, 2, 128));
    assert_eq!(status, Ok(Errno::Success));
    // 3 bytes land in the first iovec; the second must stay untouched.
    assert_eq!(m.read_u32(128).unwrap(), 3);
    assert_eq!(m.read_bytes(256, 3).unwrap(), b"abc");
    assert_eq!(m.read_bytes(512, 8).unwrap(), vec![0u8; 8]);
}

#[test]
fn file_write_then_read_through_path_open() {
    let mut ctx = ctx();
    let root = ctx.push_preopen("/");
    let mut mem = VecMemory::new(MEM_SIZE);
    let m: &mut dyn GuestMemory = &mut mem;

    // path_open(create | trunc, write rights)
    let path = b"home/user/out.txt";
    m.write(1024, path).unwrap();
    let status = ctx.path_open(
        m,
        root,
        0,
        1024,
        path.len() as u32,
        (1 << 0) | (1 << 3), // CREAT | TRUNC
        1 << 6,              // FD_WRITE
        0,
        0,
        2048,
    );
    assert_eq!(status, Ok(Errno::Success));
    let fd = m.read_u32(2048).unwrap();
    assert_eq!(fd, 4); // 3 is the preopen

    m.write(256, b"persisted").unwrap();
    plant_iovec(m, 0, 256, 9);
    assert_eq!(block_on(ctx.fd_write(m, fd, 0, 1, 128)), Ok(Errno::Success));
    assert_eq!(ctx.fd_close(fd), Ok(Errno::Success));

    let content = ctx
        .vfs
        .lock()
        .unwrap()
        .read_file("/home/user/out.txt")
        .unwrap();
    assert_eq!(&content[..], b"persisted");
}

#[test]
fn filestat_layout_has_fields_at_fixed_offsets() {
    let mut ctx = ctx();
    ctx.vfs
        .lock()
        .unwrap()
        .write_file("/home/user/f.txt", &b"12345"[..])
        .unwrap();
    let root = ctx.push_preopen("/");
    let mut mem = VecMemory::new(MEM_SIZE);
    let m: &mut dyn GuestMemory = &mut mem;

    let path = b"home/user/f.txt";
    m.write(1024, path).unwrap();
    let status = ctx.path_filestat_get(m, root, 1, 1024, path.len() as u32, 2048);
    assert_eq!(status, Ok(Errno::Success));

    let record = m.read_bytes(2048, 64).unwrap();
    assert_eq!(record[16], 4); // filetype@16: regular file
    let size = u64::from_le_bytes(record[32..40].try_into().unwrap());
    assert_eq!(size, 5); // size@32
    let mtim = u64::from_le_bytes(record[48..56].try_into().unwrap());
    assert!(mtim > 0); // mtim@48
}

#[test]
fn readdir_walks_with_cookie_and_reports_bufused() {
    let mut ctx = ctx();
    {
        let mut vfs = ctx.vfs.lock().unwrap();
        vfs.write_file("/home/user/aa", &b"1"[..]).unwrap();
        vfs.write_file("/home/user/bb", &b"22"[..]).unwrap();
        vfs.write_file("/home/user/cc", &b"333"[..]).unwrap();
    }
    let root = ctx.push_preopen("/");
    let mut mem = VecMemory::new(MEM_SIZE);
    let m: &mut dyn GuestMemory = &mut mem;

    let path = b"home/user";
    m.write(1024, path).unwrap();
    let status = ctx.path_open(m, root, 0, 1024, path.len() as u32, 1 << 1, 0, 0, 0, 2048);
    assert_eq!(status, Ok(Errno::Success));
    let dirfd = m.read_u32(2048).unwrap();
    assert!(dirfd >= 100, "directory fds live in their own range");

    // Plenty of space: all three entries, 24-byte headers + 2-byte names.
    let status = ctx.fd_readdir(m, dirfd, 4096, 512, 0, 128);
    assert_eq!(status, Ok(Errno::Success));
    assert_eq!(m.read_u32(128).unwrap(), 3 * (24 + 2));
    let first = m.read_bytes(4096, 26).unwrap();
    let d_next = u64::from_le_bytes(first[0..8].try_into().unwrap());
    let namlen = u32::from_le_bytes(first[16..20].try_into().unwrap());
    assert_eq!((d_next, namlen), (1, 2));
    assert_eq!(&first[24..26], b"aa");

    // Resume from cookie 2: only "cc" remains.
    let status = ctx.fd_readdir(m, dirfd, 4096, 512, 2, 128);
    assert_eq!(status, Ok(Errno::Success));
    assert_eq!(m.read_u32(128).unwrap(), 26);
    assert_eq!(&m.read_bytes(4096, 26).unwrap()[24..26], b"cc");

    // A too-small buffer comes back full, telling the caller to grow it.
    let status = ctx.fd_readdir(m, dirfd, 4096, 30, 0, 128);
    assert_eq!(status, Ok(Errno::Success));
    assert_eq!(m.read_u32(128).unwrap(), 30);
}

#[test]
fn prestat_reports_the_granted_prefix() {
    let mut ctx = ctx();
    let root = ctx.push_preopen("/");
    let mut mem = VecMemory::new(MEM_SIZE);
    let m: &mut dyn GuestMemory = &mut mem;

    assert_eq!(ctx.fd_prestat_get(m, root, 0), Ok(Errno::Success));
    assert_eq!(m.read_bytes(0, 1).unwrap(), vec![0]); // dir tag
    assert_eq!(m.read_u32(4).unwrap(), 1); // strlen("/")
    assert_eq!(ctx.fd_prestat_dir_name(m, root, 64, 1), Ok(Errno::Success));
    assert_eq!(m.read_bytes(64, 1).unwrap(), b"/");
    assert_eq!(ctx.fd_prestat_get(m, 0, 0), Ok(Errno::Badf));
}

#[test]
fn pipes_suspend_fd_reads_until_data_or_eof() {
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;

    let vfs = shared_vfs();
    let control = ExecControl::new();
    let (reader, writer) = pipe(16);

    let mut consumer = WasiCtx::new(vfs.clone(), control.clone());
    consumer.fds.set_target(0, FdTarget::PipeRead(reader));
    let producer_target = FdTarget::PipeWrite(writer);

    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    spawner
        .spawn_local(async move {
            producer_target.write_all(b"across the pipe").await.unwrap();
            producer_target.close();
        })
        .unwrap();

    let collected = pool.run_until(async move {
        let mut mem = VecMemory::new(MEM_SIZE);
        let m: &mut dyn GuestMemory = &mut mem;
        plant_iovec(m, 0, 256, 64);
        let mut out = Vec::new();
        loop {
            let status = consumer.fd_read(m, 0, 0, 1, 128).await;
            assert_eq!(status, Ok(Errno::Success));
            let n = m.read_u32(128).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&m.read_bytes(256, n).unwrap());
        }
        out
    });
    assert_eq!(collected, b"across the pipe");
}

#[test]
fn unsafe_to_fake_calls_return_nosys() {
    let ctx = ctx();
    assert_eq!(ctx.fd_pread(), Ok(Errno::Nosys));
    assert_eq!(ctx.fd_pwrite(), Ok(Errno::Nosys));
    assert_eq!(ctx.poll_oneoff(), Ok(Errno::Nosys));
    assert_eq!(ctx.sock_accept(), Ok(Errno::Nosys));
    assert_eq!(ctx.sock_recv(), Ok(Errno::Nosys));
    assert_eq!(ctx.sock_send(), Ok(Errno::Nosys));
    assert_eq!(ctx.sock_shutdown(), Ok(Errno::Nosys));
}

#[test]
fn cancellation_raises_the_exit_signal_at_syscall_entry() {
    let mut ctx = ctx();
    ctx.control.cancel();
    let mut mem = VecMemory::new(MEM_SIZE);
    let m: &mut dyn GuestMemory = &mut mem;
    assert_eq!(ctx.fd_close(1), Err(ExitSignal::Cancelled));
    assert_eq!(
        ctx.clock_time_get(m, 0, 0, 0),
        Err(ExitSignal::Cancelled)
    );

    ctx.control.reset();
    ctx.control.set_deadline(1);
    assert_eq!(ctx.fd_close(1), Err(ExitSignal::Timeout));
}

#[test]
fn proc_exit_carries_the_guest_code() {
    let ctx = ctx();
    assert_eq!(ctx.proc_exit(3), ExitSignal::Exit(3));
    assert_eq!(ctx.proc_exit(3).code(), 3);
}

#[test]
fn write_outside_writable_prefixes_surfaces_rofs() {
    let mut ctx = ctx();
    let root = ctx.push_preopen("/");
    let mut mem = VecMemory::new(MEM_SIZE);
    let m: &mut dyn GuestMemory = &mut mem;

    let path = b"usr/forbidden";
    m.write(1024, path).unwrap();
    let status = ctx.path_open(
        m,
        root,
        0,
        1024,
        path.len() as u32,
        1 << 0, // CREAT
        1 << 6, // FD_WRITE
        0,
        0,
        2048,
    );
    assert_eq!(status, Ok(Errno::Rofs));
}
