//! The `fuser::Filesystem` adapter: the only module that knows about inodes, file handles, and
//! the kernel-facing request/reply protocol. Every real decision is delegated to
//! [`crate::virtualfs::RoseLogicalCore`]; this module's job is bookkeeping (inode <-> path,
//! open file handles, short-lived attribute caches) and translating [`crate::error::RoseError`]
//! into `errno`.

use crate::config::Config;
use crate::error::{RoseError, RoseExpectedError};
use crate::virtualfs::{CreationIntent, EntryKind, RoseLogicalCore, Stat, TtlCache, VirtualPath};
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, warn};

/// Kernel-side dentry/attribute cache lifetime. Independent of (and shorter than) the process's
/// own caches below; we don't want the kernel holding onto a stale listing any longer than us.
const ENTRY_TTL: Duration = Duration::from_secs(1);

/// How long a `getattr`/`lookup` result is trusted without re-asking the logical core.
const ATTR_CACHE_TTL: Duration = Duration::from_secs(1);
/// How long a file created moments ago but not yet reflected in the cache continues to look like
/// an ordinary (empty) file to anything that stats it again before the write settles.
const GHOST_TTL: Duration = Duration::from_secs(5);
/// How long a collage's "release being copied in" directory stays transparent to writes.
const COLLAGE_ADD_TTL: Duration = Duration::from_secs(5);

/// The handle returned for every open that should just swallow whatever's written to it (the
/// bulk of what `cp -r` throws at a release/collage/playlist directory).
const DEV_NULL_FH: u64 = 1;
const FIRST_REAL_FH: u64 = 2;

/// Bidirectional inode <-> virtual-path table. The root is always [`fuser::FUSE_ROOT_ID`]; every
/// other path is assigned an inode the first time it's seen and keeps it until removed or
/// renamed.
pub(crate) struct InodeTable {
    path_to_inode: Mutex<HashMap<PathBuf, u64>>,
    inode_to_path: Mutex<HashMap<u64, PathBuf>>,
    next: AtomicU64,
}

impl InodeTable {
    pub(crate) fn new() -> Self {
        let mut path_to_inode = HashMap::new();
        let mut inode_to_path = HashMap::new();
        path_to_inode.insert(PathBuf::from("/"), fuser::FUSE_ROOT_ID);
        inode_to_path.insert(fuser::FUSE_ROOT_ID, PathBuf::from("/"));
        Self { path_to_inode: Mutex::new(path_to_inode), inode_to_path: Mutex::new(inode_to_path), next: AtomicU64::new(fuser::FUSE_ROOT_ID + 1) }
    }

    pub(crate) fn path_for(&self, ino: u64) -> Option<PathBuf> {
        self.inode_to_path.lock().unwrap().get(&ino).cloned()
    }

    pub(crate) fn child_path(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        let base = self.path_for(parent)?;
        Some(normalize(&base.join(name)))
    }

    pub(crate) fn calc_inode(&self, path: &Path) -> u64 {
        let mut p2i = self.path_to_inode.lock().unwrap();
        if let Some(ino) = p2i.get(path) {
            return *ino;
        }
        let ino = self.next.fetch_add(1, Ordering::SeqCst);
        p2i.insert(path.to_path_buf(), ino);
        self.inode_to_path.lock().unwrap().insert(ino, path.to_path_buf());
        ino
    }

    pub(crate) fn remove_path(&self, path: &Path) {
        if let Some(ino) = self.path_to_inode.lock().unwrap().remove(path) {
            self.inode_to_path.lock().unwrap().remove(&ino);
        }
    }

    pub(crate) fn rename_path(&self, old: &Path, new: &Path) {
        let mut p2i = self.path_to_inode.lock().unwrap();
        if let Some(ino) = p2i.remove(old) {
            p2i.insert(new.to_path_buf(), ino);
            self.inode_to_path.lock().unwrap().insert(ino, new.to_path_buf());
        }
    }
}

/// Lexically collapse `.`/`..` components without touching the filesystem (these are virtual
/// paths that may not exist anywhere on disk yet).
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// What a single open file handle is doing. Real files pass reads/writes straight through to the
/// host filesystem; handles collecting a buffered creation special-op hold their bytes in memory
/// until `release`, matching the original's "act once the upload finishes" behavior.
enum HandleState {
    RealFile { file: std::fs::File, update_release_on_close: Option<PathBuf> },
    Creating { intent: CreationIntent, buffer: Vec<u8> },
}

struct FileHandleTable {
    next: AtomicU64,
    handles: Mutex<HashMap<u64, HandleState>>,
}

impl FileHandleTable {
    fn new() -> Self {
        Self { next: AtomicU64::new(FIRST_REAL_FH), handles: Mutex::new(HashMap::new()) }
    }

    fn insert(&self, state: HandleState) -> u64 {
        let fh = self.next.fetch_add(1, Ordering::SeqCst);
        self.handles.lock().unwrap().insert(fh, state);
        fh
    }

    fn remove(&self, fh: u64) -> Option<HandleState> {
        self.handles.lock().unwrap().remove(&fh)
    }
}

/// One batch of directory entries handed out by `opendir`, consumed by the matching `readdir`
/// calls, and dropped on `releasedir`.
struct ReaddirTable {
    next: AtomicU64,
    batches: Mutex<HashMap<u64, Vec<(u64, Vec<u8>, FileAttr)>>>,
}

impl ReaddirTable {
    fn new() -> Self {
        Self { next: AtomicU64::new(1), batches: Mutex::new(HashMap::new()) }
    }

    fn open(&self, entries: Vec<(u64, Vec<u8>, FileAttr)>) -> u64 {
        let fh = self.next.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().insert(fh, entries);
        fh
    }

    fn close(&self, fh: u64) {
        self.batches.lock().unwrap().remove(&fh);
    }
}

/// `fuser::Filesystem` adapter over [`RoseLogicalCore`]. Holds every piece of state the logical
/// core deliberately doesn't: inode table, open file/directory handles, and the kernel-facing
/// attribute/existence caches the original kept as plain `TTLCache`s on the `VirtualFS` class.
pub struct RoseFs {
    core: RoseLogicalCore,
    config: Config,
    inodes: InodeTable,
    handles: FileHandleTable,
    readdirs: ReaddirTable,
    getattr_cache: TtlCache<u64, FileAttr>,
    lookup_cache: TtlCache<(u64, Vec<u8>), FileAttr>,
    ghost_existing_files: TtlCache<PathBuf, ()>,
    in_progress_collage_additions: TtlCache<PathBuf, ()>,
}

impl RoseFs {
    pub fn new(config: Config) -> RoseFs {
        RoseFs {
            core: RoseLogicalCore::new(config.clone()),
            config,
            inodes: InodeTable::new(),
            handles: FileHandleTable::new(),
            readdirs: ReaddirTable::new(),
            getattr_cache: TtlCache::new(ATTR_CACHE_TTL),
            lookup_cache: TtlCache::new(ATTR_CACHE_TTL),
            ghost_existing_files: TtlCache::new(GHOST_TTL),
            in_progress_collage_additions: TtlCache::new(COLLAGE_ADD_TTL),
        }
    }

    fn reset_caches(&self) {
        self.getattr_cache.clear();
        self.lookup_cache.clear();
    }

    fn path_str<'a>(&self, path: &'a Path) -> Result<&'a str, i32> {
        path.to_str().ok_or(libc::EINVAL)
    }

    fn parse(&self, path: &Path) -> Result<VirtualPath, i32> {
        let s = self.path_str(path)?;
        VirtualPath::parse(s).map_err(|e| {
            if !matches!(&e, RoseError::Expected(RoseExpectedError::FileNotFound { .. })) {
                error!("vfs: failed to parse path {s:?}: {e}");
            }
            errno_for(&e)
        })
    }

    /// Synthesize a [`FileAttr`] for an entry that isn't backed by a real `Stat` (the ghost file
    /// and in-progress-collage-addition cases, and the `.`/`..` pseudo-entries).
    fn synthetic_attr(&self, ino: u64, kind: FileType) -> FileAttr {
        let size = if kind == FileType::Directory { 4096 } else { 0 };
        build_attr(ino, kind, size, SystemTime::UNIX_EPOCH)
    }

    fn attr_for_stat(&self, ino: u64, stat: &Stat) -> FileAttr {
        let kind = match stat.kind {
            EntryKind::Dir => FileType::Directory,
            EntryKind::File => FileType::RegularFile,
        };
        build_attr(ino, kind, stat.size, stat.mtime)
    }

    /// The release whose cache row should be refreshed once a writable open on `p` closes.
    /// Tracks, release covers, and release sidecar files all belong to exactly one release;
    /// playlist cover art isn't cache-tracked at all and triggers nothing.
    pub(crate) fn owning_release_dir(&self, p: &VirtualPath) -> Option<PathBuf> {
        if p.file.is_none() {
            return None;
        }
        if p.playlist.is_some() {
            let track_parent = p.track_parent();
            let track_id = self.core.resolve_track_id_pub(&track_parent, p.file.as_deref()?).ok()?;
            let track = crate::cache::get_track(&self.config, &track_id).ok()??;
            return Some(track.release.source_path);
        }
        let release = p.release.as_deref()?;
        let release_parent = p.release_parent();
        if release == crate::virtualfs::ALL_TRACKS {
            let track_parent = p.track_parent();
            let track_id = self.core.resolve_track_id_pub(&track_parent, p.file.as_deref()?).ok()?;
            let track = crate::cache::get_track(&self.config, &track_id).ok()??;
            return Some(track.release.source_path);
        }
        let release_id = self.core.resolve_release_id_pub(&release_parent, release).ok()?;
        let release_data = crate::cache::get_release(&self.config, &release_id).ok()??;
        Some(release_data.source_path)
    }

    /// Open (or start creating) a real file at `path`, returning the file handle to hand back to
    /// the kernel, or the `errno` the open should fail with.
    pub(crate) fn open_impl(&self, vpath: &VirtualPath, path: &Path, flags: i32) -> Result<u64, i32> {
        if flags & libc::O_CREAT != 0 {
            let intent = self.core.classify_create(vpath).map_err(|e| errno_for(&e))?;
            if let CreationIntent::AddReleaseToCollage { .. } = &intent {
                // The uuid lives in the filename; nothing needs to be buffered, so the effect
                // can (and, to match the original's open-time behavior, should) happen now.
                self.core.finish_creation(&intent, &[]).map_err(|e| errno_for(&e))?;
                self.reset_caches();
                return Ok(DEV_NULL_FH);
            }
            self.ghost_existing_files.insert(path.to_path_buf(), ());
            return Ok(self.handles.insert(HandleState::Creating { intent, buffer: Vec::new() }));
        }

        let stat = self.core.getattr(vpath).map_err(|e| errno_for(&e))?;
        let Some(realpath) = stat.realpath else {
            return Err(libc::EISDIR);
        };
        let accmode = flags & libc::O_ACCMODE;
        let mut opts = std::fs::OpenOptions::new();
        opts.read(accmode == libc::O_RDONLY || accmode == libc::O_RDWR);
        opts.write(accmode == libc::O_WRONLY || accmode == libc::O_RDWR);
        let file = opts.open(&realpath).map_err(|e| e.raw_os_error().unwrap_or(libc::EIO))?;
        let update_release_on_close = if accmode == libc::O_WRONLY || accmode == libc::O_RDWR {
            self.owning_release_dir(vpath)
        } else {
            None
        };
        Ok(self.handles.insert(HandleState::RealFile { file, update_release_on_close }))
    }
}

fn build_attr(ino: u64, kind: FileType, size: u64, mtime: SystemTime) -> FileAttr {
    FileAttr {
        ino,
        size,
        blocks: (size + 511) / 512,
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind,
        perm: if kind == FileType::Directory { 0o755 } else { 0o644 },
        nlink: 4,
        uid: unsafe { libc::getuid() },
        gid: unsafe { libc::getgid() },
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

/// Map a [`RoseError`] onto the `errno` that crosses the VFS boundary. Anything not covered by a
/// specific expected case is logged and reported as `EIO`.
pub(crate) fn errno_for(err: &RoseError) -> i32 {
    match err {
        RoseError::Io(io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
        RoseError::Expected(expected) => errno_for_expected(expected),
        other => {
            error!("vfs: unexpected error: {other}");
            libc::EIO
        }
    }
}

fn errno_for_expected(err: &RoseExpectedError) -> i32 {
    use RoseExpectedError as E;
    match err {
        E::FileNotFound { .. }
        | E::ReleaseDoesNotExist { .. }
        | E::TrackDoesNotExist { .. }
        | E::CollageDoesNotExist { .. }
        | E::PlaylistDoesNotExist { .. }
        | E::GenreDoesNotExist { .. }
        | E::LabelDoesNotExist { .. }
        | E::DescriptorDoesNotExist { .. }
        | E::ArtistDoesNotExist { .. } => libc::ENOENT,
        E::CollageAlreadyExists { .. } | E::PlaylistAlreadyExists { .. } => libc::EEXIST,
        E::InvalidUuid { .. } | E::InvalidReplacementValue(_) | E::InvalidFileFormat { .. } => libc::EINVAL,
        E::Generic(msg) if msg.contains("not permitted") => libc::EACCES,
        other => {
            error!("vfs: unexpected error: {other}");
            libc::EIO
        }
    }
}

impl Filesystem for RoseFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let key = (parent, name.as_bytes().to_vec());
        if let Some(attr) = self.lookup_cache.get(&key) {
            reply.entry(&ENTRY_TTL, &attr, 0);
            return;
        }
        let Some(path) = self.inodes.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let ino = self.inodes.calc_inode(&path);

        if self.ghost_existing_files.get(&path).is_some() {
            let attr = self.synthetic_attr(ino, FileType::RegularFile);
            self.lookup_cache.insert(key, attr);
            reply.entry(&ENTRY_TTL, &attr, 0);
            return;
        }
        if let Some(parent_path) = path.parent() {
            if self.in_progress_collage_additions.get(&parent_path.to_path_buf()).is_some() {
                reply.error(libc::ENOENT);
                return;
            }
        }

        let vpath = match self.parse(&path) {
            Ok(v) => v,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.core.getattr(&vpath) {
            Ok(stat) => {
                let attr = self.attr_for_stat(ino, &stat);
                self.getattr_cache.insert(ino, attr);
                self.lookup_cache.insert(key, attr);
                reply.entry(&ENTRY_TTL, &attr, 0);
            }
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, _ino: u64, _nlookup: u64) {}

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        if let Some(attr) = self.getattr_cache.get(&ino) {
            reply.attr(&ENTRY_TTL, &attr);
            return;
        }
        let Some(path) = self.inodes.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if self.ghost_existing_files.get(&path).is_some() {
            let attr = self.synthetic_attr(ino, FileType::RegularFile);
            self.getattr_cache.insert(ino, attr);
            reply.attr(&ENTRY_TTL, &attr);
            return;
        }
        if self.in_progress_collage_additions.get(&path).is_some() {
            reply.attr(&ENTRY_TTL, &self.synthetic_attr(ino, FileType::Directory));
            return;
        }
        let vpath = match self.parse(&path) {
            Ok(v) => v,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.core.getattr(&vpath) {
            Ok(stat) => {
                let attr = self.attr_for_stat(ino, &stat);
                self.getattr_cache.insert(ino, attr);
                reply.attr(&ENTRY_TTL, &attr);
            }
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        // Attribute changes (chmod/chown/truncate/touch) are accepted and ignored: the cache is
        // the source of truth for anything that matters, and nothing here is settable.
        self.getattr(req, ino, None, reply);
    }

    fn mknod(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, _rdev: u32, reply: ReplyEntry) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let ino = self.inodes.calc_inode(&path);
        reply.entry(&ENTRY_TTL, &self.synthetic_attr(ino, FileType::RegularFile), 0);
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let vpath = match self.parse(&path) {
            Ok(v) => v,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        // A release directory being copied into a collage: the logical core only learns about
        // the addition once the sidecar file inside it is created, so until then this directory
        // has to look and behave like an ordinary, writable one.
        if vpath.collage.is_some() && vpath.release.is_some() {
            self.in_progress_collage_additions.insert(path.clone(), ());
            let ino = self.inodes.calc_inode(&path);
            reply.entry(&ENTRY_TTL, &self.synthetic_attr(ino, FileType::Directory), 0);
            return;
        }
        match self.core.mkdir(&vpath) {
            Ok(()) => {
                self.reset_caches();
                let ino = self.inodes.calc_inode(&path);
                reply.entry(&ENTRY_TTL, &self.synthetic_attr(ino, FileType::Directory), 0);
            }
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let vpath = match self.parse(&path) {
            Ok(v) => v,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.core.rmdir(&vpath) {
            Ok(()) => {
                self.reset_caches();
                self.inodes.remove_path(&path);
                self.in_progress_collage_additions.remove(&path);
                reply.ok();
            }
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let vpath = match self.parse(&path) {
            Ok(v) => v,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.core.unlink(&vpath) {
            Ok(()) => {
                self.reset_caches();
                self.inodes.remove_path(&path);
                self.ghost_existing_files.remove(&path);
                reply.ok();
            }
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    fn rename(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, newparent: u64, newname: &OsStr, _flags: u32, reply: ReplyEmpty) {
        let (Some(old), Some(new)) = (self.inodes.child_path(parent, name), self.inodes.child_path(newparent, newname)) else {
            reply.error(libc::ENOENT);
            return;
        };
        let old_vpath = match self.parse(&old) {
            Ok(v) => v,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let new_vpath = match self.parse(&new) {
            Ok(v) => v,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.core.rename(&old_vpath, &new_vpath) {
            Ok(()) => {
                self.reset_caches();
                self.inodes.rename_path(&old, &new);
                reply.ok();
            }
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.inodes.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Some(parent) = path.parent() {
            if self.in_progress_collage_additions.get(&parent.to_path_buf()).is_some() {
                self.ghost_existing_files.insert(path.clone(), ());
                reply.opened(DEV_NULL_FH, 0);
                return;
            }
        }
        let vpath = match self.parse(&path) {
            Ok(v) => v,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.open_impl(&vpath, &path, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn create(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, flags: i32, reply: ReplyCreate) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Some(ancestor) = path.parent() {
            if self.in_progress_collage_additions.get(&ancestor.to_path_buf()).is_some() {
                self.ghost_existing_files.insert(path.clone(), ());
                let ino = self.inodes.calc_inode(&path);
                reply.created(&ENTRY_TTL, &self.synthetic_attr(ino, FileType::RegularFile), 0, DEV_NULL_FH, 0);
                return;
            }
        }
        let vpath = match self.parse(&path) {
            Ok(v) => v,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.open_impl(&vpath, &path, flags | libc::O_CREAT) {
            Ok(fh) => {
                self.reset_caches();
                let ino = self.inodes.calc_inode(&path);
                reply.created(&ENTRY_TTL, &self.synthetic_attr(ino, FileType::RegularFile), 0, fh, 0);
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn read(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, offset: i64, size: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyData) {
        if fh == DEV_NULL_FH {
            reply.data(&[]);
            return;
        }
        let handles = self.handles.handles.lock().unwrap();
        match handles.get(&fh) {
            Some(HandleState::Creating { buffer, .. }) => {
                let start = offset.max(0) as usize;
                if start >= buffer.len() {
                    reply.data(&[]);
                } else {
                    let end = (start + size as usize).min(buffer.len());
                    reply.data(&buffer[start..end]);
                }
            }
            Some(HandleState::RealFile { file, .. }) => {
                let mut buf = vec![0u8; size as usize];
                match file.read_at(&mut buf, offset.max(0) as u64) {
                    Ok(n) => reply.data(&buf[..n]),
                    Err(e) => reply.error(e.raw_os_error().unwrap_or(libc::EIO)),
                }
            }
            None => reply.error(libc::EBADF),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, offset: i64, data: &[u8], _write_flags: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyWrite) {
        if fh == DEV_NULL_FH {
            reply.written(data.len() as u32);
            return;
        }
        let mut handles = self.handles.handles.lock().unwrap();
        match handles.get_mut(&fh) {
            Some(HandleState::Creating { buffer, .. }) => {
                let start = offset.max(0) as usize;
                if buffer.len() < start {
                    buffer.resize(start, 0);
                }
                buffer.truncate(start);
                buffer.extend_from_slice(data);
                reply.written(data.len() as u32);
            }
            Some(HandleState::RealFile { file, .. }) => match file.write_at(data, offset.max(0) as u64) {
                Ok(n) => reply.written(n as u32),
                Err(e) => reply.error(e.raw_os_error().unwrap_or(libc::EIO)),
            },
            None => reply.error(libc::EBADF),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok();
    }

    fn release(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, _lock_owner: Option<u64>, _flush: bool, reply: ReplyEmpty) {
        if fh == DEV_NULL_FH {
            reply.ok();
            return;
        }
        match self.handles.remove(fh) {
            Some(HandleState::Creating { intent, buffer }) => match self.core.finish_creation(&intent, &buffer) {
                Ok(()) => {
                    self.reset_caches();
                    reply.ok();
                }
                Err(e) => reply.error(errno_for(&e)),
            },
            Some(HandleState::RealFile { update_release_on_close, .. }) => {
                if let Some(release_dir) = update_release_on_close {
                    if let Err(e) = crate::cache_update::update_cache_for_releases(&self.config, Some(vec![release_dir]), false) {
                        warn!("vfs: failed to refresh cache after write-close: {e}");
                    }
                    self.reset_caches();
                }
                reply.ok();
            }
            None => reply.error(libc::EBADF),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.inodes.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if self.in_progress_collage_additions.get(&path).is_some() {
            let mut entries = Vec::new();
            for dot in [".", ".."] {
                let dot_path = normalize(&path.join(dot));
                let ino = self.inodes.calc_inode(&dot_path);
                entries.push((ino, dot.as_bytes().to_vec(), self.synthetic_attr(ino, FileType::Directory)));
            }
            let fh = self.readdirs.open(entries);
            reply.opened(fh, 0);
            return;
        }
        let vpath = match self.parse(&path) {
            Ok(v) => v,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.core.readdir(&vpath) {
            Ok(children) => {
                let mut entries = Vec::with_capacity(children.len());
                for (name, stat) in children {
                    let child_path = normalize(&path.join(&name));
                    let child_ino = self.inodes.calc_inode(&child_path);
                    let attr = self.attr_for_stat(child_ino, &stat);
                    entries.push((child_ino, name.into_bytes(), attr));
                }
                let fh = self.readdirs.open(entries);
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, parent_ino: u64, fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let batches = self.readdirs.batches.lock().unwrap();
        let Some(entries) = batches.get(&fh) else {
            reply.ok();
            return;
        };
        for (i, (ino, name, attr)) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            self.getattr_cache.insert(*ino, *attr);
            self.lookup_cache.insert((parent_ino, name.clone()), *attr);
            if reply.add(*ino, (i + 1) as i64, attr.kind, OsStr::from_bytes(name)) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.readdirs.close(fh);
        reply.ok();
    }

    fn getxattr(&mut self, _req: &Request<'_>, _ino: u64, _name: &OsStr, _size: u32, reply: ReplyXattr) {
        reply.error(libc::ENODATA);
    }

    fn setxattr(&mut self, _req: &Request<'_>, _ino: u64, _name: &OsStr, _value: &[u8], _flags: i32, _position: u32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn listxattr(&mut self, _req: &Request<'_>, _ino: u64, size: u32, reply: ReplyXattr) {
        if size == 0 {
            reply.size(0);
        } else {
            reply.data(&[]);
        }
    }

    fn removexattr(&mut self, _req: &Request<'_>, _ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::ENODATA);
    }
}

/// Mount the virtual filesystem at `config.vfs.mount_dir` and block until it's unmounted.
pub fn mount(config: Config) -> crate::error::Result<()> {
    let mount_dir = config.vfs.mount_dir.clone();
    debug!("vfs: mounting at {mount_dir:?}");
    let options = vec![
        fuser::MountOption::FSName("rose".to_string()),
        fuser::MountOption::AutoUnmount,
        fuser::MountOption::DefaultPermissions,
    ];
    fuser::mount2(RoseFs::new(config), &mount_dir, &options)?;
    Ok(())
}

/// Unmount whatever is mounted at `config.vfs.mount_dir`, the same way a user would from a shell.
pub fn unmount(config: &Config) -> crate::error::Result<()> {
    let status = std::process::Command::new("umount").arg(&config.vfs.mount_dir).status()?;
    if !status.success() {
        return Err(RoseError::Expected(RoseExpectedError::Generic(format!(
            "umount exited with status {status}"
        ))));
    }
    Ok(())
}
