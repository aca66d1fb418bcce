//! Jailed filesystem adapter: maps SFTP requests onto the tenant root.
//!
//! Every entry point cleans its client-supplied path through the jail
//! first; a jail failure short-circuits to a denied status. Each logical
//! operation emits exactly one audit event with its canonical action name
//! (`get_open`, `put_open`, `put_commit`, `put_fail`, `ls`, `stat`,
//! `mkdir`, `rmdir`, `rm`, `rename`, `cmd_unsupported`,
//! `list_unsupported`).

use std::collections::HashMap;
use std::io::SeekFrom;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use pelican_core::Error;
use russh_sftp::protocol::{
    Attrs, Data, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::audit::audit;
use crate::jail;
use crate::metrics;
use crate::quota::{dir_usage, AtomicQuotaWriter, UPLOAD_SUFFIX};

/// SFTP status error. Conversion into `StatusCode` is what the request
/// server sends to the peer; messages stay generic.
#[derive(Debug, Clone)]
pub struct SftpError {
    pub code: StatusCode,
    pub message: String,
}

impl SftpError {
    fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn unsupported() -> Self {
        Self::new(StatusCode::OpUnsupported, "operation not supported")
    }

    fn invalid_handle() -> Self {
        Self::new(StatusCode::Failure, "invalid handle")
    }

    fn eof() -> Self {
        Self::new(StatusCode::Eof, "end of file")
    }
}

impl std::fmt::Display for SftpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for SftpError {}

impl From<SftpError> for StatusCode {
    fn from(err: SftpError) -> Self {
        err.code
    }
}

impl From<SftpError> for russh_sftp::server::StatusReply {
    fn from(err: SftpError) -> Self {
        russh_sftp::server::StatusReply::new(err.code).with_message(err.message)
    }
}

impl From<Error> for SftpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::NotFound => StatusCode::NoSuchFile,
            Error::PermissionDenied => StatusCode::PermissionDenied,
            Error::Io(io) => match io.kind() {
                std::io::ErrorKind::NotFound => StatusCode::NoSuchFile,
                std::io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
                _ => StatusCode::Failure,
            },
            _ => StatusCode::Failure,
        };
        SftpError::new(code, err.client_message())
    }
}

enum OpenHandle {
    Read { file: File },
    Write(AtomicQuotaWriter),
    Dir { entries: Vec<DirEntry>, position: usize },
}

struct DirEntry {
    filename: String,
    attrs: FileAttributes,
}

/// One tenant session's view of the filesystem, immutable for the life of
/// the SFTP channel.
pub struct JailedFs {
    root: PathBuf,
    user: String,
    remote: String,
    quota_bytes: u64,
    quota_files: u64,

    handles: Arc<Mutex<HashMap<String, OpenHandle>>>,
    handle_counter: u64,
}

impl JailedFs {
    pub fn new(root: PathBuf, user: &str, remote: &str, quota_bytes: u64, quota_files: u64) -> Self {
        Self {
            root,
            user: user.to_string(),
            remote: remote.to_string(),
            quota_bytes,
            quota_files,
            handles: Arc::new(Mutex::new(HashMap::new())),
            handle_counter: 0,
        }
    }

    fn new_handle(&mut self) -> String {
        self.handle_counter += 1;
        format!("h{}", self.handle_counter)
    }

    fn status_ok(id: u32) -> Status {
        Status {
            id,
            status_code: StatusCode::Ok,
            error_message: String::new(),
            language_tag: "en".to_string(),
        }
    }

    async fn open_for_read(
        root: PathBuf,
        user: String,
        remote: String,
        filename: String,
    ) -> Result<File, SftpError> {
        let start = Instant::now();
        let (abs, display) = match jail::clean(&root, &filename) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                audit(&user, &remote, "get_open", &filename, "", 0, Some(&e));
                metrics::observe_op(&user, "get", "error", start.elapsed());
                return Err(e.into());
            }
        };

        match File::open(&abs).await {
            Ok(file) => {
                audit(&user, &remote, "get_open", &display, "", 0, None);
                metrics::observe_op(&user, "get", "success", start.elapsed());
                Ok(file)
            }
            Err(e) => {
                let err = Error::from(e);
                audit(&user, &remote, "get_open", &display, "", 0, Some(&err));
                metrics::observe_op(&user, "get", "error", start.elapsed());
                metrics::inc_storage_io_error("get");
                Err(err.into())
            }
        }
    }

    async fn open_for_write(
        root: PathBuf,
        user: String,
        remote: String,
        filename: String,
        quota_bytes: u64,
        quota_files: u64,
    ) -> Result<AtomicQuotaWriter, SftpError> {
        let start = Instant::now();
        let fail_op = |user: &str| metrics::observe_op(user, "put", "error", start.elapsed());

        let (abs, display) = match jail::clean(&root, &filename) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                audit(&user, &remote, "put_open", &filename, "", 0, Some(&e));
                fail_op(&user);
                return Err(e.into());
            }
        };

        if let Some(parent) = abs.parent() {
            if let Err(e) = ensure_dir(parent).await {
                let err = Error::from(e);
                audit(&user, &remote, "put_open", &display, "", 0, Some(&err));
                fail_op(&user);
                metrics::inc_storage_io_error("put");
                return Err(err.into());
            }
        }

        let usage = match dir_usage(&root).await {
            Ok(usage) => usage,
            Err(e) => {
                let err = Error::from(e);
                audit(&user, &remote, "quota_usage_failed", &display, "", 0, Some(&err));
                fail_op(&user);
                metrics::inc_storage_io_error("put");
                return Err(err.into());
            }
        };

        // The file-count quota is checked once, at open. A put that
        // replaces an existing file still counts against the cap here.
        if quota_files > 0 && usage.files >= quota_files {
            audit(
                &user,
                &remote,
                "put_open",
                &display,
                "",
                0,
                Some(&Error::QuotaExceeded),
            );
            metrics::inc_quota_exceeded(&user, "files");
            fail_op(&user);
            return Err(Error::QuotaExceeded.into());
        }

        let mut tmp_os = abs.clone().into_os_string();
        tmp_os.push(UPLOAD_SUFFIX);
        let tmp_path = PathBuf::from(tmp_os);

        // A stale temp from a dead session gets truncated by the open.
        let _ = fs::remove_file(&tmp_path).await;

        let file = match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o640)
            .open(&tmp_path)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                let err = Error::from(e);
                audit(&user, &remote, "put_open", &display, "", 0, Some(&err));
                fail_op(&user);
                metrics::inc_storage_io_error("put");
                return Err(err.into());
            }
        };

        audit(&user, &remote, "put_open", &display, "", 0, None);
        metrics::observe_op(&user, "put", "success", start.elapsed());

        Ok(AtomicQuotaWriter::new(
            &user,
            &remote,
            &display,
            tmp_path,
            abs,
            file,
            usage.bytes,
            quota_bytes,
        ))
    }

    /// Shared unlink primitive for `remove` and `rmdir`: drops a file or
    /// an empty directory. Non-empty directories fail with the raw IO
    /// error and no distinct status.
    async fn unlink_entry(abs: &Path) -> std::io::Result<()> {
        match fs::remove_file(abs).await {
            Ok(()) => Ok(()),
            Err(first) => match fs::remove_dir(abs).await {
                Ok(()) => Ok(()),
                Err(_) if first.kind() != std::io::ErrorKind::IsADirectory => Err(first),
                Err(second) => Err(second),
            },
        }
    }

    async fn remove_common(
        root: PathBuf,
        user: String,
        remote: String,
        path: String,
        action: &'static str,
        cmd_action: &'static str,
        id: u32,
    ) -> Result<Status, SftpError> {
        let start = Instant::now();
        let (abs, display) = match jail::clean(&root, &path) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                audit(&user, &remote, cmd_action, &path, "", 0, Some(&e));
                metrics::observe_op(&user, action, "error", start.elapsed());
                return Err(e.into());
            }
        };

        match Self::unlink_entry(&abs).await {
            Ok(()) => {
                audit(&user, &remote, action, &display, "", 0, None);
                metrics::observe_op(&user, action, "success", start.elapsed());
                Ok(Self::status_ok(id))
            }
            Err(e) => {
                let err = Error::from(e);
                audit(&user, &remote, action, &display, "", 0, Some(&err));
                metrics::observe_op(&user, action, "error", start.elapsed());
                metrics::inc_storage_io_error(action);
                Err(err.into())
            }
        }
    }

    async fn stat_common(
        root: PathBuf,
        user: String,
        remote: String,
        path: String,
        follow: bool,
        id: u32,
    ) -> Result<Attrs, SftpError> {
        let start = Instant::now();
        let (abs, display) = match jail::clean(&root, &path) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                audit(&user, &remote, "list_Stat", &path, "", 0, Some(&e));
                metrics::observe_op(&user, "stat", "error", start.elapsed());
                return Err(e.into());
            }
        };

        let meta = if follow {
            fs::metadata(&abs).await
        } else {
            fs::symlink_metadata(&abs).await
        };
        match meta {
            Ok(meta) => {
                audit(&user, &remote, "stat", &display, "", 0, None);
                metrics::observe_op(&user, "stat", "success", start.elapsed());
                Ok(Attrs {
                    id,
                    attrs: metadata_to_attrs(&meta),
                })
            }
            Err(e) => {
                let err = Error::from(e);
                audit(&user, &remote, "stat", &display, "", 0, Some(&err));
                metrics::observe_op(&user, "stat", "error", start.elapsed());
                Err(err.into())
            }
        }
    }
}

async fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if fs::metadata(dir).await.is_ok() {
        return Ok(());
    }
    fs::create_dir_all(dir).await?;
    fs::set_permissions(dir, std::fs::Permissions::from_mode(0o750)).await
}

fn metadata_to_attrs(meta: &std::fs::Metadata) -> FileAttributes {
    let to_secs = |t: std::io::Result<std::time::SystemTime>| {
        t.ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    };
    FileAttributes {
        size: Some(meta.len()),
        uid: Some(meta.uid()),
        user: None,
        gid: Some(meta.gid()),
        group: None,
        permissions: Some(meta.permissions().mode()),
        atime: Some(to_secs(meta.accessed())),
        mtime: Some(to_secs(meta.modified())),
    }
}

fn build_longname(filename: &str, attrs: &FileAttributes) -> String {
    let perms = attrs.permissions.unwrap_or(0);
    let file_type = if perms & 0o40000 != 0 { 'd' } else { '-' };
    let perm_str: String = [0o400, 0o200, 0o100, 0o040, 0o020, 0o010, 0o004, 0o002, 0o001]
        .iter()
        .zip(['r', 'w', 'x', 'r', 'w', 'x', 'r', 'w', 'x'])
        .map(|(bit, ch)| if perms & bit != 0 { ch } else { '-' })
        .collect();
    let size = attrs.size.unwrap_or(0);
    format!("{file_type}{perm_str}  1 {:5} {:5} {size:10} Jan  1 00:00 {filename}",
        attrs.uid.unwrap_or(0),
        attrs.gid.unwrap_or(0),
    )
}

impl russh_sftp::server::Handler for JailedFs {
    type Error = SftpError;

    fn unimplemented(&self) -> Self::Error {
        SftpError::unsupported()
    }

    fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> impl std::future::Future<Output = Result<Version, Self::Error>> + Send {
        debug!(user = %self.user, version, "sftp session initialized");
        async move { Ok(Version::new()) }
    }

    fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> impl std::future::Future<Output = Result<Handle, Self::Error>> + Send {
        let root = self.root.clone();
        let user = self.user.clone();
        let remote = self.remote.clone();
        let quota_bytes = self.quota_bytes;
        let quota_files = self.quota_files;
        let handle_id = self.new_handle();
        let handles = Arc::clone(&self.handles);

        async move {
            let handle = if pflags.contains(OpenFlags::WRITE) {
                let writer = JailedFs::open_for_write(
                    root,
                    user,
                    remote,
                    filename,
                    quota_bytes,
                    quota_files,
                )
                .await?;
                OpenHandle::Write(writer)
            } else if pflags.contains(OpenFlags::READ) {
                let file = JailedFs::open_for_read(root, user, remote, filename).await?;
                OpenHandle::Read { file }
            } else {
                return Err(SftpError::unsupported());
            };

            handles.lock().await.insert(handle_id.clone(), handle);
            Ok(Handle {
                id,
                handle: handle_id,
            })
        }
    }

    fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> impl std::future::Future<Output = Result<Data, Self::Error>> + Send {
        let handles = Arc::clone(&self.handles);
        let user = self.user.clone();

        async move {
            let mut guard = handles.lock().await;
            let file = match guard.get_mut(&handle) {
                Some(OpenHandle::Read { file }) => file,
                _ => return Err(SftpError::invalid_handle()),
            };

            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(|e| SftpError::from(Error::from(e)))?;

            let mut buffer = vec![0u8; len as usize];
            let n = file
                .read(&mut buffer)
                .await
                .map_err(|e| SftpError::from(Error::from(e)))?;
            if n == 0 {
                return Err(SftpError::eof());
            }
            buffer.truncate(n);
            metrics::add_bytes_out(&user, "success", n as u64);
            Ok(Data { id, data: buffer })
        }
    }

    fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<Status, Self::Error>> + Send {
        let handles = Arc::clone(&self.handles);
        let user = self.user.clone();

        async move {
            let mut guard = handles.lock().await;
            let writer = match guard.get_mut(&handle) {
                Some(OpenHandle::Write(writer)) => writer,
                _ => return Err(SftpError::invalid_handle()),
            };

            match writer.write_at(&data, offset).await {
                Ok(()) => {
                    metrics::add_bytes_in(&user, "success", data.len() as u64);
                    Ok(JailedFs::status_ok(id))
                }
                Err(e) => Err(SftpError::from(e)),
            }
        }
    }

    fn close(
        &mut self,
        id: u32,
        handle: String,
    ) -> impl std::future::Future<Output = Result<Status, Self::Error>> + Send {
        let handles = Arc::clone(&self.handles);

        async move {
            let removed = handles.lock().await.remove(&handle);
            match removed {
                Some(OpenHandle::Write(mut writer)) => match writer.close().await {
                    Ok(_committed) => Ok(JailedFs::status_ok(id)),
                    Err(e) => Err(SftpError::from(e)),
                },
                Some(_) => Ok(JailedFs::status_ok(id)),
                None => Err(SftpError::invalid_handle()),
            }
        }
    }

    fn opendir(
        &mut self,
        id: u32,
        path: String,
    ) -> impl std::future::Future<Output = Result<Handle, Self::Error>> + Send {
        let root = self.root.clone();
        let user = self.user.clone();
        let remote = self.remote.clone();
        let handle_id = self.new_handle();
        let handles = Arc::clone(&self.handles);

        async move {
            let start = Instant::now();
            let (abs, display) = match jail::clean(&root, &path) {
                Ok(cleaned) => cleaned,
                Err(e) => {
                    audit(&user, &remote, "list_List", &path, "", 0, Some(&e));
                    metrics::observe_op(&user, "ls", "error", start.elapsed());
                    return Err(e.into());
                }
            };

            let mut read_dir = match fs::read_dir(&abs).await {
                Ok(read_dir) => read_dir,
                Err(e) => {
                    let err = Error::from(e);
                    audit(&user, &remote, "ls", &display, "", 0, Some(&err));
                    metrics::observe_op(&user, "ls", "error", start.elapsed());
                    return Err(err.into());
                }
            };

            let mut entries = Vec::new();
            while let Ok(Some(entry)) = read_dir.next_entry().await {
                // Entries that vanish mid-listing are skipped.
                if let Ok(meta) = entry.metadata().await {
                    entries.push(DirEntry {
                        filename: entry.file_name().to_string_lossy().to_string(),
                        attrs: metadata_to_attrs(&meta),
                    });
                }
            }

            audit(&user, &remote, "ls", &display, "", 0, None);
            metrics::observe_op(&user, "ls", "success", start.elapsed());

            handles.lock().await.insert(
                handle_id.clone(),
                OpenHandle::Dir {
                    entries,
                    position: 0,
                },
            );
            Ok(Handle {
                id,
                handle: handle_id,
            })
        }
    }

    fn readdir(
        &mut self,
        id: u32,
        handle: String,
    ) -> impl std::future::Future<Output = Result<Name, Self::Error>> + Send {
        let handles = Arc::clone(&self.handles);

        async move {
            let mut guard = handles.lock().await;
            let (entries, position) = match guard.get_mut(&handle) {
                Some(OpenHandle::Dir { entries, position }) => (entries, position),
                _ => return Err(SftpError::invalid_handle()),
            };

            if *position >= entries.len() {
                return Err(SftpError::eof());
            }

            const BATCH: usize = 100;
            let end = (*position + BATCH).min(entries.len());
            let files: Vec<_> = entries[*position..end]
                .iter()
                .map(|e| russh_sftp::protocol::File {
                    filename: e.filename.clone(),
                    longname: build_longname(&e.filename, &e.attrs),
                    attrs: e.attrs.clone(),
                })
                .collect();
            *position = end;

            Ok(Name { id, files })
        }
    }

    fn stat(
        &mut self,
        id: u32,
        path: String,
    ) -> impl std::future::Future<Output = Result<Attrs, Self::Error>> + Send {
        let root = self.root.clone();
        let user = self.user.clone();
        let remote = self.remote.clone();
        async move { JailedFs::stat_common(root, user, remote, path, true, id).await }
    }

    fn lstat(
        &mut self,
        id: u32,
        path: String,
    ) -> impl std::future::Future<Output = Result<Attrs, Self::Error>> + Send {
        let root = self.root.clone();
        let user = self.user.clone();
        let remote = self.remote.clone();
        async move { JailedFs::stat_common(root, user, remote, path, false, id).await }
    }

    fn fstat(
        &mut self,
        id: u32,
        handle: String,
    ) -> impl std::future::Future<Output = Result<Attrs, Self::Error>> + Send {
        let handles = Arc::clone(&self.handles);

        async move {
            let guard = handles.lock().await;
            match guard.get(&handle) {
                Some(OpenHandle::Read { file }) => {
                    let meta = file
                        .metadata()
                        .await
                        .map_err(|e| SftpError::from(Error::from(e)))?;
                    Ok(Attrs {
                        id,
                        attrs: metadata_to_attrs(&meta),
                    })
                }
                Some(_) => Err(SftpError::unsupported()),
                None => Err(SftpError::invalid_handle()),
            }
        }
    }

    fn realpath(
        &mut self,
        id: u32,
        path: String,
    ) -> impl std::future::Future<Output = Result<Name, Self::Error>> + Send {
        let root = self.root.clone();

        async move {
            let (_, display) = jail::clean(&root, &path).map_err(SftpError::from)?;
            Ok(Name {
                id,
                files: vec![russh_sftp::protocol::File {
                    filename: display,
                    longname: String::new(),
                    attrs: FileAttributes::default(),
                }],
            })
        }
    }

    fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> impl std::future::Future<Output = Result<Status, Self::Error>> + Send {
        let root = self.root.clone();
        let user = self.user.clone();
        let remote = self.remote.clone();

        async move {
            let start = Instant::now();
            let (abs, display) = match jail::clean(&root, &path) {
                Ok(cleaned) => cleaned,
                Err(e) => {
                    audit(&user, &remote, "cmd_Mkdir", &path, "", 0, Some(&e));
                    metrics::observe_op(&user, "mkdir", "error", start.elapsed());
                    return Err(e.into());
                }
            };

            match ensure_dir(&abs).await {
                Ok(()) => {
                    audit(&user, &remote, "mkdir", &display, "", 0, None);
                    metrics::observe_op(&user, "mkdir", "success", start.elapsed());
                    Ok(JailedFs::status_ok(id))
                }
                Err(e) => {
                    let err = Error::from(e);
                    audit(&user, &remote, "mkdir", &display, "", 0, Some(&err));
                    metrics::observe_op(&user, "mkdir", "error", start.elapsed());
                    metrics::inc_storage_io_error("mkdir");
                    Err(err.into())
                }
            }
        }
    }

    fn remove(
        &mut self,
        id: u32,
        path: String,
    ) -> impl std::future::Future<Output = Result<Status, Self::Error>> + Send {
        let root = self.root.clone();
        let user = self.user.clone();
        let remote = self.remote.clone();
        async move {
            JailedFs::remove_common(root, user, remote, path, "rm", "cmd_Remove", id).await
        }
    }

    fn rmdir(
        &mut self,
        id: u32,
        path: String,
    ) -> impl std::future::Future<Output = Result<Status, Self::Error>> + Send {
        let root = self.root.clone();
        let user = self.user.clone();
        let remote = self.remote.clone();
        async move {
            JailedFs::remove_common(root, user, remote, path, "rmdir", "cmd_Rmdir", id).await
        }
    }

    fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> impl std::future::Future<Output = Result<Status, Self::Error>> + Send {
        let root = self.root.clone();
        let user = self.user.clone();
        let remote = self.remote.clone();

        async move {
            let start = Instant::now();
            let (old_abs, old_display) = match jail::clean(&root, &oldpath) {
                Ok(cleaned) => cleaned,
                Err(e) => {
                    audit(&user, &remote, "cmd_Rename", &oldpath, "", 0, Some(&e));
                    metrics::observe_op(&user, "rename", "error", start.elapsed());
                    return Err(e.into());
                }
            };
            let (new_abs, new_display) = match jail::clean(&root, &newpath) {
                Ok(cleaned) => cleaned,
                Err(e) => {
                    audit(&user, &remote, "rename", &old_display, "", 0, Some(&e));
                    metrics::observe_op(&user, "rename", "error", start.elapsed());
                    return Err(e.into());
                }
            };

            match fs::rename(&old_abs, &new_abs).await {
                Ok(()) => {
                    audit(&user, &remote, "rename", &old_display, &new_display, 0, None);
                    metrics::observe_op(&user, "rename", "success", start.elapsed());
                    Ok(JailedFs::status_ok(id))
                }
                Err(e) => {
                    let err = Error::from(e);
                    audit(&user, &remote, "rename", &old_display, &new_display, 0, Some(&err));
                    metrics::observe_op(&user, "rename", "error", start.elapsed());
                    metrics::inc_storage_io_error("rename");
                    Err(err.into())
                }
            }
        }
    }

    fn setstat(
        &mut self,
        _id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> impl std::future::Future<Output = Result<Status, Self::Error>> + Send {
        let user = self.user.clone();
        let remote = self.remote.clone();
        async move {
            audit(
                &user,
                &remote,
                "cmd_unsupported",
                &path,
                "",
                0,
                Some(&Error::Unsupported("unsupported method: Setstat".into())),
            );
            Err(SftpError::unsupported())
        }
    }

    fn fsetstat(
        &mut self,
        _id: u32,
        _handle: String,
        _attrs: FileAttributes,
    ) -> impl std::future::Future<Output = Result<Status, Self::Error>> + Send {
        let user = self.user.clone();
        let remote = self.remote.clone();
        async move {
            audit(
                &user,
                &remote,
                "cmd_unsupported",
                "",
                "",
                0,
                Some(&Error::Unsupported("unsupported method: Fsetstat".into())),
            );
            Err(SftpError::unsupported())
        }
    }

    fn readlink(
        &mut self,
        _id: u32,
        path: String,
    ) -> impl std::future::Future<Output = Result<Name, Self::Error>> + Send {
        let user = self.user.clone();
        let remote = self.remote.clone();
        async move {
            audit(
                &user,
                &remote,
                "list_unsupported",
                &path,
                "",
                0,
                Some(&Error::Unsupported("unsupported list method: Readlink".into())),
            );
            Err(SftpError::unsupported())
        }
    }

    fn symlink(
        &mut self,
        _id: u32,
        linkpath: String,
        targetpath: String,
    ) -> impl std::future::Future<Output = Result<Status, Self::Error>> + Send {
        let user = self.user.clone();
        let remote = self.remote.clone();
        async move {
            audit(
                &user,
                &remote,
                "cmd_unsupported",
                &linkpath,
                &targetpath,
                0,
                Some(&Error::Unsupported("unsupported method: Symlink".into())),
            );
            Err(SftpError::unsupported())
        }
    }
}
