//! End-to-end tests for the jailed filesystem adapter, driven through the
//! SFTP handler interface.

use pelican_sftp::JailedFs;
use russh_sftp::protocol::{FileAttributes, OpenFlags, StatusCode};
use russh_sftp::server::Handler;
use tempfile::TempDir;

fn handler_for(root: &TempDir, quota_bytes: u64, quota_files: u64) -> JailedFs {
    JailedFs::new(
        root.path().to_path_buf(),
        "alice",
        "10.0.0.1:50022",
        quota_bytes,
        quota_files,
    )
}

async fn put(fs: &mut JailedFs, path: &str, data: &[u8]) -> Result<(), StatusCode> {
    let handle = fs
        .open(
            1,
            path.to_string(),
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            FileAttributes::default(),
        )
        .await
        .map_err(StatusCode::from)?
        .handle;
    fs.write(2, handle.clone(), 0, data.to_vec())
        .await
        .map_err(StatusCode::from)?;
    fs.close(3, handle).await.map_err(StatusCode::from)?;
    Ok(())
}

async fn get(fs: &mut JailedFs, path: &str) -> Result<Vec<u8>, StatusCode> {
    let handle = fs
        .open(4, path.to_string(), OpenFlags::READ, FileAttributes::default())
        .await
        .map_err(StatusCode::from)?
        .handle;
    let mut out = Vec::new();
    let mut offset = 0u64;
    loop {
        match fs.read(5, handle.clone(), offset, 32 * 1024).await {
            Ok(data) => {
                offset += data.data.len() as u64;
                out.extend_from_slice(&data.data);
            }
            Err(e) if StatusCode::from(e.clone()) == StatusCode::Eof => break,
            Err(e) => return Err(StatusCode::from(e)),
        }
    }
    fs.close(6, handle).await.map_err(StatusCode::from)?;
    Ok(out)
}

#[tokio::test]
async fn test_list_empty_root() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 0, 0);

    let handle = fs.opendir(1, "/".into()).await.unwrap().handle;
    let err = fs.readdir(2, handle).await.unwrap_err();
    assert_eq!(StatusCode::from(err), StatusCode::Eof);
}

#[tokio::test]
async fn test_list_escape_rejected_without_directory_read() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 0, 0);

    let err = fs.opendir(1, "/../../etc".into()).await.unwrap_err();
    assert_eq!(StatusCode::from(err), StatusCode::Failure);
}

#[tokio::test]
async fn test_upload_download_round_trip() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 0, 0);

    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    put(&mut fs, "/blob.bin", &payload).await.unwrap();
    let fetched = get(&mut fs, "/blob.bin").await.unwrap();
    assert_eq!(fetched, payload);
}

#[tokio::test]
async fn test_upload_is_atomic() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 0, 0);

    let handle = fs
        .open(
            1,
            "/eve.bin".into(),
            OpenFlags::WRITE | OpenFlags::CREATE,
            FileAttributes::default(),
        )
        .await
        .unwrap()
        .handle;
    let chunk = vec![0xabu8; 1 << 20];
    fs.write(2, handle.clone(), 0, chunk.clone()).await.unwrap();

    // Mid-transfer: the final path does not exist, only the temp does.
    let err = fs.stat(3, "/eve.bin".into()).await.unwrap_err();
    assert_eq!(StatusCode::from(err), StatusCode::NoSuchFile);
    assert!(root.path().join("eve.bin.uploading").exists());

    fs.close(4, handle).await.unwrap();
    let attrs = fs.stat(5, "/eve.bin".into()).await.unwrap();
    assert_eq!(attrs.attrs.size, Some(chunk.len() as u64));
    assert!(!root.path().join("eve.bin.uploading").exists());
}

#[tokio::test]
async fn test_byte_quota_counts_existing_usage() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("existing.bin"), vec![0u8; 512]).unwrap();
    let mut fs = handler_for(&root, 1024, 0);

    // 512 already used + 600 new > 1024: the write aborts.
    let err = put(&mut fs, "/big.bin", &vec![1u8; 600]).await.unwrap_err();
    assert_eq!(err, StatusCode::Failure);
    assert!(!root.path().join("big.bin").exists());
    assert!(!root.path().join("big.bin.uploading").exists());

    // Exactly filling the remaining budget is fine.
    put(&mut fs, "/fits.bin", &vec![1u8; 512]).await.unwrap();
}

#[tokio::test]
async fn test_file_count_quota_checked_at_open() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("one.bin"), b"x").unwrap();
    std::fs::write(root.path().join("two.bin"), b"y").unwrap();
    let mut fs = handler_for(&root, 0, 2);

    let err = fs
        .open(
            1,
            "/three.bin".into(),
            OpenFlags::WRITE | OpenFlags::CREATE,
            FileAttributes::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(StatusCode::from(err), StatusCode::Failure);

    // Overwriting an existing file also counts against the cap.
    let err = fs
        .open(
            2,
            "/one.bin".into(),
            OpenFlags::WRITE | OpenFlags::CREATE,
            FileAttributes::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(StatusCode::from(err), StatusCode::Failure);
}

#[tokio::test]
async fn test_zero_length_upload_creates_empty_file() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 1024, 0);

    put(&mut fs, "/empty.txt", b"").await.unwrap();
    let attrs = fs.stat(1, "/empty.txt".into()).await.unwrap();
    assert_eq!(attrs.attrs.size, Some(0));
}

#[tokio::test]
async fn test_put_creates_parent_directories() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 0, 0);

    put(&mut fs, "/a/b/c/file.txt", b"nested").await.unwrap();
    assert_eq!(get(&mut fs, "/a/b/c/file.txt").await.unwrap(), b"nested");
}

#[tokio::test]
async fn test_rename_within_root() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 0, 0);

    put(&mut fs, "/from.txt", b"data").await.unwrap();
    fs.rename(1, "/from.txt".into(), "/to.txt".into()).await.unwrap();
    assert!(!root.path().join("from.txt").exists());
    assert_eq!(get(&mut fs, "/to.txt").await.unwrap(), b"data");
}

#[tokio::test]
async fn test_rename_across_root_boundary_rejected() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 0, 0);

    put(&mut fs, "/keep.txt", b"data").await.unwrap();
    let err = fs
        .rename(1, "/keep.txt".into(), "/../outside.txt".into())
        .await
        .unwrap_err();
    assert_eq!(StatusCode::from(err), StatusCode::Failure);
    assert!(root.path().join("keep.txt").exists());
    assert!(!root.path().parent().unwrap().join("outside.txt").exists());
}

#[tokio::test]
async fn test_mkdir_rmdir_and_remove() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 0, 0);

    fs.mkdir(1, "/sub".into(), FileAttributes::default()).await.unwrap();
    assert!(root.path().join("sub").is_dir());

    put(&mut fs, "/sub/file.txt", b"x").await.unwrap();

    // Non-empty directory: the shared unlink primitive fails.
    assert!(fs.rmdir(2, "/sub".into()).await.is_err());

    fs.remove(3, "/sub/file.txt".into()).await.unwrap();
    fs.rmdir(4, "/sub".into()).await.unwrap();
    assert!(!root.path().join("sub").exists());
}

#[tokio::test]
async fn test_read_open_missing_file() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 0, 0);

    let err = fs
        .open(1, "/ghost.txt".into(), OpenFlags::READ, FileAttributes::default())
        .await
        .unwrap_err();
    assert_eq!(StatusCode::from(err), StatusCode::NoSuchFile);
}

#[tokio::test]
async fn test_symlink_operations_unsupported() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 0, 0);

    let err = fs
        .symlink(1, "/link".into(), "/target".into())
        .await
        .unwrap_err();
    assert_eq!(StatusCode::from(err), StatusCode::OpUnsupported);

    let err = fs.readlink(2, "/link".into()).await.unwrap_err();
    assert_eq!(StatusCode::from(err), StatusCode::OpUnsupported);
}

#[tokio::test]
async fn test_realpath_reports_jail_relative_view() {
    let root = TempDir::new().unwrap();
    let mut fs = handler_for(&root, 0, 0);

    let name = fs.realpath(1, ".".into()).await.unwrap();
    assert_eq!(name.files[0].filename, "/");

    let name = fs.realpath(2, "a/./b".into()).await.unwrap();
    assert_eq!(name.files[0].filename, "/a/b");
}

#[tokio::test]
async fn test_stale_upload_temp_is_replaced() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("doc.txt.uploading"), b"stale junk").unwrap();
    let mut fs = handler_for(&root, 0, 0);

    put(&mut fs, "/doc.txt", b"fresh").await.unwrap();
    assert_eq!(get(&mut fs, "/doc.txt").await.unwrap(), b"fresh");
    assert!(!root.path().join("doc.txt.uploading").exists());
}
