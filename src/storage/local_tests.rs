use super::*;
use crate::error::Error;
use tokio::io::AsyncReadExt;

async fn read_all(mut reader: BlobReader) -> Vec<u8> {
    let mut out = Vec::with_capacity(reader.size as usize);
    let mut chunk = [0u8; 1024];
    loop {
        let n = reader.body.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    out
}

async fn put_blob(store: &LocalStore, name: &str, bytes: &[u8]) {
    let mut sink = store.open_for_write(name, bytes.len() as u64).await.unwrap();
    sink.write_chunk(bytes).await.unwrap();
    sink.commit().await.unwrap();
}

#[tokio::test]
async fn write_and_read_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalStore::new(tmp.path()).unwrap();
    put_blob(&store, "greeting.txt", b"hello").await;

    let reader = store.open_for_read("greeting.txt").await.unwrap();
    assert_eq!(reader.size, 5);
    assert_eq!(read_all(reader).await, b"hello");
}

#[tokio::test]
async fn missing_blob_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalStore::new(tmp.path()).unwrap();
    let err = store.open_for_read("absent.bin").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(err.wire_reply().as_deref(), Some("ERR File not found"));
}

#[tokio::test]
async fn uncommitted_upload_is_invisible() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalStore::new(tmp.path()).unwrap();
    let mut sink = store.open_for_write("pending.bin", 8).await.unwrap();
    sink.write_chunk(b"1234").await.unwrap();

    // Mid-write the blob must appear neither in the listing nor for reads.
    assert!(store.list().await.unwrap().is_empty());
    assert!(store.open_for_read("pending.bin").await.is_err());

    sink.write_chunk(b"5678").await.unwrap();
    sink.commit().await.unwrap();
    let names: Vec<String> = store.list().await.unwrap().into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["pending.bin".to_string()]);
}

#[tokio::test]
async fn aborted_upload_leaves_no_residue() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalStore::new(tmp.path()).unwrap();
    let mut sink = store.open_for_write("doomed.bin", 1000).await.unwrap();
    sink.write_chunk(&[0u8; 200]).await.unwrap();
    sink.abort().await;

    assert!(store.list().await.unwrap().is_empty());
    // The staging file itself must be gone, not just hidden.
    let leftover = std::fs::read_dir(tmp.path()).unwrap().count();
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn dropped_sink_cleans_up_like_abort() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalStore::new(tmp.path()).unwrap();
    {
        let mut sink = store.open_for_write("zombie.bin", 100).await.unwrap();
        sink.write_chunk(&[7u8; 10]).await.unwrap();
    }
    assert!(store.list().await.unwrap().is_empty());
    let leftover = std::fs::read_dir(tmp.path()).unwrap().count();
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn short_commit_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalStore::new(tmp.path()).unwrap();
    let mut sink = store.open_for_write("short.bin", 1000).await.unwrap();
    sink.write_chunk(&[1u8; 200]).await.unwrap();
    let err = sink.commit().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn put_overwrites_existing_name() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalStore::new(tmp.path()).unwrap();
    put_blob(&store, "config.toml", b"first version").await;
    put_blob(&store, "config.toml", b"second").await;

    let blobs = store.list().await.unwrap();
    assert_eq!(blobs.len(), 1);
    assert_eq!(blobs[0].size, 6);
    let reader = store.open_for_read("config.toml").await.unwrap();
    assert_eq!(read_all(reader).await, b"second");
}

#[tokio::test]
async fn zero_byte_blob_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalStore::new(tmp.path()).unwrap();
    put_blob(&store, "empty.dat", b"").await;
    let reader = store.open_for_read("empty.dat").await.unwrap();
    assert_eq!(reader.size, 0);
    assert!(read_all(reader).await.is_empty());
}

#[tokio::test]
async fn list_reports_metadata_and_skips_hidden_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LocalStore::new(tmp.path()).unwrap();
    put_blob(&store, "a.bin", &[9u8; 42]).await;
    std::fs::write(tmp.path().join(".hidden"), b"x").unwrap();
    std::fs::create_dir(tmp.path().join("subdir")).unwrap();

    let blobs = store.list().await.unwrap();
    assert_eq!(blobs.len(), 1);
    assert_eq!(blobs[0].name, "a.bin");
    assert_eq!(blobs[0].size, 42);
    let age = Utc::now().signed_duration_since(blobs[0].modified);
    assert!(age.num_seconds().abs() < 60, "mtime should be recent: {:?}", blobs[0].modified);
}
