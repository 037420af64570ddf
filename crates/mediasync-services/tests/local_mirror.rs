//! End-to-end sync against the local mirror backend.

use chrono::{TimeZone, Utc};
use mediasync_services::{
    AttachmentMetadata, DeleteOutcome, FileSetEvent, KeyMapper, MediaEvent, Provider,
    StaticHost, SyncConfig, SyncService, UrlRewriter,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

struct Site {
    _dir: TempDir,
    uploads: PathBuf,
    mirror: PathBuf,
}

fn site() -> Site {
    let dir = tempdir().unwrap();
    let uploads = dir.path().join("uploads");
    let mirror = dir.path().join("mirror");
    std::fs::create_dir_all(uploads.join("2024/01")).unwrap();
    Site {
        _dir: dir,
        uploads,
        mirror,
    }
}

fn write(path: &Path, contents: &[u8]) {
    std::fs::write(path, contents).unwrap();
}

fn service(site: &Site, upload_root: Option<PathBuf>) -> SyncService {
    let mut config = SyncConfig::new(Provider::Local, "");
    config.prefix = "/media/".to_string();
    config.local_mirror_path = Some(site.mirror.display().to_string());

    let host = Arc::new(StaticHost {
        upload_root,
        site_url: Some("http://site".to_string()),
        upload_url: Some("http://site/wp-content/uploads".to_string()),
    });
    SyncService::new(config, host)
}

fn january() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap()
}

#[test]
fn mapped_keys_have_single_slashes() {
    let reference = january();
    for prefix in ["", "media", "/media", "media/", "//media//"] {
        let mapper = KeyMapper::new(prefix, Some(PathBuf::from("/srv/uploads")), true);
        let key = mapper
            .map_key(Path::new("/srv/uploads/2024/01/a.jpg"), reference)
            .unwrap();

        assert!(!key.starts_with('/'), "{key}");
        assert!(!key.contains("//"), "{key}");
        assert!(key.ends_with("2024/01/a.jpg"), "{key}");
    }
}

#[tokio::test]
async fn partial_file_set_uploads_existing_files() {
    let site = site();
    let month = site.uploads.join("2024/01");
    write(&month.join("a.jpg"), b"primary");
    write(&month.join("a-150x150.jpg"), b"thumb");

    let service = service(&site, Some(site.uploads.clone()));
    let event = FileSetEvent::new(month.join("a.jpg"))
        .with_derived(["a-150x150.jpg", "a-300x200.jpg"])
        .with_reference_time(january());
    let report = service.sync_file_set(&event).await;

    assert!(report.is_clean());
    assert_eq!(report.uploaded.len(), 2);
    assert_eq!(report.skipped, vec![month.join("a-300x200.jpg")]);

    let mirrored = site.mirror.join("media/2024/01");
    assert_eq!(std::fs::read(mirrored.join("a.jpg")).unwrap(), b"primary");
    assert_eq!(std::fs::read(mirrored.join("a-150x150.jpg")).unwrap(), b"thumb");
    assert!(!mirrored.join("a-300x200.jpg").exists());
}

#[tokio::test]
async fn repeated_put_and_delete_are_idempotent() {
    let site = site();
    let primary = site.uploads.join("2024/01/a.jpg");
    write(&primary, b"v1");

    let service = service(&site, Some(site.uploads.clone()));
    let event = FileSetEvent::new(&primary).with_reference_time(january());
    service.dispatch(MediaEvent::FileSetReady(event.clone())).await;
    write(&primary, b"v2");
    service.dispatch(MediaEvent::FileSetReady(event)).await;

    let mirrored = site.mirror.join("media/2024/01/a.jpg");
    assert_eq!(std::fs::read(&mirrored).unwrap(), b"v2");

    let expected = DeleteOutcome::Deleted {
        key: "media/2024/01/a.jpg".to_string(),
    };
    assert_eq!(service.delete_file(&primary).await, expected);
    assert_eq!(service.delete_file(&primary).await, expected);
    assert!(!mirrored.exists());
}

#[tokio::test]
async fn unresolved_upload_root_skips_everything() {
    let site = site();
    let primary = site.uploads.join("2024/01/a.jpg");
    write(&primary, b"primary");

    let service = service(&site, None);
    let metadata: AttachmentMetadata = serde_json::from_str(
        r#"{"file":"2024/01/a.jpg","width":1024,"height":768,"sizes":{}}"#,
    )
    .unwrap();

    let returned = service
        .upload_attachment(metadata.clone(), &primary, Some(january()))
        .await;

    assert_eq!(returned, metadata);
    assert!(!site.mirror.exists() || std::fs::read_dir(&site.mirror).unwrap().next().is_none());
}

#[test]
fn html_round_trip_changes_only_the_host() {
    let rewriter =
        UrlRewriter::new("http://site/wp-content/uploads", Some("http://site"), "cdn.example.com")
            .unwrap();

    let html = "<div>\n<img src=\"http://site/wp-content/uploads/2024/01/a.jpg\">\n</div>";
    let out = rewriter.rewrite_html(html);
    assert_eq!(
        out,
        "<div>\n<img src=\"http://cdn.example.com/wp-content/uploads/2024/01/a.jpg\">\n</div>"
    );

    let untouched = "<img src=\"http://other.test/a.jpg\">";
    assert_eq!(rewriter.rewrite_html(untouched), untouched);
}

#[tokio::test]
async fn file_outside_upload_root_is_never_mirrored() {
    let site = site();
    let outside = site.uploads.parent().unwrap().join("secret.txt");
    write(&outside, b"secret");

    let service = service(&site, Some(site.uploads.clone()));
    let report = service
        .sync_file_set(&FileSetEvent::new(&outside).with_reference_time(january()))
        .await;

    assert!(report.uploaded.is_empty());
    assert!(!site.mirror.exists() || std::fs::read_dir(&site.mirror).unwrap().next().is_none());
}
