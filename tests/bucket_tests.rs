mod common;

use bytes::Bytes;
use common::{CountingStore, adapter, test_config};
use gcs_media_storage::{
    config::ModuleConfig,
    models::media_file::{ImportFile, Subdirectory},
    services::bucket::Bucket,
};
use std::fs;

fn import(filename: &str, content: &'static [u8]) -> ImportFile {
    ImportFile {
        filename: filename.into(),
        directory: None,
        content: Bytes::from_static(content),
    }
}

#[tokio::test]
async fn load_by_filename_populates_and_clears_state() {
    let store = CountingStore::new();
    store.seed("media/catalog/a.jpg", b"abc").await;
    let mut bucket = Bucket::new(adapter(test_config("media"), store.clone()));

    assert!(bucket.load_by_filename("catalog/a.jpg").await.unwrap());
    assert_eq!(bucket.filename(), Some("catalog/a.jpg"));
    assert_eq!(bucket.content(), Some(&Bytes::from_static(b"abc")));
    assert_eq!(
        bucket.loaded().unwrap().checksum,
        "900150983cd24fb0d6963f7d28e17f72"
    );

    assert!(!bucket.load_by_filename("catalog/missing.jpg").await.unwrap());
    assert!(bucket.loaded().is_none());
    assert!(bucket.id().is_none());
}

#[tokio::test]
async fn load_by_filename_strips_media_directory() {
    let store = CountingStore::new();
    store.seed("catalog/a.jpg", b"abc").await;
    let config = ModuleConfig {
        media_dir: "/srv/shop/pub/media".into(),
        ..test_config("")
    };
    let mut bucket = Bucket::new(adapter(config, store.clone()));

    assert!(
        bucket
            .load_by_filename("/srv/shop/pub/media/catalog/a.jpg")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn import_collects_failures_and_continues() {
    let store = CountingStore::new();
    store.fail_put("media/b.jpg");
    let mut bucket = Bucket::new(adapter(test_config("media"), store.clone()));

    bucket
        .import_files(vec![
            import("a.jpg", b"a"),
            import("b.jpg", b"b"),
            import("c.jpg", b"c"),
        ])
        .await;

    assert_eq!(bucket.errors().len(), 1);
    assert!(store.body("media/a.jpg").await.is_some());
    assert!(store.body("media/b.jpg").await.is_none());
    assert!(store.body("media/c.jpg").await.is_some());
}

#[tokio::test]
async fn import_of_tmp_path_reports_unable_to_save() {
    let store = CountingStore::new();
    let mut bucket = Bucket::new(adapter(test_config(""), store.clone()));

    bucket
        .import_files(vec![ImportFile {
            directory: Some("catalog/tmp".into()),
            ..import("a.jpg", b"a")
        }])
        .await;

    assert_eq!(bucket.errors(), ["Unable to save file: catalog/tmp/a.jpg"]);
    assert_eq!(store.puts(), 0);
}

#[tokio::test]
async fn import_of_extensionless_dotfile_is_verified_against_the_bucket() {
    let store = CountingStore::new();
    let mut bucket = Bucket::new(adapter(test_config("media"), store.clone()));

    bucket
        .import_files(vec![ImportFile {
            directory: Some("downloadable".into()),
            ..import(".htaccess", b"deny from all")
        }])
        .await;

    assert!(bucket.errors().is_empty(), "{:?}", bucket.errors());
    assert_eq!(
        store.body("media/downloadable/.htaccess").await.unwrap(),
        Bytes::from_static(b"deny from all")
    );
}

#[tokio::test]
async fn file_operations_reach_extensionless_objects() {
    let store = CountingStore::new();
    store.seed("import/.htaccess", b"x").await;
    let bucket = Bucket::new(adapter(test_config(""), store.clone()));

    bucket
        .copy_file("import/.htaccess", "export/.htaccess")
        .await
        .unwrap();
    assert!(store.body("export/.htaccess").await.is_some());

    bucket
        .rename_file("export/.htaccess", "archive/.htaccess")
        .await
        .unwrap();
    assert!(store.body("export/.htaccess").await.is_none());
    assert!(store.body("archive/.htaccess").await.is_some());

    bucket.delete_file("archive/.htaccess").await.unwrap();
    assert!(store.body("archive/.htaccess").await.is_none());
}

#[tokio::test]
async fn export_files_pages_until_exhausted() {
    let store = CountingStore::new();
    for key in ["media/a.jpg", "media/b.jpg", "media/c/d.jpg"] {
        store.seed(key, b"x").await;
    }
    let mut bucket = Bucket::new(adapter(test_config("media"), store.clone()));

    let first = bucket.export_files(0, 2).await.unwrap().unwrap();
    let names: Vec<_> = first.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(names, ["a.jpg", "b.jpg"]);

    let second = bucket.export_files(2, 2).await.unwrap().unwrap();
    let names: Vec<_> = second.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(names, ["c/d.jpg"]);

    assert!(bucket.export_files(3, 2).await.unwrap().is_none());

    // offset zero restarts the export
    assert_eq!(bucket.export_files(0, 10).await.unwrap().unwrap().len(), 3);
}

#[tokio::test]
async fn export_of_empty_bucket_is_none() {
    let store = CountingStore::new();
    let mut bucket = Bucket::new(adapter(test_config(""), store.clone()));

    assert!(bucket.export_files(0, 10).await.unwrap().is_none());
    assert!(bucket.export_directories(0, 10).await.unwrap().is_none());
}

#[tokio::test]
async fn directory_views_strip_the_bucket_prefix() {
    let store = CountingStore::new();
    for key in [
        "media/catalog/a.jpg",
        "media/catalog/product/b.jpg",
        "media/catalog/category/c.jpg",
    ] {
        store.seed(key, b"x").await;
    }
    let bucket = Bucket::new(adapter(test_config("media"), store.clone()));

    let subdirs = bucket.get_subdirectories("catalog").await.unwrap();
    assert_eq!(
        subdirs,
        [
            Subdirectory {
                name: "category".into()
            },
            Subdirectory {
                name: "product".into()
            },
        ]
    );

    let files = bucket.get_directory_files("catalog").await.unwrap();
    let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(names, ["catalog/a.jpg"]);
}

#[tokio::test]
async fn delete_folder_purges_only_that_folder() {
    let store = CountingStore::new();
    for key in ["media/cache/a.jpg", "media/cache/x/b.jpg", "media/cached.jpg"] {
        store.seed(key, b"x").await;
    }
    let bucket = Bucket::new(adapter(test_config("media"), store.clone()));

    assert_eq!(bucket.delete_folder("").await.unwrap(), 0);
    assert_eq!(bucket.delete_folder("cache").await.unwrap(), 2);
    assert!(store.body("media/cached.jpg").await.is_some());
}

#[tokio::test]
async fn file_operations_ignore_missing_sources() {
    let store = CountingStore::new();
    store.seed("a.jpg", b"x").await;
    let bucket = Bucket::new(adapter(test_config(""), store.clone()));

    bucket.copy_file("a.jpg", "b.jpg").await.unwrap();
    bucket.rename_file("b.jpg", "c.jpg").await.unwrap();
    bucket.copy_file("missing.jpg", "d.jpg").await.unwrap();
    bucket.delete_file("missing.jpg").await.unwrap();

    assert!(bucket.file_exists("a.jpg").await.unwrap());
    assert!(!bucket.file_exists("b.jpg").await.unwrap());
    assert!(bucket.file_exists("c.jpg").await.unwrap());
    assert!(!bucket.file_exists("d.jpg").await.unwrap());

    bucket.delete_file("c.jpg").await.unwrap();
    assert!(!bucket.file_exists("c.jpg").await.unwrap());
}

#[tokio::test]
async fn save_file_uploads_from_media_directory() {
    let media = tempfile::tempdir().unwrap();
    fs::create_dir_all(media.path().join("wysiwyg")).unwrap();
    fs::write(media.path().join("wysiwyg/banner.png"), b"png").unwrap();

    let store = CountingStore::new();
    let config = ModuleConfig {
        media_dir: media.path().to_path_buf(),
        ..test_config("media")
    };
    let mut bucket = Bucket::new(adapter(config, store.clone()));

    bucket.save_file("wysiwyg/banner.png").await;

    assert!(bucket.errors().is_empty());
    assert_eq!(
        store.body("media/wysiwyg/banner.png").await.unwrap(),
        Bytes::from_static(b"png")
    );
}

#[tokio::test]
async fn clear_removes_everything_under_prefix() {
    let store = CountingStore::new();
    for key in ["media/a.jpg", "media/b/c.jpg", "elsewhere.jpg"] {
        store.seed(key, b"x").await;
    }
    let bucket = Bucket::new(adapter(test_config("media"), store.clone()));

    assert_eq!(bucket.clear().await.unwrap(), 2);
    assert!(store.body("elsewhere.jpg").await.is_some());
}

#[test]
fn file_path_joins_with_optional_prefix() {
    assert_eq!(Bucket::get_file_path("a.jpg", Some("catalog/")), "catalog/a.jpg");
    assert_eq!(Bucket::get_file_path("a.jpg", None), "a.jpg");
}
