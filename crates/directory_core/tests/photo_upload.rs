use directory_core::db::open_db_in_memory;
use directory_core::{
    AuditFilter, BlobResult, BlobStore, FsBlobStore, NewResident, Pagination, PhotoUpload,
    Principal, ResidentService, ServiceError, ROLE_ADMIN,
};
use std::cell::Cell;

/// Counts puts so tests can assert that rejected uploads never reach storage.
struct CountingStore {
    puts: Cell<usize>,
}

impl BlobStore for CountingStore {
    fn put(&self, _bytes: &[u8], content_type_hint: Option<&str>) -> BlobResult<String> {
        self.puts.set(self.puts.get() + 1);
        Ok(format!("memory://{}", content_type_hint.unwrap_or("bin")))
    }
}

#[test]
fn upload_stores_file_sets_url_and_audits() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::new(dir.path(), "https://dir.example.com");
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ResidentService::new(&mut conn);
    let actor = Principal::new(1, "admin@example.com", [ROLE_ADMIN]);

    let created = service
        .create_resident(Some(&actor), &NewResident::new("Ana", "101"))
        .unwrap();
    let upload = PhotoUpload {
        file_name: Some("portrait.PNG"),
        bytes: b"\x89PNG fake image",
    };
    let updated = service
        .upload_photo(Some(&actor), created.id, upload, &store)
        .unwrap();

    let url = updated.photo_url.clone().unwrap();
    assert!(url.starts_with("https://dir.example.com/uploads/"));
    assert!(url.ends_with(".png"));
    let file_name = url.rsplit('/').next().unwrap();
    assert!(dir.path().join(file_name).exists());

    let filter = AuditFilter {
        action: Some("UPLOAD_RESIDENT_PHOTO".to_string()),
        ..AuditFilter::default()
    };
    let entries = service
        .list_audit_entries(&filter, Pagination::default())
        .unwrap()
        .items;
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.before.as_ref().unwrap()["photo_url"], serde_json::Value::Null);
    assert_eq!(entry.after.as_ref().unwrap()["photo_url"], url.as_str());
    let metadata = entry.metadata.as_ref().unwrap();
    assert_eq!(metadata["filename"], "portrait.PNG");
    assert_eq!(metadata["url"], url.as_str());
}

#[test]
fn upload_without_extension_defaults_to_jpg() {
    let store = CountingStore { puts: Cell::new(0) };
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ResidentService::new(&mut conn);
    let created = service
        .create_resident(None, &NewResident::new("Ana", "101"))
        .unwrap();

    let upload = PhotoUpload {
        file_name: Some("camera-upload"),
        bytes: b"jpeg bytes",
    };
    let updated = service.upload_photo(None, created.id, upload, &store).unwrap();
    assert_eq!(updated.photo_url.as_deref(), Some("memory://jpg"));
    assert_eq!(store.puts.get(), 1);
}

#[test]
fn rejected_uploads_never_reach_the_store() {
    let store = CountingStore { puts: Cell::new(0) };
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ResidentService::new(&mut conn).with_photo_max_bytes(8);
    let created = service
        .create_resident(None, &NewResident::new("Ana", "101"))
        .unwrap();

    let wrong_type = PhotoUpload {
        file_name: Some("resume.pdf"),
        bytes: b"%PDF",
    };
    assert!(matches!(
        service.upload_photo(None, created.id, wrong_type, &store),
        Err(ServiceError::Validation(_))
    ));

    let too_large = PhotoUpload {
        file_name: Some("big.jpg"),
        bytes: b"123456789",
    };
    let err = service
        .upload_photo(None, created.id, too_large, &store)
        .unwrap_err();
    assert!(err.to_string().contains("too large"));

    let missing = PhotoUpload {
        file_name: Some("ok.gif"),
        bytes: b"GIF89a",
    };
    assert!(matches!(
        service.upload_photo(None, 404, missing, &store),
        Err(ServiceError::NotFound(404))
    ));

    assert_eq!(store.puts.get(), 0);
    let total = service
        .list_audit_entries(&AuditFilter::default(), Pagination::default())
        .unwrap()
        .total;
    assert_eq!(total, 1);
    assert!(service.get_resident(created.id).unwrap().photo_url.is_none());
}
