use directory_core::db::open_db_in_memory;
use directory_core::{
    AuditAction, AuditEntry, AuditFilter, NewResident, Pagination, Patch, Principal,
    ResidentFilter, ResidentPatch, ResidentService, ServiceError, ROLE_ADMIN,
};
use rusqlite::Connection;

fn admin() -> Principal {
    Principal::new(1, "admin@example.com", [ROLE_ADMIN])
}

fn entries(service: &ResidentService<'_>) -> Vec<AuditEntry> {
    let mut items = service
        .list_audit_entries(&AuditFilter::default(), Pagination::new(Some(200), 0))
        .unwrap()
        .items;
    items.reverse();
    items
}

fn resident_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM residents;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn create_records_one_entry_with_null_before() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ResidentService::new(&mut conn);
    let actor = admin();

    let created = service
        .create_resident(Some(&actor), &NewResident::new("Ana Souza", "101"))
        .unwrap();

    let log = entries(&service);
    assert_eq!(log.len(), 1);
    let entry = &log[0];
    assert_eq!(entry.action, "CREATE_RESIDENT");
    assert_eq!(entry.actor_user_id, Some(1));
    assert_eq!(entry.actor_email.as_deref(), Some("admin@example.com"));
    assert_eq!(entry.entity_type.as_deref(), Some("resident"));
    assert_eq!(entry.entity_id, Some(created.id.to_string()));
    assert!(entry.before.is_none());
    assert_eq!(entry.after, Some(serde_json::to_value(&created).unwrap()));
}

#[test]
fn update_records_before_and_after_snapshots() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ResidentService::new(&mut conn);

    let created = service
        .create_resident(None, &NewResident::new("Ana", "101"))
        .unwrap();
    let patch = ResidentPatch {
        unit: Patch::Set("102".to_string()),
        ..ResidentPatch::default()
    };
    let updated = service.update_resident(None, created.id, &patch).unwrap();

    let log = entries(&service);
    assert_eq!(log.len(), 2);
    let entry = &log[1];
    assert_eq!(entry.action, AuditAction::UpdateResident.as_str());
    assert!(entry.actor_user_id.is_none());
    assert!(entry.actor_email.is_none());
    assert_eq!(entry.before, Some(serde_json::to_value(&created).unwrap()));
    assert_eq!(entry.after, Some(serde_json::to_value(&updated).unwrap()));
    assert_eq!(entry.after.as_ref().unwrap()["unit"], "102");
}

#[test]
fn deactivate_sets_timestamp_and_is_audited_even_when_repeated() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ResidentService::new(&mut conn);
    let actor = admin();

    let created = service
        .create_resident(Some(&actor), &NewResident::new("Ana", "101"))
        .unwrap();
    let first = service.deactivate_resident(Some(&actor), created.id).unwrap();
    let second = service.deactivate_resident(Some(&actor), created.id).unwrap();

    assert!(!first.is_active);
    assert!(first.deactivated_at.is_some());
    assert_eq!(second.deactivated_at, first.deactivated_at);

    let log = entries(&service);
    let actions: Vec<&str> = log.iter().map(|entry| entry.action.as_str()).collect();
    assert_eq!(
        actions,
        vec!["CREATE_RESIDENT", "DEACTIVATE_RESIDENT", "DEACTIVATE_RESIDENT"]
    );
    assert_eq!(log[2].before, Some(serde_json::to_value(&first).unwrap()));
    assert_eq!(log[2].after, Some(serde_json::to_value(&second).unwrap()));
}

#[test]
fn no_op_update_is_still_audited() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ResidentService::new(&mut conn);

    let created = service
        .create_resident(None, &NewResident::new("Ana", "101"))
        .unwrap();
    let same = service
        .update_resident(None, created.id, &ResidentPatch::default())
        .unwrap();

    assert_eq!(same, created);
    let log = entries(&service);
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].before, log[1].after);
}

#[test]
fn missing_resident_fails_without_audit_write() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ResidentService::new(&mut conn);

    let patch = ResidentPatch {
        notes: Patch::Set(Some("x".to_string())),
        ..ResidentPatch::default()
    };
    assert!(matches!(
        service.update_resident(None, 41, &patch),
        Err(ServiceError::NotFound(41))
    ));
    assert!(matches!(
        service.deactivate_resident(None, 41),
        Err(ServiceError::NotFound(41))
    ));
    assert!(matches!(service.get_resident(41), Err(ServiceError::NotFound(41))));
    assert!(entries(&service).is_empty());
}

#[test]
fn validation_failure_writes_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let mut service = ResidentService::new(&mut conn);
        let err = service
            .create_resident(None, &NewResident::new(" ", "101"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref message) if message.contains("full_name")));
        assert!(entries(&service).is_empty());
    }
    assert_eq!(resident_count(&conn), 0);
}

#[test]
fn audit_failure_rolls_back_resident_write() {
    let mut conn = open_db_in_memory().unwrap();
    // Every audit insert now fails after the resident row is written.
    conn.execute_batch("ALTER TABLE audit_log RENAME COLUMN action TO action_tag;")
        .unwrap();

    {
        let mut service = ResidentService::new(&mut conn);
        let result = service.create_resident(None, &NewResident::new("Ana", "101"));
        assert!(matches!(result, Err(ServiceError::Repo(_))));
    }
    assert_eq!(resident_count(&conn), 0);
}

#[test]
fn audit_listing_filters_and_orders_newest_first() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ResidentService::new(&mut conn);
    let admin = admin();
    let other = Principal::new(2, "clerk@example.com", [ROLE_ADMIN]);

    let ana = service
        .create_resident(Some(&admin), &NewResident::new("Ana", "101"))
        .unwrap();
    service
        .create_resident(Some(&other), &NewResident::new("Bo", "102"))
        .unwrap();
    service.deactivate_resident(Some(&other), ana.id).unwrap();

    let all = service
        .list_audit_entries(&AuditFilter::default(), Pagination::default())
        .unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.items[0].action, "DEACTIVATE_RESIDENT");
    assert!(all.items[0].id > all.items[1].id);

    let by_clerk = AuditFilter {
        actor_email: Some("CLERK".to_string()),
        ..AuditFilter::default()
    };
    assert_eq!(
        service
            .list_audit_entries(&by_clerk, Pagination::default())
            .unwrap()
            .total,
        2
    );

    let creates = AuditFilter {
        action: Some("CREATE_RESIDENT".to_string()),
        entity_type: Some("resident".to_string()),
        ..AuditFilter::default()
    };
    let page = service
        .list_audit_entries(&creates, Pagination::new(Some(1), 0))
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
}

#[test]
fn service_listing_matches_repository_order() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ResidentService::new(&mut conn);

    let first = service
        .create_resident(None, &NewResident::new("Ana", "101"))
        .unwrap();
    service
        .create_resident(None, &NewResident::new("Bo", "102"))
        .unwrap();
    service.deactivate_resident(None, first.id).unwrap();

    let page = service
        .list_residents(&ResidentFilter::default(), Pagination::default())
        .unwrap();
    let names: Vec<&str> = page.items.iter().map(|r| r.full_name.as_str()).collect();
    assert_eq!(names, vec!["Bo", "Ana"]);
}

#[test]
fn audit_actor_filter_folds_non_ascii_case() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ResidentService::new(&mut conn);
    let renee = Principal::new(3, "RENÉE@example.com", [ROLE_ADMIN]);

    service
        .create_resident(Some(&renee), &NewResident::new("Ana", "101"))
        .unwrap();
    service
        .create_resident(Some(&admin()), &NewResident::new("Bo", "102"))
        .unwrap();

    let by_renee = AuditFilter {
        actor_email: Some("renée@".to_string()),
        ..AuditFilter::default()
    };
    let page = service
        .list_audit_entries(&by_renee, Pagination::default())
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].actor_email.as_deref(), Some("RENÉE@example.com"));
}
