use florandei_core::clock::parse_rfc3339_ms;
use florandei_core::db::open_db_in_memory;
use florandei_core::transfer::{parse_envelope, read_envelope, write_envelope};
use florandei_core::{
    GeoPoint, Photo, RegistroDraft, RegistroService, ServiceError, SqliteRegistroRepository,
    TransferError,
};
use serde_json::Value;

fn photo() -> Photo {
    Photo::new("image/png", vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]).unwrap()
}

#[test]
fn export_writes_versioned_camel_case_envelope_with_inline_photo() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());
    service
        .save(
            RegistroDraft::new(GeoPoint::new(-21.34, -47.74), "Ipê")
                .with_id("ipe")
                .with_tags(["Flor"])
                .with_photo(photo()),
        )
        .unwrap();

    let envelope = service.export().unwrap();
    let json = serde_json::to_value(&envelope).unwrap();

    assert_eq!(json["version"], "1.0");
    assert!(json["exportDate"].as_str().unwrap().ends_with('Z'));
    let entry = &json["registros"][0];
    assert_eq!(entry["id"], "ipe");
    assert_eq!(entry["hasPhoto"], Value::Bool(true));
    assert_eq!(entry["tags"][0], "Flor");
    assert!(entry["photo"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
    assert!(entry["createdAt"].is_string());
}

#[test]
fn backup_file_round_trip_restores_into_fresh_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backup.json");

    let original = {
        let mut conn = open_db_in_memory().unwrap();
        let mut service =
            RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());
        let saved = service
            .save(
                RegistroDraft::new(GeoPoint::new(-21.30, -47.70), "Bromélia")
                    .with_tags(["Planta nativa", "Flor"])
                    .with_created_at(1_700_000_000_000)
                    .with_photo(photo()),
            )
            .unwrap();
        service
            .save(RegistroDraft::new(GeoPoint::new(-21.31, -47.71), "Capivara"))
            .unwrap();
        write_envelope(&path, &service.export().unwrap()).unwrap();
        saved
    };

    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());
    let imported = service.import(read_envelope(&path).unwrap()).unwrap();
    assert_eq!(imported, 2);

    let restored = service.get(&original.id).unwrap().unwrap();
    assert_eq!(restored.registro.description, "Bromélia");
    assert_eq!(restored.registro.tags, vec!["Planta nativa", "Flor"]);
    assert_eq!(restored.registro.created_at, 1_700_000_000_000);
    assert_eq!(restored.photo, Some(photo()));
}

#[test]
fn import_overwrites_registros_with_same_id() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());
    service
        .save(RegistroDraft::new(GeoPoint::new(0.0, 0.0), "antigo").with_id("legacy-1"))
        .unwrap();

    let envelope = parse_envelope(
        r#"{
            "version": "1.0",
            "exportDate": "2024-09-01T00:00:00.000Z",
            "registros": [
                {
                    "id": "legacy-1",
                    "latitude": -21.33,
                    "longitude": -47.74,
                    "description": "novo",
                    "tags": ["Fauna"],
                    "createdAt": "2024-05-04T03:02:01.000Z",
                    "hasPhoto": false
                }
            ]
        }"#,
    )
    .unwrap();
    assert_eq!(service.import(envelope).unwrap(), 1);

    let registros = service.list().unwrap();
    assert_eq!(registros.len(), 1);
    assert_eq!(registros[0].id, "legacy-1");
    assert_eq!(registros[0].description, "novo");
    assert_eq!(
        registros[0].created_at,
        parse_rfc3339_ms("2024-05-04T03:02:01.000Z").unwrap()
    );
}

#[test]
fn import_without_ids_or_version_generates_ids() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());

    let envelope = parse_envelope(
        r#"{ "registros": [
            { "latitude": 1.0, "longitude": 2.0, "description": "a" },
            { "latitude": 3.0, "longitude": 4.0, "description": "b", "hasPhoto": true }
        ] }"#,
    )
    .unwrap();
    assert_eq!(service.import(envelope).unwrap(), 2);

    let registros = service.list().unwrap();
    assert_eq!(registros.len(), 2);
    assert_ne!(registros[0].id, registros[1].id);
    assert!(registros.iter().all(|registro| !registro.has_photo));
}

#[test]
fn invalid_entry_aborts_import_before_writing() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());

    let envelope = parse_envelope(
        r#"{ "version": "1.0", "registros": [
            { "id": "ok", "latitude": 1.0, "longitude": 2.0, "description": "fine" },
            { "id": "bad", "latitude": 120.0, "longitude": 2.0, "description": "out of range" }
        ] }"#,
    )
    .unwrap();

    assert!(matches!(
        service.import(envelope),
        Err(ServiceError::Validation(_))
    ));
    assert!(service.list().unwrap().is_empty());
}

#[test]
fn failed_write_leaves_journal_unchanged_after_partial_import() {
    let mut conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_second BEFORE INSERT ON registros
         WHEN NEW.id = 'second'
         BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
    )
    .unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());

    let envelope = parse_envelope(
        r#"{ "version": "1.0", "registros": [
            { "id": "first", "latitude": 1.0, "longitude": 2.0, "description": "a" },
            { "id": "second", "latitude": 3.0, "longitude": 4.0, "description": "b" }
        ] }"#,
    )
    .unwrap();

    assert!(matches!(service.import(envelope), Err(ServiceError::Repo(_))));
    assert!(service.list().unwrap().is_empty());
}

#[test]
fn import_rejects_unsupported_version_and_bad_photo() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());

    let future = parse_envelope(r#"{ "version": "2.0", "registros": [] }"#).unwrap();
    assert!(matches!(
        service.import(future),
        Err(ServiceError::Transfer(TransferError::UnsupportedVersion(_)))
    ));

    let bad_photo = parse_envelope(
        r#"{ "registros": [
            { "id": "p", "latitude": 1.0, "longitude": 2.0, "description": "x",
              "hasPhoto": true, "photo": "not a data url" }
        ] }"#,
    )
    .unwrap();
    assert!(matches!(
        service.import(bad_photo),
        Err(ServiceError::Transfer(TransferError::InvalidPhoto { .. }))
    ));
}

#[test]
fn malformed_backup_text_is_invalid_format() {
    assert!(matches!(
        parse_envelope("[1, 2, 3]"),
        Err(TransferError::InvalidFormat(_))
    ));
}
