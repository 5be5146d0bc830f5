use florandei_core::clock::parse_rfc3339_ms;
use florandei_core::db::open_db_in_memory;
use florandei_core::service::stats::TOP_TAGS_LIMIT;
use florandei_core::{
    GeoPoint, Photo, RegistroDraft, RegistroFilter, RegistroService, SortOrder,
    SqliteRegistroRepository, TagCount,
};

fn ms(value: &str) -> i64 {
    parse_rfc3339_ms(value).unwrap()
}

fn seed(service: &mut RegistroService<SqliteRegistroRepository<'_>>) {
    let point = GeoPoint::new(-21.3367, -47.7453);
    let photo = Photo::new("image/jpeg", vec![0xFF, 0xD8, 0xFF]).unwrap();
    service
        .save(
            RegistroDraft::new(point, "Ipê amarelo na praça")
                .with_id("ipe")
                .with_tags(["Árvore", "Flor"])
                .with_created_at(ms("2024-08-10T12:00:00.000Z"))
                .with_photo(photo),
        )
        .unwrap();
    service
        .save(
            RegistroDraft::new(point, "Bromélia no tronco")
                .with_id("bromelia")
                .with_tags(["Planta nativa", "Flor"])
                .with_created_at(ms("2024-09-01T08:30:00.000Z")),
        )
        .unwrap();
    service
        .save(
            RegistroDraft::new(point, "Pegadas de capivara")
                .with_id("capivara")
                .with_tags(["Fauna"])
                .with_created_at(ms("2024-09-20T17:45:00.000Z")),
        )
        .unwrap();
}

fn ids(registros: Vec<florandei_core::Registro>) -> Vec<String> {
    registros.into_iter().map(|registro| registro.id).collect()
}

#[test]
fn empty_filter_lists_all_newest_first() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());
    seed(&mut service);

    let listed = service.filter(&RegistroFilter::default()).unwrap();
    assert_eq!(ids(listed), vec!["capivara", "bromelia", "ipe"]);
}

#[test]
fn ascending_sort_reverses_order() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());
    seed(&mut service);

    let filter = RegistroFilter {
        sort: SortOrder::DateAsc,
        ..RegistroFilter::default()
    };
    assert_eq!(
        ids(service.filter(&filter).unwrap()),
        vec!["ipe", "bromelia", "capivara"]
    );
}

#[test]
fn search_matches_description_case_insensitively() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());
    seed(&mut service);

    let filter = RegistroFilter {
        search: Some("BROMÉLIA".to_string()),
        ..RegistroFilter::default()
    };
    assert_eq!(ids(service.filter(&filter).unwrap()), vec!["bromelia"]);

    let blank = RegistroFilter {
        search: Some("   ".to_string()),
        ..RegistroFilter::default()
    };
    assert_eq!(service.filter(&blank).unwrap().len(), 3);
}

#[test]
fn tag_filter_is_exact_and_combines_with_search() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());
    seed(&mut service);

    let by_tag = RegistroFilter {
        tag: Some(" Flor ".to_string()),
        ..RegistroFilter::default()
    };
    assert_eq!(ids(service.filter(&by_tag).unwrap()), vec!["bromelia", "ipe"]);

    let partial_tag = RegistroFilter {
        tag: Some("Flo".to_string()),
        ..RegistroFilter::default()
    };
    assert!(service.filter(&partial_tag).unwrap().is_empty());

    let combined = RegistroFilter {
        search: Some("praça".to_string()),
        tag: Some("Flor".to_string()),
        sort: SortOrder::DateAsc,
    };
    assert_eq!(ids(service.filter(&combined).unwrap()), vec!["ipe"]);
}

#[test]
fn tags_are_distinct_and_sorted() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());
    seed(&mut service);

    assert_eq!(
        service.tags().unwrap(),
        vec!["Fauna", "Flor", "Planta nativa", "Árvore"]
    );
}

#[test]
fn statistics_summarize_journal() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());
    seed(&mut service);

    let stats = service.statistics().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.with_photo, 1);
    assert_eq!(stats.total_tags, 4);
    assert_eq!(
        stats.top_tags[0],
        TagCount {
            tag: "Flor".to_string(),
            count: 2
        }
    );
    assert_eq!(stats.top_tags.len(), 4);
    assert_eq!(stats.per_month.get("2024-08"), Some(&1));
    assert_eq!(stats.per_month.get("2024-09"), Some(&2));
    assert_eq!(stats.last_created_at, Some(ms("2024-09-20T17:45:00.000Z")));
}

#[test]
fn statistics_cap_top_tags() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());
    let tags: Vec<String> = (0..TOP_TAGS_LIMIT + 3).map(|i| format!("tag-{i:02}")).collect();
    service
        .save(RegistroDraft::new(GeoPoint::new(0.0, 0.0), "muitas tags").with_tags(tags))
        .unwrap();

    let stats = service.statistics().unwrap();
    assert_eq!(stats.total_tags, TOP_TAGS_LIMIT + 3);
    assert_eq!(stats.top_tags.len(), TOP_TAGS_LIMIT);
    assert_eq!(stats.top_tags[0].tag, "tag-00");
}

#[test]
fn statistics_of_empty_journal() {
    let mut conn = open_db_in_memory().unwrap();
    let service = RegistroService::new(SqliteRegistroRepository::try_new(&mut conn).unwrap());

    let stats = service.statistics().unwrap();
    assert_eq!(stats.total, 0);
    assert!(stats.top_tags.is_empty());
    assert!(stats.per_month.is_empty());
    assert_eq!(stats.last_created_at, None);
}
