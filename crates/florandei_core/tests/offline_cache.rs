use florandei_core::map::{tiles_for_bounds, MapArea, TileCoord};
use florandei_core::model::registro::GeoPoint;
use florandei_core::offline::{
    CacheStorage, FetchError, FetchOutcome, FetchRequest, FetchedResponse, Fetcher,
    OfflineError, OfflineSettings, OfflineWorker, TileCache, TileSettings,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// In-process network double: serves canned responses while online.
#[derive(Default)]
struct FakeNetwork {
    responses: RefCell<HashMap<String, FetchedResponse>>,
    offline: Cell<bool>,
    requests: RefCell<Vec<String>>,
}

impl FakeNetwork {
    fn serve(&self, url: &str, body: &str) {
        self.responses
            .borrow_mut()
            .insert(url.to_string(), FetchedResponse::ok("text/html", body));
    }

    fn serve_status(&self, url: &str, status: u16) {
        self.responses.borrow_mut().insert(
            url.to_string(),
            FetchedResponse {
                status,
                content_type: None,
                body: Vec::new(),
            },
        );
    }

    fn go_offline(&self) {
        self.offline.set(true);
    }

    fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl Fetcher for FakeNetwork {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
        self.requests.borrow_mut().push(request.url.clone());
        if self.offline.get() {
            return Err(FetchError::Network("offline".to_string()));
        }
        self.responses
            .borrow()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| FetchError::Network(format!("no route to {}", request.url)))
    }
}

fn shell_settings() -> OfflineSettings {
    OfflineSettings {
        base_url: "http://app.test".to_string(),
        precache_urls: vec!["/index.html".to_string(), "/js/app.js".to_string()],
        ..OfflineSettings::default()
    }
}

fn serve_shell(network: &FakeNetwork) {
    network.serve("http://app.test/index.html", "<html>shell</html>");
    network.serve("http://app.test/js/app.js", "console.log('app')");
}

#[test]
fn install_precaches_every_shell_file() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    serve_shell(&network);
    let storage = CacheStorage::new(dir.path()).unwrap();
    let worker = OfflineWorker::new(storage.clone(), &network, shell_settings());

    assert_eq!(worker.install().unwrap(), 2);

    let cache = storage.open("florandei-v1").unwrap();
    let shell = cache.lookup("http://app.test/index.html").unwrap().unwrap();
    assert_eq!(shell.body, b"<html>shell</html>");
    assert_eq!(shell.content_type.as_deref(), Some("text/html"));
}

#[test]
fn failed_install_stores_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    network.serve("http://app.test/index.html", "<html>shell</html>");
    network.serve_status("http://app.test/js/app.js", 404);
    let storage = CacheStorage::new(dir.path()).unwrap();
    let worker = OfflineWorker::new(storage.clone(), &network, shell_settings());

    match worker.install() {
        Err(OfflineError::InstallFailed { url, .. }) => {
            assert_eq!(url, "http://app.test/js/app.js")
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!storage
        .open("florandei-v1")
        .unwrap()
        .contains("http://app.test/index.html"));
}

#[test]
fn activate_deletes_stale_caches_but_keeps_current_and_retained() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    let storage = CacheStorage::new(dir.path()).unwrap();
    for name in ["florandei-v0", "florandei-v1", "florandei-tiles-v1"] {
        storage.open(name).unwrap();
    }
    let worker = OfflineWorker::new(storage.clone(), &network, shell_settings())
        .retain_cache("florandei-tiles-v1");

    assert_eq!(worker.activate().unwrap(), vec!["florandei-v0"]);
    let mut remaining = storage.cache_names().unwrap();
    remaining.sort();
    assert_eq!(remaining, vec!["florandei-tiles-v1", "florandei-v1"]);
}

#[test]
fn fetch_is_network_first_and_falls_back_to_cache() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    network.serve("http://app.test/css/styles.css", "body{}");
    let storage = CacheStorage::new(dir.path()).unwrap();
    let worker = OfflineWorker::new(storage, &network, shell_settings());

    let online = worker
        .handle_fetch(&FetchRequest::get("/css/styles.css"))
        .unwrap();
    assert!(matches!(online, FetchOutcome::Network(_)));

    network.serve("http://app.test/css/styles.css", "body{color:red}");
    let refreshed = worker
        .handle_fetch(&FetchRequest::get("http://app.test/css/styles.css"))
        .unwrap();
    assert_eq!(refreshed.body(), b"body{color:red}");

    network.go_offline();
    let cached = worker
        .handle_fetch(&FetchRequest::get("/css/styles.css"))
        .unwrap();
    assert_eq!(cached.source(), "cache");
    assert_eq!(cached.body(), b"body{color:red}");
}

#[test]
fn offline_navigation_falls_back_to_app_shell() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    serve_shell(&network);
    let storage = CacheStorage::new(dir.path()).unwrap();
    let worker = OfflineWorker::new(storage, &network, shell_settings());
    worker.install().unwrap();
    network.go_offline();

    let page = worker
        .handle_fetch(&FetchRequest::navigate("/registros/42"))
        .unwrap();
    assert!(matches!(page, FetchOutcome::NavigationFallback(_)));
    assert_eq!(page.body(), b"<html>shell</html>");

    match worker.handle_fetch(&FetchRequest::get("/js/missing.js")) {
        Err(OfflineError::Offline(url)) => assert_eq!(url, "http://app.test/js/missing.js"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn corrupt_cached_entry_is_treated_as_a_miss_offline() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    serve_shell(&network);
    let storage = CacheStorage::new(dir.path()).unwrap();
    let worker = OfflineWorker::new(storage.clone(), &network, shell_settings());
    worker.install().unwrap();

    for entry in std::fs::read_dir(dir.path().join("florandei-v1")).unwrap() {
        let path = entry.unwrap().path();
        if std::fs::read(&path).unwrap() == b"<html>shell</html>" {
            std::fs::write(&path, b"<ht").unwrap();
        }
    }
    network.go_offline();

    match worker.handle_fetch(&FetchRequest::navigate("/registros/42")) {
        Err(OfflineError::Offline(url)) => assert_eq!(url, "http://app.test/registros/42"),
        other => panic!("unexpected result: {other:?}"),
    }
    let cache = storage.open("florandei-v1").unwrap();
    assert!(!cache.contains("http://app.test/index.html"));
    assert!(cache.contains("http://app.test/js/app.js"));
}

#[test]
fn non_get_and_bypassed_hosts_are_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    let tile_url = "https://a.tile.openstreetmap.org/14/6018/9155.png";
    network.serve(tile_url, "png");
    network.serve("http://app.test/api", "ok");
    let storage = CacheStorage::new(dir.path()).unwrap();
    let worker = OfflineWorker::new(storage.clone(), &network, shell_settings());

    let tile = worker.handle_fetch(&FetchRequest::get(tile_url)).unwrap();
    assert!(matches!(tile, FetchOutcome::Passthrough(_)));

    let post = FetchRequest {
        method: "POST".to_string(),
        ..FetchRequest::get("/api")
    };
    let outcome = worker.handle_fetch(&post).unwrap();
    assert_eq!(outcome.source(), "passthrough");

    let cache = storage.open("florandei-v1").unwrap();
    assert!(cache.keys().unwrap().is_empty());
}

fn tiny_area() -> MapArea {
    MapArea {
        min_zoom: 12,
        max_zoom: 13,
        zoom: 12,
        ..MapArea::default()
    }
}

fn tile_settings() -> TileSettings {
    TileSettings {
        url_template: "https://tiles.test/{z}/{x}/{y}.png".to_string(),
        subdomains: Vec::new(),
        ..TileSettings::default()
    }
}

fn serve_tiles(network: &FakeNetwork, area: &MapArea, zoom: u8) -> usize {
    let tiles = tiles_for_bounds(&area.bounds, zoom);
    for tile in &tiles {
        network.serve(
            &format!("https://tiles.test/{}/{}/{}.png", tile.z, tile.x, tile.y),
            "tile",
        );
    }
    tiles.len()
}

#[test]
fn tiles_are_cache_first() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    let storage = CacheStorage::new(dir.path()).unwrap();
    let tiles = TileCache::new(&storage, &network, tile_settings()).unwrap();
    let tile = TileCoord::containing(GeoPoint::new(-21.3367, -47.7453), 14);
    network.serve(&tiles.url_for(tile), "tile");

    let first = tiles.get_tile(tile).unwrap();
    assert!(!first.from_cache);
    network.go_offline();
    let second = tiles.get_tile(tile).unwrap();
    assert!(second.from_cache);
    assert_eq!(second.body, b"tile");
    assert_eq!(network.request_count(), 1);
}

#[test]
fn missing_tile_reports_status() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    let storage = CacheStorage::new(dir.path()).unwrap();
    let tiles = TileCache::new(&storage, &network, tile_settings()).unwrap();
    let tile = TileCoord { z: 3, x: 1, y: 2 };
    network.serve_status(&tiles.url_for(tile), 404);

    assert!(matches!(
        tiles.get_tile(tile),
        Err(OfflineError::UnexpectedStatus { status: 404, .. })
    ));
}

#[test]
fn prefetch_downloads_area_once_and_counts_failures() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    let area = tiny_area();
    let at_12 = serve_tiles(&network, &area, 12);
    let at_13 = tiles_for_bounds(&area.bounds, 13).len();
    let storage = CacheStorage::new(dir.path()).unwrap();
    let tiles = TileCache::new(&storage, &network, tile_settings()).unwrap();

    let report = tiles.prefetch(&area, &[12, 13, 18]).unwrap();
    assert_eq!(report.planned, at_12 + at_13);
    assert_eq!(report.fetched, at_12);
    assert_eq!(report.failed, at_13);

    let again = tiles.prefetch(&area, &[12]).unwrap();
    assert_eq!(again.already_cached, at_12);
    assert_eq!(again.fetched, 0);
}

#[test]
fn prefetch_refuses_oversized_plans() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    let storage = CacheStorage::new(dir.path()).unwrap();
    let settings = TileSettings {
        max_prefetch_tiles: 1,
        ..tile_settings()
    };
    let tiles = TileCache::new(&storage, &network, settings).unwrap();

    assert!(matches!(
        tiles.prefetch(&MapArea::default(), &[16]),
        Err(OfflineError::PrefetchTooLarge { limit: 1, .. })
    ));
    assert_eq!(network.request_count(), 0);
}

#[test]
fn prefetch_refuses_deep_zoom_without_building_plan() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    let storage = CacheStorage::new(dir.path()).unwrap();
    let tiles = TileCache::new(&storage, &network, tile_settings()).unwrap();
    let area = MapArea {
        max_zoom: 30,
        ..MapArea::default()
    };

    match tiles.prefetch(&area, &[30]) {
        Err(OfflineError::PrefetchTooLarge { planned, limit }) => {
            assert_eq!(limit, 2500);
            assert!(planned > 1_000_000_000, "planned {planned}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(network.request_count(), 0);
}

#[test]
fn default_zooms_run_from_area_minimum_to_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let network = FakeNetwork::default();
    let storage = CacheStorage::new(dir.path()).unwrap();
    let tiles = TileCache::new(&storage, &network, tile_settings()).unwrap();

    assert_eq!(
        tiles.default_zooms(&MapArea::default()),
        vec![12, 13, 14, 15, 16]
    );
}
