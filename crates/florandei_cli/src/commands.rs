//! Command handlers.
//!
//! Handlers print user-facing text to stdout; failures bubble up to `main`.

use crate::{AddArgs, Command, EditArgs, ListArgs, NearArgs, OfflineCommand, TilesCommand};
use chrono::Local;
use florandei_core::clock::{format_date, format_date_time, now_epoch_ms};
use florandei_core::map::{format_coords, MapView, Marker, MarkerLayer, UserLocation};
use florandei_core::offline::{
    CacheStorage, FetchRequest, HttpFetcher, OfflineWorker, TileCache,
};
use florandei_core::transfer::{backup_file_name, read_envelope, write_envelope};
use florandei_core::{
    AppConfig, GeoPoint, Photo, PhotoError, Registro, RegistroDraft, RegistroFilter,
    RegistroService, RegistroWithPhoto, ServiceError, SqliteRegistroRepository, SUGGESTED_TAGS,
};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

type Service<'conn> = RegistroService<SqliteRegistroRepository<'conn>>;
type CommandResult = Result<(), Box<dyn Error>>;

const LIST_DESCRIPTION_CHARS: usize = 60;

pub(crate) fn dispatch(
    command: Command,
    config: &AppConfig,
    service: &mut Service<'_>,
) -> CommandResult {
    match command {
        Command::Add(args) => add(service, args),
        Command::Show { id } => show(service, &id),
        Command::Edit(args) => edit(service, args),
        Command::Delete { id } => {
            service.delete(&id)?;
            println!("Registro deleted.");
            Ok(())
        }
        Command::List(args) => list(service, args),
        Command::Tags { suggested } => tags(service, suggested),
        Command::Stats { json } => stats(service, json),
        Command::Export { output } => export(service, output),
        Command::Import { file } => {
            let envelope = read_envelope(&file)?;
            let imported = service.import(envelope)?;
            println!("Imported {imported} registro(s) from {}.", file.display());
            Ok(())
        }
        Command::Clear { yes } => {
            if !yes {
                return Err("clear deletes every registro; pass --yes to confirm".into());
            }
            let removed = service.clear()?;
            println!("Deleted {removed} registro(s).");
            Ok(())
        }
        Command::Near(args) => near(service, config, args),
        Command::Offline(command) => offline(config, command),
        Command::Tiles(TilesCommand::Prefetch { zooms }) => prefetch_tiles(config, &zooms),
    }
}

fn location_from(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
    match (lat, lng) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)),
        _ => None,
    }
}

fn add(service: &mut Service<'_>, args: AddArgs) -> CommandResult {
    let photo = args.photo.as_ref().map(|path| Photo::from_file(path)).transpose()?;
    let draft = RegistroDraft {
        id: None,
        location: location_from(args.lat, args.lng),
        description: args.description,
        tags: args.tags,
        photo,
        created_at: None,
    };

    let registro = service.save(draft)?;
    println!("Registro saved: {}", registro.id);
    Ok(())
}

fn edit(service: &mut Service<'_>, args: EditArgs) -> CommandResult {
    let current = service
        .get(&args.id)?
        .ok_or_else(|| ServiceError::NotFound(args.id.clone()))?;
    let registro = service.save(edit_draft(current, args)?)?;
    println!("Registro updated: {}", registro.id);
    Ok(())
}

/// Merges edit flags over the stored registro.
///
/// Unset coordinates keep their stored value; the photo is carried forward
/// unless replaced or removed; `--tag` appends unless `--clear-tags` is set.
fn edit_draft(current: RegistroWithPhoto, args: EditArgs) -> Result<RegistroDraft, PhotoError> {
    let existing = current.registro;

    let location = GeoPoint::new(
        args.lat.unwrap_or(existing.latitude),
        args.lng.unwrap_or(existing.longitude),
    );
    let mut tags = if args.clear_tags {
        Vec::new()
    } else {
        existing.tags
    };
    tags.extend(args.tags);
    let photo = match (args.photo, args.remove_photo) {
        (Some(path), _) => Some(Photo::from_file(path)?),
        (None, true) => None,
        (None, false) => current.photo,
    };

    Ok(RegistroDraft {
        id: Some(existing.id),
        location: Some(location),
        description: args.description.unwrap_or(existing.description),
        tags,
        photo,
        created_at: None,
    })
}

fn show(service: &Service<'_>, id: &str) -> CommandResult {
    let found = service
        .get(id)?
        .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
    let registro = &found.registro;

    println!("id:          {}", registro.id);
    println!(
        "location:    {}",
        format_coords(registro.latitude, registro.longitude)
    );
    println!("description: {}", registro.description);
    if !registro.tags.is_empty() {
        println!("tags:        {}", registro.tags.join(", "));
    }
    println!(
        "created:     {}",
        format_date_time(registro.created_at, &Local)
    );
    println!(
        "updated:     {}",
        format_date_time(registro.updated_at, &Local)
    );
    match &found.photo {
        Some(photo) => println!("photo:       {} ({} bytes)", photo.mime_type, photo.data.len()),
        None => println!("photo:       none"),
    }
    Ok(())
}

fn list(service: &Service<'_>, args: ListArgs) -> CommandResult {
    let filter = RegistroFilter {
        search: args.search,
        tag: args.tag,
        sort: args.sort,
    };
    let registros = service.filter(&filter)?;
    if registros.is_empty() {
        println!("No registros found.");
        return Ok(());
    }
    for registro in &registros {
        print_summary(registro);
    }
    println!("{} registro(s)", registros.len());
    Ok(())
}

fn print_summary(registro: &Registro) {
    let mut description: String = registro
        .description
        .chars()
        .take(LIST_DESCRIPTION_CHARS)
        .collect();
    if registro.description.chars().count() > LIST_DESCRIPTION_CHARS {
        description.push_str("...");
    }
    let photo_mark = if registro.has_photo { " [photo]" } else { "" };
    println!(
        "{}  {}  {}{}",
        format_date(registro.created_at, &Local),
        registro.id,
        description,
        photo_mark
    );
    if !registro.tags.is_empty() {
        println!("            tags: {}", registro.tags.join(", "));
    }
}

fn tags(service: &Service<'_>, suggested: bool) -> CommandResult {
    let in_use = service.tags()?;
    if suggested {
        println!("Suggested:");
        for tag in SUGGESTED_TAGS {
            let mark = if in_use.iter().any(|used| used.as_str() == *tag) { "*" } else { " " };
            println!("  {mark} {tag}");
        }
        println!("In use:");
    }
    if in_use.is_empty() {
        println!("No tags in use.");
    }
    for tag in &in_use {
        println!("  {tag}");
    }
    Ok(())
}

fn stats(service: &Service<'_>, json: bool) -> CommandResult {
    let statistics = service.statistics()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&statistics)?);
        return Ok(());
    }

    println!("registros:   {}", statistics.total);
    println!("with photo:  {}", statistics.with_photo);
    println!("tags in use: {}", statistics.total_tags);
    if let Some(last) = statistics.last_created_at {
        println!("last entry:  {}", format_date_time(last, &Local));
    }
    if !statistics.top_tags.is_empty() {
        println!("top tags:");
        for entry in &statistics.top_tags {
            println!("  {:<20} {}", entry.tag, entry.count);
        }
    }
    if !statistics.per_month.is_empty() {
        println!("per month:");
        for (month, count) in &statistics.per_month {
            println!("  {month}  {count}");
        }
    }
    Ok(())
}

fn export(service: &Service<'_>, output: Option<PathBuf>) -> CommandResult {
    let envelope = service.export()?;
    let path = output.unwrap_or_else(|| PathBuf::from(backup_file_name(now_epoch_ms())));
    write_envelope(&path, &envelope)?;
    println!(
        "Exported {} registro(s) to {}.",
        envelope.registros.len(),
        path.display()
    );
    Ok(())
}

fn near(service: &Service<'_>, config: &AppConfig, args: NearArgs) -> CommandResult {
    let point = GeoPoint::new(args.lat, args.lng);
    point.validate()?;

    let user = UserLocation::new(point, args.accuracy.unwrap_or(0.0));
    let view = MapView::initial(&config.map, Some(&user));

    if args.accuracy.is_some() {
        println!(
            "You are at {} ({})",
            format_coords(point.latitude, point.longitude),
            user.accuracy_label()
        );
    }
    println!(
        "Map opens at {} zoom {}",
        format_coords(view.center.latitude, view.center.longitude),
        view.zoom
    );

    let found = nearby_markers(&service.list()?, point, args.radius_km);
    if found.is_empty() {
        println!("No registros within {} km.", args.radius_km);
        return Ok(());
    }
    for (marker, distance) in found {
        let tags = marker
            .popup
            .tags
            .as_deref()
            .map(|tags| format!("  [{tags}]"))
            .unwrap_or_default();
        println!(
            "{:>7.3} km  {}  {}  {}{}",
            distance, marker.popup.date, marker.id, marker.popup.title, tags
        );
    }
    Ok(())
}

/// Markers within `radius_km` of `point`, nearest first.
fn nearby_markers(
    registros: &[Registro],
    point: GeoPoint,
    radius_km: f64,
) -> Vec<(Marker, f64)> {
    let mut layer = MarkerLayer::new();
    layer.load(registros, &Local);
    layer
        .nearest(point, radius_km)
        .into_iter()
        .map(|(marker, distance)| (marker.clone(), distance))
        .collect()
}

fn http_fetcher(config: &AppConfig) -> Result<HttpFetcher, Box<dyn Error>> {
    let timeout = Duration::from_secs(config.offline.network_timeout_secs);
    Ok(HttpFetcher::new(&config.tiles.user_agent, timeout)?)
}

fn offline(config: &AppConfig, command: OfflineCommand) -> CommandResult {
    let storage = CacheStorage::new(config.cache_dir())?;
    let worker = OfflineWorker::new(storage, http_fetcher(config)?, config.offline.clone())
        .retain_cache(config.tiles.cache_name.clone());

    match command {
        OfflineCommand::Install => {
            let stored = worker.install()?;
            println!(
                "Cached {stored} app-shell file(s) in `{}`.",
                config.offline.cache_name
            );
        }
        OfflineCommand::Activate => {
            let deleted = worker.activate()?;
            if deleted.is_empty() {
                println!("No stale caches.");
            }
            for name in deleted {
                println!("Deleted cache `{name}`.");
            }
        }
        OfflineCommand::Fetch {
            url,
            navigate,
            output,
        } => {
            let request = if navigate {
                FetchRequest::navigate(url)
            } else {
                FetchRequest::get(url)
            };
            let outcome = worker.handle_fetch(&request)?;
            println!(
                "{} {} ({} bytes)",
                outcome.status(),
                outcome.source(),
                outcome.body().len()
            );
            if let Some(path) = output {
                std::fs::write(&path, outcome.body())?;
                println!("Body written to {}.", path.display());
            }
        }
    }
    Ok(())
}

fn prefetch_tiles(config: &AppConfig, zooms: &[u8]) -> CommandResult {
    let storage = CacheStorage::new(config.cache_dir())?;
    let tiles = TileCache::new(&storage, http_fetcher(config)?, config.tiles.clone())?;
    let zooms = if zooms.is_empty() {
        tiles.default_zooms(&config.map)
    } else {
        zooms.to_vec()
    };

    println!("Prefetching {} at zoom {:?}", config.map.name, zooms);
    let report = tiles.prefetch(&config.map, &zooms)?;
    println!(
        "planned {}, fetched {}, already cached {}, failed {}",
        report.planned, report.fetched, report.already_cached, report.failed
    );
    Ok(())
}
