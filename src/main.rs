mod app;
mod config;
mod geolocate;
mod tiles;
mod tilesource;

use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{info, warn};
use map_elements::{Engine, Tag};

use app::LeafmarkApp;
use config::AppConfig;
use geolocate::IpLocator;

/// Document shown when no file is given on the command line.
const SAMPLE_DOCUMENT: &str = r##"
<leaflet-map latitude="37.7749" longitude="-122.4194" zoom="13" max-zoom="19">
  <leaflet-tilelayer
      url="https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png"
      max-zoom="19"
      attribution="&copy; OpenStreetMap contributors"></leaflet-tilelayer>

  <leaflet-marker id="ferry" latitude="37.7955" longitude="-122.3937"
      title="Ferry Building"><b>Ferry Building</b> at the Embarcadero</leaflet-marker>
  <leaflet-marker id="drag-me" latitude="37.7694" longitude="-122.4862"
      draggable title="Drag me"></leaflet-marker>

  <leaflet-circle id="alcatraz" latitude="37.8270" longitude="-122.4230" radius="400"
      color="#d33" fill fill-opacity="0.25" clickable>Alcatraz</leaflet-circle>

  <leaflet-polygon id="park" color="#2a7d46" weight="2" fill
      fill-opacity="0.15">
    <leaflet-point latitude="37.7712" longitude="-122.5108"></leaflet-point>
    <leaflet-point latitude="37.7745" longitude="-122.4551"></leaflet-point>
    <leaflet-point latitude="37.7648" longitude="-122.4545"></leaflet-point>
    <leaflet-point latitude="37.7660" longitude="-122.5102"></leaflet-point>
    Golden Gate Park
  </leaflet-polygon>

  <leaflet-layer-group id="transit">
    <leaflet-polyline color="#e08020" weight="3" opacity="0.8">
      <leaflet-point latitude="37.7890" longitude="-122.4012"></leaflet-point>
      <leaflet-point latitude="37.7840" longitude="-122.4077"></leaflet-point>
      <leaflet-point latitude="37.7780" longitude="-122.4140"></leaflet-point>
    </leaflet-polyline>
  </leaflet-layer-group>

  <leaflet-geojson id="landmarks" color="#7a3fa8" weight="2">
    <script type="application/json">
      {"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"name":"Coit Tower"},
         "geometry":{"type":"Point","coordinates":[-122.4088,37.8024]}},
        {"type":"Feature","properties":{"name":"Marina shoreline"},
         "geometry":{"type":"LineString","coordinates":
           [[-122.4534,37.8066],[-122.4331,37.8065],[-122.4223,37.8085]]}}
      ]}
    </script>
  </leaflet-geojson>

  <leaflet-scale-control position="bottomleft"></leaflet-scale-control>
  <leaflet-fullscreen-control position="topright"></leaflet-fullscreen-control>
  <leaflet-legend position="topright" title="Around the bay" symbol-width="24" symbol-height="18">
    <leaflet-legend-symbol type="rectangle" label="Parks"
        color="#2a7d46" fill fill-opacity="0.4"></leaflet-legend-symbol>
    <leaflet-legend-symbol type="polyline" label="Transit"
        color="#e08020" weight="3"></leaflet-legend-symbol>
    <leaflet-legend-symbol type="circle" label="Landmarks"
        color="#d33" fill></leaflet-legend-symbol>
  </leaflet-legend>
  <leaflet-geolocation set-view max-zoom="15"></leaflet-geolocation>
</leaflet-map>
"##;

#[derive(Parser, Debug)]
#[command(name = "leafmark", about = "Viewer for declarative leaflet-style map documents")]
struct Args {
    /// HTML document with map elements; the built-in sample is used when omitted
    document: Option<PathBuf>,

    /// Override the map element's starting latitude
    #[arg(long)]
    latitude: Option<f64>,

    /// Override the map element's starting longitude
    #[arg(long)]
    longitude: Option<f64>,

    /// Override the map element's starting zoom
    #[arg(long)]
    zoom: Option<f64>,

    /// Never touch the network; tiles come from the cache only
    #[arg(long)]
    offline: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), eframe::Error> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .init();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config: {}, using defaults", e);
        AppConfig::default()
    });

    let markup = match &args.document {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(markup) => {
                config.remember_document(&path.display().to_string());
                if let Err(e) = config.save() {
                    warn!("Failed to save config: {}", e);
                }
                markup
            }
            Err(e) => {
                eprintln!("Cannot read {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => {
            info!("No document given, showing the built-in sample");
            SAMPLE_DOCUMENT.to_string()
        }
    };

    let mut engine = match Engine::from_markup(&markup) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Cannot parse document: {}", e);
            process::exit(1);
        }
    };

    apply_view_overrides(&mut engine, &args);

    let locator = match (config.override_latitude, config.override_longitude) {
        (Some(lat), Some(lng)) => {
            info!("Using configured location override: {}, {}", lat, lng);
            IpLocator::with_override(lat, lng)
        }
        _ => IpLocator::new(),
    };
    engine.install_locator(locator);
    engine.set_host_fullscreen_capable(true);

    let offline = args.offline || config.offline;
    if offline {
        info!("Offline mode: tiles come from the cache only");
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.window_width, config.window_height])
            .with_title("Leafmark"),
        ..Default::default()
    };

    eframe::run_native(
        "Leafmark",
        options,
        Box::new(move |_cc| Ok(Box::new(LeafmarkApp::new(engine, offline)))),
    )
}

/// Write CLI view overrides into the first map element's attributes, so the
/// engine picks them up like any other attribute change on its next flush.
fn apply_view_overrides(engine: &mut Engine, args: &Args) {
    if args.latitude.is_none() && args.longitude.is_none() && args.zoom.is_none() {
        return;
    }
    let doc = engine.document();
    let Some(map_node) = doc
        .descendants(doc.root())
        .into_iter()
        .find(|&n| doc.tag(n) == Some(Tag::Map))
    else {
        warn!("View override given but the document has no map element");
        return;
    };

    let overrides = [
        ("latitude", args.latitude),
        ("longitude", args.longitude),
        ("zoom", args.zoom),
    ];
    let doc = engine.document_mut();
    for (name, value) in overrides {
        if let Some(value) = value {
            if let Err(e) = doc.set_attribute(map_node, name, &value.to_string()) {
                warn!("Cannot override {}: {}", name, e);
            }
        }
    }
}
