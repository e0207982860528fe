use anyhow::{bail, Result};
use clap::Parser;
use log::{debug, info, warn};

use route_finder::{
    Config, GeoJsonSurface, LocationRegistry, MapView, OsrmClient, Presenter, RouteOutcome,
    RouteRequester, TileLayer,
};

#[derive(Parser)]
struct Args {
    /// Name of the city to start from
    #[arg(long)]
    from: Option<String>,

    /// Name of the city to end at
    #[arg(long)]
    to: Option<String>,

    /// Print the known city names and quit
    #[arg(long)]
    list: bool,

    /// GeoJSON file with named points, replacing the built-in cities
    #[arg(long)]
    cities: Option<String>,

    /// JSON file with settings. Anything missing keeps its default.
    #[arg(long)]
    config: Option<String>,

    /// Use a different OSRM server
    #[arg(long)]
    osrm_url: Option<String>,

    /// Where to write the markers and route as GeoJSON
    #[arg(long, default_value = "route.geojson")]
    output: String,
}

struct LogPresenter;

impl Presenter for LogPresenter {
    fn alert(&mut self, message: &str) {
        warn!("{message}");
    }

    fn refresh(&mut self, loading: bool) {
        debug!("Still loading: {loading}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;
    let args = Args::parse();

    let mut config = match args.config {
        Some(path) => Config::from_json(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    if let Some(url) = args.osrm_url {
        config.routing_url = url;
    }

    let custom;
    let registry = match args.cities {
        Some(path) => {
            custom = LocationRegistry::from_geojson(&std::fs::read_to_string(path)?)?;
            &custom
        }
        None => LocationRegistry::builtin(),
    };

    if args.list {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let map = MapView::initialize(
        GeoJsonSurface::new(config.container.clone()),
        config.center,
        config.zoom,
        TileLayer::default(),
    );
    let mut requester = RouteRequester::new(registry, map, &config);
    requester.select_start(args.from);
    requester.select_end(args.to);

    let service = OsrmClient::new(&config);
    let outcome = requester
        .find_selected_route(&service, &mut LogPresenter)
        .await?;

    // Markers stay even when there's no route
    std::fs::write(&args.output, requester.map().surface().render_geojson())?;
    match outcome {
        RouteOutcome::Drawn { points } => {
            info!("Wrote a route with {points} points to {}", args.output);
            Ok(())
        }
        _ => bail!("No route drawn ({outcome:?})"),
    }
}
