use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use sitepin::config::Config;
use sitepin::location::{
    share, LocationAcquirer, LocationError, LocationSource, NetworkSensor, ResolvedLocation,
    Resolvers, SiteDraft,
};
use sitepin::server::{self, AppState, LocationResponse, ShareResponse};

/// Sitepin: place a site from whatever you have at hand.
///
/// Resolves pasted coordinates, short map links, street addresses and share
/// payloads to a position with a label. Prints JSON to stdout.
///
/// Examples:
///   sitepin "Cantiere vicino a 45.4642, 9.1900 Milano"
///   sitepin "https://maps.app.goo.gl/abcdef"
///   sitepin "Piazza del Duomo, Milano"
///   sitepin --title "Maps" --text "Via Roma 12" --url "https://maps.app.goo.gl/x"
///   sitepin --locate
///   sitepin --serve --port 3000
#[derive(Parser)]
#[command(name = "sitepin", version, about, long_about = None)]
struct Cli {
    /// Free text to resolve: coordinates, a map link or an address.
    #[arg(index = 1)]
    text: Option<String>,

    /// Share payload title.
    #[arg(long)]
    title: Option<String>,

    /// Share payload text.
    #[arg(long = "text")]
    share_text: Option<String>,

    /// Share payload URL.
    #[arg(long)]
    url: Option<String>,

    /// Use the device position, falling back to 0, 0.
    #[arg(long, short = 'l')]
    locate: bool,

    /// Start the HTTP server.
    #[arg(long)]
    serve: bool,

    /// Server bind address (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides config).
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Offline mode: only explicit coordinates are recognized.
    #[arg(long)]
    offline: bool,

    /// Config file (defaults to ~/.sitepin/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct ResolveOutput {
    #[serde(flatten)]
    draft: SiteDraft,
    source: LocationSource,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    sitepin::logging::init(cli.verbose);

    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    // ── Server ──────────────────────────────────────────────────

    if cli.serve {
        let host = cli.host.clone().unwrap_or_else(|| config.server.host.clone());
        let port = cli.port.unwrap_or(config.server.port);
        let state = AppState::new(config, cli.offline);
        server::start(state, &host, port).await;
        return;
    }

    // ── Device location ─────────────────────────────────────────

    if cli.locate {
        let sensor = Arc::new(NetworkSensor::new(
            &config.device.ip_endpoint,
            &config.geocoder.user_agent,
        ));
        let acquirer = LocationAcquirer::new(sensor, config.device.acquirer());
        let located = acquirer.locate_or_fallback().await;
        if let Some(notice) = &located.notice {
            eprintln!("  {}", notice);
        }
        print_location(&located.location);
        return;
    }

    let resolvers = Resolvers::from_config(&config, cli.offline);

    // ── Share payload ───────────────────────────────────────────

    if cli.title.is_some() || cli.share_text.is_some() || cli.url.is_some() {
        let shared = share::parse(
            cli.title.as_deref().unwrap_or(""),
            cli.share_text.as_deref().unwrap_or(""),
            cli.url.as_deref().unwrap_or(""),
        )
        .unwrap_or_else(|| {
            eprintln!("Error: {}", LocationError::NoInput);
            std::process::exit(1);
        });

        let suggestion = if shared.is_resolved() {
            None
        } else {
            resolvers.resolve_text(shared.label()).await
        };
        if !shared.is_resolved() {
            eprintln!("  \u{270F}\u{FE0F}  No coordinates in the payload; set the position by hand.");
        }

        let output = ShareResponse {
            draft: shared.to_draft(),
            resolved: shared.is_resolved(),
            suggestion: suggestion.map(LocationResponse::from),
        };
        println!("{}", to_json(&output));
        return;
    }

    // ── Free text ───────────────────────────────────────────────

    let Some(text) = cli.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        eprintln!("Error: {}", LocationError::NoInput);
        eprintln!();
        eprintln!("Usage:");
        eprintln!("  sitepin \"45.4642, 9.1900\"");
        eprintln!("  sitepin \"https://maps.app.goo.gl/abcdef\"");
        eprintln!("  sitepin \"Piazza del Duomo, Milano\"");
        eprintln!("  sitepin --title T --text X --url U");
        eprintln!("  sitepin --locate");
        eprintln!("  sitepin --serve");
        std::process::exit(1);
    };

    let Some(loc) = resolvers.resolve_text(text).await else {
        eprintln!("Error: {}", LocationError::AllStrategiesExhausted);
        std::process::exit(1);
    };
    print_location(&loc);
}

fn print_location(loc: &ResolvedLocation) {
    eprintln!("  \u{1F4CD} {} ({})", loc.label, loc.source);
    let output = ResolveOutput {
        draft: SiteDraft::from(loc),
        source: loc.source,
    };
    println!("{}", to_json(&output));
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error: Cannot encode output: {}", e);
        std::process::exit(1);
    })
}
