//! Overpass Fetch - command line front end
//!
//! Downloads URLs and Overpass queries into the local response cache.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use overpass_fetch::cache::FileCache;
use overpass_fetch::config::FetchConfig;
use overpass_fetch::fetch::{CachedFetcher, DEFAULT_MAX_AGE_DAYS};
use overpass_fetch::http::PacedClient;
use overpass_fetch::overpass::{
    area_id, BoundingBox, OverpassClient, SearchArea, DEFAULT_QUERY_MAX_AGE_DAYS,
};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Download a URL into the cache
    Get {
        url: String,
        cache_key: String,
        max_age_days: f64,
    },
    /// Run an Overpass query template
    Overpass {
        template: PathBuf,
        area: SearchArea,
        recurse: bool,
        max_age_days: f64,
        cache_key: Option<String>,
    },
    /// Show cache location and freshness
    Status,
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"Overpass Fetch - Polite cached downloads for OpenStreetMap imports

USAGE:
    overpass-fetch [--config FILE] get <url> <cache_key> [max_age_days]
    overpass-fetch [--config FILE] overpass <template> relation <id> [OPTIONS]
    overpass-fetch [--config FILE] overpass <template> bounding_box <w> <s> <e> <n> [OPTIONS]
    overpass-fetch [--config FILE] status
    overpass-fetch help

COMMANDS:
    get       Download a URL into the cache, reusing a fresh copy (default 30 days)
    overpass  Fill an XML query template and run it (default max age 7 days)
    status    Show the cache directory and its most recent change
    help      Show this help message

OVERPASS OPTIONS:
    --no-recurse    Leave the {{recurse}} placeholder empty
    --max-age DAYS  Maximum age of a reusable cached response
    --key NAME      Cache file name (default: cache_<sha1 of query>.osm)

EXAMPLES:
    # Download the municipality list once a month
    overpass-fetch get https://example.org/kommuner.csv kommuner.csv 30

    # Kindergartens in Norway
    overpass-fetch overpass query_template.xml relation 2978650

CONFIG:
    JSON file with any of: n_delay, delay_seconds, retry_connection_error_hours,
    request_timeout_seconds, user_agent, cache_dir, overpass_endpoint

ENVIRONMENT:
    RUST_LOG         Log filter, e.g. "debug" or "overpass_fetch::http=debug" (default: info)
"#
    );
}

fn parse_float(value: &str, name: &str) -> Result<f64> {
    value
        .parse()
        .with_context(|| format!("{} must be a number, got {:?}", name, value))
}

fn parse_overpass(args: &[String]) -> Result<Command> {
    let usage = "Usage: overpass-fetch overpass <template> (relation <id> | bounding_box <w> <s> <e> <n>)";
    if args.len() < 2 {
        return Err(anyhow!(usage));
    }

    let template = PathBuf::from(&args[0]);
    let (area, mut rest) = match args[1].as_str() {
        "relation" => {
            let id = args.get(2).ok_or_else(|| anyhow!(usage))?;
            let id = id
                .parse()
                .with_context(|| format!("relation id must be an integer, got {:?}", id))?;
            area_id(id)?;
            (SearchArea::Relation(id), &args[3..])
        }
        "bounding_box" => {
            if args.len() < 6 {
                return Err(anyhow!(usage));
            }
            let mut coords = [0.0; 4];
            for (coord, (value, name)) in coords
                .iter_mut()
                .zip(args[2..6].iter().zip(["west", "south", "east", "north"]))
            {
                *coord = parse_float(value, name)?;
            }
            (SearchArea::BoundingBox(BoundingBox::from_array(coords)), &args[6..])
        }
        other => {
            return Err(anyhow!(
                "unknown area {:?}, expected \"relation\" or \"bounding_box\"",
                other
            ))
        }
    };

    let mut recurse = true;
    let mut max_age_days = DEFAULT_QUERY_MAX_AGE_DAYS;
    let mut cache_key = None;
    while let Some((flag, tail)) = rest.split_first() {
        match flag.as_str() {
            "--no-recurse" => {
                recurse = false;
                rest = tail;
            }
            "--max-age" | "--key" => {
                let value = tail
                    .first()
                    .ok_or_else(|| anyhow!("{} needs a value", flag))?;
                if flag == "--max-age" {
                    max_age_days = parse_float(value, "--max-age")?;
                } else {
                    cache_key = Some(value.clone());
                }
                rest = &tail[1..];
            }
            other => return Err(anyhow!("Unknown option: {}", other)),
        }
    }

    Ok(Command::Overpass {
        template,
        area,
        recurse,
        max_age_days,
        cache_key,
    })
}

fn parse_args() -> Result<(Option<PathBuf>, Command)> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    let mut config_path = None;
    if args.first().map(String::as_str) == Some("--config") {
        if args.len() < 2 {
            return Err(anyhow!("--config needs a file"));
        }
        config_path = Some(PathBuf::from(&args[1]));
        args.drain(..2);
    }

    if args.is_empty() {
        return Ok((config_path, Command::Help));
    }

    let command = match args[0].as_str() {
        "get" => {
            if args.len() < 3 {
                return Err(anyhow!(
                    "Usage: overpass-fetch get <url> <cache_key> [max_age_days]"
                ));
            }
            let max_age_days = match args.get(3) {
                Some(value) => parse_float(value, "max_age_days")?,
                None => DEFAULT_MAX_AGE_DAYS,
            };
            Command::Get {
                url: args[1].clone(),
                cache_key: args[2].clone(),
                max_age_days,
            }
        }
        "overpass" => parse_overpass(&args[1..])?,
        "status" => Command::Status,
        "help" | "--help" | "-h" => Command::Help,
        _ => {
            eprintln!("Unknown command: {}", args[0]);
            Command::Help
        }
    };

    Ok((config_path, command))
}

fn build_fetcher(config: &FetchConfig) -> Result<CachedFetcher> {
    let client = PacedClient::new(config.client_config()?)?;
    let cache = FileCache::open(config.cache_dir())?;
    Ok(CachedFetcher::new(client, cache))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let (config_path, command) = match parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let config = match &config_path {
        Some(path) => FetchConfig::load(path)?,
        None => FetchConfig::default(),
    };

    match command {
        Command::Get {
            url,
            cache_key,
            max_age_days,
        } => {
            let fetcher = build_fetcher(&config)?;
            match fetcher.get_cached(&url, &cache_key, max_age_days).await {
                Some(content) => {
                    info!(
                        url = %url,
                        bytes = content.len(),
                        path = %fetcher.cache().path_for(&cache_key).display(),
                        "Download ready"
                    );
                }
                None => {
                    error!(url = %url, "Download failed");
                    std::process::exit(2);
                }
            }
        }
        Command::Overpass {
            template,
            area,
            recurse,
            max_age_days,
            cache_key,
        } => {
            let fetcher = build_fetcher(&config)?;
            let overpass = OverpassClient::with_endpoint(fetcher, config.overpass_endpoint.clone());
            info!(template = %template.display(), endpoint = %overpass.endpoint(), "Running Overpass query");

            let xml = overpass
                .query_template(&template, &area, recurse, max_age_days, cache_key.as_deref())
                .await?;

            std::io::stdout()
                .lock()
                .write_all(xml.as_bytes())
                .context("Failed to write response")?;
        }
        Command::Status => {
            let cache = FileCache::open(config.cache_dir())?;
            println!("Cache directory: {}", cache.cache_dir().display());
            match cache.latest_modification() {
                Some(modified) => {
                    let age = SystemTime::now()
                        .duration_since(modified)
                        .unwrap_or_default();
                    println!(
                        "Last change: {:.1} hours ago",
                        age.as_secs_f64() / 3600.0
                    );
                }
                None => println!("Cache is empty."),
            }
        }
        Command::Help => {
            print_help();
        }
    }

    Ok(())
}
