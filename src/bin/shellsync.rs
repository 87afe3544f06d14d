use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use shellsync::{
    ActivationReport, ActivationState, AppConfig, DiskStorage, FetchOutcome, HttpNetwork,
    Request, ResourceTable, Synchronizer,
};

type DiskSynchronizer = Synchronizer<DiskStorage, HttpNetwork>;

fn print_usage() {
    eprintln!("Usage: shellsync [OPTIONS] --resources <FILE> <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install             Stage the core shell into the staging cache");
    eprintln!("  activate            Reconcile the content cache and promote staged files");
    eprintln!("  update              install, then activate");
    eprintln!("  fetch <URL|PATH>    Serve a request through the cache");
    eprintln!("  message <TAG>       Deliver a control message (skipWaiting, downloadOffline)");
    eprintln!("  status              Show what is cached");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --resources <FILE>  Resource table (JSON)");
    eprintln!("  --config <FILE>     Config file (default: $XDG_CONFIG_HOME/shellsync/config.toml)");
    eprintln!("  --origin <ORIGIN>   Application origin, overrides the config file");
    eprintln!("  --cache-dir <DIR>   Cache directory, overrides the config file");
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Logging is controlled with RUST_LOG (default: info).");
}

enum Command {
    Install,
    Activate,
    Update,
    Fetch(String),
    Message(String),
    Status,
}

struct Args {
    config: Option<PathBuf>,
    origin: Option<String>,
    cache_dir: Option<PathBuf>,
    resources: PathBuf,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut config = None;
    let mut origin = None;
    let mut cache_dir = None;
    let mut resources = None;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--origin" => origin = Some(value("--origin")?),
            "--cache-dir" => cache_dir = Some(PathBuf::from(value("--cache-dir")?)),
            "--resources" => resources = Some(PathBuf::from(value("--resources")?)),
            flag if flag.starts_with("--") => return Err(format!("unknown option {flag}")),
            _ => positional.push(arg.clone()),
        }
    }

    let resources = resources.ok_or("--resources is required")?;
    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("install") => Command::Install,
        Some("activate") => Command::Activate,
        Some("update") => Command::Update,
        Some("status") => Command::Status,
        Some("fetch") => Command::Fetch(positional.next().ok_or("fetch requires a URL")?),
        Some("message") => Command::Message(positional.next().ok_or("message requires a tag")?),
        Some(other) => return Err(format!("unknown command {other}")),
        None => return Err("no command given".to_string()),
    };
    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument {extra}"));
    }

    Ok(Args {
        config,
        origin,
        cache_dir,
        resources,
        command,
    })
}

fn print_activation(report: &ActivationReport) {
    if report.state == ActivationState::Corrupted {
        eprintln!("Activation failed; all caches were cleared");
        std::process::exit(1);
    }
    let path = match report.path {
        ActivationState::HasPriorManifest => "upgrade",
        _ => "first install",
    };
    println!(
        "Activated ({path}): {} promoted, {} evicted",
        report.promoted,
        report.evicted.len()
    );
    for url in &report.evicted {
        println!("  - {url}");
    }
}

async fn fetch(sync: &DiskSynchronizer, target: &str) -> shellsync::Result<()> {
    let url = if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        sync.url_for(target.trim_start_matches('/'))
    };

    let outcome = sync.fetch(&Request::get(url.as_str())).await;
    sync.wait_idle().await;
    let (source, response) = match outcome? {
        FetchOutcome::Passthrough => {
            println!("{url}: not a cached resource, passed through");
            return Ok(());
        }
        FetchOutcome::Cached(r) => ("cache", r),
        FetchOutcome::Network(r) => ("network", r),
    };
    println!(
        "{url}: {} from {source}, {} bytes ({})",
        response.status,
        response.body.len(),
        response.header("content-type").unwrap_or("no content type")
    );
    Ok(())
}

async fn status(sync: &DiskSynchronizer) -> shellsync::Result<()> {
    let report = sync.status().await?;
    println!("Origin:   {}", sync.origin());
    println!("Manifest: {}", report.manifest);
    println!(
        "Cached:   {}/{} resources ({} bytes)",
        report.cached.len(),
        sync.table().len(),
        report.cached_bytes
    );
    if report.staged > 0 {
        println!("Staged:   {} (awaiting activation)", report.staged);
    }
    for key in &report.missing {
        println!("  missing {key}");
    }
    for url in &report.stale {
        println!("  stale   {url}");
    }
    println!(
        "Offline:  {}",
        if report.offline_ready() { "ready" } else { "incomplete" }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> shellsync::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        std::process::exit(0);
    }
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("Error: {msg}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default()?,
    };
    if let Some(origin) = args.origin {
        config.sync.origin = origin;
    }
    if let Some(dir) = args.cache_dir {
        config.paths.cache_dir = dir;
    }
    if config.sync.origin.is_empty() {
        eprintln!("Error: no origin configured; pass --origin or set sync.origin in the config file");
        std::process::exit(1);
    }

    let table = ResourceTable::load(&args.resources)?;
    log::debug!(
        "Loaded {} resources ({} core) from {}",
        table.len(),
        table.core().len(),
        args.resources.display()
    );

    let network = HttpNetwork::new(&config.sync)?;
    let storage = DiskStorage::new(config.paths.cache_dir);
    let sync = Synchronizer::new(config.sync, table, Arc::new(storage), Arc::new(network))?;

    match args.command {
        Command::Install => {
            sync.install().await?;
            println!("Installed {} core resources", sync.table().core().len());
        }
        Command::Activate => print_activation(&sync.activate().await),
        Command::Update => {
            sync.install().await?;
            print_activation(&sync.activate().await);
        }
        Command::Fetch(target) => fetch(&sync, &target).await?,
        Command::Message(tag) => {
            if sync.message_tag(&tag).is_none() {
                println!("Ignored unrecognised message {tag:?}");
            }
            sync.wait_idle().await;
        }
        Command::Status => status(&sync).await?,
    }
    Ok(())
}
