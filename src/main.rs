use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use noticeboard::rss::{
    FeedPipeline, FeedService, FetchSettings, Fetcher, Orchestrator, RetryPolicy, WorkerPool,
};
use noticeboard::{Config, Database, NoticeboardError, Result};

const USAGE: &str = "usage: noticeboard [run | list | add <name> <url> | edit <feed-id> <name> <url> | refresh <feed-id> | preview <feed-id>]";

/// Operator command given on the command line.
enum Command {
    Run,
    List,
    Add { name: String, url: String },
    Edit { feed_id: i64, name: String, url: String },
    Refresh(i64),
    Preview(i64),
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let feed_id = |arg: Option<&String>| -> Result<i64> {
            arg.ok_or_else(|| NoticeboardError::Validation(USAGE.to_string()))?
                .parse()
                .map_err(|_| NoticeboardError::Validation("feed id must be a number".to_string()))
        };

        match args.first().map(String::as_str) {
            None | Some("run") => Ok(Command::Run),
            Some("list") => Ok(Command::List),
            Some("add") => match (args.get(1), args.get(2)) {
                (Some(name), Some(url)) => Ok(Command::Add {
                    name: name.clone(),
                    url: url.clone(),
                }),
                _ => Err(NoticeboardError::Validation(USAGE.to_string())),
            },
            Some("edit") => match (args.get(2), args.get(3)) {
                (Some(name), Some(url)) => Ok(Command::Edit {
                    feed_id: feed_id(args.get(1))?,
                    name: name.clone(),
                    url: url.clone(),
                }),
                _ => Err(NoticeboardError::Validation(USAGE.to_string())),
            },
            Some("refresh") => Ok(Command::Refresh(feed_id(args.get(1))?)),
            Some("preview") => Ok(Command::Preview(feed_id(args.get(1))?)),
            Some(_) => Err(NoticeboardError::Validation(USAGE.to_string())),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    // Load configuration
    let config_path =
        std::env::var("NOTICEBOARD_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = match Config::load_with_env(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::from(2);
    }

    // Initialize logging
    if matches!(command, Command::Run) {
        if let Err(e) = noticeboard::logging::init(&config.logging) {
            eprintln!("Failed to initialize logging: {e}");
            noticeboard::logging::init_console_only(&config.logging.level);
        }
    } else {
        noticeboard::logging::init_console_only(&config.logging.level);
    }

    match run(command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let db = Database::open(&config.database.path).await?;
    let fetcher = Arc::new(Fetcher::new(FetchSettings::from_config(&config.rss)));
    let pipeline = FeedPipeline::new(db.clone(), fetcher, &config.rss);
    let service = FeedService::with_pipeline(pipeline.clone(), &config.rss);

    match command {
        Command::Run => {
            info!("Noticeboard feed ingestion starting");
            let pool = WorkerPool::new(
                pipeline,
                RetryPolicy::from_config(&config.rss),
                config.rss.max_concurrent_fetches,
            );
            let orchestrator = Orchestrator::new(db.clone(), Arc::new(pool), &config.rss);

            tokio::select! {
                _ = orchestrator.run() => {}
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    info!("Shutting down");
                }
            }
        }
        Command::List => {
            for feed in service.list_feeds().await? {
                println!(
                    "{:>4}  {:<8} {:<8} {}  <{}>",
                    feed.id,
                    if feed.active { "active" } else { "inactive" },
                    service.health_of(&feed),
                    feed.name,
                    feed.url
                );
                if let Some(err) = &feed.health.last_error {
                    println!("      last error: {err}");
                }
            }
        }
        Command::Add { name, url } => {
            let feed = service.add_feed(&name, &url).await?;
            println!("added feed {} ({})", feed.id, feed.name);
        }
        Command::Edit { feed_id, name, url } => {
            let active = service.get_feed(feed_id).await?.active;
            let feed = service.update_feed(feed_id, &name, &url, active).await?;
            println!("updated feed {} ({} <{}>)", feed.id, feed.name, feed.url);
        }
        Command::Refresh(feed_id) => {
            let report = service.refresh(feed_id).await?;
            println!("{report}");
        }
        Command::Preview(feed_id) => {
            let preview = service.preview(feed_id).await?;
            println!("{}", preview.report);
            for item in &preview.items {
                println!(
                    "  {}  {}",
                    item.published_at.format("%Y-%m-%d %H:%M"),
                    item.title
                );
            }
        }
    }

    db.close().await;
    Ok(())
}
