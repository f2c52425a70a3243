use anyhow::anyhow;

use cloudy_reader::config::Config;
use cloudy_reader::error::Result;
use cloudy_reader::store::Store;
use cloudy_reader::token::token_channel;

const USAGE: &str = "usage: cloudy-reader <add <url> [frequency] | list | remove <feed-id> | sync>";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::load()?;

    // The CLI never waits for a token to show up later
    let (_token_tx, token) = token_channel(config.token.clone());
    let store = Store::open(config.store_options(token)?).await?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["add", url] => add(&store, &config, url, None).await?,
        ["add", url, frequency] => {
            let frequency: u32 = frequency
                .parse()
                .map_err(|_| anyhow!("frequency must be a number of seconds, got {}", frequency))?;
            add(&store, &config, url, Some(frequency)).await?
        }
        ["list"] => list(&store).await?,
        ["remove", feed_id] => {
            store.subscriptions().remove_subscription(feed_id).await?;
            println!("Removed {}", feed_id);
        }
        ["sync"] => {
            require_token(&config)?;
            let report = store.sync_once().await?;
            println!(
                "Pulled {} ({} skipped), pushed {}; cursor {}",
                report.pulled, report.skipped, report.pushed, report.cursor
            );
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn require_token(config: &Config) -> Result<()> {
    if config.token.is_none() {
        return Err(anyhow!(
            "no token configured; set token in {:?} or {}",
            Config::config_path(),
            cloudy_reader::config::TOKEN_ENV
        )
        .into());
    }
    Ok(())
}

async fn add(store: &Store, config: &Config, url: &str, frequency: Option<u32>) -> Result<()> {
    require_token(config)?;
    let feed_id = match frequency {
        Some(frequency) => store.add_subscription_with_frequency(url, frequency).await?,
        None => store.add_subscription(url).await?,
    };
    println!("Subscribed to {} as {}", url, feed_id);
    Ok(())
}

async fn list(store: &Store) -> Result<()> {
    for entry in store.list_subscriptions().await? {
        let sub = &entry.subscription;
        if sub.deleted {
            continue;
        }
        let title = entry
            .feed
            .as_ref()
            .and_then(|f| f.title.as_deref())
            .unwrap_or("(not synced yet)");
        println!("{}  {}  {}  every {}s", sub.feed_id, title, sub.url, sub.requested_frequency);
    }
    Ok(())
}
