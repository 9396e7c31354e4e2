//! Fetch a batch of URLs concurrently and print one line per URL, in the
//! order given.
//!
//! ```text
//! RUST_LOG=fanout_core=debug cargo run -p fanout-core --example fetch_batch -- \
//!     https://example.com/ https://example.org/
//! ```

use anyhow::{Context, Result};
use fanout_config::FanoutConfig;
use fanout_core::{Dispatcher, HttpTransport, Outcome, RequestOptions};
use std::env;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_URLS: &[&str] = &[
    "http://nonexistent.invalid/",
    "https://example.com/",
    "https://example.org/",
];

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let config = match FanoutConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => {
            tracing::warn!("Ignoring config: {err}");
            FanoutConfig::default()
        }
    };

    let mut urls: Vec<String> = env::args().skip(1).collect();
    if urls.is_empty() {
        urls = DEFAULT_URLS.iter().map(ToString::to_string).collect();
    }

    let transport =
        HttpTransport::new(&config.transport()).context("failed to build HTTP transport")?;
    let mut dispatcher = Dispatcher::builder(transport)
        .config(config.dispatcher())
        .callback(|task| {
            tracing::info!(index = task.index(), url = task.url(), "Finished");
        })
        .build();

    dispatcher.run(|scope| {
        urls.iter()
            .try_for_each(|url| scope.get(url.as_str(), RequestOptions::default()))
    })??;

    for (url, outcome) in urls.iter().zip(dispatcher.results()) {
        match outcome {
            Outcome::Success(response) => println!(
                "{url}\t{}\t{} bytes\t{:?}",
                response.status(),
                response.body().len(),
                response.elapsed()
            ),
            Outcome::Failure(failure) => {
                println!("{url}\terror ({})\t{}", failure.kind(), failure.message());
            }
        }
    }

    Ok(())
}
