use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use castor::{Destination, Event, EventProcessor, ProcessingError, SqsConnector, TextCodec};
use tracing_subscriber::EnvFilter;

/// Property keys read from the environment, e.g. `QUEUE_URL` -> `queue.url`
const PROPERTY_KEYS: &[&str] = &[
    "aws.region",
    "aws.sqs.access.key",
    "aws.sqs.secret.key",
    "aws.sqs.role.arn",
    "aws.sqs.endpoint.url",
    "queue.url",
    "poll.interval",
    "consumer.threads",
    "max.messages",
    "ack.strategy",
];

fn properties_from_env() -> HashMap<String, String> {
    PROPERTY_KEYS
        .iter()
        .filter_map(|key| {
            let var = key.replace('.', "_").to_uppercase();
            std::env::var(var).ok().map(|value| (key.to_string(), value))
        })
        .collect()
}

pub struct PrintProcessor;

impl EventProcessor for PrintProcessor {
    async fn process_event(&self, event: Event) -> Result<(), ProcessingError> {
        let body = String::from_utf8(event.payload)?;
        if body.contains("error") {
            return Err("message contains error".into());
        }
        println!("Processing message {}: {:?}", event.ext_id, body);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_line_number(true)
        .init();

    let properties = properties_from_env();
    anyhow::ensure!(
        properties.contains_key("queue.url"),
        "QUEUE_URL is not set"
    );

    let job_pool = Arc::new(tokio::runtime::Handle::current());
    let mut destination = Destination::new(SqsConnector, TextCodec, job_pool);

    destination.init(&properties);
    destination
        .connect()
        .await
        .context("failed to connect to SQS")?;
    destination.bind(PrintProcessor);

    let workers = destination.start();
    tracing::info!(workers, "destination running");

    destination
        .send(&Event::new("hello from castor", "demo-1"))
        .await;

    tokio::signal::ctrl_c().await?;

    destination.stop();
    destination.close().await;

    println!("done");

    Ok(())
}
