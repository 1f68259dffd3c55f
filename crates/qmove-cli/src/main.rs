use anyhow::Context;
use clap::Parser;
use qmove::{ReceiveRequest, SqsQueue, WorkerPool};
use std::num::NonZeroUsize;

mod config;

#[tokio::main]
pub async fn main() {
    let cli = Cli::parse();
    init_logger();

    if let Err(e) = cli.run().await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_logger() {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(env).init();
}

#[derive(Debug, Parser)]
#[command(name = "qmove")]
#[command(about = "moves every message from one aws sqs queue to another", long_about = None)]
pub struct Cli {
    /// Source queue URL or name
    #[arg(long, value_parser = clap::builder::NonEmptyStringValueParser::new())]
    src: String,

    /// Destination queue URL or name
    #[arg(long, value_parser = clap::builder::NonEmptyStringValueParser::new())]
    dest: String,

    /// Source queue region
    #[arg(long)]
    src_region: Option<String>,

    /// Destination queue region
    #[arg(long)]
    dest_region: Option<String>,

    /// Number of clients draining the source queue concurrently
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    clients: u32,

    /// Maximum messages per receive
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(i32).range(1..=10))]
    batch_size: i32,

    /// Long polling wait per receive, in seconds
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i32).range(0..=20))]
    wait_time: i32,

    /// Use LocalStack with static test credentials
    #[arg(long)]
    local: bool,

    /// Custom AWS endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let endpoint = config::Endpoint {
            local: self.local,
            url: self.endpoint.clone(),
        };
        let source_config = config::load(self.src_region.clone(), &endpoint).await;
        let destination_config = config::load(self.dest_region.clone(), &endpoint).await;

        let source = SqsQueue::from_config(&source_config);
        let source_url = source.resolve_queue_url(&self.src).await?;
        let destination_url = SqsQueue::from_config(&destination_config)
            .resolve_queue_url(&self.dest)
            .await?;
        let clients = NonZeroUsize::new(self.clients as usize)
            .context("number of clients must be at least 1")?;

        log::info!("source queue : {}", source_url);
        log::info!("destination queue : {}", destination_url);
        log::info!("number of clients : {}", clients);

        let request = ReceiveRequest::new(source_url.as_str())
            .with_max_messages(self.batch_size)
            .with_wait_time_seconds(self.wait_time);
        request.validate()?;

        match source.approximate_depth(&source_url).await {
            Ok(depth) => log::info!("approximately {} messages to move", depth),
            Err(e) => log::warn!("could not read source queue depth: {:#}", e),
        }

        let pool = WorkerPool::new(clients, request, destination_url);
        let report = pool
            .run(|_| {
                (
                    SqsQueue::from_config(&source_config),
                    SqsQueue::from_config(&destination_config),
                )
            })
            .await
            .context("transfer did not complete")?;

        log::info!(
            "all done: {} delivered, {} send failures, {} delete failures",
            report.totals.delivered,
            report.totals.send_failed,
            report.totals.delete_failed
        );

        // each drainer stops on its own view of the queue; in-flight messages can outlive them all
        match source.approximate_depth(&source_url).await {
            Ok(0) => {}
            Ok(depth) => log::warn!(
                "source queue still reports approximately {} messages; they reappear once their visibility timeout expires",
                depth
            ),
            Err(e) => log::warn!("could not read source queue depth: {:#}", e),
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Ok(())
    }
}
