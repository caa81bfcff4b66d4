use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::error;
use tracing_subscriber::EnvFilter;

use gtfsrt_server::feed::{FeedAggregator, FeedAggregatorConfig, FeedWriter, FeedWriterConfig};
use gtfsrt_server::iris::{
    RealtimeItemStore, decode_change_entry, decode_plan_entry, load_change_entries,
    load_plan_entries,
};
use gtfsrt_server::kv::InMemoryKv;
use gtfsrt_server::matching::{Matcher, MatcherConfig};
use gtfsrt_server::pipeline::{Pipeline, PipelineConfig};
use gtfsrt_server::schedule::InMemoryScheduleStore;
use gtfsrt_server::stations::{StadaClient, StadaClientConfig, StationTable};
use gtfsrt_server::stream::{self, ConsumerConfig, FileCursorStore, InMemoryStream};
use gtfsrt_server::web::{AppState, create_router};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Station master data: local file, live fetch, or none.
    let stations = match std::env::var("STATIONS_FILE") {
        Ok(path) => {
            let table = StationTable::from_dataset_file(Path::new(&path))
                .expect("Failed to load station dataset");
            println!("Loaded {} stations from {path}", table.len());
            table
        }
        Err(_) => match (
            std::env::var("STADA_CLIENT_ID"),
            std::env::var("STADA_API_KEY"),
        ) {
            (Ok(client_id), Ok(api_key)) => {
                println!("Fetching station dataset...");
                let client = StadaClient::new(StadaClientConfig::new(client_id, api_key))
                    .expect("Failed to create StaDa client");
                let dataset = client
                    .fetch_stations()
                    .await
                    .expect("Failed to fetch station dataset");
                let table = StationTable::from_dataset(&dataset);
                println!("Loaded {} stations", table.len());
                table
            }
            _ => {
                eprintln!(
                    "Warning: neither STATIONS_FILE nor STADA_CLIENT_ID/STADA_API_KEY set. \
                     Stops will only match by id."
                );
                StationTable::new(Vec::new())
            }
        },
    };
    let stations = Arc::new(stations);

    // Reference schedule.
    let schedule = match std::env::var("SCHEDULE_FILE") {
        Ok(path) => {
            let store = InMemoryScheduleStore::from_json_file(Path::new(&path))
                .expect("Failed to load schedule");
            println!("Loaded {} schedule stop-time rows from {path}", store.len());
            store
        }
        Err(_) => {
            eprintln!("Warning: SCHEDULE_FILE not set. No trip will ever match.");
            InMemoryScheduleStore::new(Vec::new())
        }
    };

    // Message streams, optionally preloaded from captured fixtures.
    let plan_stream = Arc::new(InMemoryStream::new());
    let change_stream = Arc::new(InMemoryStream::new());
    if let Ok(path) = std::env::var("IRIS_PLAN_STREAM_FILE") {
        let count = load_plan_entries(Path::new(&path), &plan_stream)
            .await
            .expect("Failed to load plan fixture");
        println!("Replayed {count} plan messages from {path}");
    }
    if let Ok(path) = std::env::var("IRIS_CHANGE_STREAM_FILE") {
        let count = load_change_entries(Path::new(&path), &change_stream)
            .await
            .expect("Failed to load change fixture");
        println!("Replayed {count} change messages from {path}");
    }

    let mut matcher_config = MatcherConfig::default();
    if let Ok(concurrency) = std::env::var("MATCH_CONCURRENCY") {
        matcher_config.concurrency = concurrency
            .parse()
            .expect("MATCH_CONCURRENCY must be a number");
    }
    let pipeline_config = PipelineConfig {
        fuzzy_time_matching: std::env::var("GTFSRT_FUZZY_TIMES")
            .is_ok_and(|value| value == "1" || value.eq_ignore_ascii_case("true")),
    };

    let aggregator = Arc::new(FeedAggregator::new(&FeedAggregatorConfig::default()));
    let pipeline = Arc::new(Pipeline::new(
        RealtimeItemStore::new(Arc::new(InMemoryKv::new())),
        Matcher::new(Arc::new(schedule), stations.clone(), &matcher_config),
        stations,
        aggregator.clone(),
        &pipeline_config,
    ));

    let cursors_dir = std::env::var("GTFSRT_CURSORS_DIR").unwrap_or_else(|_| ".".to_string());
    let cursors = Arc::new(FileCursorStore::new(cursors_dir));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Shutting down...");
            let _ = shutdown_tx.send(true);
        }
    });

    // Feed file writer.
    let feed_path =
        std::env::var("GTFSRT_FEED_PATH").unwrap_or_else(|_| "latest.gtfs-rt.pbf".to_string());
    let writer = FeedWriter::new(aggregator.clone(), FeedWriterConfig::new(feed_path));
    let writer_task = tokio::spawn(writer.run(shutdown_rx.clone()));

    // HTTP server.
    let bind_addr: SocketAddr = std::env::var("GTFSRT_BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .expect("GTFSRT_BIND_ADDR must be a socket address");
    let app = create_router(AppState::new(aggregator.clone()));
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    println!("GTFS-RT server listening on http://{bind_addr}");
    println!();
    println!("Endpoints:");
    println!("  GET /health   - Health check");
    println!("  GET /gtfs-rt  - Current feed (protobuf)");
    println!("  GET /status   - Feed statistics");
    let web_task = tokio::spawn({
        let mut shutdown = shutdown_rx.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.changed().await;
                })
                .await
        }
    });

    // Stream consumers. These run until shutdown; any error they return
    // means the deployment is broken and the process should die visibly.
    let plan_consumer = tokio::spawn({
        let pipeline = pipeline.clone();
        let stream = plan_stream.clone();
        let cursors = cursors.clone();
        let shutdown = shutdown_rx.clone();
        async move {
            stream::run(
                ConsumerConfig::new("plans_cursor"),
                stream.as_ref(),
                cursors.as_ref(),
                decode_plan_entry,
                move |_, item| {
                    let pipeline = pipeline.clone();
                    async move { pipeline.handle_plan(item).await }
                },
                shutdown,
            )
            .await
        }
    });
    let change_consumer = tokio::spawn({
        let pipeline = pipeline.clone();
        let stream = change_stream.clone();
        let cursors = cursors.clone();
        let shutdown = shutdown_rx.clone();
        async move {
            stream::run(
                ConsumerConfig::new("changes_cursor"),
                stream.as_ref(),
                cursors.as_ref(),
                decode_change_entry,
                move |_, item| {
                    let pipeline = pipeline.clone();
                    async move { pipeline.handle_change(item).await }
                },
                shutdown,
            )
            .await
        }
    });

    let (plan_result, change_result) = tokio::join!(plan_consumer, change_consumer);
    for result in [plan_result, change_result] {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(error = %err, "consumer terminated");
                std::process::exit(1);
            }
            Err(join_error) => {
                error!(error = %join_error, "consumer task failed");
                std::process::exit(1);
            }
        }
    }

    let _ = writer_task.await;
    let _ = web_task.await;
    println!("Shut down cleanly");
}
