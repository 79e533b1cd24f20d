//! Basic search against the in-memory store
//!
//! This example demonstrates:
//! - Running a single search through the executor
//! - Falling back when the indexed query is unavailable
//! - Driving a debounced session with the coordinator

use std::{sync::Arc, time::Duration};

use geoseek::{
    EngineConfig, SearchCoordinator, SearchExecutor, SearchFilters, SearchRequest, SearchResult,
    SearchStage,
    store::{InMemoryStore, test_data},
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    geoseek::init_logging(tracing::Level::INFO)?;

    let store = Arc::new(InMemoryStore::new(test_data::london_records()));
    let executor = SearchExecutor::new(store, &EngineConfig::default());
    let cancel = CancellationToken::new();

    println!("Active sites within 3 km of Trafalgar Square:");
    let request = SearchRequest::new(
        test_data::LONDON,
        3.0,
        SearchFilters::new().status("active"),
    );
    let result = executor.execute(&request, &cancel).await?;
    print_results(&result, 5);

    println!("\nSame search again:");
    let result = executor.execute(&request, &cancel).await?;
    print_results(&result, 5);

    // A backend without the indexed nearby function
    let store = Arc::new(
        InMemoryStore::builder()
            .records(test_data::london_records())
            .nearby_unavailable()
            .latency(Duration::from_millis(50))
            .build(),
    );
    println!("\nCoordinated search on a backend without the spatial index:");
    let coordinator = SearchCoordinator::new(store);
    let mut updates = coordinator.subscribe();
    coordinator.start_search(test_data::LONDON, SearchFilters::default());
    coordinator.set_radius(10.0);

    let state = updates
        .wait_for(|s| s.stage == SearchStage::Complete || s.error.is_some())
        .await?
        .clone();
    match state.error {
        Some(failure) => println!("  Search failed: {}", failure.user_message()),
        None => println!(
            "  {} results via {} (search #{})",
            state.results.len(),
            state.method,
            state.search_id
        ),
    }
    coordinator.shutdown().await;

    Ok(())
}

fn print_results(result: &SearchResult, limit: usize) {
    println!(
        "  {} results via {} in {:?}",
        result.len(),
        result.method,
        result.timing.total
    );
    for (i, record) in result.records.iter().take(limit).enumerate() {
        println!(
            "  {}. {} - {} ({:.2} km)",
            i + 1,
            record.id(),
            record.field_str("title").unwrap_or("Untitled"),
            record.distance_km()
        );
    }
    if result.len() > limit {
        println!("  ... and {} more", result.len() - limit);
    }
}
