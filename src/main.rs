#[tokio::main]
async fn main() {
    if let Err(e) = project_indexer::cli::run().await {
        eprintln!("Error: {e}");
        if e.is_retryable() {
            eprintln!("This looks transient; retry once the store is reachable.");
        }
        std::process::exit(1);
    }
}
