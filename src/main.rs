//! Grantry CLI - OAuth2 authorization provider
//!
//! Run with: cargo run -- <command>
//! Or after build: ./target/release/grantry <command>

#[tokio::main]
async fn main() {
    // Load .env before config so overrides apply
    let _ = dotenvy::dotenv();

    grantry::init_logging();

    if let Err(e) = grantry::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
