#[tokio::main]
async fn main() {
    std::process::exit(wscopy_cli::run().await);
}
