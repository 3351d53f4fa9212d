#[tokio::main]
async fn main() {
    medoffice::init_tracing();

    if let Err(e) = medoffice::run().await {
        tracing::error!(error = %e, "MedOffice failed to start");
        std::process::exit(1);
    }
}
