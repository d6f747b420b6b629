use eln_infra::AppConfig;

#[tokio::main]
async fn main() {
    eln_observability::init();

    let config = AppConfig::from_env().expect("invalid or incomplete configuration");

    let app = eln_api::app::build_app(config).await.expect("failed to build app");

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("failed to bind 0.0.0.0:8080");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
