use movietrack::configuration::get_configuration;
use movietrack::startup::{build_auth_service, run, spawn_revocation_pruner};
use movietrack::telemetry::init_telemetry;
use std::net::TcpListener;
use std::time::Duration;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // 구조화된 로깅 초기화
    init_telemetry();

    tracing::info!("Starting application");

    // 설정 로드
    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    // 저장소와 토큰 발급기 구성 (설정 오류는 여기서 중단)
    let auth = build_auth_service(&configuration).await.map_err(|e| {
        tracing::error!("Failed to build auth service: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Startup error")
    })?;
    tracing::info!(
        backend = ?configuration.repository.backend,
        "Auth service ready"
    );

    // 만료된 폐기 토큰 정리 작업
    let _pruner = spawn_revocation_pruner(
        auth.revocations(),
        Duration::from_secs(configuration.revocation.prune_interval_secs),
    );

    // 서버 주소 설정
    let address = configuration.application.address();
    tracing::info!("Binding server to address: {}", address);

    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    // 서버 실행
    let server = run(listener, auth)?;
    tracing::info!("Server started successfully");

    server.await
}
