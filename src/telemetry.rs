use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// RUST_LOG가 없거나 잘못된 경우 기본 필터를 사용합니다.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// 구조화된 로깅을 초기화합니다.
/// JSON 형식의 로그를 표준 출력으로 내보내며, `log` 크레이트의 이벤트도 함께 수집합니다.
/// 이미 전역 subscriber가 설정되어 있으면 아무것도 하지 않습니다.
pub fn init_telemetry() {
    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .json();

    let result = tracing_subscriber::registry()
        .with(env_filter())
        .with(formatting_layer)
        .try_init();

    if let Err(e) = result {
        tracing::debug!(error = %e, "Telemetry already initialised");
    }
}
