use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. JSON lines when `MANGA_ENV=production`,
/// human-readable output otherwise. `RUST_LOG` overrides the default filter.
pub fn init_tracing(service_name: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));

    let registry = tracing_subscriber::registry().with(env_filter);

    if is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }

    tracing::info!(service = service_name, "tracing initialized");
}

fn is_production() -> bool {
    std::env::var("MANGA_ENV").is_ok_and(|v| v == "production")
}

/// Debug for the service's own crate and the shared crate, info elsewhere.
fn default_directives(service_name: &str) -> String {
    // Targets are module paths, which use underscores.
    let crate_target = service_name.replace('-', "_");
    format!("info,{crate_target}=debug,manga_shared=debug,tower_http=debug")
}
