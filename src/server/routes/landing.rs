//! Landing page

use axum::{extract::State, response::Html};

use crate::server::state::AppState;

/// GET /
pub async fn landing_page(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        r#"<html>
<head><title>ICMP Exporter</title></head>
<body>
<h1>ICMP Exporter</h1>
<p>Prometheus Exporter for monitoring point to point link latency</p>
<p>Version: {}</p>
<ul>
<li><a href="{}">Metrics</a></li>
</ul>
</body>
</html>
"#,
        env!("CARGO_PKG_VERSION"),
        state.telemetry_path
    ))
}
