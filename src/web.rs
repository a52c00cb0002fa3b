use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::config::MonitorConfig;
use crate::models::LogSnapshot;
use crate::storage::LogStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<LogStore>,
    pub(crate) target: Arc<str>,
    pub(crate) refresh_secs: u64,
}

impl AppState {
    pub(crate) fn new(config: &MonitorConfig, store: Arc<LogStore>) -> Self {
        Self {
            store,
            target: Arc::from(config.target.as_str()),
            refresh_secs: config.page_refresh.as_secs().max(1),
        }
    }
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new().route("/", get(index)).with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let snapshot = state.store.snapshot();
    Html(render_page(&state.target, state.refresh_secs, &snapshot))
}

/// Serves `router` until `shutdown` flips to `true`.
pub(crate) async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "dashboard listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    info!("dashboard stopped");
    Ok(())
}

pub(crate) fn render_page(target: &str, refresh_secs: u64, snapshot: &LogSnapshot) -> String {
    let target = escape_html(target);
    let mut page = String::with_capacity(1024 + 48 * snapshot.ping_log.len());
    let _ = write!(
        page,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta http-equiv=\"refresh\" content=\"{refresh_secs}\">\n\
         <title>Ping monitor: {target}</title>\n</head>\n<body>\n\
         <h1>Ping monitor: {target}</h1>\n"
    );
    push_section(&mut page, "ping-log", "Latest pings", &snapshot.ping_log);
    push_section(&mut page, "loss-log", "Packet loss", &snapshot.loss_log);
    page.push_str("</body>\n</html>\n");
    page
}

fn push_section(page: &mut String, id: &str, title: &str, lines: &[String]) {
    let _ = write!(page, "<h2>{title}</h2>\n<pre id=\"{id}\">");
    for line in lines {
        page.push_str(&escape_html(line));
        page.push('\n');
    }
    page.push_str("</pre>\n");
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageSettings;
    use crate::models::{ProbeOutcome, ProbeStatus};
    use chrono::{Local, TimeZone};
    use std::net::SocketAddr;

    #[test]
    fn empty_snapshot_renders_empty_sections() {
        let page = render_page("192.0.2.1", 3, &LogSnapshot::default());
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<meta http-equiv=\"refresh\" content=\"3\">"));
        assert!(page.contains("<h1>Ping monitor: 192.0.2.1</h1>"));
        assert!(page.contains("<pre id=\"ping-log\"></pre>"));
        assert!(page.contains("<pre id=\"loss-log\"></pre>"));
        assert!(page.trim_end().ends_with("</html>"));
    }

    #[test]
    fn lines_are_rendered_in_order_and_escaped() {
        let snapshot = LogSnapshot {
            ping_log: vec!["a \u{2013} 1 ms".to_string(), "b \u{2013} PACKET LOSS".to_string()],
            loss_log: vec!["b \u{2013} 100% Packet Loss".to_string()],
        };
        let page = render_page("<host>", 5, &snapshot);
        assert!(page.contains("Ping monitor: &lt;host&gt;"));
        assert!(page.contains(
            "<pre id=\"ping-log\">a \u{2013} 1 ms\nb \u{2013} PACKET LOSS\n</pre>"
        ));
        assert!(page.contains("<pre id=\"loss-log\">b \u{2013} 100% Packet Loss\n</pre>"));
    }

    async fn spawn_dashboard(
        store: Arc<LogStore>,
    ) -> (SocketAddr, watch::Sender<bool>, tokio::task::JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState {
            store,
            target: Arc::from("192.0.2.7"),
            refresh_secs: 3,
        };
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(serve(listener, build_router(state), rx));
        (addr, tx, handle)
    }

    #[tokio::test]
    async fn serves_current_logs_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            LogStore::open(&StorageSettings {
                log_dir: dir.path().to_path_buf(),
                ..StorageSettings::default()
            })
            .await
            .unwrap(),
        );
        let at = Local.with_ymd_and_hms(2024, 2, 29, 23, 59, 58).single().unwrap();
        store
            .append(&ProbeOutcome::new(at, ProbeStatus::success(8.5)))
            .await
            .unwrap();
        store
            .append(&ProbeOutcome::new(at + chrono::Duration::seconds(1), ProbeStatus::Loss))
            .await
            .unwrap();

        let (addr, shutdown, handle) = spawn_dashboard(store).await;
        let client = reqwest::Client::new();

        let resp = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let content_type = resp.headers()[reqwest::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/html"));
        let body = resp.text().await.unwrap();
        assert!(body.contains("2024-02-29 23:59:58 \u{2013} 8.50 ms"));
        assert!(body.contains("2024-02-29 23:59:59 \u{2013} PACKET LOSS"));
        assert!(body.contains("2024-02-29 23:59:59 \u{2013} 100% Packet Loss"));

        let missing = client.get(format!("http://{addr}/logs")).send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
        let post = client.post(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(post.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

        drop(client);
        shutdown.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
