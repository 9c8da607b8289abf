//! REST endpoint handlers for the viewer API server.
//!
//! The latest payload and summary come from the in-memory
//! [`StateStore`](occupancy_core::StateStore); history comes from the
//! `SQLite` [`ReadingStore`](occupancy_db::ReadingStore).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/latest` | Latest raw payload as plain text |
//! | `GET` | `/api/readings` | All stored records, newest first |
//! | `GET` | `/api/readings/{day}` | Stored records for one weekday |
//! | `GET` | `/api/summary` | Last recorded reading |
//! | `GET` | `/api/averages/{day}` | Three-hour block averages for one weekday |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{Html, IntoResponse};
use occupancy_core::analytics::block_averages;
use occupancy_types::{BlockAverage, DayOfWeek, RecordSummary, StoredRecord};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page with the current reading and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let latest = escape_html(&state.state.latest_raw().await);
    let sessions = state.broadcaster.open_sessions();
    let last_count = state
        .state
        .summary()
        .await
        .map_or_else(|| String::from("--"), |s| s.count.to_string());

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Room Occupancy</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        li::before {{ content: "GET "; color: #7ee787; font-weight: bold; }}
        pre {{ background: #161b22; padding: 1rem; border-radius: 6px; }}
    </style>
</head>
<body>
    <h1>Room Occupancy</h1>

    <pre id="latest">{latest}</pre>

    <div>
        <div class="metric">
            <div class="label">Last recorded count</div>
            <div class="value">{last_count}</div>
        </div>
        <div class="metric">
            <div class="label">Live viewers</div>
            <div class="value">{sessions}</div>
        </div>
    </div>

    <h2>API Endpoints</h2>
    <ul>
        <li><a href="/latest">/latest</a> -- Latest raw sensor payload</li>
        <li><a href="/api/readings">/api/readings</a> -- All stored readings</li>
        <li><a href="/api/readings/monday">/api/readings/{{day}}</a> -- Readings for one weekday</li>
        <li><a href="/api/summary">/api/summary</a> -- Last recorded reading</li>
        <li><a href="/api/averages/monday">/api/averages/{{day}}</a> -- Three-hour averages</li>
    </ul>

    <script>
        const ws = new WebSocket(`ws://${{location.host}}/ws`);
        ws.onmessage = (e) => {{ document.getElementById("latest").textContent = e.data; }};
    </script>
</body>
</html>"#
    ))
}

/// Escape the characters that are significant in HTML text.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// GET /latest -- raw payload
// ---------------------------------------------------------------------------

/// Return the latest raw payload, or a single space before any data.
pub async fn latest(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let raw = state.state.latest_raw().await;
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        raw.to_string(),
    )
}

// ---------------------------------------------------------------------------
// GET /api/readings -- history
// ---------------------------------------------------------------------------

/// All stored records, newest first.
pub async fn list_readings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StoredRecord>>, ObserverError> {
    Ok(Json(state.store.all().await?))
}

/// Stored records for one weekday, newest first.
///
/// The day accepts full or three-letter names in any case.
pub async fn readings_by_day(
    State(state): State<Arc<AppState>>,
    Path(day): Path<String>,
) -> Result<Json<Vec<StoredRecord>>, ObserverError> {
    let day: DayOfWeek = day.parse()?;
    Ok(Json(state.store.by_day(day).await?))
}

// ---------------------------------------------------------------------------
// GET /api/summary -- last recorded reading
// ---------------------------------------------------------------------------

/// The last persisted reading and when it was written.
pub async fn summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RecordSummary>, ObserverError> {
    state
        .state
        .summary()
        .await
        .map(Json)
        .ok_or_else(|| ObserverError::NotFound(String::from("no reading recorded yet")))
}

// ---------------------------------------------------------------------------
// GET /api/averages/{day} -- chart data
// ---------------------------------------------------------------------------

/// Three-hour block averages of the stored counts for one weekday.
pub async fn averages(
    State(state): State<Arc<AppState>>,
    Path(day): Path<String>,
) -> Result<Json<Vec<BlockAverage>>, ObserverError> {
    let day: DayOfWeek = day.parse()?;
    let records = state.store.by_day(day).await?;
    Ok(Json(block_averages(&records)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<b>Count: 1 & \"2\"</b>"),
            "&lt;b&gt;Count: 1 &amp; &quot;2&quot;&lt;/b&gt;"
        );
        assert_eq!(escape_html("Count: 3"), "Count: 3");
    }
}
