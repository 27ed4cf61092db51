//! Admin review dashboard
//!
//! A small axum server for manual withdrawal settlement: login with the
//! shared admin credential, list pending withdrawals, mark one paid (which
//! notifies the user through the bot), logout. No state transition happens
//! without an authenticated session, and marking an already-paid withdrawal
//! again is a no-op.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Form, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use teloxide::Bot;
use tokio::net::TcpListener;

use crate::core::config::{rewards, web as web_config};
use crate::storage::db::{self, MarkPaidResult};
use crate::storage::{get_connection, DbPool};
use crate::telegram::notifications::notify_withdrawal_paid;

/// Shared state for the dashboard.
#[derive(Clone)]
struct WebState {
    db: Arc<DbPool>,
    bot: Bot,
    /// Logged-in session tokens with their expiry deadline
    sessions: Arc<DashMap<String, Instant>>,
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

/// Start the admin dashboard server.
pub async fn start_admin_server(port: u16, db: Arc<DbPool>, bot: Bot) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let state = WebState {
        db,
        bot,
        sessions: Arc::new(DashMap::new()),
    };

    let app = Router::new()
        .route("/", get(login_page).post(login_submit))
        .route("/dashboard", get(dashboard_handler))
        .route("/mark_paid/{id}", post(mark_paid_handler))
        .route("/logout", get(logout_handler))
        .with_state(state);

    log::info!("Starting admin dashboard on http://{}", addr);
    log::info!("  GET/POST /           - Login");
    log::info!("  GET  /dashboard      - Pending withdrawals");
    log::info!("  POST /mark_paid/{{id}} - Settle a withdrawal");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Extracts the session token from the Cookie header and checks it is a
/// live, unexpired admin session.
fn is_authenticated(state: &WebState, headers: &HeaderMap) -> bool {
    let Some(token) = session_token(headers) else {
        return false;
    };
    // Read, then release the shard lock before any removal.
    let live = state
        .sessions
        .get(&token)
        .map(|deadline| *deadline > Instant::now())
        .unwrap_or(false);
    if !live {
        state.sessions.remove(&token);
    }
    live
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "session").then(|| value.to_string())
    })
}

async fn login_page() -> Html<String> {
    Html(render_login_page(None))
}

/// Compares a submitted credential against the configured one by SHA-256
/// digest, so comparison time does not depend on how much of the secret
/// matches.
fn credential_matches(submitted: &str, expected: &str) -> bool {
    Sha256::digest(submitted.as_bytes()) == Sha256::digest(expected.as_bytes())
}

async fn login_submit(State(state): State<WebState>, Form(form): Form<LoginForm>) -> Response {
    let user_ok = credential_matches(&form.username, &web_config::ADMIN_USER);
    let pass_ok = !web_config::ADMIN_PASS.is_empty() && credential_matches(&form.password, &web_config::ADMIN_PASS);

    if !(user_ok && pass_ok) {
        log::warn!("Failed dashboard login attempt for user {:?}", form.username);
        return (StatusCode::UNAUTHORIZED, Html(render_login_page(Some("Invalid credentials")))).into_response();
    }

    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    state
        .sessions
        .insert(token.clone(), Instant::now() + Duration::from_secs(web_config::SESSION_TTL_SECS));

    let mut response = Redirect::to("/dashboard").into_response();
    if let Ok(cookie) = HeaderValue::from_str(&format!("session={token}; HttpOnly; Path=/")) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

async fn logout_handler(State(state): State<WebState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.remove(&token);
    }
    let mut response = Redirect::to("/").into_response();
    if let Ok(cookie) = HeaderValue::from_str("session=; Max-Age=0; Path=/") {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

/// GET /dashboard — pending withdrawals, oldest first.
async fn dashboard_handler(State(state): State<WebState>, headers: HeaderMap) -> Response {
    if !is_authenticated(&state, &headers) {
        return Redirect::to("/").into_response();
    }

    let withdrawals = match get_connection(&state.db).map_err(crate::core::AppError::from).and_then(|conn| {
        db::list_pending_withdrawals(&conn)
    }) {
        Ok(w) => w,
        Err(e) => {
            log::error!("Failed to list pending withdrawals: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>Store unavailable</h1>".to_string()))
                .into_response();
        }
    };

    Html(render_dashboard(&withdrawals)).into_response()
}

/// POST /mark_paid/{id} — transition `pending → paid` and notify the user.
async fn mark_paid_handler(State(state): State<WebState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !is_authenticated(&state, &headers) {
        return Redirect::to("/").into_response();
    }

    let result = get_connection(&state.db)
        .map_err(crate::core::AppError::from)
        .and_then(|mut conn| db::mark_withdrawal_paid(&mut conn, &id));

    match result {
        Ok(MarkPaidResult::Paid(withdrawal)) => {
            log::info!("Withdrawal {} marked paid for user {}", withdrawal.id, withdrawal.user_id);
            // Best effort — delivery failure never rolls the transition back.
            let bot = state.bot.clone();
            tokio::spawn(async move {
                notify_withdrawal_paid(&bot, withdrawal.user_id, withdrawal.amount).await;
            });
        }
        Ok(MarkPaidResult::AlreadyPaid) => {
            log::info!("Withdrawal {} already paid, nothing to do", id);
        }
        Ok(MarkPaidResult::NotFound) => {
            log::warn!("Mark-paid requested for unknown withdrawal {}", id);
        }
        Err(e) => {
            log::error!("Failed to mark withdrawal {} paid: {}", id, e);
        }
    }

    Redirect::to("/dashboard").into_response()
}

fn render_login_page(error: Option<&str>) -> String {
    let error_html = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, html_escape(e)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Admin Login</title>
<style>
body{{background:#0d0d0d;color:#fff;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',sans-serif;display:flex;justify-content:center;align-items:center;min-height:100vh}}
form{{background:rgba(255,255,255,.08);border:1px solid rgba(255,255,255,.12);border-radius:16px;padding:32px;width:320px}}
input{{display:block;width:100%;margin:8px 0;padding:10px;border-radius:8px;border:1px solid #444;background:#1a1a1a;color:#fff;box-sizing:border-box}}
button{{width:100%;padding:10px;margin-top:12px;border:none;border-radius:8px;background:#1DB954;color:#000;font-weight:600;cursor:pointer}}
.error{{color:#fc3c44}}
</style>
</head>
<body>
<form method="post" action="/">
<h2>Withdrawals Admin</h2>
{error_html}
<input name="username" placeholder="Username" required>
<input name="password" type="password" placeholder="Password" required>
<button type="submit">Log in</button>
</form>
</body>
</html>"#
    )
}

fn render_dashboard(withdrawals: &[crate::ledger::Withdrawal]) -> String {
    let currency = rewards::CURRENCY.as_str();
    let rows = if withdrawals.is_empty() {
        r#"<tr><td colspan="6" class="empty">No pending withdrawals 🎉</td></tr>"#.to_string()
    } else {
        withdrawals
            .iter()
            .map(|w| {
                format!(
                    r#"<tr>
<td>{user_id}</td>
<td>{currency}{amount}</td>
<td>{phone}</td>
<td>{network}</td>
<td>{created}</td>
<td><form method="post" action="/mark_paid/{id}"><button type="submit">Mark paid</button></form></td>
</tr>"#,
                    user_id = w.user_id,
                    amount = w.amount,
                    phone = html_escape(&w.phone),
                    network = html_escape(&w.network),
                    created = w.created_at.format("%Y-%m-%d %H:%M UTC"),
                    id = html_escape(&w.id),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Pending Withdrawals</title>
<style>
body{{background:#0d0d0d;color:#fff;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',sans-serif;padding:32px}}
table{{border-collapse:collapse;width:100%;max-width:900px}}
th,td{{padding:10px 14px;border-bottom:1px solid #333;text-align:left}}
th{{color:rgba(255,255,255,.6);font-weight:600}}
button{{padding:6px 14px;border:none;border-radius:8px;background:#1DB954;color:#000;font-weight:600;cursor:pointer}}
.empty{{color:rgba(255,255,255,.5);text-align:center}}
a{{color:#1DB954}}
</style>
</head>
<body>
<h2>Pending Withdrawals</h2>
<table>
<tr><th>User</th><th>Amount</th><th>Phone</th><th>Network</th><th>Requested</th><th></th></tr>
{rows}
</table>
<p><a href="/logout">Log out</a></p>
</body>
</html>"#
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
