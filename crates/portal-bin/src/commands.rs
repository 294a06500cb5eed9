//! Command handlers. Output on stdout is for the user; everything else goes
//! through tracing.

use portal_auth::{AppContext, ApiRequest, ContextResult, Navigator, PageQuery, PageResult};
use portal_config_and_utils::{Config, Paths};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// A terminal cannot open pages; show the target instead.
struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, target: &str) {
        println!("Open in a browser: {target}");
    }
}

pub fn start(config: Config, paths: &Paths) -> ContextResult<AppContext> {
    AppContext::start(config, paths, Arc::new(PrintNavigator))
}

fn print_json(value: &Value) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn login(context: &AppContext, account: &str, password: &str) -> CommandResult {
    match context.manager().login(account, password).await {
        Ok(session) => {
            println!(
                "Logged in as {}",
                session.user_label().unwrap_or_else(|| account.to_string())
            );
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err.user_message("登录失败"));
            Err(err.into())
        }
    }
}

pub fn logout(context: &AppContext) -> CommandResult {
    context.manager().logout();
    println!("Logged out");
    Ok(())
}

pub async fn refresh(context: &AppContext) -> CommandResult {
    match context.manager().refresh().await {
        Some(session) => println!(
            "Session renewed{}",
            if session.refresh_credential().is_some() {
                ""
            } else {
                " (no further renewal possible)"
            }
        ),
        None => println!("Session could not be renewed; logged out"),
    }
    Ok(())
}

pub fn status(context: &AppContext) -> CommandResult {
    let snapshot = context.manager().snapshot();
    let mut report = serde_json::to_value(&snapshot)?;
    if let Some(object) = report.as_object_mut() {
        object.insert(
            "flavor".to_string(),
            Value::from(context.config().flavor.as_str()),
        );
        object.insert(
            "backend".to_string(),
            Value::from(context.manager().store_backend()),
        );
        if let Some(session) = context.manager().current_session() {
            let expiry = portal_auth::decode_token_expiry(&session.token);
            object.insert(
                "tokenExpiresAt".to_string(),
                expiry.map(|at| Value::from(at.to_rfc3339())).unwrap_or(Value::Null),
            );
        }
    }
    print_json(&report)
}

pub async fn oauth_login(context: &AppContext, provider: &str) -> CommandResult {
    context.manager().start_oauth_login(provider).await?;
    Ok(())
}

pub async fn oauth_callback(context: &AppContext, state: &str) -> CommandResult {
    let session = context.manager().exchange_oauth_state(state).await?;
    println!(
        "Logged in as {}",
        session.user_label().unwrap_or_else(|| "-".to_string())
    );
    Ok(())
}

pub async fn me(context: &AppContext) -> CommandResult {
    let session = context.manager().fetch_current_user().await?;
    print_json(&session.user)
}

pub async fn menus(context: &AppContext) -> CommandResult {
    let menus = context.projections().fetch_menus().await;
    print_json(&serde_json::to_value(menus)?)
}

pub async fn profile(context: &AppContext) -> CommandResult {
    let profile = context.projections().profile().await?;
    print_json(&profile.unwrap_or(Value::Null))
}

pub async fn list(
    context: &AppContext,
    path: &str,
    page: u32,
    size: u32,
    keyword: Option<String>,
) -> CommandResult {
    let mut query = PageQuery::new(page, size);
    query.keyword = keyword;

    let result: PageResult<Value> = context.resource(path).page(&query).await?;
    info!(path, total = result.total_row, "Listed page");
    print_json(&serde_json::to_value(result)?)
}

pub async fn get(context: &AppContext, path: &str) -> CommandResult {
    let data: Value = context.api().send(&ApiRequest::get(path)).await?;
    print_json(&data)
}

/// Keep the process alive so the renewal scheduler can do its work.
pub async fn watch(context: &AppContext) -> CommandResult {
    println!("Watching session; press Ctrl-C to stop");
    let mut states = tokio::time::interval(std::time::Duration::from_secs(
        context.config().renewal.check_interval_secs.max(1),
    ));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = states.tick() => {
                let snapshot = context.manager().snapshot();
                info!(
                    state = ?snapshot.state,
                    refresh_in_flight = snapshot.refresh_in_flight,
                    "Session state"
                );
            }
        }
    }
    Ok(())
}
