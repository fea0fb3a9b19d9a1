//! The browser-facing action protocol.
//!
//! One envelope in (`{module, action, data}`), one envelope out
//! (`{module, action, data, err}`, empty `err` meaning success). Routing is a
//! flat name-to-handler table; no handler ever aborts the process — every
//! failure degrades to the `err` field.

use std::fs;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::app::{AppContext, DriveService};
use crate::provider::DownloadItem;

/// Request envelope from the frontend.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

/// Response envelope to the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub module: String,
    pub action: String,
    pub data: Value,
    pub err: String,
}

/// Routes one request to its handler and wraps the outcome.
pub async fn dispatch(ctx: &AppContext, request: ActionRequest) -> ActionResponse {
    let ActionRequest {
        module,
        action,
        data,
    } = request;
    match route(ctx, &module, &action, data).await {
        Ok(data) => ActionResponse {
            module,
            action,
            data,
            err: String::new(),
        },
        Err(err) => ActionResponse {
            module,
            action,
            data: Value::Null,
            err,
        },
    }
}

async fn route(
    ctx: &AppContext,
    module: &str,
    action: &str,
    data: Value,
) -> Result<Value, String> {
    match module {
        "aria2" => aria2_action(ctx, action, &data).await,
        "cookies" => cookies_action(ctx, action, &data).await,
        other => match ctx.drive(other) {
            Some(drive) => drive_action(ctx, drive, action, &data).await,
            None => Err(format!("unknown module '{other}'")),
        },
    }
}

async fn aria2_action(ctx: &AppContext, action: &str, data: &Value) -> Result<Value, String> {
    let aria2 = ctx.aria2();
    match action {
        "getConfig" => Ok(json!({ "url": aria2.config().url })),
        "saveConfig" => {
            let url = data.get("url").and_then(Value::as_str).unwrap_or_default();
            aria2.save_config(url).map_err(|e| e.to_string())?;
            Ok(json!({ "url": aria2.config().url }))
        }
        "getVersion" => aria2
            .get_version()
            .await
            .map(Value::String)
            .map_err(|e| e.to_string()),
        "getStat" => {
            let snapshot = aria2.get_status().await.map_err(|e| e.to_string())?;
            Ok(serde_json::to_value(snapshot).unwrap_or(Value::Null))
        }
        "start" => {
            aria2.unpause(&gids_of(data, action)?).await;
            Ok(Value::Null)
        }
        "pause" => {
            aria2.pause(&gids_of(data, action)?).await;
            Ok(Value::Null)
        }
        "remove" => {
            aria2.remove(&gids_of(data, action)?).await;
            Ok(Value::Null)
        }
        "removeStoped" => {
            aria2.remove_results(&gids_of(data, action)?).await;
            Ok(Value::Null)
        }
        "startAll" => aria2
            .unpause_all()
            .await
            .map(|()| Value::Null)
            .map_err(|e| e.to_string()),
        "pauseAll" => aria2
            .pause_all()
            .await
            .map(|()| Value::Null)
            .map_err(|e| e.to_string()),
        "removeAllStoped" => aria2
            .purge_stopped()
            .await
            .map(|()| Value::Null)
            .map_err(|e| e.to_string()),
        other => Err(format!("unknown aria2 action '{other}'")),
    }
}

fn gids_of(data: &Value, action: &str) -> Result<Vec<String>, String> {
    data.as_array()
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .ok_or_else(|| format!("{action} invalid gids"))
}

async fn drive_action(
    ctx: &AppContext,
    drive: &DriveService,
    action: &str,
    data: &Value,
) -> Result<Value, String> {
    match action {
        "getAccountList" => {
            let names = drive.account_names().await.map_err(|e| e.to_string())?;
            Ok(json!(names))
        }
        "reloadAccounts" => {
            drive.invalidate_accounts().await;
            let names = drive.account_names().await.map_err(|e| e.to_string())?;
            Ok(json!(names))
        }
        "loadData" => {
            let account = data.get("account").and_then(Value::as_str).unwrap_or_default();
            let id = data.get("id").and_then(Value::as_str).unwrap_or_default();
            let path = data.get("path").and_then(Value::as_str).unwrap_or_default();
            // Hierarchical providers navigate by path when the frontend sends
            // one; otherwise the selected item id is the cursor.
            let cursor = if path.is_empty() { id } else { path };
            let list = drive
                .list_items(account, cursor)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({
                "account": account,
                "id": id,
                "list": serde_json::to_value(list).unwrap_or(Value::Null),
            }))
        }
        "download" => {
            let account = data.get("account").and_then(Value::as_str).unwrap_or_default();
            let items: Vec<DownloadItem> = data
                .get("list")
                .cloned()
                .and_then(|list| serde_json::from_value(list).ok())
                .ok_or_else(|| "convert list fail".to_string())?;
            drive
                .enqueue_downloads(account, &items, ctx.aria2())
                .await
                .map(|()| json!("ok"))
                .map_err(|e| e.to_string())
        }
        other => Err(format!("unknown {} action '{other}'", drive.kind())),
    }
}

async fn cookies_action(ctx: &AppContext, action: &str, data: &Value) -> Result<Value, String> {
    match action {
        "save" => {
            let filename = data
                .get("filename")
                .and_then(Value::as_str)
                .filter(|f| is_plain_file_name(f))
                .ok_or_else(|| "bad cookies filename".to_string())?;
            let content = data
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| "bad cookies content".to_string())?;

            fs::create_dir_all(ctx.config_dir())
                .and_then(|()| fs::write(ctx.config_dir().join(filename), content))
                .map_err(|e| e.to_string())?;
            info!(filename, "cookie file saved");

            // Saved cookies change the account universe: drop every cached
            // account list so the next getAccountList sees the new file.
            for drive in ctx.drives() {
                drive.invalidate_accounts().await;
            }

            let page = data.get("page").and_then(Value::as_str).unwrap_or_default();
            Ok(json!(page))
        }
        other => Err(format!("unknown cookies action '{other}'")),
    }
}

/// Cookie files may only land directly in the config directory.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
}
