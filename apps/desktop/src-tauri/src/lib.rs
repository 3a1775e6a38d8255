mod data_dir;
mod host;
mod lifecycle;
mod menu;
mod panic_log;
mod startup_trace;

use lifecycle::HostLifecycle;
use serde_json::Value;
use tauri::{Manager, RunEvent};
use todocx_bridge::{BridgeError, BridgeResponse, HostError};

/// The single command the UI may invoke. Every outcome, including a request
/// that fails to decode, comes back as a `BridgeResponse`.
#[tauri::command]
async fn bridge_invoke(app: tauri::AppHandle, request: Value) -> BridgeResponse {
    let Some(host) = app.try_state::<HostLifecycle>() else {
        let err = BridgeError::Host(HostError::new("host is not initialised"));
        return BridgeResponse::failure(&err, Value::Null);
    };
    let bridge = host.bridge.clone();
    let call_id = uuid::Uuid::new_v4().to_string();

    // Dialogs block until the user answers.
    let joined = tauri::async_runtime::spawn_blocking(move || {
        bridge.dispatch_raw(Some(&call_id), request)
    })
    .await;
    match joined {
        Ok(resp) => resp,
        Err(e) => {
            let err = BridgeError::Host(HostError::new(format!("bridge task failed: {e}")));
            host.log.error_chain("Bridge task failed", &err);
            BridgeResponse::failure(&err, Value::Null)
        }
    }
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    startup_trace::mark_best_effort("run_enter");
    panic_log::install_best_effort();
    startup_trace::mark_best_effort("panic_hook_installed");
    let ctx = tauri::generate_context!();
    startup_trace::mark_best_effort("context_generated");
    tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, _args, _cwd| {
            lifecycle::focus_main_window(app);
        }))
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_opener::init())
        .menu(menu::build)
        .on_menu_event(menu::handle_event)
        .setup(|app| {
            startup_trace::mark_best_effort("setup_enter");
            app.manage(menu::ZoomLevel::default());
            let host = HostLifecycle::init(app.handle())?;
            host.start_worker(app.handle().clone());
            app.manage(host);
            startup_trace::mark_best_effort("setup_exit");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![bridge_invoke])
        .build(ctx)
        .expect("error while building tauri application")
        .run(|app, event| match event {
            RunEvent::ExitRequested { code, api, .. } => {
                if lifecycle::keep_running_without_windows(code, cfg!(target_os = "macos")) {
                    api.prevent_exit();
                }
            }
            #[cfg(target_os = "macos")]
            RunEvent::Reopen {
                has_visible_windows: false,
                ..
            } => {
                if let Some(host) = app.try_state::<HostLifecycle>() {
                    host.reopen_main_window(app);
                }
            }
            RunEvent::Exit => {
                if let Some(host) = app.try_state::<HostLifecycle>() {
                    host.shutdown();
                }
            }
            _ => {}
        });
}
