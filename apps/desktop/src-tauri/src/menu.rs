use std::sync::Mutex;

use tauri::{
    menu::{Menu, MenuBuilder, MenuEvent, MenuItem, MenuItemBuilder, PredefinedMenuItem, SubmenuBuilder},
    AppHandle, Manager, Runtime, WebviewWindow,
};
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};

use crate::lifecycle::{HostLifecycle, MAIN_WINDOW_LABEL, WINDOW_TITLE};

pub const ABOUT_TITLE: &str = "About";
pub const ABOUT_DETAIL: &str = "Converts documents to Word through a local conversion service.";

// Same scale as Chromium zoom levels: factor = 1.2^level.
const ZOOM_BASE: f64 = 1.2;
const ZOOM_STEP: f64 = 0.5;
const MIN_ZOOM_LEVEL: f64 = -8.0;
const MAX_ZOOM_LEVEL: f64 = 9.0;

/// Custom menu entries. Clipboard and undo entries are predefined items and
/// never reach the event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Quit,
    Reload,
    ForceReload,
    ToggleDevtools,
    ResetZoom,
    ZoomIn,
    ZoomOut,
    ToggleFullscreen,
    Minimize,
    CloseWindow,
    About,
}

impl MenuAction {
    pub const ALL: [MenuAction; 11] = [
        MenuAction::Quit,
        MenuAction::Reload,
        MenuAction::ForceReload,
        MenuAction::ToggleDevtools,
        MenuAction::ResetZoom,
        MenuAction::ZoomIn,
        MenuAction::ZoomOut,
        MenuAction::ToggleFullscreen,
        MenuAction::Minimize,
        MenuAction::CloseWindow,
        MenuAction::About,
    ];

    pub fn id(self) -> &'static str {
        match self {
            MenuAction::Quit => "file.quit",
            MenuAction::Reload => "view.reload",
            MenuAction::ForceReload => "view.force_reload",
            MenuAction::ToggleDevtools => "view.devtools",
            MenuAction::ResetZoom => "view.zoom_reset",
            MenuAction::ZoomIn => "view.zoom_in",
            MenuAction::ZoomOut => "view.zoom_out",
            MenuAction::ToggleFullscreen => "view.fullscreen",
            MenuAction::Minimize => "window.minimize",
            MenuAction::CloseWindow => "window.close",
            MenuAction::About => "help.about",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.id() == id)
    }

    pub fn label(self) -> &'static str {
        match self {
            MenuAction::Quit => "Quit",
            MenuAction::Reload => "Reload",
            MenuAction::ForceReload => "Force Reload",
            MenuAction::ToggleDevtools => "Developer Tools",
            MenuAction::ResetZoom => "Actual Size",
            MenuAction::ZoomIn => "Zoom In",
            MenuAction::ZoomOut => "Zoom Out",
            MenuAction::ToggleFullscreen => "Toggle Full Screen",
            MenuAction::Minimize => "Minimize",
            MenuAction::CloseWindow => "Close",
            MenuAction::About => "About",
        }
    }

    pub fn accelerator(self) -> Option<&'static str> {
        match self {
            MenuAction::Quit => Some("CmdOrCtrl+Q"),
            MenuAction::Reload => Some("CmdOrCtrl+R"),
            MenuAction::ForceReload => Some("CmdOrCtrl+Shift+R"),
            MenuAction::ToggleDevtools => Some("CmdOrCtrl+Shift+I"),
            MenuAction::ResetZoom => Some("CmdOrCtrl+0"),
            MenuAction::ZoomIn => Some("CmdOrCtrl+Plus"),
            MenuAction::ZoomOut => Some("CmdOrCtrl+-"),
            MenuAction::ToggleFullscreen => Some("F11"),
            MenuAction::Minimize => Some("CmdOrCtrl+M"),
            MenuAction::CloseWindow => Some("CmdOrCtrl+W"),
            MenuAction::About => None,
        }
    }
}

/// Current zoom level of the main window, shared by the zoom entries.
#[derive(Debug, Default)]
pub struct ZoomLevel(Mutex<f64>);

impl ZoomLevel {
    /// Applies a zoom entry and returns the new level.
    pub fn apply(&self, action: MenuAction) -> f64 {
        let mut level = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *level = next_zoom_level(*level, action);
        *level
    }
}

pub fn next_zoom_level(level: f64, action: MenuAction) -> f64 {
    let next = match action {
        MenuAction::ResetZoom => 0.0,
        MenuAction::ZoomIn => level + ZOOM_STEP,
        MenuAction::ZoomOut => level - ZOOM_STEP,
        _ => level,
    };
    next.clamp(MIN_ZOOM_LEVEL, MAX_ZOOM_LEVEL)
}

pub fn zoom_factor(level: f64) -> f64 {
    ZOOM_BASE.powf(level)
}

pub fn about_message(version: &str) -> String {
    format!("{WINDOW_TITLE} {version}\n\n{ABOUT_DETAIL}")
}

fn custom_item<R: Runtime>(app: &AppHandle<R>, action: MenuAction) -> tauri::Result<MenuItem<R>> {
    let b = MenuItemBuilder::with_id(action.id(), action.label());
    match action.accelerator() {
        Some(acc) => b.accelerator(acc).build(app),
        None => b.build(app),
    }
}

/// File, Edit, View, Window and Help menus for the application.
pub fn build<R: Runtime>(app: &AppHandle<R>) -> tauri::Result<Menu<R>> {
    let file = SubmenuBuilder::new(app, "File")
        .item(&custom_item(app, MenuAction::Quit)?)
        .build()?;
    let edit = SubmenuBuilder::new(app, "Edit")
        .item(&PredefinedMenuItem::undo(app, None)?)
        .item(&PredefinedMenuItem::redo(app, None)?)
        .separator()
        .item(&PredefinedMenuItem::cut(app, None)?)
        .item(&PredefinedMenuItem::copy(app, None)?)
        .item(&PredefinedMenuItem::paste(app, None)?)
        .item(&PredefinedMenuItem::select_all(app, None)?)
        .build()?;
    let view = SubmenuBuilder::new(app, "View")
        .item(&custom_item(app, MenuAction::Reload)?)
        .item(&custom_item(app, MenuAction::ForceReload)?)
        .item(&custom_item(app, MenuAction::ToggleDevtools)?)
        .separator()
        .item(&custom_item(app, MenuAction::ResetZoom)?)
        .item(&custom_item(app, MenuAction::ZoomIn)?)
        .item(&custom_item(app, MenuAction::ZoomOut)?)
        .separator()
        .item(&custom_item(app, MenuAction::ToggleFullscreen)?)
        .build()?;
    let window = SubmenuBuilder::new(app, "Window")
        .item(&custom_item(app, MenuAction::Minimize)?)
        .item(&custom_item(app, MenuAction::CloseWindow)?)
        .build()?;
    let help = SubmenuBuilder::new(app, "Help")
        .item(&custom_item(app, MenuAction::About)?)
        .build()?;
    MenuBuilder::new(app)
        .items(&[&file, &edit, &view, &window, &help])
        .build()
}

pub fn handle_event<R: Runtime>(app: &AppHandle<R>, event: MenuEvent) {
    let id: &str = event.id().as_ref();
    let Some(action) = MenuAction::from_id(id) else {
        return;
    };
    match action {
        MenuAction::Quit => {
            log_info(app, "Quit requested from menu");
            app.exit(0);
        }
        MenuAction::About => show_about(app),
        _ => {
            let Some(window) = app.get_webview_window(MAIN_WINDOW_LABEL) else {
                return;
            };
            if let Err(e) = apply_to_window(app, &window, action) {
                log_error(app, &format!("Menu {} failed", action.id()), &e.to_string());
            }
        }
    }
}

fn apply_to_window<R: Runtime>(
    app: &AppHandle<R>,
    window: &WebviewWindow<R>,
    action: MenuAction,
) -> tauri::Result<()> {
    match action {
        // The webview has no cache-bypassing reload, so both entries reload.
        MenuAction::Reload | MenuAction::ForceReload => window.eval("window.location.reload()"),
        MenuAction::ToggleDevtools => {
            toggle_devtools(window);
            Ok(())
        }
        MenuAction::ResetZoom | MenuAction::ZoomIn | MenuAction::ZoomOut => {
            let level = match app.try_state::<ZoomLevel>() {
                Some(z) => z.apply(action),
                None => next_zoom_level(0.0, action),
            };
            window.set_zoom(zoom_factor(level))
        }
        MenuAction::ToggleFullscreen => {
            let full = window.is_fullscreen()?;
            window.set_fullscreen(!full)
        }
        MenuAction::Minimize => window.minimize(),
        MenuAction::CloseWindow => window.close(),
        MenuAction::Quit | MenuAction::About => Ok(()),
    }
}

#[cfg(debug_assertions)]
fn toggle_devtools<R: Runtime>(window: &WebviewWindow<R>) {
    if window.is_devtools_open() {
        window.close_devtools();
    } else {
        window.open_devtools();
    }
}

// Release builds ship without the inspector.
#[cfg(not(debug_assertions))]
fn toggle_devtools<R: Runtime>(_window: &WebviewWindow<R>) {}

fn show_about<R: Runtime>(app: &AppHandle<R>) {
    let version = app.package_info().version.to_string();
    app.dialog()
        .message(about_message(&version))
        .title(ABOUT_TITLE)
        .kind(MessageDialogKind::Info)
        .buttons(MessageDialogButtons::Ok)
        .show(|_| {});
}

fn log_info<R: Runtime>(app: &AppHandle<R>, message: &str) {
    if let Some(host) = app.try_state::<HostLifecycle>() {
        host.log.info(message);
    }
}

fn log_error<R: Runtime>(app: &AppHandle<R>, message: &str, detail: &str) {
    if let Some(host) = app.try_state::<HostLifecycle>() {
        host.log.error(message, Some(detail));
    }
}
