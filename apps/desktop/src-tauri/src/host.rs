use std::path::{Path, PathBuf};

use tauri::{AppHandle, Manager, Runtime};
use tauri_plugin_dialog::{DialogExt, FileDialogBuilder, FilePath};
use tauri_plugin_opener::OpenerExt;
use todocx_bridge::{
    FileFilter, HostError, HostServices, OpenDirectoryOptions, OpenFileOptions, SaveFileOptions,
    UserDirectory,
};

/// Native dialogs, shell integration and standard directories via Tauri.
///
/// Dialog calls block until the user answers; the bridge command runs them on
/// a blocking thread, never on the event loop.
pub struct TauriHost<R: Runtime> {
    app: AppHandle<R>,
    data_dir: PathBuf,
}

impl<R: Runtime> TauriHost<R> {
    pub fn new(app: AppHandle<R>, data_dir: PathBuf) -> Self {
        Self { app, data_dir }
    }

    fn file_dialog(&self, title: &str, filters: &[FileFilter]) -> FileDialogBuilder<R> {
        let mut b = self.app.dialog().file().set_title(title);
        for f in filters {
            let exts: Vec<&str> = f.extensions.iter().map(String::as_str).collect();
            b = b.add_filter(&f.name, &exts);
        }
        b
    }
}

fn into_path(fp: FilePath) -> Result<PathBuf, HostError> {
    fp.into_path()
        .map_err(|e| HostError::new(format!("dialog returned an unusable path: {e}")))
}

impl<R: Runtime> HostServices for TauriHost<R> {
    fn pick_files(&self, opts: &OpenFileOptions) -> Result<Option<Vec<PathBuf>>, HostError> {
        let dialog = self.file_dialog(&opts.title, &opts.filters);
        let picked = if opts.multi_select {
            dialog.blocking_pick_files()
        } else {
            dialog.blocking_pick_file().map(|fp| vec![fp])
        };
        match picked {
            None => Ok(None),
            Some(fps) => fps
                .into_iter()
                .map(into_path)
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
        }
    }

    fn pick_directory(&self, opts: &OpenDirectoryOptions) -> Result<Option<PathBuf>, HostError> {
        self.app
            .dialog()
            .file()
            .set_title(&opts.title)
            .blocking_pick_folder()
            .map(into_path)
            .transpose()
    }

    fn pick_save_path(&self, opts: &SaveFileOptions) -> Result<Option<PathBuf>, HostError> {
        let mut dialog = self.file_dialog(&opts.title, &opts.filters);
        if let Some(default) = &opts.default_path {
            if let Some(dir) = default.parent().filter(|d| !d.as_os_str().is_empty()) {
                dialog = dialog.set_directory(dir);
            }
            if let Some(name) = default.file_name() {
                dialog = dialog.set_file_name(name.to_string_lossy());
            }
        }
        dialog.blocking_save_file().map(into_path).transpose()
    }

    fn reveal_in_file_manager(&self, path: &Path) -> Result<(), HostError> {
        self.app
            .opener()
            .reveal_item_in_dir(path)
            .map_err(|e| HostError::new(format!("reveal {} failed: {e}", path.display())))
    }

    fn open_path(&self, path: &Path) -> Result<(), HostError> {
        self.app
            .opener()
            .open_path(path.to_string_lossy(), None::<&str>)
            .map_err(|e| HostError::new(format!("open {} failed: {e}", path.display())))
    }

    fn user_directory(&self, dir: UserDirectory) -> Result<PathBuf, HostError> {
        let paths = self.app.path();
        let resolved = match dir {
            UserDirectory::Home => paths.home_dir(),
            UserDirectory::AppData => paths.data_dir(),
            UserDirectory::UserData => return Ok(self.data_dir.clone()),
            UserDirectory::Temp => paths.temp_dir(),
            UserDirectory::Desktop => paths.desktop_dir(),
            UserDirectory::Documents => paths.document_dir(),
            UserDirectory::Downloads => paths.download_dir(),
            UserDirectory::Music => paths.audio_dir(),
            UserDirectory::Pictures => paths.picture_dir(),
            UserDirectory::Videos => paths.video_dir(),
        };
        resolved.map_err(|e| HostError::new(format!("{} directory unavailable: {e}", dir.key())))
    }
}
