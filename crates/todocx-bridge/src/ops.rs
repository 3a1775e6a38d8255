use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::{envelope::BridgeRequest, error::BridgeError};

pub const ALL_FILES_FILTER_NAME: &str = "All Files";
pub const OPEN_FILE_TITLE: &str = "Select File";
pub const OPEN_DIRECTORY_TITLE: &str = "Select Directory";
pub const SAVE_FILE_TITLE: &str = "Save File";

/// The complete set of operations the UI may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeOp {
    ResolveWorkerEndpoint,
    OpenFileDialog,
    OpenDirectoryDialog,
    SaveFileDialog,
    SaveTextFile,
    RevealInFileManager,
    OpenPath,
    GetUserDirectory,
}

impl BridgeOp {
    pub const ALL: [BridgeOp; 8] = [
        BridgeOp::ResolveWorkerEndpoint,
        BridgeOp::OpenFileDialog,
        BridgeOp::OpenDirectoryDialog,
        BridgeOp::SaveFileDialog,
        BridgeOp::SaveTextFile,
        BridgeOp::RevealInFileManager,
        BridgeOp::OpenPath,
        BridgeOp::GetUserDirectory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BridgeOp::ResolveWorkerEndpoint => "resolve-worker-endpoint",
            BridgeOp::OpenFileDialog => "open-file-dialog",
            BridgeOp::OpenDirectoryDialog => "open-directory-dialog",
            BridgeOp::SaveFileDialog => "save-file-dialog",
            BridgeOp::SaveTextFile => "save-text-file",
            BridgeOp::RevealInFileManager => "reveal-in-file-manager",
            BridgeOp::OpenPath => "open-path",
            BridgeOp::GetUserDirectory => "get-user-directory",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for BridgeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn all_files() -> Self {
        Self {
            name: ALL_FILES_FILTER_NAME.to_string(),
            extensions: vec!["*".to_string()],
        }
    }

    fn normalized(self, op: BridgeOp) -> Result<Self, BridgeError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(BridgeError::invalid(format!("{op}: filter name is empty")));
        }
        if self.extensions.is_empty() {
            return Err(BridgeError::invalid(format!(
                "{op}: filter {name:?} has no extensions"
            )));
        }
        let mut extensions = Vec::with_capacity(self.extensions.len());
        for ext in self.extensions {
            let e = ext.trim().trim_start_matches('.');
            if e.is_empty() || e.contains(['/', '\\', '\0']) {
                return Err(BridgeError::invalid(format!(
                    "{op}: filter {name:?} has invalid extension {ext:?}"
                )));
            }
            extensions.push(e.to_string());
        }
        Ok(Self { name, extensions })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFileOptions {
    pub title: String,
    pub filters: Vec<FileFilter>,
    pub multi_select: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDirectoryOptions {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFileOptions {
    pub title: String,
    pub filters: Vec<FileFilter>,
    pub default_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTextFileParams {
    pub content: String,
    pub path: PathBuf,
}

/// Named standard directories the UI may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UserDirectory {
    Home,
    AppData,
    UserData,
    Temp,
    Desktop,
    #[default]
    Documents,
    Downloads,
    Music,
    Pictures,
    Videos,
}

impl UserDirectory {
    pub const ALL: [UserDirectory; 10] = [
        UserDirectory::Home,
        UserDirectory::AppData,
        UserDirectory::UserData,
        UserDirectory::Temp,
        UserDirectory::Desktop,
        UserDirectory::Documents,
        UserDirectory::Downloads,
        UserDirectory::Music,
        UserDirectory::Pictures,
        UserDirectory::Videos,
    ];

    pub fn key(self) -> &'static str {
        match self {
            UserDirectory::Home => "home",
            UserDirectory::AppData => "appData",
            UserDirectory::UserData => "userData",
            UserDirectory::Temp => "temp",
            UserDirectory::Desktop => "desktop",
            UserDirectory::Documents => "documents",
            UserDirectory::Downloads => "downloads",
            UserDirectory::Music => "music",
            UserDirectory::Pictures => "pictures",
            UserDirectory::Videos => "videos",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.key() == key)
    }
}

/// Result of an open-file pick: one path, or all of them when multi-select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickedFiles {
    Single(PathBuf),
    Many(Vec<PathBuf>),
}

impl PickedFiles {
    /// `None` when nothing was picked.
    pub fn from_selection(paths: Vec<PathBuf>, multi_select: bool) -> Option<Self> {
        if multi_select {
            if paths.is_empty() {
                return None;
            }
            return Some(PickedFiles::Many(paths));
        }
        paths.into_iter().next().map(PickedFiles::Single)
    }

    pub fn to_json(&self) -> Value {
        match self {
            PickedFiles::Single(p) => path_value(p),
            PickedFiles::Many(ps) => Value::Array(ps.iter().map(|p| path_value(p)).collect()),
        }
    }
}

pub(crate) fn path_value(p: &Path) -> Value {
    Value::String(p.to_string_lossy().into_owned())
}

/// A request that passed validation. Only this type reaches host code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCall {
    ResolveWorkerEndpoint,
    OpenFileDialog(OpenFileOptions),
    OpenDirectoryDialog(OpenDirectoryOptions),
    SaveFileDialog(SaveFileOptions),
    SaveTextFile(SaveTextFileParams),
    RevealInFileManager(Option<PathBuf>),
    OpenPath(Option<PathBuf>),
    GetUserDirectory(UserDirectory),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct OpenFileArgs {
    title: Option<String>,
    filters: Option<Vec<FileFilter>>,
    #[serde(alias = "multiSelections")]
    multi_select: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OpenDirectoryArgs {
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct SaveFileArgs {
    title: Option<String>,
    filters: Option<Vec<FileFilter>>,
    default_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct SaveTextFileArgs {
    content: String,
    default_path: String,
}

impl BridgeCall {
    pub fn from_request(req: &BridgeRequest) -> Result<Self, BridgeError> {
        let op = BridgeOp::from_name(&req.op).ok_or_else(|| {
            BridgeError::invalid(format!("unknown operation: {:?}", truncate(&req.op, 64)))
        })?;
        Self::parse(op, &req.payload)
    }

    pub fn parse(op: BridgeOp, payload: &Value) -> Result<Self, BridgeError> {
        match op {
            BridgeOp::ResolveWorkerEndpoint => {
                let empty = match payload {
                    Value::Null => true,
                    Value::Object(m) => m.is_empty(),
                    _ => false,
                };
                if !empty {
                    return Err(BridgeError::invalid(format!("{op}: takes no arguments")));
                }
                Ok(BridgeCall::ResolveWorkerEndpoint)
            }
            BridgeOp::OpenFileDialog => {
                let a: OpenFileArgs = optional_object(op, payload)?;
                Ok(BridgeCall::OpenFileDialog(OpenFileOptions {
                    title: title_or(a.title, OPEN_FILE_TITLE),
                    filters: filters_or_all(op, a.filters)?,
                    multi_select: a.multi_select.unwrap_or(false),
                }))
            }
            BridgeOp::OpenDirectoryDialog => {
                let a: OpenDirectoryArgs = optional_object(op, payload)?;
                Ok(BridgeCall::OpenDirectoryDialog(OpenDirectoryOptions {
                    title: title_or(a.title, OPEN_DIRECTORY_TITLE),
                }))
            }
            BridgeOp::SaveFileDialog => {
                let a: SaveFileArgs = optional_object(op, payload)?;
                let default_path = match a.default_path.as_deref() {
                    None => None,
                    Some(p) if p.trim().is_empty() => None,
                    Some(p) => Some(plain_path(op, p)?),
                };
                Ok(BridgeCall::SaveFileDialog(SaveFileOptions {
                    title: title_or(a.title, SAVE_FILE_TITLE),
                    filters: filters_or_all(op, a.filters)?,
                    default_path,
                }))
            }
            BridgeOp::SaveTextFile => {
                if !payload.is_object() {
                    return Err(BridgeError::invalid(format!(
                        "{op}: expected {{ content, defaultPath }}"
                    )));
                }
                let a = SaveTextFileArgs::deserialize(payload)
                    .map_err(|e| BridgeError::invalid(format!("{op}: {e}")))?;
                let path = absolute_path(op, &a.default_path)?;
                Ok(BridgeCall::SaveTextFile(SaveTextFileParams {
                    content: a.content,
                    path,
                }))
            }
            BridgeOp::RevealInFileManager => {
                Ok(BridgeCall::RevealInFileManager(optional_path(op, payload)?))
            }
            BridgeOp::OpenPath => Ok(BridgeCall::OpenPath(optional_path(op, payload)?)),
            BridgeOp::GetUserDirectory => {
                let dir = match payload {
                    Value::Null => UserDirectory::default(),
                    Value::String(s) if s.trim().is_empty() => UserDirectory::default(),
                    Value::String(s) => UserDirectory::from_key(s.trim()).ok_or_else(|| {
                        BridgeError::invalid(format!(
                            "{op}: unknown directory {:?}",
                            truncate(s, 64)
                        ))
                    })?,
                    _ => {
                        return Err(BridgeError::invalid(format!(
                            "{op}: expected a directory name"
                        )))
                    }
                };
                Ok(BridgeCall::GetUserDirectory(dir))
            }
        }
    }
}

fn optional_object<T: DeserializeOwned + Default>(
    op: BridgeOp,
    payload: &Value,
) -> Result<T, BridgeError> {
    match payload {
        Value::Null => Ok(T::default()),
        Value::Object(_) => {
            T::deserialize(payload).map_err(|e| BridgeError::invalid(format!("{op}: {e}")))
        }
        _ => Err(BridgeError::invalid(format!("{op}: expected an object"))),
    }
}

fn title_or(title: Option<String>, default: &str) -> String {
    match title {
        Some(t) if !t.trim().is_empty() => t.trim().to_string(),
        _ => default.to_string(),
    }
}

fn filters_or_all(
    op: BridgeOp,
    filters: Option<Vec<FileFilter>>,
) -> Result<Vec<FileFilter>, BridgeError> {
    match filters {
        Some(fs) if !fs.is_empty() => fs.into_iter().map(|f| f.normalized(op)).collect(),
        _ => Ok(vec![FileFilter::all_files()]),
    }
}

fn plain_path(op: BridgeOp, raw: &str) -> Result<PathBuf, BridgeError> {
    if raw.contains('\0') {
        return Err(BridgeError::invalid(format!("{op}: path contains NUL")));
    }
    Ok(PathBuf::from(raw))
}

fn absolute_path(op: BridgeOp, raw: &str) -> Result<PathBuf, BridgeError> {
    if raw.trim().is_empty() {
        return Err(BridgeError::invalid(format!("{op}: path is empty")));
    }
    let p = plain_path(op, raw)?;
    if !p.is_absolute() {
        return Err(BridgeError::invalid(format!(
            "{op}: path must be absolute: {}",
            truncate(raw, 256)
        )));
    }
    Ok(p)
}

// Missing or blank means "nothing to do".
fn optional_path(op: BridgeOp, payload: &Value) -> Result<Option<PathBuf>, BridgeError> {
    match payload {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => absolute_path(op, s).map(Some),
        _ => Err(BridgeError::invalid(format!("{op}: expected a path string"))),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(op: &str, payload: Value) -> Result<BridgeCall, BridgeError> {
        BridgeCall::from_request(&BridgeRequest::new(op, payload))
    }

    fn abs(name: &str) -> String {
        std::env::temp_dir().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn op_names_round_trip_and_unknown_ops_are_rejected() {
        for op in BridgeOp::ALL {
            assert_eq!(BridgeOp::from_name(op.name()), Some(op));
        }
        let err = parse("exec-shell", json!("rm -rf /")).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn open_file_dialog_defaults_when_payload_is_null() {
        let call = parse("open-file-dialog", Value::Null).unwrap();
        assert_eq!(
            call,
            BridgeCall::OpenFileDialog(OpenFileOptions {
                title: "Select File".to_string(),
                filters: vec![FileFilter::all_files()],
                multi_select: false,
            })
        );
    }

    #[test]
    fn open_file_dialog_accepts_filters_and_multi_select_alias() {
        let call = parse(
            "open-file-dialog",
            json!({
                "title": " Pick audio ",
                "filters": [{ "name": "Audio", "extensions": [".mp3", "wav"] }],
                "multiSelections": true
            }),
        )
        .unwrap();
        let BridgeCall::OpenFileDialog(opts) = call else {
            panic!("wrong call");
        };
        assert_eq!(opts.title, "Pick audio");
        assert_eq!(opts.filters[0].extensions, vec!["mp3", "wav"]);
        assert!(opts.multi_select);
    }

    #[test]
    fn malformed_dialog_payloads_are_invalid() {
        for (op, payload) in [
            ("open-file-dialog", json!("not an object")),
            ("open-file-dialog", json!({ "filters": "docx" })),
            ("open-file-dialog", json!({ "filters": [{ "name": "", "extensions": ["a"] }] })),
            ("open-file-dialog", json!({ "filters": [{ "name": "A", "extensions": [] }] })),
            ("open-file-dialog", json!({ "filters": [{ "name": "A", "extensions": ["../x"] }] })),
            ("open-file-dialog", json!({ "unexpected": 1 })),
            ("open-directory-dialog", json!({ "title": 5 })),
            ("save-file-dialog", json!({ "defaultPath": ["a"] })),
        ] {
            let err = parse(op, payload.clone()).unwrap_err();
            assert!(
                matches!(err, BridgeError::InvalidArgument(_)),
                "{op} {payload} -> {err:?}"
            );
        }
    }

    #[test]
    fn save_text_file_requires_content_and_absolute_path() {
        let p = abs("notes.txt");
        let call = parse("save-text-file", json!({ "content": "hi", "defaultPath": p })).unwrap();
        assert_eq!(
            call,
            BridgeCall::SaveTextFile(SaveTextFileParams {
                content: "hi".to_string(),
                path: PathBuf::from(&p),
            })
        );

        for payload in [
            Value::Null,
            json!({ "content": "hi" }),
            json!({ "defaultPath": p }),
            json!({ "content": 1, "defaultPath": p }),
            json!({ "content": "hi", "defaultPath": "" }),
            json!({ "content": "hi", "defaultPath": "relative/notes.txt" }),
        ] {
            let err = parse("save-text-file", payload.clone()).unwrap_err();
            assert!(matches!(err, BridgeError::InvalidArgument(_)), "{payload}");
        }
    }

    #[test]
    fn paths_with_surrounding_spaces_are_kept_verbatim() {
        let p = abs("draft notes .txt ");
        let call = parse("save-text-file", json!({ "content": "hi", "defaultPath": p })).unwrap();
        assert_eq!(
            call,
            BridgeCall::SaveTextFile(SaveTextFileParams {
                content: "hi".to_string(),
                path: PathBuf::from(&p),
            })
        );
        assert_eq!(
            parse("open-path", json!(p)).unwrap(),
            BridgeCall::OpenPath(Some(PathBuf::from(&p)))
        );
        match parse("save-file-dialog", json!({ "defaultPath": " report.txt" })).unwrap() {
            BridgeCall::SaveFileDialog(o) => {
                assert_eq!(o.default_path, Some(PathBuf::from(" report.txt")));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            parse("save-text-file", json!({ "content": "hi", "defaultPath": "   " })).unwrap_err(),
            BridgeError::InvalidArgument(_)
        ));
    }

    #[test]
    fn empty_paths_for_shell_ops_mean_no_op() {
        assert_eq!(
            parse("reveal-in-file-manager", Value::Null).unwrap(),
            BridgeCall::RevealInFileManager(None)
        );
        assert_eq!(
            parse("open-path", json!("  ")).unwrap(),
            BridgeCall::OpenPath(None)
        );
        assert!(matches!(
            parse("open-path", json!(42)).unwrap_err(),
            BridgeError::InvalidArgument(_)
        ));
    }

    #[test]
    fn user_directory_keys() {
        assert_eq!(
            parse("get-user-directory", Value::Null).unwrap(),
            BridgeCall::GetUserDirectory(UserDirectory::Documents)
        );
        assert_eq!(
            parse("get-user-directory", json!("downloads")).unwrap(),
            BridgeCall::GetUserDirectory(UserDirectory::Downloads)
        );
        for d in UserDirectory::ALL {
            assert_eq!(UserDirectory::from_key(d.key()), Some(d));
        }
        assert!(parse("get-user-directory", json!("system32")).is_err());
    }

    #[test]
    fn resolve_worker_endpoint_takes_no_arguments() {
        assert!(parse("resolve-worker-endpoint", json!({})).is_ok());
        assert!(parse("resolve-worker-endpoint", json!({ "port": 1 })).is_err());
    }

    #[test]
    fn picked_files_shape_follows_multi_select() {
        let a = PathBuf::from("/tmp/a.txt");
        let b = PathBuf::from("/tmp/b.txt");
        assert_eq!(
            PickedFiles::from_selection(vec![a.clone(), b.clone()], false),
            Some(PickedFiles::Single(a.clone()))
        );
        let many = PickedFiles::from_selection(vec![a, b], true).unwrap();
        assert_eq!(many.to_json(), json!(["/tmp/a.txt", "/tmp/b.txt"]));
        assert_eq!(PickedFiles::from_selection(vec![], true), None);
    }
}
