use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::smugmug::responses::AlbumImageRecord;

pub const DEFAULT_FILENAME_TEMPLATE: &str = "{{FileName}}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unknown template variable '{0}'")]
    UnknownVariable(String),

    #[error("Unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
}

/// Substitution variables available to a filename template.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenameVars<'a> {
    pub file_name: &'a str,
    pub image_key: &'a str,
    pub archived_md5: &'a str,
    pub upload_key: &'a str,
}

impl<'a> FilenameVars<'a> {
    pub fn from_record(record: &'a AlbumImageRecord) -> Self {
        Self {
            file_name: &record.file_name,
            image_key: &record.image_key,
            archived_md5: &record.archived_md5,
            upload_key: &record.upload_key,
        }
    }

    fn lookup(&self, name: &str) -> Option<&'a str> {
        match name {
            "FileName" => Some(self.file_name),
            "ImageKey" => Some(self.image_key),
            "ArchivedMD5" => Some(self.archived_md5),
            "UploadKey" => Some(self.upload_key),
            _ => None,
        }
    }
}

/// Expand `{{Name}}` placeholders in a single pass.
///
/// Whitespace inside the braces and a leading dot are ignored, so
/// `{{ .FileName }}` and `{{FileName}}` are equivalent. Text outside
/// placeholders is copied as-is. Empty variables render as empty strings.
pub fn render_template(template: &str, vars: &FilenameVars<'_>) -> Result<String, TemplateError> {
    let mut result = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        result.push_str(&rest[..open]);
        let inner_start = open + 2;
        let close = rest[inner_start..]
            .find("}}")
            .ok_or(TemplateError::Unterminated(template.len() - rest.len() + open))?;

        let name = rest[inner_start..inner_start + close].trim();
        let name = name.strip_prefix('.').unwrap_or(name).trim_start();
        let value = vars
            .lookup(name)
            .ok_or_else(|| TemplateError::UnknownVariable(name.to_string()))?;
        result.push_str(value);

        rest = &rest[inner_start + close + 2..];
    }
    result.push_str(rest);

    Ok(result)
}

/// Render the filename template for one asset.
///
/// An unrenderable template is logged and yields an empty string, which
/// makes the caller fall back to the original filename or image key.
pub fn build_filename(record: &AlbumImageRecord, template: &str) -> String {
    match render_template(template, &FilenameVars::from_record(record)) {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!(
                "Cannot build filename for {} from template '{}': {}",
                record.image_key,
                template,
                e
            );
            String::new()
        }
    }
}

/// Clean a filename by removing characters that are invalid on common
/// filesystems: `/`, `\`, `:`, `*`, `?`, `"`, `<`, `>`, `|`.
///
/// A name made only of dots (`.`, `..`) would resolve to a directory, so it
/// cleans to an empty name.
pub fn clean_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        return String::new();
    }
    cleaned
}

/// Local folder for an album: destination root plus the album's URL path.
///
/// The URL path is split on `/` and joined as components; empty, `.` and
/// `..` segments are dropped so an album can never resolve outside the
/// destination.
pub fn album_folder(destination: &Path, url_path: &str) -> PathBuf {
    let mut path = destination.to_path_buf();
    for component in url_path.split('/') {
        if let Some(Component::Normal(_)) = Path::new(component).components().next() {
            path.push(component);
        }
    }
    path
}

/// The in-progress name for a transfer into `download_path`.
///
/// `transfer_id` keeps two assets that resolve to the same final name from
/// sharing a `.part` file.
pub fn part_path(download_path: &Path, transfer_id: &str) -> PathBuf {
    let mut name = download_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    let transfer_id = clean_filename(transfer_id);
    if !transfer_id.is_empty() {
        name.push(".");
        name.push(transfer_id);
    }
    name.push(".part");
    download_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> FilenameVars<'static> {
        FilenameVars {
            file_name: "IMG_0001.JPG",
            image_key: "abc123",
            archived_md5: "d41d8cd9",
            upload_key: "42",
        }
    }

    #[test]
    fn test_render_plain_variable() {
        assert_eq!(render_template("{{FileName}}", &vars()).unwrap(), "IMG_0001.JPG");
    }

    #[test]
    fn test_render_mixed_text_and_variables() {
        assert_eq!(
            render_template("{{UploadKey}}-{{ImageKey}}_{{ArchivedMD5}}.jpg", &vars()).unwrap(),
            "42-abc123_d41d8cd9.jpg"
        );
    }

    #[test]
    fn test_render_tolerates_spaces_and_dot() {
        assert_eq!(
            render_template("{{ .ImageKey }}-{{ FileName}}", &vars()).unwrap(),
            "abc123-IMG_0001.JPG"
        );
    }

    #[test]
    fn test_render_without_placeholders() {
        assert_eq!(render_template("static.jpg", &vars()).unwrap(), "static.jpg");
        assert_eq!(render_template("", &vars()).unwrap(), "");
    }

    #[test]
    fn test_render_empty_variables() {
        let empty = FilenameVars::default();
        assert_eq!(render_template("{{FileName}}{{UploadKey}}", &empty).unwrap(), "");
    }

    #[test]
    fn test_unknown_variable_is_error() {
        assert_eq!(
            render_template("{{Title}}.jpg", &vars()),
            Err(TemplateError::UnknownVariable("Title".into()))
        );
    }

    #[test]
    fn test_unterminated_placeholder_is_error() {
        assert_eq!(
            render_template("a-{{FileName", &vars()),
            Err(TemplateError::Unterminated(2))
        );
    }

    #[test]
    fn test_build_filename_error_yields_empty() {
        let record = AlbumImageRecord {
            file_name: "IMG.JPG".into(),
            image_key: "k".into(),
            ..Default::default()
        };
        assert_eq!(build_filename(&record, "{{Nope}}"), "");
        assert_eq!(build_filename(&record, DEFAULT_FILENAME_TEMPLATE), "IMG.JPG");
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("a/b\\c:d*e?f\"g<h>i|j.jpg"), "abcdefghij.jpg");
        assert_eq!(clean_filename("normal.jpg"), "normal.jpg");
    }

    #[test]
    fn test_clean_filename_rejects_dot_names() {
        assert_eq!(clean_filename("."), "");
        assert_eq!(clean_filename(".."), "");
        assert_eq!(clean_filename("./.."), "");
        assert_eq!(clean_filename(".hidden"), ".hidden");
        assert_eq!(clean_filename("..jpg"), "..jpg");
    }

    #[test]
    fn test_album_folder_joins_components() {
        let p = album_folder(Path::new("/backup"), "/Family/Vacation-2020");
        assert_eq!(p, PathBuf::from("/backup/Family/Vacation-2020"));
    }

    #[test]
    fn test_album_folder_drops_traversal() {
        let p = album_folder(Path::new("/backup"), "/../etc/./x//");
        assert_eq!(p, PathBuf::from("/backup/etc/x"));
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/backup/a/IMG.JPG"), "abc123"),
            PathBuf::from("/backup/a/IMG.JPG.abc123.part")
        );
        assert_eq!(
            part_path(Path::new("/backup/a/IMG.JPG"), ""),
            PathBuf::from("/backup/a/IMG.JPG.part")
        );
        assert_eq!(
            part_path(Path::new("/backup/a/IMG.JPG"), "../x"),
            PathBuf::from("/backup/a/IMG.JPG...x.part")
        );
    }
}
