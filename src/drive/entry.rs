use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::cmp::Ordering;

/// Mime type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    Image,
    Other,
}

impl EntryKind {
    pub fn classify(mime_type: &str) -> Self {
        if mime_type == FOLDER_MIME_TYPE {
            EntryKind::Folder
        } else if mime_type.starts_with("image/") {
            EntryKind::Image
        } else {
            EntryKind::Other
        }
    }

    pub fn is_selectable(self) -> bool {
        !matches!(self, EntryKind::Other)
    }
}

/// File metadata as returned by the Drive v3 API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    // Drive encodes int64 as a JSON string
    pub size: Option<String>,
    pub modified_time: Option<DateTime<Utc>>,
    pub thumbnail_link: Option<String>,
    pub web_view_link: Option<String>,
    pub web_content_link: Option<String>,
    pub icon_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriveEntry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub mime_type: String,
    pub size_bytes: Option<u64>,
    pub modified_time: Option<DateTime<Utc>>,
    pub thumbnail_link: Option<String>,
    pub web_view_link: Option<String>,
    pub icon_link: Option<String>,
}

impl DriveEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        Self {
            id: id.into(),
            name: name.into(),
            kind: EntryKind::classify(&mime_type),
            mime_type,
            size_bytes: None,
            modified_time: None,
            thumbnail_link: None,
            web_view_link: None,
            icon_link: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn is_image(&self) -> bool {
        self.kind == EntryKind::Image
    }

    pub fn display_size(&self) -> String {
        self.size_bytes.map(format_size).unwrap_or_else(|| "—".to_string())
    }
}

impl From<RawFile> for DriveEntry {
    fn from(raw: RawFile) -> Self {
        Self {
            size_bytes: raw.size.as_deref().and_then(|s| s.parse().ok()),
            modified_time: raw.modified_time,
            thumbnail_link: raw.thumbnail_link,
            web_view_link: raw.web_view_link.or(raw.web_content_link),
            icon_link: raw.icon_link,
            ..DriveEntry::new(raw.id, raw.name, raw.mime_type)
        }
    }
}

/// Folders first, then by name.
pub fn sort_entries(entries: &mut [DriveEntry]) {
    entries.sort_by(compare_entries);
}

fn compare_entries(a: &DriveEntry, b: &DriveEntry) -> Ordering {
    b.is_folder()
        .cmp(&a.is_folder())
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let value = bytes as f64;
    if value < KB {
        format!("{} B", bytes)
    } else if value < MB {
        format!("{:.1} KB", value / KB)
    } else if value < GB {
        format!("{:.1} MB", value / MB)
    } else {
        format!("{:.1} GB", value / GB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(EntryKind::classify(FOLDER_MIME_TYPE), EntryKind::Folder);
        assert_eq!(EntryKind::classify("image/png"), EntryKind::Image);
        assert_eq!(EntryKind::classify("image/jpeg"), EntryKind::Image);
        assert_eq!(EntryKind::classify("application/pdf"), EntryKind::Other);
        assert_eq!(
            EntryKind::classify("application/vnd.google-apps.document"),
            EntryKind::Other
        );
        assert!(!EntryKind::Other.is_selectable());
        assert!(EntryKind::Folder.is_selectable());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 / 2), "1.5 GB");
    }

    #[test]
    fn test_sort_folders_first_then_name() {
        let mut entries = vec![
            DriveEntry::new("1", "zebra.png", "image/png"),
            DriveEntry::new("2", "Photos", FOLDER_MIME_TYPE),
            DriveEntry::new("3", "apple.jpg", "image/jpeg"),
            DriveEntry::new("4", "Archive", FOLDER_MIME_TYPE),
            DriveEntry::new("5", "notes.txt", "text/plain"),
        ];
        sort_entries(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Archive", "Photos", "apple.jpg", "notes.txt", "zebra.png"]);
    }

    #[test]
    fn test_from_raw_file() {
        let raw: RawFile = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "name": "cat.png",
            "mimeType": "image/png",
            "size": "2048",
            "modifiedTime": "2024-03-01T10:00:00.000Z",
            "webContentLink": "https://drive.google.com/uc?id=abc"
        }))
        .unwrap();
        let entry = DriveEntry::from(raw);
        assert_eq!(entry.kind, EntryKind::Image);
        assert_eq!(entry.size_bytes, Some(2048));
        assert_eq!(entry.display_size(), "2.0 KB");
        assert!(entry.modified_time.is_some());
        assert_eq!(
            entry.web_view_link.as_deref(),
            Some("https://drive.google.com/uc?id=abc")
        );
    }
}
