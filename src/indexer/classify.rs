//! Content classification for top-level library entries

use std::path::Path;

/// Archive container extensions recognized as single-file titles
pub const ARCHIVE_EXTENSIONS: &[&str] = &[
    "cbz", "cbr", "cb7", "cbt", "zip", "rar", "7z", "tar", "epub",
];

/// What a library entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// A directory holding one title's chapters
    TitleFolder,
    /// A lone archive treated as a one-chapter title
    SingleArchiveFile,
    Skip,
}

impl ContentKind {
    pub fn is_indexable(self) -> bool {
        !matches!(self, Self::Skip)
    }
}

/// Classify an entry by kind and extension.
///
/// Hidden entries (leading `.`) are always skipped. Extension matching is
/// case-insensitive.
pub fn classify(path: &Path, is_dir: bool) -> ContentKind {
    if is_hidden(path) {
        return ContentKind::Skip;
    }
    if is_dir {
        return ContentKind::TitleFolder;
    }
    if is_archive(path) {
        ContentKind::SingleArchiveFile
    } else {
        ContentKind::Skip
    }
}

pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ARCHIVE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directories_are_title_folders() {
        assert_eq!(
            classify(Path::new("/lib/A/One-Punch-Man"), true),
            ContentKind::TitleFolder
        );
        // Extension is irrelevant for directories
        assert_eq!(
            classify(Path::new("/lib/A/Weird.txt"), true),
            ContentKind::TitleFolder
        );
    }

    #[test]
    fn test_archives_case_insensitive() {
        for name in ["a.cbz", "a.CBZ", "a.Cbr", "a.7z", "a.epub", "a.ZIP"] {
            assert_eq!(
                classify(Path::new(name), false),
                ContentKind::SingleArchiveFile,
                "{name}"
            );
        }
    }

    #[test]
    fn test_everything_else_skipped() {
        assert_eq!(classify(Path::new("info.txt"), false), ContentKind::Skip);
        assert_eq!(classify(Path::new("cover.jpg"), false), ContentKind::Skip);
        assert_eq!(classify(Path::new("noext"), false), ContentKind::Skip);
        assert_eq!(classify(Path::new(".hidden"), true), ContentKind::Skip);
        assert_eq!(classify(Path::new(".cache.cbz"), false), ContentKind::Skip);
        assert!(!ContentKind::Skip.is_indexable());
        assert!(ContentKind::TitleFolder.is_indexable());
    }
}
