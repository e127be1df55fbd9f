//! Editable script text and its revision counter.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// The script currently shown in the editor.
///
/// `revision` increases on every edit, even when the new text is identical, so a
/// compiled unit can always tell whether it was built from the current text.
#[derive(Debug, Clone, Default)]
pub struct ScriptSource {
    text: String,
    revision: u64,
}

/// Immutable copy of the source handed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub text: Arc<str>,
    pub revision: u64,
}

impl SourceSnapshot {
    /// SHA-256 of the script text, lowercase hex.
    pub fn digest(&self) -> String {
        digest_text(&self.text)
    }
}

pub fn digest_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl ScriptSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            revision: 0,
        }
    }

    /// Read a script file. The loaded text starts at revision 0.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self::new(std::fs::read_to_string(path)?))
    }

    /// Write the current text to `path`. Does not affect the revision.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, &self.text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.revision += 1;
    }

    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            text: Arc::from(self.text.as_str()),
            revision: self.revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_text_bumps_revision() {
        let mut source = ScriptSource::default();
        assert_eq!(source.text(), "");
        assert_eq!(source.revision(), 0);

        source.set_text("fn Main() {}");
        assert_eq!(source.revision(), 1);

        // identical text still counts as an edit
        source.set_text("fn Main() {}");
        assert_eq!(source.revision(), 2);
    }

    #[test]
    fn test_snapshot_is_detached_from_later_edits() {
        let mut source = ScriptSource::new("a");
        let snapshot = source.snapshot();
        source.set_text("b");

        assert_eq!(&*snapshot.text, "a");
        assert_eq!(snapshot.revision, 0);
        assert_eq!(source.snapshot().revision, 1);
    }

    #[test]
    fn test_digest_is_stable() {
        let a = ScriptSource::new("fn Main() {}").snapshot();
        let b = ScriptSource::new("fn Main() {}").snapshot();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
        assert_ne!(a.digest(), ScriptSource::new("").snapshot().digest());
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.rhai");

        let mut source = ScriptSource::default();
        source.set_text("fn Main(ctx) { ctx.frame }");
        source.save(&path).unwrap();

        let loaded = ScriptSource::load(&path).unwrap();
        assert_eq!(loaded.text(), "fn Main(ctx) { ctx.frame }");
        assert_eq!(loaded.revision(), 0);
    }
}
