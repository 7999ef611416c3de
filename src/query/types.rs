//! File type filter.

use std::fmt;

/// Extensions accepted by the `img` capability.
const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg"];
const GIF_EXTENSIONS: &[&str] = &[".gif"];
const WEBM_EXTENSIONS: &[&str] = &[".webm"];

/// Set of file categories a subscription accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileTypes {
    pub image: bool,
    pub gif: bool,
    pub webm: bool,
}

impl FileTypes {
    /// Parse a type expression such as `.img.webm`.
    ///
    /// Unknown tokens are ignored.
    pub fn parse(source: &str) -> Self {
        let mut types = Self::default();
        for token in source.split('.').map(str::trim) {
            match token.to_ascii_lowercase().as_str() {
                "img" => types.image = true,
                "gif" => types.gif = true,
                "webm" => types.webm = true,
                _ => {}
            }
        }
        types
    }

    /// Whether no category is selected.
    pub fn is_empty(&self) -> bool {
        !(self.image || self.gif || self.webm)
    }

    /// Whether a file name carries an extension accepted by this set.
    pub fn matches(&self, file_name: &str) -> bool {
        let name = file_name.to_ascii_lowercase();
        let accepts = |extensions: &[&str]| extensions.iter().any(|ext| name.ends_with(ext));

        (self.image && accepts(IMAGE_EXTENSIONS))
            || (self.gif && accepts(GIF_EXTENSIONS))
            || (self.webm && accepts(WEBM_EXTENSIONS))
    }
}

impl fmt::Display for FileTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.image {
            f.write_str(".img")?;
        }
        if self.gif {
            f.write_str(".gif")?;
        }
        if self.webm {
            f.write_str(".webm")?;
        }
        Ok(())
    }
}
