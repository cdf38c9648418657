use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown format tag: {0}")]
pub struct UnknownFormat(pub String);

/// Target encodings every upload is converted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatTag {
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl FormatTag {
    /// The fixed, ordered conversion target set
    pub const ALL: [FormatTag; 4] = [FormatTag::Jpeg, FormatTag::Png, FormatTag::Webp, FormatTag::Avif];

    pub fn as_str(self) -> &'static str {
        match self {
            FormatTag::Jpeg => "jpeg",
            FormatTag::Png => "png",
            FormatTag::Webp => "webp",
            FormatTag::Avif => "avif",
        }
    }

    /// Extension used for artifact file names
    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn mime(self) -> &'static str {
        match self {
            FormatTag::Jpeg => "image/jpeg",
            FormatTag::Png => "image/png",
            FormatTag::Webp => "image/webp",
            FormatTag::Avif => "image/avif",
        }
    }

    /// `<stem>-converted.<ext>`
    pub fn artifact_name(self, stem: &str) -> String {
        format!("{}-converted.{}", stem, self.extension())
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatTag {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(FormatTag::Jpeg),
            "png" => Ok(FormatTag::Png),
            "webp" => Ok(FormatTag::Webp),
            "avif" => Ok(FormatTag::Avif),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}
