use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Track,
    Album,
    Playlist,
    Video,
    Artist,
}

impl MediaKind {
    /// Classification precedence. Track must come before album.
    pub const ORDERED: [MediaKind; 5] = [
        MediaKind::Track,
        MediaKind::Album,
        MediaKind::Playlist,
        MediaKind::Video,
        MediaKind::Artist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Playlist => "playlist",
            Self::Video => "video",
            Self::Artist => "artist",
        }
    }

    /// Regex fragment matching a valid identifier for this kind.
    pub(crate) fn id_pattern(&self) -> &'static str {
        match self {
            Self::Playlist => "[A-Za-z0-9-]+",
            _ => "[0-9]+",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A piece of remote content to act upon. Only the classifier builds these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    kind: MediaKind,
    id: String,
}

impl MediaReference {
    pub(super) fn new(kind: MediaKind, id: &str) -> Self {
        debug_assert!(!id.is_empty());
        Self {
            kind,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with ID: {}", self.kind, self.id)
    }
}
