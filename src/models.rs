use serde::{Deserialize, Serialize};

/// A track reported by the provider's "currently playing" endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_image_url: Option<String>,
    pub song_url: String,
    /// Provider's playback flag; false when the track is paused.
    pub is_playing: bool,
}

/// Normalized now-playing state. Every successful upstream call yields a new value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NowPlayingState {
    #[default]
    NotPlaying,
    Playing(Track),
}

impl NowPlayingState {
    pub fn is_playing(&self) -> bool {
        matches!(self, NowPlayingState::Playing(t) if t.is_playing)
    }

    pub fn track(&self) -> Option<&Track> {
        match self {
            NowPlayingState::Playing(t) => Some(t),
            NowPlayingState::NotPlaying => None,
        }
    }
}

/// JSON body served by the proxy endpoint and consumed by the polling client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlayingResponse {
    pub is_playing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NowPlayingResponse {
    pub fn not_playing() -> Self {
        Self::default()
    }

    pub fn error(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }
}

impl From<&NowPlayingState> for NowPlayingResponse {
    fn from(state: &NowPlayingState) -> Self {
        match state {
            NowPlayingState::NotPlaying => Self::not_playing(),
            NowPlayingState::Playing(t) => Self {
                is_playing: t.is_playing,
                title: Some(t.title.clone()),
                artist: Some(t.artist.clone()),
                album: Some(t.album.clone()),
                album_image_url: t.album_image_url.clone(),
                song_url: Some(t.song_url.clone()),
                error: None,
            },
        }
    }
}

impl From<NowPlayingResponse> for NowPlayingState {
    // A body without a title carries nothing to display.
    fn from(resp: NowPlayingResponse) -> Self {
        match resp.title {
            Some(title) => NowPlayingState::Playing(Track {
                title,
                artist: resp.artist.unwrap_or_default(),
                album: resp.album.unwrap_or_default(),
                album_image_url: resp.album_image_url,
                song_url: resp.song_url.unwrap_or_default(),
                is_playing: resp.is_playing,
            }),
            None => NowPlayingState::NotPlaying,
        }
    }
}

/// Raw "currently playing" payload. Every field is optional so that shape
/// mismatches decode and get rejected by [`CurrentlyPlaying::into_state`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentlyPlaying {
    #[serde(default)]
    pub currently_playing_type: Option<String>,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub item: Option<PlayingItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayingItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub album: Option<Album>,
    #[serde(default)]
    pub external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<Image>>,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Artist {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

impl CurrentlyPlaying {
    /// Normalize the payload. Anything that is not a complete track is `NotPlaying`.
    pub fn into_state(self) -> NowPlayingState {
        if self.currently_playing_type.as_deref() != Some("track") {
            return NowPlayingState::NotPlaying;
        }
        let Some(item) = self.item else {
            return NowPlayingState::NotPlaying;
        };
        let Some(title) = item.name.filter(|n| !n.is_empty()) else {
            return NowPlayingState::NotPlaying;
        };
        let Some(album) = item.album else {
            return NowPlayingState::NotPlaying;
        };
        let Some(images) = album.images else {
            return NowPlayingState::NotPlaying;
        };

        // first image is the largest
        let album_image_url = images.into_iter().next().and_then(|i| i.url);
        let artist = album
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        NowPlayingState::Playing(Track {
            title,
            artist,
            album: album.name.unwrap_or_default(),
            album_image_url,
            song_url: item
                .external_urls
                .and_then(|u| u.spotify)
                .unwrap_or_default(),
            is_playing: self.is_playing,
        })
    }
}
