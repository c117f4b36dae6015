/// View models shared between the fetcher, the cache and the HTTP layer.
use serde::{Deserialize, Deserializer, Serialize};

/// Normalized metadata for one video page.
///
/// This is the only shape written to the cache; it is rebuilt from the cached
/// JSON snapshot on every hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub source_url: String,
    pub id: String,
    pub author: String,
    pub title: String,
    pub thumbnail_url: String,
    pub formats: Vec<FormatOption>,
}

/// One downloadable variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOption {
    pub format_id: String,
    pub quality_label: String,
    pub width: u32,
    pub height: u32,
    pub extension: String,
}

impl VideoMetadata {
    /// Build the view from yt-dlp's `-j` output, dropping formats with no id or
    /// no decodable stream. `page_url` backs `source_url` when yt-dlp omits it.
    pub fn from_ytdlp(info: YtDlpInfo, page_url: &str) -> Self {
        let formats = info
            .formats
            .into_iter()
            .filter(YtDlpFormat::is_downloadable)
            .map(FormatOption::from)
            .collect();

        let source_url = info
            .webpage_url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| page_url.to_string());

        Self {
            source_url,
            id: info.id.unwrap_or_default(),
            author: info.uploader.unwrap_or_default(),
            title: info.title.unwrap_or_default(),
            thumbnail_url: info.thumbnail.unwrap_or_default(),
            formats,
        }
    }

    /// Attachment filename suggested to the browser.
    pub fn download_filename(&self) -> String {
        let title = self.title.trim();
        if title.is_empty() {
            return "video.mp4".to_string();
        }
        format!("{}.mp4", title.replace('/', "-"))
    }
}

impl FormatOption {
    /// Short label for a quality picker.
    ///
    /// yt-dlp labels split streams like `"137 - 1920x1080 (1080p) video only"`;
    /// those collapse to the resolution, audio-only streams to `"Audio only"`.
    pub fn display_label(&self) -> String {
        let label = &self.quality_label;
        if label.contains("audio only") {
            return "Audio only".to_string();
        }
        if label.contains("video only") {
            return label
                .split(' ')
                .find(|p| p.ends_with('p') || p.contains('x'))
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}p", self.height));
        }
        label.clone()
    }
}

impl From<YtDlpFormat> for FormatOption {
    fn from(f: YtDlpFormat) -> Self {
        Self {
            format_id: f.format_id.unwrap_or_default(),
            quality_label: f.format.unwrap_or_default(),
            width: f.width.map(clamp_dimension).unwrap_or(0),
            height: f.height.map(clamp_dimension).unwrap_or(0),
            extension: f.ext.unwrap_or_default(),
        }
    }
}

// ====== RAW YT-DLP SCHEMA ======

/// Subset of the `yt-dlp -j` document we read. yt-dlp emits `null` for
/// anything it could not determine, so every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct YtDlpInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub formats: Vec<YtDlpFormat>,
}

/// One entry of `formats[]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct YtDlpFormat {
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub filesize: Option<f64>,
}

impl YtDlpFormat {
    /// Non-empty id and at least one stream yt-dlp did not report as `"none"`.
    pub fn is_downloadable(&self) -> bool {
        let has_id = self.format_id.as_deref().is_some_and(|id| !id.is_empty());
        let no_video = self.vcodec.as_deref() == Some("none");
        let no_audio = self.acodec.as_deref() == Some("none");
        has_id && !(no_video && no_audio)
    }
}

impl YtDlpInfo {
    /// Parse a `-j` document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

fn clamp_dimension(v: f64) -> u32 {
    if v.is_finite() && v > 0.0 {
        v.min(u32::MAX as f64) as u32
    } else {
        0
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<YtDlpFormat>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<YtDlpFormat>>::deserialize(deserializer)?.unwrap_or_default())
}
