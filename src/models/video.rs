use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{ERR_EMPTY_TITLE, ERR_INVALID_PRICE};
use crate::error::{AppError, Result};

fn default_true() -> bool {
    true
}

/// Catalog entry as persisted in the metadata document and the mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub duration: VideoDuration,
    /// Object key of the video file
    #[serde(default)]
    pub video_file_id: String,
    /// Object key of the thumbnail image
    #[serde(default)]
    pub thumbnail_file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub views: u64,
    /// Free text, may hold several whitespace-separated URLs
    #[serde(default)]
    pub product_link: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Legacy flag, kept for document compatibility
    #[serde(default)]
    pub is_purchased: bool,
}

impl Video {
    /// Build a stored video from creation input
    pub fn from_new(id: String, created_at: DateTime<Utc>, new: NewVideo) -> Self {
        Self {
            id,
            title: new.title,
            description: new.description,
            price: new.price,
            duration: new.duration,
            video_file_id: new.video_file_id,
            thumbnail_file_id: new.thumbnail_file_id,
            thumbnail_url: new.thumbnail_url,
            created_at,
            views: 0,
            product_link: new.product_link,
            is_active: new.is_active,
            is_purchased: new.is_purchased,
        }
    }

    /// Individual links found in `product_link`
    pub fn product_links(&self) -> Vec<&str> {
        self.product_link.split_whitespace().collect()
    }

    /// Object keys this video references in the bucket
    pub fn file_keys(&self) -> Vec<&str> {
        [self.video_file_id.as_str(), self.thumbnail_file_id.as_str()]
            .into_iter()
            .filter(|key| !key.trim().is_empty())
            .collect()
    }
}

/// Input for creating a video; id, createdAt and views are assigned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVideo {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub duration: VideoDuration,
    #[serde(default)]
    pub video_file_id: String,
    #[serde(default)]
    pub thumbnail_file_id: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub product_link: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_purchased: bool,
}

impl NewVideo {
    pub fn new(title: impl Into<String>, price: f64, duration: VideoDuration) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            price,
            duration,
            video_file_id: String::new(),
            thumbnail_file_id: String::new(),
            thumbnail_url: None,
            product_link: String::new(),
            is_active: true,
            is_purchased: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::InvalidInput(ERR_EMPTY_TITLE.to_string()));
        }
        validate_price(self.price)
    }
}

/// Partial update merged onto an existing video; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub duration: Option<VideoDuration>,
    pub video_file_id: Option<String>,
    pub thumbnail_file_id: Option<String>,
    pub thumbnail_url: Option<String>,
    pub views: Option<u64>,
    pub product_link: Option<String>,
    pub is_active: Option<bool>,
    pub is_purchased: Option<bool>,
}

impl VideoPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(AppError::InvalidInput(ERR_EMPTY_TITLE.to_string()));
            }
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }

    pub fn apply(self, video: &mut Video) {
        if let Some(title) = self.title {
            video.title = title;
        }
        if let Some(description) = self.description {
            video.description = description;
        }
        if let Some(price) = self.price {
            video.price = price;
        }
        if let Some(duration) = self.duration {
            video.duration = duration;
        }
        if let Some(video_file_id) = self.video_file_id {
            video.video_file_id = video_file_id;
        }
        if let Some(thumbnail_file_id) = self.thumbnail_file_id {
            video.thumbnail_file_id = thumbnail_file_id;
        }
        if let Some(thumbnail_url) = self.thumbnail_url {
            video.thumbnail_url = Some(thumbnail_url);
        }
        if let Some(views) = self.views {
            video.views = views;
        }
        if let Some(product_link) = self.product_link {
            video.product_link = product_link;
        }
        if let Some(is_active) = self.is_active {
            video.is_active = is_active;
        }
        if let Some(is_purchased) = self.is_purchased {
            video.is_purchased = is_purchased;
        }
    }
}

fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::InvalidInput(ERR_INVALID_PRICE.to_string()));
    }
    Ok(())
}

/// Video length, either whole seconds or clock text (`MM:SS` / `HH:MM:SS`)
///
/// Documents written by older clients store the duration as a number, newer
/// ones as clock text, and some as a bare digit string. All three decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VideoDuration {
    Seconds(u64),
    Clock(String),
}

impl Default for VideoDuration {
    fn default() -> Self {
        VideoDuration::Clock("00:00".to_string())
    }
}

impl VideoDuration {
    /// Decode the TEXT column of the mirror
    pub fn from_stored(text: &str) -> Self {
        match text.trim().parse::<u64>() {
            Ok(seconds) => VideoDuration::Seconds(seconds),
            Err(_) => VideoDuration::Clock(text.to_string()),
        }
    }

    /// Encode for the TEXT column of the mirror
    pub fn to_stored(&self) -> String {
        match self {
            VideoDuration::Seconds(seconds) => seconds.to_string(),
            VideoDuration::Clock(text) => text.clone(),
        }
    }

    /// Total length in seconds, `None` if the clock text is unparsable
    pub fn total_seconds(&self) -> Option<u64> {
        match self {
            VideoDuration::Seconds(seconds) => Some(*seconds),
            VideoDuration::Clock(text) => parse_clock(text),
        }
    }

    /// Clock rendering: `MM:SS` under an hour, `HH:MM:SS` otherwise
    pub fn to_clock(&self) -> String {
        match self.total_seconds() {
            Some(seconds) => format_clock(seconds),
            None => match self {
                VideoDuration::Clock(text) => text.clone(),
                VideoDuration::Seconds(seconds) => format_clock(*seconds),
            },
        }
    }

    /// Same duration as clock text
    pub fn normalized(&self) -> Self {
        VideoDuration::Clock(self.to_clock())
    }
}

fn parse_clock(text: &str) -> Option<u64> {
    let parts: Vec<u64> = text
        .trim()
        .split(':')
        .map(|part| part.trim().parse::<u64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;

    // Out-of-range components make the text unparsable rather than wrapping
    let (hours, minutes, seconds) = match parts.as_slice() {
        [seconds] => (0, 0, *seconds),
        [minutes, seconds] => (0, *minutes, *seconds),
        [hours, minutes, seconds] => (*hours, *minutes, *seconds),
        _ => return None,
    };

    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

fn format_clock(total_seconds: u64) -> String {
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes < 60 {
        format!("{:02}:{:02}", minutes, seconds)
    } else {
        format!("{:02}:{:02}:{:02}", minutes / 60, minutes % 60, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_video() -> Video {
        Video::from_new(
            "abc".to_string(),
            Utc::now(),
            NewVideo::new("Demo", 9.99, VideoDuration::Seconds(125)),
        )
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(VideoDuration::Seconds(125).to_clock(), "02:05");
        assert_eq!(VideoDuration::Seconds(0).to_clock(), "00:00");
        assert_eq!(VideoDuration::Seconds(3725).to_clock(), "01:02:05");
        assert_eq!(VideoDuration::Clock("125".into()).to_clock(), "02:05");
        assert_eq!(VideoDuration::Clock("1:02:05".into()).to_clock(), "01:02:05");
        assert_eq!(VideoDuration::Clock("live".into()).to_clock(), "live");
    }

    #[test]
    fn test_total_seconds() {
        assert_eq!(VideoDuration::Clock("02:05".into()).total_seconds(), Some(125));
        assert_eq!(VideoDuration::Clock("01:00:00".into()).total_seconds(), Some(3600));
        assert_eq!(VideoDuration::Clock("soon".into()).total_seconds(), None);
    }

    #[test]
    fn test_oversized_clock_is_unparsable() {
        let huge = VideoDuration::Clock("9999999999999999:00:00".into());
        assert_eq!(huge.total_seconds(), None);
        assert_eq!(huge.to_clock(), "9999999999999999:00:00");

        let minutes = VideoDuration::Clock(format!("{}:00", u64::MAX));
        assert_eq!(minutes.total_seconds(), None);
    }

    #[test]
    fn test_duration_json_forms() {
        let number: VideoDuration = serde_json::from_str("125").unwrap();
        assert_eq!(number, VideoDuration::Seconds(125));

        let text: VideoDuration = serde_json::from_str("\"02:05\"").unwrap();
        assert_eq!(text, VideoDuration::Clock("02:05".into()));
    }

    #[test]
    fn test_stored_duration() {
        assert_eq!(VideoDuration::from_stored("125"), VideoDuration::Seconds(125));
        assert_eq!(
            VideoDuration::from_stored("02:05"),
            VideoDuration::Clock("02:05".into())
        );
    }

    #[test]
    fn test_patch_merges_only_given_fields() {
        let mut video = sample_video();
        let original = video.clone();

        VideoPatch {
            title: Some("Renamed".into()),
            is_active: Some(false),
            ..Default::default()
        }
        .apply(&mut video);

        assert_eq!(video.title, "Renamed");
        assert!(!video.is_active);
        assert_eq!(video.price, original.price);
        assert_eq!(video.duration, original.duration);
        assert_eq!(video.created_at, original.created_at);
    }

    #[test]
    fn test_validation() {
        assert!(NewVideo::new("Demo", 0.0, VideoDuration::default()).validate().is_ok());
        assert!(NewVideo::new("  ", 1.0, VideoDuration::default()).validate().is_err());
        assert!(NewVideo::new("Demo", -1.0, VideoDuration::default()).validate().is_err());
        assert!(NewVideo::new("Demo", f64::NAN, VideoDuration::default()).validate().is_err());
    }

    #[test]
    fn test_product_links_and_file_keys() {
        let mut video = sample_video();
        video.product_link = "https://a.example  https://b.example\n".into();
        video.video_file_id = "videos/demo.mp4".into();

        assert_eq!(
            video.product_links(),
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(video.file_keys(), vec!["videos/demo.mp4"]);
    }

    #[test]
    fn test_legacy_document_entry() {
        let json = r#"{
            "id": "x1",
            "title": "Old",
            "price": 5,
            "duration": "125",
            "createdAt": "2024-05-01T10:00:00.000Z"
        }"#;
        let video: Video = serde_json::from_str(json).unwrap();

        assert!(video.is_active);
        assert_eq!(video.views, 0);
        assert_eq!(video.duration.to_clock(), "02:05");
    }
}
