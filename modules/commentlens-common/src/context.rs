use url::Url;

/// Extract the video id from a YouTube watch-page location.
///
/// A location is analyzable when its host contains `youtube.com`, its path
/// starts with `/watch`, and it carries a non-empty `v` query parameter.
pub fn youtube_video_id(location: &str) -> Option<String> {
    let url = Url::parse(location.trim()).ok()?;
    let host = url.host_str()?;
    if !host.contains("youtube.com") || !url.path().starts_with("/watch") {
        return None;
    }
    url.query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.trim().to_string())
        .filter(|id| !id.is_empty())
}
