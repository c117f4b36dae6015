/// HTML fragment returned to the front-end after a successful `/submit`.
use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute, encode_text};

use onetime_shared::VideoMetadata;

/// Render the details card with a quality picker and download link.
///
/// The front-end swaps this in with htmx; Alpine drives the select and the
/// link. Every value from yt-dlp is escaped for its context.
pub fn video_details(meta: &VideoMetadata) -> String {
    let selected = meta
        .formats
        .first()
        .map(|f| f.format_id.as_str())
        .unwrap_or("");
    let filename = meta.download_filename();

    // Alpine state lives in an attribute and is evaluated as JS, so the
    // values go through JSON first and attribute escaping second.
    let x_data = format!(
        "{{ selectedFormat: {}, pageUrl: {}, filename: {} }}",
        js_string(selected),
        js_string(&meta.source_url),
        js_string(&filename),
    );

    let mut html = String::with_capacity(1024 + meta.formats.len() * 64);
    let _ = write!(
        html,
        r#"
<div class="mt-6 mb-20 p-4 rounded-lg shadow-2xl" x-data="{x_data}">
  <h3 class="text-lg font-bold mb-4">Video Details</h3>
  <img src="{thumb}" alt="Video Thumbnail" class="w-full rounded-md mb-4" />
  <p class="text-white mb-2"><strong>Title:</strong> {title}</p>
  <p class="text-white mb-2"><strong>Author:</strong> {author}</p>
  <div class="mt-4">
    <label for="qualitySelect" class="block mb-2">Select Quality</label>
    <select id="qualitySelect" x-model="selectedFormat" class="w-full p-2 bg-neutral-800 text-white rounded-md border">"#,
        x_data = encode_double_quoted_attribute(&x_data),
        thumb = encode_double_quoted_attribute(&meta.thumbnail_url),
        title = encode_text(&meta.title),
        author = encode_text(&meta.author),
    );

    for format in &meta.formats {
        let _ = write!(
            html,
            r#"
      <option value="{}">{}</option>"#,
            encode_double_quoted_attribute(&format.format_id),
            encode_text(&format.display_label()),
        );
    }

    html.push_str(
        r#"
    </select>
  </div>
  <a
    x-bind:href="'/download?url=' + encodeURIComponent(pageUrl) + '&filename=' + encodeURIComponent(filename) + '&format=' + encodeURIComponent(selectedFormat)"
    class="block mb-32 w-full mt-4 bg-red-900 text-center text-white p-3 rounded-md hover:bg-blue-600"
    download
  >
    Download Video
  </a>
</div>"#,
    );

    html
}

/// Quote `s` as a JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
