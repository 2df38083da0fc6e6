use crate::{
    error::{ImagenioError, Result},
    models::{CaptionEntry, RawCaption},
};

const FENCE: &str = "```";
const JSON_FENCE: &str = "```json";

/// Instruction appended after the images in the single captioning call.
pub fn build_caption_instruction(description_prompt: &str) -> String {
    format!(
        "Do this for each image separately: \"{}\". We will call the result of it as the \
         information about an image. Give each image a title. Return the result as a list of \
         objects in json format; each object will correspond one image and the fields for the \
         object will be \"title\" for the title and \"info\" for the information.",
        escape_html(description_prompt)
    )
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Removes an optional markdown code fence around the model's JSON.
fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    let body = if let Some(rest) = text.strip_prefix(JSON_FENCE) {
        rest
    } else if let Some(rest) = text.strip_prefix(FENCE) {
        rest
    } else {
        return text;
    };
    let body = body.trim_end();
    body.strip_suffix(FENCE).unwrap_or(body).trim()
}

/// Turns the captioning model's text into caption entries, in the order the
/// model listed them.
pub fn parse_captions(raw_text: &str) -> Result<Vec<CaptionEntry>> {
    let json_text = strip_code_fence(raw_text);

    let raw: Vec<RawCaption> = serde_json::from_str(json_text).map_err(|e| {
        log::debug!("Unparseable caption text: {}", raw_text);
        ImagenioError::CaptionParseError(e.to_string())
    })?;

    Ok(raw
        .into_iter()
        .map(|caption| CaptionEntry {
            title: caption.title,
            description: caption.info,
        })
        .collect())
}
