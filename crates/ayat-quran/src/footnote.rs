//! Footnote markers embedded in translation text.
//!
//! Translations mark footnotes as `<sup foot_note=12345>1</sup>`, where the
//! attribute is the footnote resource id and the element text is the
//! number shown to the reader. The attribute value may be quoted.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootnoteMarker {
    pub id: u64,
    /// Visible number, used in the `"{translator}:{number}"` key
    pub number: String,
}

const OPEN: &str = "<sup";
const CLOSE: &str = "</sup>";
const ATTR: &str = "foot_note=";

/// Every well-formed marker in `text`, in order of appearance.
pub fn extract_markers(text: &str) -> Vec<FootnoteMarker> {
    let mut markers = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        let tail = &rest[start + OPEN.len()..];
        let Some(tag_end) = tail.find('>') else { break };
        let attrs = &tail[..tag_end];
        let body = &tail[tag_end + 1..];
        let Some(close) = body.find(CLOSE) else { break };

        if let Some(id) = parse_id(attrs) {
            let number = body[..close].trim();
            if !number.is_empty() {
                markers.push(FootnoteMarker {
                    id,
                    number: number.to_string(),
                });
            }
        }
        rest = &body[close + CLOSE.len()..];
    }
    markers
}

fn parse_id(attrs: &str) -> Option<u64> {
    let value = &attrs[attrs.find(ATTR)? + ATTR.len()..];
    let value = value.trim_start_matches(['"', '\'']);
    let digits = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
    value[..digits].parse().ok()
}

/// Key under which a footnote is stored on a verse
pub fn footnote_key(translator: &str, number: &str) -> String {
    format!("{translator}:{number}")
}
