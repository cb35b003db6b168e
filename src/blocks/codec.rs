//! Block serialization
//!
//! A document is stored in a single text column:
//!
//! ```text
//! block    := TAG "|" payload
//! document := block ("«BLOCK»" block)*
//! ```
//!
//! The field separator is split with a limit, so text payloads may contain `|`. A checkbox payload
//! is `<checked>|<text>` and is split blindly, there is no escaping.

use uuid::Uuid;

use super::Block;

/// Separates blocks within a document
const BLOCK_SEPARATOR: &str = "«BLOCK»";

/// Separates the tag from the payload, and the checkbox fields from each other
const FIELD_SEPARATOR: char = '|';

const TAG_TEXT: &str = "TEXT";
const TAG_IMAGE: &str = "IMAGE";
const TAG_AUDIO: &str = "AUDIO";
const TAG_CHECK: &str = "CHECK";

/// Encode blocks into a single document string, order preserved
pub fn encode(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(encode_block)
        .collect::<Vec<String>>()
        .join(BLOCK_SEPARATOR)
}

fn encode_block(block: &Block) -> String {
    match block {
        Block::Text { text, .. } => format!("{TAG_TEXT}{FIELD_SEPARATOR}{text}"),
        Block::Image { uri, .. } => format!("{TAG_IMAGE}{FIELD_SEPARATOR}{uri}"),
        Block::Audio { path, .. } => format!("{TAG_AUDIO}{FIELD_SEPARATOR}{path}"),
        Block::Checkbox { text, checked, .. } => {
            format!("{TAG_CHECK}{FIELD_SEPARATOR}{checked}{FIELD_SEPARATOR}{text}")
        }
    }
}

/// Decode a document back into blocks
///
/// Never fails: unknown tags are dropped and missing payloads default to an empty string. An absent
/// or empty document, or one where nothing survives decoding, becomes a single empty text block so
/// an editor always has something to edit.
pub fn decode(data: Option<&str>) -> Vec<Block> {
    let Some(data) = data.filter(|data| !data.is_empty()) else {
        return vec![Block::text("")];
    };

    let blocks = data
        .split(BLOCK_SEPARATOR)
        .filter_map(decode_block)
        .collect::<Vec<Block>>();

    if blocks.is_empty() {
        tracing::debug!("No decodable blocks in document, starting with an empty one");

        return vec![Block::text("")];
    }

    blocks
}

fn decode_block(raw: &str) -> Option<Block> {
    let mut parts = raw.splitn(2, FIELD_SEPARATOR);

    let tag = parts.next().unwrap_or_default();
    let payload = parts.next().unwrap_or_else(|| {
        tracing::debug!(r#"Block "{tag}" has no payload, using an empty one"#);
        ""
    });

    let block = match tag {
        TAG_TEXT => Block::Text {
            id: Uuid::new_v4(),
            text: payload.to_string(),
        },
        TAG_IMAGE => Block::Image {
            id: Uuid::new_v4(),
            uri: payload.to_string(),
        },
        TAG_AUDIO => Block::Audio {
            id: Uuid::new_v4(),
            path: payload.to_string(),
        },
        TAG_CHECK => {
            let mut fields = payload.splitn(2, FIELD_SEPARATOR);

            let checked = fields
                .next()
                .is_some_and(|checked| checked.eq_ignore_ascii_case("true"));
            let text = fields.next().unwrap_or_default();

            Block::Checkbox {
                id: Uuid::new_v4(),
                text: text.to_string(),
                checked,
            }
        }
        _ => {
            tracing::debug!(r#"Dropping block with unknown tag "{tag}""#);

            return None;
        }
    };

    Some(block)
}

/// Plain text preview of the blocks
///
/// Only text blocks contribute, joined by a single space. Used for searching.
pub fn preview(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            Block::Text { text, .. } => Some(text.as_str()),
            Block::Image { .. } | Block::Audio { .. } | Block::Checkbox { .. } => None,
        })
        .collect::<Vec<&str>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let blocks = vec![
            Block::text("Shopping"),
            Block::checkbox("milk", true),
            Block::image("content://media/1"),
            Block::audio("/cache/voice_1.m4a"),
        ];

        assert_eq!(
            "TEXT|Shopping«BLOCK»CHECK|true|milk«BLOCK»IMAGE|content://media/1«BLOCK»AUDIO|/cache/voice_1.m4a",
            encode(&blocks)
        );
    }

    #[test]
    fn test_round_trip() {
        let blocks = vec![
            Block::text("first | with a pipe"),
            Block::checkbox("bread", false),
            Block::checkbox("eggs | large", true),
            Block::image("file:///tmp/a.png"),
            Block::text(""),
            Block::audio("/cache/voice_2.m4a"),
            Block::text("last"),
        ];

        assert_eq!(blocks, decode(Some(encode(&blocks).as_str())));
    }

    #[test]
    fn test_round_trip_keeps_order() {
        let blocks = vec![Block::text("b"), Block::text("a"), Block::text("c")];

        let decoded = decode(Some(encode(&blocks).as_str()));

        assert_eq!(vec!["b", "a", "c"], texts(&decoded));
    }

    #[test]
    fn test_decode_regenerates_ids() {
        let blocks = vec![Block::text("a")];

        let decoded = decode(Some(encode(&blocks).as_str()));

        assert_ne!(blocks[0].id(), decoded[0].id());
    }

    #[test]
    fn test_decode_empty_document() {
        assert_eq!(vec![Block::text("")], decode(Some("")));
        assert_eq!(vec![Block::text("")], decode(None));
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert_eq!(
            vec![Block::text("hi")],
            decode(Some("FOO|bar«BLOCK»TEXT|hi"))
        );
    }

    #[test]
    fn test_decode_only_unknown_tags() {
        assert_eq!(vec![Block::text("")], decode(Some("FOO|bar«BLOCK»BAR|baz")));
    }

    #[test]
    fn test_decode_missing_payload() {
        assert_eq!(
            vec![
                Block::text(""),
                Block::image(""),
                Block::audio(""),
                Block::checkbox("", false),
            ],
            decode(Some("TEXT«BLOCK»IMAGE«BLOCK»AUDIO«BLOCK»CHECK"))
        );
    }

    #[test]
    fn test_decode_checkbox_fields() {
        assert_eq!(
            vec![Block::checkbox("done", true)],
            decode(Some("CHECK|TRUE|done"))
        );
        assert_eq!(
            vec![Block::checkbox("", false)],
            decode(Some("CHECK|yes"))
        );
        assert_eq!(
            vec![Block::checkbox("a|b", false)],
            decode(Some("CHECK|false|a|b"))
        );
    }

    #[test]
    fn test_preview() {
        let blocks = vec![Block::text("a"), Block::image("u"), Block::text("b")];

        assert_eq!("a b", preview(&blocks));
    }

    #[test]
    fn test_preview_without_text() {
        let blocks = vec![Block::checkbox("milk", false), Block::audio("/a.m4a")];

        assert_eq!("", preview(&blocks));
    }

    fn texts(blocks: &[Block]) -> Vec<&str> {
        blocks
            .iter()
            .filter_map(|block| match block {
                Block::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}
