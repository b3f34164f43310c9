//! Message translation between WhatsApp and Discord renderings.
//!
//! Pure functions: the orchestrator feeds events in and executes the
//! returned sends. Quote blocks, forward markers, sender prefixes and
//! the long-text partitioning all live here.

use crate::common::messages::{DiscordMessageEvent, WaContent, WaMessageEvent};

/// Largest media payload relayed to Discord, in bytes.
pub const MEDIA_CEILING: u64 = 8_388_284;

/// Discord's message length limit.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Text sent in place of an attachment that exceeds the ceiling.
pub const OVERSIZE_NOTICE: &str =
    "Ferryman Attention: Received a file, but it's over 8MB. Check WhatsApp on your phone.";

/// A WhatsApp message rendered for webhook delivery.
///
/// All but the last chunk are sent plain; the last chunk carries the
/// attachment (when `attach_media` is set) and anchors the correlation
/// entry.
#[derive(Debug, Clone, PartialEq)]
pub struct WaOutbound {
    pub chunks: Vec<String>,
    pub attach_media: bool,
}

/// Render a WhatsApp message into Discord webhook chunks.
///
/// Returns `None` when there is nothing to relay; unsupported message
/// types are skipped silently.
pub fn translate_wa_message(
    event: &WaMessageEvent,
    sender_name: &str,
    quoted_name: &str,
    group_prefix: bool,
) -> Option<WaOutbound> {
    let mut content = String::new();
    if event.participant.is_some() && group_prefix {
        content.push_str(&format!("[{}] ", sender_name));
    }

    let attach_media = match &event.content {
        WaContent::Text { body } => {
            if event.forwarded {
                content.push_str(&format!("> Forwarded Message:\n{}", body));
            } else if let Some(quote) = &event.quoted {
                content.push_str(&quote_block(quoted_name, &quote.text, body));
            } else {
                content.push_str(body);
            }
            false
        }
        WaContent::Media { caption, size, .. } => {
            if *size > MEDIA_CEILING {
                return Some(WaOutbound {
                    chunks: vec![OVERSIZE_NOTICE.to_string()],
                    attach_media: false,
                });
            }
            if let Some(caption) = caption {
                content.push_str(caption);
            }
            true
        }
        WaContent::Unsupported => return None,
    };

    if content.is_empty() && !attach_media {
        return None;
    }

    let chunks = if content.is_empty() {
        vec![String::new()]
    } else {
        partition_text(&content, DISCORD_MESSAGE_LIMIT)
    };

    Some(WaOutbound {
        chunks,
        attach_media,
    })
}

/// Quote block: every quoted line "> "-prefixed, reply text below.
fn quote_block(quoted_name: &str, quoted_text: &str, reply: &str) -> String {
    format!(
        "> {}: {}\n{}",
        quoted_name,
        quoted_text.split('\n').collect::<Vec<_>>().join("\n> "),
        reply
    )
}

/// Render a Discord message into the text sent to WhatsApp.
///
/// With uploads enabled the attachments travel as separate document
/// sends and empty content falls back to a placeholder; with uploads
/// disabled the attachment URLs are appended to the text instead.
pub fn translate_discord_text(
    event: &DiscordMessageEvent,
    upload_attachments: bool,
    discord_prefix: bool,
) -> String {
    let mut text = if upload_attachments {
        if event.content.is_empty() {
            if !event.attachments.is_empty() {
                "Attachments".to_string()
            } else if !event.embeds.is_empty() {
                "Embed".to_string()
            } else {
                String::new()
            }
        } else {
            event.content.clone()
        }
    } else {
        let mut parts = vec![event.content.clone()];
        parts.extend(event.attachments.iter().map(|a| a.url.clone()));
        parts.join(" ")
    };

    if discord_prefix {
        text = format!("[{}] {}", event.author_name, text);
    }
    text
}

/// Find the last UTF-8 char boundary at or before `byte_index` in `s`.
///
/// Returns a byte offset that is safe to use for slicing `s`.
fn floor_char_boundary(s: &str, byte_index: usize) -> usize {
    if byte_index >= s.len() {
        return s.len();
    }
    // Walk backward until we find a char boundary
    let mut i = byte_index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split text into chunks that fit within the max length (in bytes).
///
/// Prefers newline boundaries, then spaces, then a hard cut. Never
/// splits in the middle of a multi-byte UTF-8 character.
pub fn partition_text(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        // Skip leading whitespace left over from previous boundary splits
        remaining = remaining.trim_start();
        if remaining.is_empty() {
            break;
        }

        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let split_at = floor_char_boundary(remaining, max_len);

        // If max_len is smaller than the first character, force at least one
        // character to avoid an infinite loop.
        if split_at == 0 {
            let first_char_end = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
            chunks.push(remaining[..first_char_end].to_string());
            remaining = &remaining[first_char_end..];
            continue;
        }

        let window = &remaining[..split_at];

        if let Some(newline_idx) = window.rfind('\n') {
            chunks.push(remaining[..newline_idx].to_string());
            remaining = &remaining[newline_idx + 1..];
        } else if let Some(space_idx) = window.rfind(' ') {
            chunks.push(remaining[..space_idx].to_string());
            remaining = &remaining[space_idx + 1..];
        } else {
            // No boundary found, hard split at char boundary
            chunks.push(window.to_string());
            remaining = &remaining[split_at..];
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::messages::{DiscordAttachment, WaMediaKind, WaQuote};
    use serenity::model::id::{ChannelId, MessageId};

    fn text_event(body: &str) -> WaMessageEvent {
        WaMessageEvent {
            id: "WA1".to_string(),
            chat_jid: "123@s.whatsapp.net".to_string(),
            participant: None,
            from_me: false,
            push_name: None,
            timestamp: 0,
            content: WaContent::Text {
                body: body.to_string(),
            },
            quoted: None,
            forwarded: false,
        }
    }

    fn media_event(size: u64, caption: Option<&str>) -> WaMessageEvent {
        WaMessageEvent {
            content: WaContent::Media {
                kind: WaMediaKind::Image,
                file_name: None,
                caption: caption.map(|c| c.to_string()),
                size,
            },
            ..text_event("")
        }
    }

    fn discord_event(content: &str) -> DiscordMessageEvent {
        DiscordMessageEvent {
            id: MessageId::new(1),
            channel_id: ChannelId::new(2),
            parent_category: None,
            author_name: "Operator".to_string(),
            webhook_authored: false,
            content: content.to_string(),
            attachments: Vec::new(),
            embeds: Vec::new(),
            reply_to: None,
            timestamp: 0,
        }
    }

    #[test]
    fn test_plain_text_passes_through() {
        let out = translate_wa_message(&text_event("hello"), "Alice", "", false).unwrap();
        assert_eq!(out.chunks, vec!["hello"]);
        assert!(!out.attach_media);
    }

    #[test]
    fn test_group_prefix_applied() {
        let mut event = text_event("hello");
        event.participant = Some("456@s.whatsapp.net".to_string());

        let out = translate_wa_message(&event, "Alice", "", true).unwrap();
        assert_eq!(out.chunks, vec!["[Alice] hello"]);

        // prefix policy off
        let out = translate_wa_message(&event, "Alice", "", false).unwrap();
        assert_eq!(out.chunks, vec!["hello"]);
    }

    #[test]
    fn test_forwarded_marker() {
        let mut event = text_event("passed along");
        event.forwarded = true;

        let out = translate_wa_message(&event, "Alice", "", false).unwrap();
        assert_eq!(out.chunks, vec!["> Forwarded Message:\npassed along"]);
    }

    #[test]
    fn test_quote_block_prefixes_every_line() {
        let mut event = text_event("my reply");
        event.quoted = Some(WaQuote {
            participant: "456@s.whatsapp.net".to_string(),
            text: "line one\nline two".to_string(),
        });

        let out = translate_wa_message(&event, "Alice", "Bob", false).unwrap();
        assert_eq!(out.chunks, vec!["> Bob: line one\n> line two\nmy reply"]);
    }

    #[test]
    fn test_oversize_media_becomes_notice() {
        let out =
            translate_wa_message(&media_event(MEDIA_CEILING + 1, None), "Alice", "", false)
                .unwrap();
        assert_eq!(out.chunks, vec![OVERSIZE_NOTICE]);
        assert!(!out.attach_media);
    }

    #[test]
    fn test_media_at_ceiling_is_attached() {
        let out = translate_wa_message(
            &media_event(MEDIA_CEILING, Some("look at this")),
            "Alice",
            "",
            false,
        )
        .unwrap();
        assert_eq!(out.chunks, vec!["look at this"]);
        assert!(out.attach_media);
    }

    #[test]
    fn test_captionless_media_gets_empty_chunk() {
        let out = translate_wa_message(&media_event(10, None), "Alice", "", false).unwrap();
        assert_eq!(out.chunks, vec![""]);
        assert!(out.attach_media);
    }

    #[test]
    fn test_unsupported_is_skipped() {
        let mut event = text_event("");
        event.content = WaContent::Unsupported;
        assert!(translate_wa_message(&event, "Alice", "", false).is_none());
    }

    #[test]
    fn test_empty_text_is_skipped() {
        assert!(translate_wa_message(&text_event(""), "Alice", "", false).is_none());
    }

    #[test]
    fn test_discord_text_prefix() {
        let event = discord_event("hello");
        assert_eq!(translate_discord_text(&event, true, false), "hello");
        assert_eq!(translate_discord_text(&event, true, true), "[Operator] hello");
    }

    #[test]
    fn test_discord_attachment_urls_appended_without_upload() {
        let mut event = discord_event("see this");
        event.attachments.push(DiscordAttachment {
            url: "https://cdn.example/file.png".to_string(),
            file_name: "file.png".to_string(),
            size: 10,
        });

        assert_eq!(
            translate_discord_text(&event, false, false),
            "see this https://cdn.example/file.png"
        );
    }

    #[test]
    fn test_discord_placeholders_with_upload() {
        let mut event = discord_event("");
        event.embeds.push(serde_json::json!({"title": "t"}));
        assert_eq!(translate_discord_text(&event, true, false), "Embed");

        event.attachments.push(DiscordAttachment {
            url: "https://cdn.example/file.png".to_string(),
            file_name: "file.png".to_string(),
            size: 10,
        });
        assert_eq!(translate_discord_text(&event, true, false), "Attachments");
    }

    #[test]
    fn test_partition_short_text() {
        let chunks = partition_text("Hello world", 50);
        assert_eq!(chunks, vec!["Hello world"]);
    }

    #[test]
    fn test_partition_prefers_newline() {
        let chunks = partition_text("first line\nsecond line", 15);
        assert_eq!(chunks, vec!["first line", "second line"]);
    }

    #[test]
    fn test_partition_falls_back_to_space() {
        let chunks = partition_text("Hello beautiful world", 15);
        assert_eq!(chunks, vec!["Hello beautiful", "world"]);
    }

    #[test]
    fn test_partition_hard_cut_without_boundaries() {
        let chunks = partition_text("HelloBeautifulWorld", 10);
        assert_eq!(chunks, vec!["HelloBeaut", "ifulWorld"]);
    }

    #[test]
    fn test_partition_never_splits_multibyte() {
        let chunks = partition_text("ééé", 3);
        for chunk in &chunks {
            assert!(chunk.len() <= 3);
            assert!(std::str::from_utf8(chunk.as_bytes()).is_ok());
        }
    }

    #[test]
    fn test_partition_concatenation_preserved() {
        let original = "alpha beta gamma\ndelta epsilon zeta eta theta iota kappa";
        let chunks = partition_text(original, 12);

        let reassembled: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.split_whitespace().map(|w| w.to_string()))
            .collect();
        let expected: Vec<String> = original.split_whitespace().map(|w| w.to_string()).collect();
        assert_eq!(reassembled, expected);
        for chunk in &chunks {
            assert!(chunk.len() <= 12);
        }
    }
}
