//! Turns an inbound message into a relay payload.
//!
//! Attachments are re-expressed as plain CDN URLs in the message text. The
//! platform renders those as inline previews, so media survives the hop
//! without re-uploading files.

use super::types::{InboundEvent, RelayPayload};
use once_cell::sync::Lazy;
use regex::Regex;

static CDN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https://cdn\.discordapp\.com/\S+").expect("valid CDN regex"));

/// Why an event was not relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OwnMessage,
    BotAuthor,
    SystemMessage,
    Empty,
}

/// Result of building a payload
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Deliver(RelayPayload),
    Skip(SkipReason),
}

/// Build the outbound payload for `event`. `self_id` is the relay bot's
/// own user id, when known.
pub fn build_payload(event: &InboundEvent, self_id: Option<&str>) -> BuildOutcome {
    if self_id.is_some_and(|id| id == event.author.id) {
        return BuildOutcome::Skip(SkipReason::OwnMessage);
    }
    if event.author.bot {
        return BuildOutcome::Skip(SkipReason::BotAuthor);
    }
    if event.system {
        return BuildOutcome::Skip(SkipReason::SystemMessage);
    }

    let text = event.text.as_deref().unwrap_or("");
    if text.trim().is_empty() && event.attachments.is_empty() && event.embeds.is_empty() {
        return BuildOutcome::Skip(SkipReason::Empty);
    }

    let links = collect_media_links(event);

    let mut content = text.to_string();
    if !links.is_empty() {
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(&links.join("\n"));
    }

    BuildOutcome::Deliver(RelayPayload {
        display_name: event.author.display_name.clone(),
        avatar_url: event.author.avatar_url.clone(),
        text: content,
        embeds: event.embeds.clone(),
    })
}

/// Attachment URLs followed by CDN links found in the text, first-seen order, no duplicates
pub fn collect_media_links(event: &InboundEvent) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    let from_attachments = event.attachments.iter().map(|a| a.url.as_str());
    let from_text = event
        .text
        .as_deref()
        .into_iter()
        .flat_map(|text| CDN_LINK.find_iter(text).map(|m| m.as_str()));

    for link in from_attachments.chain(from_text) {
        if !links.iter().any(|l| l == link) {
            links.push(link.to_string());
        }
    }

    links
}
