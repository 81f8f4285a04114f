//! Discord message limits and webhook URL helpers.

use crate::relay::types::WebhookCredential;
use serenity::all::{CreateEmbed, Embed};

/// Maximum message content length
pub const MAX_CONTENT_LEN: usize = 2000;

/// Maximum embeds per message
pub const MAX_EMBEDS: usize = 10;

/// Truncate text to fit Discord limits, on a char boundary
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    const MARKER: &str = "\n… (truncated)";
    let keep = max_len.saturating_sub(MARKER.chars().count());
    let truncated: String = text.chars().take(keep).collect();

    // Try to break at newline
    match truncated.rfind('\n') {
        Some(pos) if pos > 0 => format!("{}{}", &truncated[..pos], MARKER),
        _ => format!("{}{}", truncated, MARKER),
    }
}

/// Fit relayed text into `max_len`, cutting the free text before the
/// trailing block of media links so the links survive
pub fn fit_content(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let split = lines
        .iter()
        .rposition(|line| !is_link_line(line))
        .map_or(0, |i| i + 1);
    let body = lines[..split].join("\n");
    let links = lines[split..].join("\n");
    let links_len = links.chars().count();

    if body.is_empty() || links.is_empty() || links_len + 1 >= max_len {
        return truncate(text, max_len);
    }

    let budget = max_len - links_len - 1;
    format!("{}\n{}", truncate(&body, budget), links)
}

fn is_link_line(line: &str) -> bool {
    line.starts_with("https://") && !line.contains(char::is_whitespace)
}

/// Rebuild outgoing embeds from relayed embed JSON, dropping any that no
/// longer parse
pub fn to_create_embeds(embeds: &[serde_json::Value]) -> Vec<CreateEmbed> {
    embeds
        .iter()
        .filter_map(|value| serde_json::from_value::<Embed>(value.clone()).ok())
        .take(MAX_EMBEDS)
        .map(CreateEmbed::from)
        .collect()
}

/// Extract id and token from `https://discord.com/api/webhooks/{id}/{token}`
pub fn credential_from_url(url: &str) -> Option<WebhookCredential> {
    let rest = url.split("/webhooks/").nth(1)?;
    let mut parts = rest.trim_end_matches('/').splitn(2, '/');
    let id = parts.next().filter(|s| !s.is_empty())?;
    let token = parts.next().filter(|s| !s.is_empty())?;

    if !id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(WebhookCredential::new(id, token))
}
