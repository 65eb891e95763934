//! Raw RFC822 parsing into the structured entity graph the ingester writes.
//!
//! Parsing is best-effort: malformed input yields a degraded [`ParsedEmail`]
//! with an error marker instead of failing the sync pass. Attachment bytes go
//! to the attachment store on disk; the relational store only keeps metadata
//! and the path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use mailparse::{addrparse, MailAddr, MailHeaderMap, ParsedMail};
use tracing::warn;

use crate::types::{
    now_ts, ContactRole, ParsedAttachment, ParsedContact, ParsedEmail, ParsedHeader,
};

/// Header values are bounded to keep storage growth in check.
const MAX_HEADER_VALUE_LEN: usize = 500;
const SNIPPET_LEN: usize = 200;

pub struct ParseContext<'a> {
    pub account_id: i64,
    pub attachment_store: Option<&'a AttachmentStore>,
}

pub fn parse_raw_email(raw: &[u8], ctx: &ParseContext<'_>) -> ParsedEmail {
    let parsed = match mailparse::parse_mail(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "MIME parse failed, storing degraded message");
            return degraded_email(&e.to_string());
        }
    };

    let external_message_id = parsed
        .headers
        .get_first_value("Message-ID")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(generated_message_id);

    let contacts = parse_contacts(&parsed);
    let (from_email, from_name) = contacts
        .iter()
        .find(|c| c.role == ContactRole::From)
        .map(|c| (c.email.clone(), c.name.clone()))
        .unwrap_or_else(|| ("unknown@email.com".to_string(), String::new()));

    let sent_at = parsed
        .headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .unwrap_or_else(now_ts);

    let (body_text, body_html) = extract_bodies(&parsed);
    let snippet = make_snippet(if body_text.is_empty() { &body_html } else { &body_text });

    let in_reply_to = parsed
        .headers
        .get_first_value("In-Reply-To")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let reference_ids = parsed
        .headers
        .get_first_value("References")
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !v.is_empty());
    // Thread correlation falls back along In-Reply-To, then the oldest
    // referenced id, then the message itself.
    let thread_id = in_reply_to
        .clone()
        .or_else(|| {
            reference_ids
                .as_ref()
                .and_then(|r| r.split_whitespace().next().map(|s| s.to_string()))
        })
        .or_else(|| Some(external_message_id.clone()));

    let attachments = parse_attachments(&parsed, ctx, &external_message_id);

    ParsedEmail {
        subject: parsed
            .headers
            .get_first_value("Subject")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "(no subject)".to_string()),
        reply_to: parsed
            .headers
            .get_first_value("Reply-To")
            .and_then(|v| first_address(&v)),
        headers: parse_headers(&parsed),
        has_attachments: !attachments.is_empty(),
        received_at: now_ts(),
        external_message_id,
        thread_id,
        from_email,
        from_name,
        snippet,
        body_text,
        body_html,
        in_reply_to,
        reference_ids,
        sent_at,
        contacts,
        attachments,
        parse_error: None,
    }
}

fn degraded_email(error: &str) -> ParsedEmail {
    let id = generated_message_id();
    ParsedEmail {
        external_message_id: id.clone(),
        thread_id: Some(id),
        subject: "(parse failed)".to_string(),
        from_email: "unknown@email.com".to_string(),
        from_name: "Unknown".to_string(),
        snippet: format!("parse error: {error}"),
        body_html: format!("<p>failed to parse message: {error}</p>"),
        sent_at: now_ts(),
        received_at: now_ts(),
        parse_error: Some(error.to_string()),
        ..ParsedEmail::default()
    }
}

fn generated_message_id() -> String {
    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
        .hash(&mut hasher);
    format!("<generated-{:016x}@mailsink.local>", hasher.finish())
}

fn parse_contacts(parsed: &ParsedMail<'_>) -> Vec<ParsedContact> {
    let mut contacts = Vec::new();
    for (header, role) in [
        ("From", ContactRole::From),
        ("To", ContactRole::To),
        ("Cc", ContactRole::Cc),
        ("Bcc", ContactRole::Bcc),
    ] {
        let Some(value) = parsed.headers.get_first_value(header) else {
            continue;
        };
        let Ok(addrs) = addrparse(&value) else {
            warn!(header, "Unparsable address list, skipping");
            continue;
        };
        for addr in addrs.iter() {
            match addr {
                MailAddr::Single(info) => contacts.push(ParsedContact {
                    role,
                    email: info.addr.clone(),
                    name: info.display_name.clone().unwrap_or_default(),
                }),
                MailAddr::Group(group) => {
                    for info in &group.addrs {
                        contacts.push(ParsedContact {
                            role,
                            email: info.addr.clone(),
                            name: info.display_name.clone().unwrap_or_default(),
                        });
                    }
                }
            }
        }
    }
    contacts
}

fn first_address(value: &str) -> Option<String> {
    addrparse(value)
        .ok()?
        .extract_single_info()
        .map(|info| info.addr)
}

fn parse_headers(parsed: &ParsedMail<'_>) -> Vec<ParsedHeader> {
    parsed
        .headers
        .iter()
        .map(|h| {
            let mut value = h.get_value();
            if value.chars().count() > MAX_HEADER_VALUE_LEN {
                value = value.chars().take(MAX_HEADER_VALUE_LEN).collect::<String>() + "...";
            }
            ParsedHeader {
                name: h.get_key(),
                value,
            }
        })
        .collect()
}

fn extract_bodies(parsed: &ParsedMail<'_>) -> (String, String) {
    let mut text = String::new();
    let mut html = String::new();
    collect_bodies(parsed, &mut text, &mut html);
    (text, html)
}

fn collect_bodies(part: &ParsedMail<'_>, text: &mut String, html: &mut String) {
    let ctype = part.ctype.mimetype.to_ascii_lowercase();
    if ctype.starts_with("multipart/") {
        for sub in &part.subparts {
            collect_bodies(sub, text, html);
        }
        return;
    }
    if is_attachment(part) {
        return;
    }
    match ctype.as_str() {
        "text/plain" => {
            if text.is_empty() {
                *text = part.get_body().unwrap_or_default();
            }
        }
        "text/html" => {
            if html.is_empty() {
                *html = part.get_body().unwrap_or_default();
            }
        }
        _ => {}
    }
}

fn is_attachment(part: &ParsedMail<'_>) -> bool {
    let disposition = part.get_content_disposition();
    matches!(
        disposition.disposition,
        mailparse::DispositionType::Attachment
    ) || disposition.params.contains_key("filename")
}

fn parse_attachments(
    parsed: &ParsedMail<'_>,
    ctx: &ParseContext<'_>,
    external_message_id: &str,
) -> Vec<ParsedAttachment> {
    let mut out = Vec::new();
    collect_attachments(parsed, ctx, external_message_id, &mut out);
    out
}

fn collect_attachments(
    part: &ParsedMail<'_>,
    ctx: &ParseContext<'_>,
    external_message_id: &str,
    out: &mut Vec<ParsedAttachment>,
) {
    for sub in &part.subparts {
        collect_attachments(sub, ctx, external_message_id, out);
    }
    if !is_attachment(part) {
        return;
    }

    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .cloned()
        .or_else(|| part.ctype.params.get("name").cloned())
        .unwrap_or_else(|| format!("unnamed_{}.bin", now_ts()));
    let mime_type = part.ctype.mimetype.clone();

    let content = match part.get_body_raw() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(filename = %filename, error = %e, "Undecodable attachment body, keeping metadata only");
            Vec::new()
        }
    };
    let size = content.len() as u32;

    // A write failure drops this attachment only, never the message.
    let path = match ctx.attachment_store {
        Some(store) if !content.is_empty() => {
            match store.save(ctx.account_id, external_message_id, &filename, &content) {
                Ok(path) => Some(path.display().to_string()),
                Err(e) => {
                    warn!(filename = %filename, error = %e, "Failed to persist attachment bytes");
                    None
                }
            }
        }
        _ => None,
    };

    out.push(ParsedAttachment {
        filename,
        mime_type,
        size,
        path,
    });
}

fn make_snippet(body: &str) -> String {
    let mut stripped = String::with_capacity(SNIPPET_LEN);
    let mut in_tag = false;
    for ch in body.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => {
                if ch.is_whitespace() {
                    if !stripped.ends_with(' ') && !stripped.is_empty() {
                        stripped.push(' ');
                    }
                } else {
                    stripped.push(ch);
                }
            }
            _ => {}
        }
        if stripped.chars().count() >= SNIPPET_LEN {
            break;
        }
    }
    stripped.trim().to_string()
}

/// On-disk home for attachment bytes, sharded by a hash of the external
/// message id: `<base>/<account_id>/<h[0..2]>/<h[2..4]>/<filename>`.
pub struct AttachmentStore {
    base_dir: PathBuf,
}

impl AttachmentStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn save(
        &self,
        account_id: i64,
        external_message_id: &str,
        filename: &str,
        content: &[u8],
    ) -> std::io::Result<PathBuf> {
        let mut hasher = DefaultHasher::new();
        external_message_id.hash(&mut hasher);
        let digest = format!("{:016x}", hasher.finish());

        let dir = self
            .base_dir
            .join(account_id.to_string())
            .join(&digest[0..2])
            .join(&digest[2..4]);
        std::fs::create_dir_all(&dir)?;

        let safe = safe_filename(filename);
        let mut target = dir.join(&safe);
        let mut counter = 1;
        while target.exists() {
            let stem = Path::new(&safe)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("file");
            let ext = Path::new(&safe)
                .extension()
                .and_then(|s| s.to_str())
                .map(|e| format!(".{e}"))
                .unwrap_or_default();
            target = dir.join(format!("{stem}_{counter}{ext}"));
            counter += 1;
        }

        std::fs::write(&target, content)?;
        Ok(target)
    }
}

fn safe_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "unnamed.bin".to_string()
    } else {
        trimmed.to_string()
    }
}
