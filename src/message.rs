use crate::error::{AppError, Result};

use chrono::{DateTime, FixedOffset};
use log::{info, warn};
use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use std::fs;
use std::path::{Path, PathBuf};

const DATE_FORMATS: [&str; 2] = ["%a, %d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M:%S %z"];

#[derive(Debug)]
pub struct PdfAttachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// What the pipeline needs from one e-mail.
#[derive(Debug)]
pub struct MailContent {
    pub date: DateTime<FixedOffset>,
    pub body: String,
    pub pdf_attachments: Vec<PdfAttachment>,
}

/// Tries the RFC 2822 layout with and without the weekday.
pub fn parse_email_date(header: &str) -> Option<DateTime<FixedOffset>> {
    let mut value = header.trim();
    if value.ends_with(')') {
        if let Some(start) = value.rfind('(') {
            value = value[..start].trim_end();
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(value, format).ok())
}

pub fn parse_message(raw: &[u8]) -> Result<MailContent> {
    let parsed = parse_mail(raw)?;
    let date_header = parsed.headers.get_first_value("Date").unwrap_or_default();
    let date = parse_email_date(&date_header).ok_or(AppError::InvalidDate(date_header))?;

    let mut parts = Vec::new();
    walk(&parsed, &mut parts);

    let mut pdf_attachments = Vec::new();
    for part in &parts {
        if part.ctype.mimetype.starts_with("multipart/") {
            continue;
        }
        if part.headers.get_first_value("Content-Disposition").is_none() {
            continue;
        }
        if let Some(filename) = attachment_filename(part) {
            if filename.to_lowercase().ends_with(".pdf") {
                match part.get_body_raw() {
                    Ok(data) => pdf_attachments.push(PdfAttachment { filename, data }),
                    Err(err) => warn!("Could not decode attachment {}: {}, skipping...", filename, err),
                }
            }
        }
    }

    let body = match parts.iter().find(|part| part.ctype.mimetype == "text/plain") {
        Some(part) => part.get_body()?,
        None => String::new(),
    };

    Ok(MailContent {
        date,
        body,
        pdf_attachments,
    })
}

/// Writes each PDF as `<YYYYMMDD>_<filename>` under `dir`. A different
/// file already holding that name gets a `_2`, `_3`, ... suffix; an
/// identical one is left as is.
pub fn save_pdf_attachments(content: &MailContent, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut saved = Vec::new();
    for attachment in &content.pdf_attachments {
        let safe_filename = format!(
            "{}_{}",
            content.date.format("%Y%m%d"),
            attachment.filename.replace(|c: char| c == '/' || c == '\\', "_")
        );
        let mut copy = 1;
        let filepath = loop {
            let candidate = dir.join(numbered(&safe_filename, copy));
            if !candidate.exists() {
                fs::write(&candidate, &attachment.data)?;
                info!("Saved attachment: {}", candidate.display());
                break candidate;
            }
            if fs::read(&candidate)? == attachment.data {
                info!("Attachment already saved: {}", candidate.display());
                break candidate;
            }
            copy += 1;
        };
        saved.push(filepath);
    }
    Ok(saved)
}

/// `name.pdf`, `name_2.pdf`, `name_3.pdf`, ...
fn numbered(filename: &str, copy: u32) -> String {
    if copy == 1 {
        return filename.to_string();
    }
    match filename.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{}{}", &filename[..dot], copy, &filename[dot..]),
        _ => format!("{}_{}", filename, copy),
    }
}

/// Depth-first, root first.
fn walk<'a, 'b>(part: &'b ParsedMail<'a>, out: &mut Vec<&'b ParsedMail<'a>>) {
    out.push(part);
    for subpart in &part.subparts {
        walk(subpart, out);
    }
}

fn attachment_filename(part: &ParsedMail) -> Option<String> {
    part.get_content_disposition()
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}
