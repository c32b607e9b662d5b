use crate::error::{AppError, Result};
use crate::imap::IMAPClient;
use crate::message::{parse_message, save_pdf_attachments};
use crate::routes::{find_matching_route, Route};

use chrono::NaiveDate;
use log::{debug, warn};
use std::path::Path;

pub const BILLING_TYPE: &str = "Transport";

/// One matching e-mail: a single ticket on a known route.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketRecord {
    pub date: NaiveDate,
    pub client: String,
    pub project: String,
    pub billing_type: String,
    pub tickets: u32,
    pub route: String,
    pub kind: String,
    pub amount: f64,
}

impl TicketRecord {
    pub fn new(date: NaiveDate, route: &Route) -> TicketRecord {
        TicketRecord {
            date,
            client: String::new(),
            project: String::new(),
            billing_type: BILLING_TYPE.to_string(),
            tickets: 1,
            route: route.name.clone(),
            kind: String::new(),
            amount: route.price,
        }
    }
}

pub trait MessageSource {
    fn fetch_message(&mut self, id: u32) -> Result<Vec<u8>>;
}

impl MessageSource for IMAPClient {
    fn fetch_message(&mut self, id: u32) -> Result<Vec<u8>> {
        self.fetch_rfc822(id)
    }
}

/// Fetches every message, saves its PDFs into `attachment_dir` and turns
/// the ones whose body names a route into ticket records.
pub fn extract_email_data<S: MessageSource>(
    source: &mut S,
    email_ids: &[u32],
    routes: &[Route],
    attachment_dir: &Path,
) -> Result<Vec<TicketRecord>> {
    let mut email_data = Vec::new();

    for &email_id in email_ids {
        let raw_email = source.fetch_message(email_id)?;
        let content = match parse_message(&raw_email) {
            Ok(content) => content,
            Err(AppError::InvalidDate(date)) => {
                warn!("Could not parse date '{}' of message {}, skipping...", date, email_id);
                continue;
            }
            Err(AppError::Mail(err)) => {
                warn!("Could not parse message {}: {}, skipping...", email_id, err);
                continue;
            }
            Err(err) => return Err(err),
        };

        save_pdf_attachments(&content, attachment_dir)?;

        match find_matching_route(routes, &content.body) {
            Some(route) => email_data.push(TicketRecord::new(content.date.date_naive(), route)),
            None => debug!("Message {} matches no route", email_id),
        }
    }

    Ok(email_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    struct FakeMailbox {
        messages: HashMap<u32, String>,
    }

    impl MessageSource for FakeMailbox {
        fn fetch_message(&mut self, id: u32) -> Result<Vec<u8>> {
            self.messages
                .get(&id)
                .map(|raw| raw.as_bytes().to_vec())
                .ok_or_else(|| AppError::Imap(format!("no message {}", id)))
        }
    }

    fn routes() -> Vec<Route> {
        vec![
            Route {
                name: "Paris-Lyon".to_string(),
                keywords: vec!["Paris > Lyon".to_string()],
                price: 45.0,
            },
            Route {
                name: "Lyon-Paris".to_string(),
                keywords: vec!["Lyon > Paris".to_string()],
                price: 40.0,
            },
        ]
    }

    fn mail_with_pdf(date: &str, body: &str) -> String {
        format!(
            concat!(
                "Date: {}\r\n",
                "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
                "\r\n",
                "--b\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "{}\r\n",
                "--b\r\n",
                "Content-Type: application/pdf\r\n",
                "Content-Disposition: attachment; filename=\"e-ticket.pdf\"\r\n",
                "Content-Transfer-Encoding: base64\r\n",
                "\r\n",
                "JVBERi0xLjQ=\r\n",
                "--b--\r\n",
            ),
            date, body
        )
    }

    #[test]
    fn extract_email_data__builds_records_for_matching_routes() {
        let dir = tempfile::tempdir().unwrap();
        let mut mailbox = FakeMailbox {
            messages: vec![
                (1, mail_with_pdf("Mon, 15 Jan 2024 07:00:00 +0100", "Trajet Paris > Lyon")),
                (2, mail_with_pdf("Mon, 15 Jan 2024 18:00:00 +0100", "Trajet Lyon > Paris")),
                (3, mail_with_pdf("Tue, 16 Jan 2024 09:00:00 +0100", "Newsletter")),
            ]
            .into_iter()
            .collect(),
        };

        let records = extract_email_data(&mut mailbox, &[1, 2, 3], &routes(), dir.path()).unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], TicketRecord::new(day, &routes()[0]));
        assert_eq!(records[1].route, "Lyon-Paris");
        assert_eq!(records[1].amount, 40.0);
        assert_eq!(records[1].billing_type, "Transport");

        // attachments are kept even when no route matches
        assert!(dir.path().join("20240115_e-ticket.pdf").exists());
        assert!(dir.path().join("20240116_e-ticket.pdf").exists());
    }

    #[test]
    fn extract_email_data__skips_messages_with_bad_dates() {
        let dir = tempfile::tempdir().unwrap();
        let mut mailbox = FakeMailbox {
            messages: vec![(9, mail_with_pdf("sometime in January", "Paris > Lyon"))]
                .into_iter()
                .collect(),
        };

        let records = extract_email_data(&mut mailbox, &[9], &routes(), dir.path()).unwrap();

        assert!(records.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn extract_email_data__uses_the_header_offset_for_the_day() {
        let dir = tempfile::tempdir().unwrap();
        let mut mailbox = FakeMailbox {
            messages: vec![(4, mail_with_pdf("Wed, 31 Jan 2024 23:30:00 -0500", "Paris > Lyon"))]
                .into_iter()
                .collect(),
        };

        let records = extract_email_data(&mut mailbox, &[4], &routes(), dir.path()).unwrap();

        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn extract_email_data__with_undecodable_attachment__still_records_the_ticket() {
        let dir = tempfile::tempdir().unwrap();
        let raw = mail_with_pdf("Mon, 15 Jan 2024 07:00:00 +0100", "Trajet Paris > Lyon")
            .replace("JVBERi0xLjQ=", "JVBERi0x!!!*");
        let mut mailbox = FakeMailbox {
            messages: vec![(5, raw)].into_iter().collect(),
        };

        let records = extract_email_data(&mut mailbox, &[5], &routes(), dir.path()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].route, "Paris-Lyon");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn extract_email_data__propagates_fetch_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut mailbox = FakeMailbox {
            messages: HashMap::new(),
        };
        assert!(extract_email_data(&mut mailbox, &[1], &routes(), dir.path()).is_err());
    }
}
