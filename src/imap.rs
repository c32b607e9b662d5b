extern crate openssl;
extern crate regex;

use crate::error::{AppError, Result};
use crate::tcpstream::TCPStreamType;

use log::{debug, info};
use openssl::ssl::{SslConnector, SslMethod};
use regex::Regex;
use std::io::BufReader;
use std::net::TcpStream;
use std::sync::OnceLock;

#[derive(Debug, PartialEq)]
enum IMAPState {
    NotAuthenticated,
    Authenticated,
    Selected,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthMechanism {
    Login,
    Plain,
}

impl AuthMechanism {
    pub fn parse(value: &str) -> Option<AuthMechanism> {
        match value.to_ascii_lowercase().as_str() {
            "login" => Some(AuthMechanism::Login),
            "plain" => Some(AuthMechanism::Plain),
            _ => None,
        }
    }
}

/// One server line with the literals (`{n}` + n bytes) embedded in it.
#[derive(Debug)]
struct ResponseLine {
    text: String,
    literals: Vec<Vec<u8>>,
}

pub struct IMAPClient {
    stream: TCPStreamType,
    state: IMAPState,
    tag_counter: u32,
}

const LF: u8 = 0x0A;

fn status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<tag>A\d{4,}) (?P<status>OK|NO|BAD)(?: (?P<text>.*))?$")
            .expect("invalid status regex")
    })
}

fn literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(?P<len>\d+)\}$").expect("invalid literal regex"))
}

fn exists_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\* (?P<count>\d+) EXISTS").expect("invalid exists regex"))
}

impl IMAPClient {
    pub fn connect(host: &str, port: u16) -> Result<IMAPClient> {
        info!("Connecting to {} at port {}...", host, port);
        let tcp_stream = TcpStream::connect((host, port))?;
        let connector = SslConnector::builder(SslMethod::tls())?.build();
        let ssl_stream = connector
            .connect(host, tcp_stream)
            .map_err(|err| AppError::Tls(err.to_string()))?;
        IMAPClient::from_stream(TCPStreamType::SSL(BufReader::new(ssl_stream)))
    }

    /// Reads the server greeting from an already established stream.
    pub(crate) fn from_stream(stream: TCPStreamType) -> Result<IMAPClient> {
        let mut client = IMAPClient {
            stream,
            state: IMAPState::NotAuthenticated,
            tag_counter: 0,
        };
        let greeting = client.read_response_line()?;
        debug!("S: {}", greeting.text);
        if greeting.text.starts_with("* OK") {
            Ok(client)
        } else if greeting.text.starts_with("* PREAUTH") {
            client.state = IMAPState::Authenticated;
            Ok(client)
        } else {
            Err(AppError::Imap(format!("unexpected greeting: {}", greeting.text)))
        }
    }

    pub fn login(&mut self, username: &str, password: &str, mechanism: AuthMechanism) -> Result<()> {
        match self.state {
            IMAPState::NotAuthenticated => (),
            IMAPState::Authenticated => return Ok(()),
            _ => return Err(AppError::Imap("already logged in".to_string())),
        }
        match mechanism {
            AuthMechanism::Login => {
                let command = format!("LOGIN {} {}", quote(username)?, quote(password)?);
                self.send_command(&command, &[])?;
            }
            AuthMechanism::Plain => {
                let token = base64::encode(format!("\0{}\0{}", username, password));
                self.send_command("AUTHENTICATE PLAIN", &[token])?;
            }
        }
        self.state = IMAPState::Authenticated;
        Ok(())
    }

    /// Selects a mailbox and returns its message count.
    pub fn select(&mut self, mailbox: &str) -> Result<u32> {
        if self.state != IMAPState::Authenticated && self.state != IMAPState::Selected {
            return Err(AppError::Imap("SELECT requires an authenticated session".to_string()));
        }
        let lines = self.send_command(&format!("SELECT {}", quote(mailbox)?), &[])?;
        self.state = IMAPState::Selected;
        let exists = lines
            .iter()
            .filter_map(|line| exists_re().captures(&line.text))
            .filter_map(|caps| caps["count"].parse::<u32>().ok())
            .last()
            .unwrap_or(0);
        debug!("{} holds {} messages", mailbox, exists);
        Ok(exists)
    }

    pub fn search(&mut self, criteria: &str) -> Result<Vec<u32>> {
        self.require_selected("SEARCH")?;
        let lines = if criteria.is_ascii() {
            self.send_command(&format!("SEARCH {}", criteria), &[])?
        } else {
            let mut chunks = literalize(criteria);
            let first = chunks.remove(0);
            self.send_command(&format!("SEARCH CHARSET UTF-8 {}", first), &chunks)?
        };
        let mut ids = Vec::new();
        for line in lines.iter().filter(|line| line.text.starts_with("* SEARCH")) {
            for id in line.text["* SEARCH".len()..].split_whitespace() {
                let id = id
                    .parse::<u32>()
                    .map_err(|_| AppError::Imap(format!("bad SEARCH response: {}", line.text)))?;
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Fetches the full RFC822 source of a message by sequence number.
    pub fn fetch_rfc822(&mut self, id: u32) -> Result<Vec<u8>> {
        self.require_selected("FETCH")?;
        let lines = self.send_command(&format!("FETCH {} (RFC822)", id), &[])?;
        let fetch_prefix = format!("* {} FETCH", id);
        lines
            .into_iter()
            .filter(|line| line.text.starts_with(&fetch_prefix))
            .flat_map(|line| line.literals.into_iter())
            .next()
            .ok_or_else(|| AppError::Imap(format!("no RFC822 body returned for message {}", id)))
    }

    pub fn logout(&mut self) -> Result<()> {
        if self.state == IMAPState::Logout {
            return Ok(());
        }
        self.send_command("LOGOUT", &[])?;
        self.state = IMAPState::Logout;
        self.stream.shutdown();
        Ok(())
    }

    fn require_selected(&self, command: &str) -> Result<()> {
        if self.state == IMAPState::Selected {
            Ok(())
        } else {
            Err(AppError::Imap(format!("{} requires a selected mailbox", command)))
        }
    }

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{:04}", self.tag_counter)
    }

    /// Sends a tagged command and collects the untagged lines up to its
    /// completion. Each `+` request is answered with the next entry of
    /// `continuations`.
    fn send_command(&mut self, command: &str, continuations: &[String]) -> Result<Vec<ResponseLine>> {
        let tag = self.next_tag();
        let line = format!("{} {}", tag, command);
        debug!("C: {}", redact(&line));
        self.stream.write_string(&line)?;
        self.read_response(&tag, continuations)
    }

    fn read_response(&mut self, tag: &str, continuations: &[String]) -> Result<Vec<ResponseLine>> {
        let mut pending = continuations.iter();
        let mut untagged = Vec::new();
        loop {
            let line = self.read_response_line()?;
            if line.text.starts_with('+') {
                match pending.next() {
                    Some(data) => {
                        debug!("C: <continuation>");
                        self.stream.write_string(data)?;
                        continue;
                    }
                    None => {
                        return Err(AppError::Imap(format!("unexpected continuation: {}", line.text)))
                    }
                }
            }
            if let Some(caps) = status_re().captures(&line.text) {
                if &caps["tag"] != tag {
                    return Err(AppError::Imap(format!("unexpected tagged response: {}", line.text)));
                }
                debug!("S: {}", line.text);
                let text = caps.name("text").map(|m| m.as_str()).unwrap_or("");
                return match &caps["status"] {
                    "OK" => Ok(untagged),
                    status => Err(AppError::Imap(format!("{} {}", status, text))),
                };
            }
            debug!("S: {}", line.text);
            untagged.push(line);
        }
    }

    fn read_response_line(&mut self) -> Result<ResponseLine> {
        let mut text = String::new();
        let mut literals = Vec::new();
        loop {
            let mut buff = Vec::new();
            if self.stream.read_until(LF, &mut buff)? == 0 {
                return Err(AppError::Imap("connection closed by server".to_string()));
            }
            let chunk = String::from_utf8_lossy(trim_crlf(&buff)).into_owned();
            let literal_len = literal_re()
                .captures(&chunk)
                .and_then(|caps| caps["len"].parse::<usize>().ok());
            text.push_str(&chunk);
            match literal_len {
                Some(len) => {
                    let mut literal = vec![0; len];
                    self.stream.read_exact(&mut literal)?;
                    literals.push(literal);
                }
                None => break,
            }
        }
        Ok(ResponseLine { text, literals })
    }
}

/// Splits a command tail so every non-ASCII quoted string travels as a
/// synchronizing literal: each chunk but the last ends with `{n}` and the
/// next chunk starts with those n bytes.
fn literalize(criteria: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut chars = criteria.chars();
    while let Some(c) = chars.next() {
        if c != '"' {
            current.push(c);
            continue;
        }
        let mut raw = String::from("\"");
        let mut value = String::new();
        while let Some(c) = chars.next() {
            raw.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        raw.push(escaped);
                        value.push(escaped);
                    }
                }
                '"' => break,
                _ => value.push(c),
            }
        }
        if value.is_ascii() {
            current.push_str(&raw);
        } else {
            current.push_str(&format!("{{{}}}", value.len()));
            chunks.push(current);
            current = value;
        }
    }
    chunks.push(current);
    chunks
}

fn trim_crlf(buffer: &[u8]) -> &[u8] {
    let mut end = buffer.len();
    while end > 0 && (buffer[end - 1] == LF || buffer[end - 1] == 0x0D) {
        end -= 1;
    }
    &buffer[..end]
}

/// IMAP quoted string.
fn quote(value: &str) -> Result<String> {
    if value.contains('\r') || value.contains('\n') {
        return Err(AppError::Imap("line breaks are not allowed in quoted strings".to_string()));
    }
    Ok(format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")))
}

fn redact(line: &str) -> String {
    let mut parts = line.splitn(3, ' ');
    match (parts.next(), parts.next()) {
        (Some(tag), Some("LOGIN")) => format!("{} LOGIN <redacted>", tag),
        (Some(tag), Some("AUTHENTICATE")) => format!("{} AUTHENTICATE <redacted>", tag),
        _ => line.to_string(),
    }
}
