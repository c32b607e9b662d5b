extern crate openssl;

use openssl::ssl::SslStream;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;

#[cfg(test)]
use std::io::Cursor;

pub enum TCPStreamType {
    SSL(BufReader<SslStream<TcpStream>>),
    /// Replays canned server bytes and records everything the client writes.
    #[cfg(test)]
    Scripted(BufReader<Cursor<Vec<u8>>>, Vec<u8>),
}

impl TCPStreamType {
    pub fn read_until(&mut self, byte: u8, buff: &mut Vec<u8>) -> io::Result<usize> {
        match self {
            TCPStreamType::SSL(stream) => stream.read_until(byte, buff),
            #[cfg(test)]
            TCPStreamType::Scripted(input, _) => input.read_until(byte, buff),
        }
    }

    pub fn read_exact(&mut self, buff: &mut [u8]) -> io::Result<()> {
        match self {
            TCPStreamType::SSL(stream) => stream.read_exact(buff),
            #[cfg(test)]
            TCPStreamType::Scripted(input, _) => input.read_exact(buff),
        }
    }

    /// Writes one protocol line, CRLF terminated.
    pub fn write_string(&mut self, line: &str) -> io::Result<()> {
        match self {
            TCPStreamType::SSL(stream) => {
                let inner = stream.get_mut();
                inner.write_all(line.as_bytes())?;
                inner.write_all(b"\r\n")?;
                inner.flush()
            }
            #[cfg(test)]
            TCPStreamType::Scripted(_, written) => {
                written.extend_from_slice(line.as_bytes());
                written.extend_from_slice(b"\r\n");
                Ok(())
            }
        }
    }

    pub fn shutdown(&mut self) {
        match self {
            TCPStreamType::SSL(stream) => {
                let _ = stream.get_mut().shutdown();
            }
            #[cfg(test)]
            TCPStreamType::Scripted(_, _) => (),
        }
    }
}

#[cfg(test)]
impl TCPStreamType {
    pub fn scripted(server_bytes: &str) -> TCPStreamType {
        TCPStreamType::Scripted(
            BufReader::new(Cursor::new(server_bytes.as_bytes().to_vec())),
            Vec::new(),
        )
    }

    pub fn written(&self) -> String {
        match self {
            TCPStreamType::Scripted(_, written) => String::from_utf8_lossy(written).into_owned(),
            _ => String::new(),
        }
    }
}
