//! # Indicator Client
//!
//! Blocking client for the line protocol: one connection per request,
//! one line out, one line back.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use isrv_common::protocol::{
    FIELD_SEPARATOR, VERB_QUERY, VERB_REPORT, VERB_SHUTDOWN, VERB_STATUS,
};

/// Default connect/read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Client {
    addr: SocketAddr,
    timeout: Duration,
}

impl Client {
    pub fn new(addr: SocketAddr) -> Self {
        Client {
            addr,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sends one request line and returns the response without its newline.
    ///
    /// A connection closed before any byte arrives yields an empty string.
    pub fn send(&self, line: &str) -> io::Result<String> {
        let mut stream = TcpStream::connect_timeout(&self.addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader.read_line(&mut response)?;
        if response.ends_with('\n') {
            response.pop();
            if response.ends_with('\r') {
                response.pop();
            }
        }
        Ok(response)
    }

    /// `q;<country>;<indicator>`
    pub fn query(&self, country: &str, indicator: &str) -> io::Result<String> {
        self.send(&join(&[VERB_QUERY, country, indicator]))
    }

    /// `q;<country>;<indicator>;<year>`
    pub fn query_year(&self, country: &str, indicator: &str, year: u16) -> io::Result<String> {
        self.send(&join(&[VERB_QUERY, country, indicator, &year.to_string()]))
    }

    /// `r;<indicator>`
    pub fn report(&self, indicator: &str) -> io::Result<String> {
        self.send(&join(&[VERB_REPORT, indicator]))
    }

    pub fn status(&self) -> io::Result<String> {
        self.send(VERB_STATUS)
    }

    pub fn shutdown(&self) -> io::Result<String> {
        self.send(VERB_SHUTDOWN)
    }
}

fn join(fields: &[&str]) -> String {
    fields.join(FIELD_SEPARATOR.to_string().as_str())
}
