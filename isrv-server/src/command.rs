//! # Command Registry
//!
//! Turn a request line into a typed [`Command`] and run it.
//!
//! ## Design Principles
//!
//! 1. **Closed Set**: Exactly five variants, dispatched by one `match`.
//! 2. **Total Parse**: Unknown verbs degrade to [`Command::Error`]; parsing
//!    never fails.
//! 3. **Late Validation**: Field counts are checked when a variant executes,
//!    so a malformed request still gets a deterministic reply.
//! 4. **Value Keys**: Cache keys come from the parsed fields, never from the
//!    command instance.

use isrv_common::protocol::{
    split_fields, RESPONSE_BAD_ARGUMENTS, RESPONSE_ERROR, VERB_QUERY, VERB_REPORT, VERB_SHUTDOWN,
    VERB_STATUS,
};
use isrv_engine::CacheKey;

use crate::server::Server;

/// A parsed request. Each variant carries every field of the line,
/// verb included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `q;<country>;<indicator>[;<year>]`
    Query(Vec<String>),
    /// `r;<indicator>`
    Report(Vec<String>),
    /// `s`
    Status(Vec<String>),
    /// `z`
    Shutdown(Vec<String>),
    /// Anything else.
    Error(Vec<String>),
}

impl Command {
    /// Parses a raw request line.
    pub fn parse(line: &str) -> Command {
        Command::from_fields(split_fields(line))
    }

    /// Selects the variant from the first field.
    pub fn from_fields(fields: Vec<String>) -> Command {
        match fields.first().map(String::as_str) {
            Some(VERB_QUERY) => Command::Query(fields),
            Some(VERB_REPORT) => Command::Report(fields),
            Some(VERB_STATUS) => Command::Status(fields),
            Some(VERB_SHUTDOWN) => Command::Shutdown(fields),
            _ => Command::Error(fields),
        }
    }

    pub fn fields(&self) -> &[String] {
        match self {
            Command::Query(fields)
            | Command::Report(fields)
            | Command::Status(fields)
            | Command::Shutdown(fields)
            | Command::Error(fields) => fields,
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Query(_) => "query",
            Command::Report(_) => "report",
            Command::Status(_) => "status",
            Command::Shutdown(_) => "shutdown",
            Command::Error(_) => "error",
        }
    }

    /// Whether the result depends only on the request fields.
    ///
    /// Status reads live server state and shutdown has a side effect, so
    /// neither may be memoized.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Command::Query(_) | Command::Report(_))
    }

    /// Cache key for cacheable commands.
    pub fn cache_key(&self) -> Option<CacheKey> {
        self.is_cacheable()
            .then(|| CacheKey::from_fields(self.fields()))
    }

    /// Runs the command and returns the response line (without terminator).
    ///
    /// `generation` identifies the run that accepted the connection; a
    /// shutdown only stops that run.
    pub async fn execute(&self, server: &Server, generation: u64) -> String {
        match self {
            Command::Query(fields) => query(server, fields),
            Command::Report(fields) => report(server, fields),
            Command::Status(_) => server.state(),
            Command::Shutdown(_) => server.shutdown_run(generation).await,
            Command::Error(_) => RESPONSE_ERROR.to_string(),
        }
    }
}

fn query(server: &Server, fields: &[String]) -> String {
    match fields {
        [_, country, indicator] => server.dataset().query(country, indicator),
        [_, country, indicator, year] => match year.trim().parse::<u16>() {
            Ok(year) => server.dataset().query_year(country, indicator, year),
            Err(err) => format!("Year must be a number {err}"),
        },
        _ => RESPONSE_BAD_ARGUMENTS.to_string(),
    }
}

fn report(server: &Server, fields: &[String]) -> String {
    match fields {
        [_, indicator] => server.dataset().report(indicator),
        _ => RESPONSE_BAD_ARGUMENTS.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use isrv_common::ServerConfig;
    use isrv_data::Dataset;

    struct Echo;

    impl Dataset for Echo {
        fn query(&self, country: &str, indicator: &str) -> String {
            format!("all:{country}:{indicator}")
        }

        fn query_year(&self, country: &str, indicator: &str, year: u16) -> String {
            format!("year:{country}:{indicator}:{year}")
        }

        fn report(&self, indicator: &str) -> String {
            format!("report:{indicator}")
        }
    }

    fn server() -> Server {
        Server::new(ServerConfig::default(), Arc::new(Echo))
    }

    #[test]
    fn selects_variant_by_verb() {
        assert!(matches!(Command::parse("q;DEU;X"), Command::Query(_)));
        assert!(matches!(Command::parse("r;X"), Command::Report(_)));
        assert!(matches!(Command::parse("s"), Command::Status(_)));
        assert!(matches!(Command::parse("z"), Command::Shutdown(_)));
        assert!(matches!(Command::parse("zz"), Command::Error(_)));
        assert!(matches!(Command::parse(""), Command::Error(_)));
    }

    #[test]
    fn only_query_and_report_are_cacheable() {
        assert!(Command::parse("q;DEU;X").is_cacheable());
        assert!(Command::parse("r;X").is_cacheable());
        assert!(!Command::parse("s").is_cacheable());
        assert!(!Command::parse("z").is_cacheable());
        assert!(!Command::parse("zz").is_cacheable());
        assert_eq!(Command::parse("s").cache_key(), None);
    }

    #[test]
    fn equal_lines_share_a_cache_key() {
        let a = Command::parse("q;DEU;NY.GDP.MKTP.CD\r\n");
        let b = Command::parse("q;DEU;NY.GDP.MKTP.CD");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), Command::parse("q;FRA;NY.GDP.MKTP.CD").cache_key());
    }

    #[tokio::test]
    async fn query_dispatches_on_field_count() {
        let server = server();
        assert_eq!(Command::parse("q;DEU;X").execute(&server, 0).await, "all:DEU:X");
        assert_eq!(Command::parse("q;DEU;X;1990").execute(&server, 0).await, "year:DEU:X:1990");
        assert_eq!(Command::parse("q;DEU").execute(&server, 0).await, " Bad arguments");
        assert_eq!(Command::parse("q;DEU;X;1990;1").execute(&server, 0).await, " Bad arguments");
    }

    #[tokio::test]
    async fn non_numeric_year_is_explained() {
        let response = Command::parse("q;DEU;X;nineteen").execute(&server(), 0).await;
        assert!(response.starts_with("Year must be a number "), "{response}");
    }

    #[tokio::test]
    async fn report_checks_arity() {
        let server = server();
        assert_eq!(Command::parse("r;X").execute(&server, 0).await, "report:X");
        assert_eq!(Command::parse("r").execute(&server, 0).await, " Bad arguments");
        assert_eq!(Command::parse("r;X;Y").execute(&server, 0).await, " Bad arguments");
    }

    #[tokio::test]
    async fn unknown_verb_reports_error() {
        assert_eq!(Command::parse("zz").execute(&server(), 0).await, "Error");
    }

    #[tokio::test]
    async fn shutdown_on_stopped_server_is_a_no_op() {
        let response = Command::parse("z").execute(&server(), 0).await;
        assert!(response.ends_with("Server already closed!"), "{response}");
    }

    #[tokio::test]
    async fn shutdown_only_stops_its_own_run() {
        let mut config = ServerConfig::default();
        config.port = 0;
        config.pool_size = Some(1);
        let server = Server::new(config, Arc::new(Echo));

        server.start().await.unwrap();
        let first = server.generation();
        server.shutdown().await;
        server.start().await.unwrap();
        assert_ne!(server.generation(), first);

        let stale = Command::parse("z").execute(&server, first).await;
        assert!(stale.ends_with("Server already closed!"), "{stale}");
        assert!(server.is_running());

        let current = Command::parse("z").execute(&server, server.generation()).await;
        assert!(current.ends_with("Server socket closed!"), "{current}");
        assert!(!server.is_running());
        server.wait_terminated().await;
    }
}
