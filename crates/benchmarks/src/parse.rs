//! Extracting measurements from load-generator output.

use crate::error::{BenchError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

// Sample line: "Speed: 152720 request/sec, 152720 response/sec"
static SPEED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Speed: (\d+) request/sec").expect("speed pattern is valid")
});

/// Requests per second reported by the echo client.
///
/// # Errors
///
/// [`BenchError::Parse`] carrying the full output when no speed line is
/// present or the number does not fit in a `u64`.
pub fn parse_throughput(output: &str) -> Result<u64> {
    SPEED_RE
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| BenchError::Parse {
            raw_output: output.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_speed_line() {
        let output = "Benchmarking: localhost:8080\n\
                      200 clients, running 128 bytes, 20 sec.\n\
                      \n\
                      Speed: 152720 request/sec, 152720 response/sec\n\
                      Requests: 3054400\n\
                      Responses: 3054400\n";
        assert_eq!(parse_throughput(output).unwrap(), 152_720);
    }

    #[test]
    fn test_first_match_wins() {
        let output = "Speed: 10 request/sec\nSpeed: 20 request/sec\n";
        assert_eq!(parse_throughput(output).unwrap(), 10);
    }

    #[test]
    fn test_missing_speed_is_error() {
        let output = "Requests: 0\nResponses: 0\n";
        match parse_throughput(output).unwrap_err() {
            BenchError::Parse { raw_output } => assert_eq!(raw_output, output),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overflow_is_error() {
        let output = "Speed: 99999999999999999999999 request/sec";
        assert!(matches!(
            parse_throughput(output),
            Err(BenchError::Parse { .. })
        ));
    }

    #[test]
    fn test_response_rate_alone_is_not_enough() {
        assert!(parse_throughput("Speed: 152720 response/sec").is_err());
    }
}
