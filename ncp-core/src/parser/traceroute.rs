use super::lexer::{Lexeme, Token, lex};
use crate::RawProbeOutput;
use crate::metrics::{PathHop, PathMetrics};
use std::time::SystemTime;
use tracing::{debug, warn};

/// `traceroute` does not go further than this many hops.
const MAX_HOP_INDEX: u32 = 255;

/// Parse the output of `traceroute` (with or without `-n`).
///
/// Returns `None` if no hop could be found.
pub(super) fn parse(raw: &RawProbeOutput, collected_at: SystemTime) -> Option<PathMetrics> {
    let mut hops: Vec<PathHop> = Vec::new();

    for line in raw.stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("traceroute") {
            continue;
        }

        let Some(hop) = hop(trimmed) else {
            debug!(%line, "skipping malformed traceroute line");
            continue;
        };

        let expected = hops.len() as u32 + 1;
        if hop.hop_index < expected {
            debug!(%line, expected, "skipping out of order traceroute hop");
            continue;
        }
        if hop.hop_index > expected {
            warn!(
                from = expected,
                to = hop.hop_index - 1,
                "traceroute output is missing hops, recording them as silent"
            );
            hops.extend((expected..hop.hop_index).map(PathHop::no_response));
        }
        hops.push(hop);
    }

    if hops.is_empty() {
        return None;
    }

    match PathMetrics::new(
        raw.source.clone(),
        raw.destination.clone(),
        hops,
        collected_at,
    ) {
        Ok(path) => Some(path),
        Err(error) => {
            warn!(%error, "inconsistent traceroute hops");
            None
        }
    }
}

/// One line of traceroute output:
///
/// ```text
///  1  10.0.1.1 (10.0.1.1)  0.123 ms  0.101 ms  0.099 ms
///  2  * * *
///  3  r2.lab (10.0.2.1)  1.234 ms * 1.100 ms
///  4  10.0.2.10  0.503 ms  0.411 ms  0.420 ms
/// ```
///
/// Lines without a leading hop index (the extra responders of a hop
/// printed on their own line) are not hops.
fn hop(line: &str) -> Option<PathHop> {
    let lexemes = lex(line)?;
    let (first, rest) = lexemes.split_first()?;
    if first.token != Token::Integer {
        return None;
    }
    let hop_index: u32 = first.text.parse().ok()?;
    if hop_index == 0 || hop_index > MAX_HOP_INDEX {
        return None;
    }

    let mut address: Option<String> = None;
    let mut hostname: Option<String> = None;
    let mut rtt_ms: Option<f64> = None;

    let mut i = 0;
    while i < rest.len() {
        let lexeme = &rest[i];
        match lexeme.token {
            Token::OpenParen => {
                let close = rest[i..]
                    .iter()
                    .position(|l| l.token == Token::CloseParen)
                    .map(|offset| i + offset)?;
                let inner = line[lexeme.span.end..rest[close].span.start].trim();
                if address.is_none() && !inner.is_empty() {
                    address = Some(inner.to_owned());
                    hostname = i
                        .checked_sub(1)
                        .map(|previous| &rest[previous])
                        .filter(|previous| is_name(previous) && previous.text != inner)
                        .map(|previous| previous.text.to_owned());
                }
                i = close;
            }
            _ if lexeme.is_number() && rest.get(i + 1).is_some_and(|l| l.is_word("ms")) => {
                if rtt_ms.is_none() {
                    rtt_ms = lexeme.text.parse().ok().filter(|rtt: &f64| *rtt >= 0.0);
                }
                i += 1;
            }
            _ if is_name(lexeme) && address.is_none() => {
                // `name (address)` is handled with the parenthesis
                if !rest.get(i + 1).is_some_and(|l| l.token == Token::OpenParen) {
                    address = Some(lexeme.text.to_owned());
                }
            }
            _ => (),
        }
        i += 1;
    }

    let hop = match address {
        None => PathHop::no_response(hop_index),
        Some(address) => PathHop::responded(hop_index, address, rtt_ms),
    };
    Some(match hostname {
        Some(hostname) => hop.with_hostname(hostname),
        None => hop,
    })
}

fn is_name(lexeme: &Lexeme<'_>) -> bool {
    lexeme.is_address() || (lexeme.token == Token::Word && lexeme.text != "ms")
}
