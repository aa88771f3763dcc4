use super::lexer::{Lexeme, Token, lex};
use crate::metrics::{LatencyMetrics, RttStats};
use crate::{Endpoint, RawProbeOutput};
use std::{collections::BTreeMap, time::SystemTime};
use tracing::debug;

/// Everything of interest found in the output of a `ping` run.
#[derive(Debug, Default)]
struct PingOutput {
    /// round trip time by sequence number, first reply wins
    samples: BTreeMap<u32, f64>,
    highest_seq: u32,
    transmitted: Option<u32>,
    received: Option<u32>,
    summary_rtt: Option<RttStats>,
    /// at least one reply, summary or unreachable report was found; the
    /// `PING` banner alone does not count
    recognised: bool,
}

/// Parse the output of iputils `ping`.
///
/// Returns `None` if the output holds no reply, summary or unreachable
/// report.
pub(super) fn parse(raw: &RawProbeOutput, collected_at: SystemTime) -> Option<LatencyMetrics> {
    let mut output = PingOutput::default();

    for line in raw.stdout.lines() {
        output.line(line);
    }
    for line in raw.stderr.lines() {
        if line.to_ascii_lowercase().contains("unreachable") {
            debug!(%line, "destination reported unreachable");
            output.recognised = true;
        }
    }

    if !output.recognised {
        return None;
    }

    Some(output.into_metrics(raw.source.clone(), raw.destination.clone(), collected_at))
}

impl PingOutput {
    fn line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if line.starts_with("PING ") || line.starts_with("---") {
            return;
        }

        let Some(lexemes) = lex(line) else {
            debug!(%line, "skipping malformed ping line");
            return;
        };

        if self.summary(&lexemes) || self.rtt_summary(&lexemes) || self.reply(line, &lexemes) {
            self.recognised = true;
        } else {
            debug!(%line, "skipping unrecognised ping line");
        }
    }

    /// `5 packets transmitted, 4 received, 20% packet loss, time 4005ms`
    fn summary(&mut self, lexemes: &[Lexeme<'_>]) -> bool {
        let mut transmitted = None;
        let mut received = None;

        for (i, lexeme) in lexemes.iter().enumerate() {
            if lexeme.token != Token::Integer {
                continue;
            }
            let next = |n: usize| lexemes.get(i + n);
            if next(1).is_some_and(|l| l.is_word("packets"))
                && next(2).is_some_and(|l| l.is_word("transmitted"))
            {
                transmitted = lexeme.text.parse().ok();
            } else if next(1).is_some_and(|l| l.is_word("received")) {
                received = lexeme.text.parse().ok();
            }
        }

        match (transmitted, received) {
            (Some(transmitted), Some(received)) => {
                self.transmitted = Some(transmitted);
                self.received = Some(received);
                true
            }
            _ => false,
        }
    }

    /// `rtt min/avg/max/mdev = 0.045/0.050/0.061/0.007 ms`
    fn rtt_summary(&mut self, lexemes: &[Lexeme<'_>]) -> bool {
        let Some(first) = lexemes.first() else {
            return false;
        };
        if !(first.is_word("rtt") || first.is_word("round-trip")) {
            return false;
        }
        let Some(equals) = lexemes.iter().position(|l| l.token == Token::Equals) else {
            return false;
        };

        let values: Vec<f64> = lexemes[equals + 1..]
            .iter()
            .filter(|l| l.is_number())
            .filter_map(|l| l.text.parse().ok())
            .collect();
        if let [min_ms, avg_ms, max_ms, ..] = values[..] {
            if 0.0 <= min_ms && min_ms <= avg_ms && avg_ms <= max_ms {
                self.summary_rtt = Some(RttStats {
                    min_ms,
                    avg_ms,
                    max_ms,
                });
            }
        }
        true
    }

    /// `64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=0.045 ms`
    /// or `From 10.0.0.1 icmp_seq=1 Destination Host Unreachable`
    fn reply(&mut self, line: &str, lexemes: &[Lexeme<'_>]) -> bool {
        let Some(seq) = value_of(lexemes, "icmp_seq").and_then(|v| v.parse::<u32>().ok()) else {
            return false;
        };
        self.highest_seq = self.highest_seq.max(seq);

        if lexemes.iter().any(|l| l.is_word("DUP")) {
            debug!(%line, "ignoring duplicate reply");
            return true;
        }

        match value_of(lexemes, "time").and_then(|v| v.parse::<f64>().ok()) {
            Some(rtt) if rtt.is_finite() && rtt >= 0.0 => {
                self.samples.entry(seq).or_insert(rtt);
            }
            Some(_) => debug!(%line, "ignoring reply with an invalid round trip time"),
            // no time: an error report for this sequence number
            None => (),
        }
        true
    }

    fn into_metrics(
        self,
        source: Endpoint,
        destination: Endpoint,
        collected_at: SystemTime,
    ) -> LatencyMetrics {
        let samples: Vec<f64> = self.samples.values().copied().collect();
        let sampled = u32::try_from(samples.len()).unwrap_or(u32::MAX);

        let transmitted = self.transmitted.unwrap_or(self.highest_seq);
        let received = self.received.unwrap_or(sampled);
        let rtt = RttStats::from_samples(&samples).or(self.summary_rtt);

        LatencyMetrics::from_counts(source, destination, rtt, transmitted, received, collected_at)
    }
}

/// The value of a `key=value` pair of the line.
fn value_of<'a>(lexemes: &[Lexeme<'a>], key: &str) -> Option<&'a str> {
    lexemes.windows(3).find_map(|window| match window {
        [k, eq, v] if k.is_word(key) && eq.token == Token::Equals && v.is_number() => Some(v.text),
        _ => None,
    })
}
