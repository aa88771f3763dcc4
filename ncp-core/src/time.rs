//! Human friendly durations, as given on a command line or in a
//! configuration: `"500ms"`, `"2s"`, `"1m 30s"`.

use logos::{Lexer, Logos};
use std::{fmt, str::FromStr, time};
use thiserror::Error;

/// A [`std::time::Duration`] that can be parsed from and displayed as a
/// sequence of `<integer><unit>` terms.
///
/// ```
/// # use ncp_core::time::Duration;
/// let timeout: Duration = "1s 500ms".parse().unwrap();
/// assert_eq!(timeout.into_duration(), std::time::Duration::from_millis(1_500));
/// assert_eq!(timeout.to_string(), "1.5s");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(time::Duration);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,
    #[error("unexpected input at `{0}'")]
    Unexpected(String),
    #[error("expecting a unit after `{0}' (ns, us, ms, s, m or h)")]
    MissingUnit(String),
    #[error("`{0}' is too large")]
    Overflow(String),
}

impl Duration {
    pub const fn new(dur: time::Duration) -> Self {
        Self(dur)
    }

    #[inline]
    pub fn into_duration(self) -> time::Duration {
        self.0
    }
}

impl From<time::Duration> for Duration {
    fn from(value: time::Duration) -> Self {
        Self(value)
    }
}

impl From<Duration> for time::Duration {
    fn from(value: Duration) -> Self {
        value.0
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <time::Duration as fmt::Debug>::fmt(&self.0, f)
    }
}

impl FromStr for Duration {
    type Err = DurationParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex: Lexer<'_, Token> = Lexer::new(s);
        let mut total = time::Duration::ZERO;
        let mut terms = 0;

        while let Some(next) = lex.next() {
            let unexpected = || DurationParseError::Unexpected(lex.slice().to_owned());
            if next != Ok(Token::Value) {
                return Err(unexpected());
            }
            let number: u64 = lex
                .slice()
                .parse()
                .map_err(|_| DurationParseError::Overflow(lex.slice().to_owned()))?;
            let value = lex.slice().to_owned();

            let Some(Ok(unit)) = lex.next() else {
                return Err(DurationParseError::MissingUnit(value));
            };
            let overflow = || DurationParseError::Overflow(value.clone());
            let duration = match unit {
                Token::NanoSeconds => time::Duration::from_nanos(number),
                Token::MicroSeconds => time::Duration::from_micros(number),
                Token::MilliSeconds => time::Duration::from_millis(number),
                Token::Seconds => time::Duration::from_secs(number),
                Token::Minutes => {
                    time::Duration::from_secs(number.checked_mul(60).ok_or_else(overflow)?)
                }
                Token::Hours => {
                    time::Duration::from_secs(number.checked_mul(3_600).ok_or_else(overflow)?)
                }
                Token::Value => return Err(DurationParseError::MissingUnit(value)),
            };
            total = total.checked_add(duration).ok_or_else(overflow)?;
            terms += 1;
        }

        if terms == 0 {
            return Err(DurationParseError::Empty);
        }

        Ok(Self(total))
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|μs|µs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,
    #[token("h")]
    Hours,

    #[regex("[0-9]+")]
    Value,
}
