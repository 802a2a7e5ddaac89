//! Textual repair of payloads the server rejected with non-null violations.
//!
//! When a server declares a field non-null but resolves it to null, it
//! answers with an error whose locations point at the offending selection
//! in the sent payload. The retrier cuts those selections out of the text and
//! sends the smaller payload again, a bounded number of times.

use crate::transport::{Exchange, GraphQLResponse, Location, Transport};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Message prefix of the only error shape the retrier handles.
pub const NON_NULL_VIOLATION: &str = "Cannot return null for non-nullable field";

/// How a retry sequence ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// The errors are of a kind the retrier does not touch.
    NotRetryable,
    /// A repaired payload came back without errors.
    Recovered {
        payload: String,
        exchange: Exchange,
        attempts: usize,
    },
    /// Ran out of attempts, or could not shrink the payload any further.
    Failed {
        payload: String,
        exchange: Option<Exchange>,
        attempts: usize,
    },
}

impl RetryOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RetryOutcome::Recovered { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Retrier {
    max_retries: usize,
}

impl Retrier {
    /// `max_retries` bounds how many repaired payloads are sent.
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }

    /// Repair `payload` against `response` and resend until the server
    /// accepts it or the attempts run out.
    pub fn retry<T: Transport + ?Sized>(
        &self,
        transport: &T,
        payload: &str,
        response: &GraphQLResponse,
    ) -> RetryOutcome {
        if !is_retryable(response) {
            return RetryOutcome::NotRetryable;
        }

        let mut payload = payload.to_string();
        let mut response = response.clone();
        let mut last_exchange = None;
        for attempt in 1..=self.max_retries {
            if !is_retryable(&response) {
                debug!(attempt, "retry answered with a different error, giving up");
                return RetryOutcome::Failed {
                    payload,
                    exchange: last_exchange,
                    attempts: attempt - 1,
                };
            }
            let Some(repaired) = repair(&payload, &error_locations(&response)) else {
                debug!(attempt, "nothing left to remove from payload");
                return RetryOutcome::Failed {
                    payload,
                    exchange: last_exchange,
                    attempts: attempt - 1,
                };
            };
            payload = repaired;
            info!(attempt, payload = %payload, "retrying with repaired payload");

            let exchange = match transport.send(&payload) {
                Ok(exchange) => exchange,
                Err(err) => {
                    debug!(attempt, error = %err, "retry request failed");
                    return RetryOutcome::Failed {
                        payload,
                        exchange: None,
                        attempts: attempt,
                    };
                }
            };
            match &exchange.response {
                Some(next) if !next.has_errors() => {
                    return RetryOutcome::Recovered {
                        payload,
                        exchange,
                        attempts: attempt,
                    };
                }
                Some(next) => {
                    response = next.clone();
                    last_exchange = Some(exchange);
                }
                None => {
                    return RetryOutcome::Failed {
                        payload,
                        exchange: Some(exchange),
                        attempts: attempt,
                    };
                }
            }
        }

        RetryOutcome::Failed {
            payload,
            exchange: last_exchange,
            attempts: self.max_retries,
        }
    }
}

/// True when the response has errors and every one is a non-null violation.
pub fn is_retryable(response: &GraphQLResponse) -> bool {
    let errors = response.errors();
    !errors.is_empty()
        && errors
            .iter()
            .all(|e| e.message.contains(NON_NULL_VIOLATION))
}

fn error_locations(response: &GraphQLResponse) -> Vec<Location> {
    response
        .errors()
        .iter()
        .flat_map(|e| e.locations.iter().copied())
        .collect()
}

/// Remove the selections at `locations` from `payload`.
///
/// A location on a line opening a block removes the whole block through its
/// closing brace; on a closing brace it does nothing; on any other line it
/// removes that line. Blocks left empty
/// afterwards are removed too. Returns `None` when nothing changed or when
/// nothing selectable would remain.
pub fn repair(payload: &str, locations: &[Location]) -> Option<String> {
    let mut lines: Vec<&str> = payload.lines().collect();
    let targets: BTreeSet<usize> = locations
        .iter()
        .filter(|l| l.line >= 1 && l.line <= lines.len())
        .map(|l| l.line - 1)
        .collect();

    // Bottom-up, so earlier indices stay valid.
    let mut changed = false;
    for &start in targets.iter().rev() {
        if start >= lines.len() {
            continue;
        }
        let line = lines[start].trim();
        if line.is_empty() || line.starts_with('}') {
            continue;
        }
        let end = if line.ends_with('{') {
            match block_end(&lines, start) {
                Some(end) => end,
                None => continue,
            }
        } else {
            start
        };
        lines.drain(start..=end);
        changed = true;
    }
    if !changed {
        return None;
    }

    prune_empty_blocks(&mut lines);
    if lines.is_empty() {
        return None;
    }
    Some(lines.join("\n"))
}

/// Index of the line closing the block opened on `start`, if `start` opens one.
fn block_end(lines: &[&str], start: usize) -> Option<usize> {
    if !lines[start].trim_end().ends_with('{') {
        return None;
    }
    let mut depth = 0i64;
    for (index, line) in lines.iter().enumerate().skip(start) {
        depth += brace_delta(line);
        if depth <= 0 {
            return Some(index);
        }
    }
    None
}

/// Net `{` minus `}` outside string literals.
fn brace_delta(line: &str) -> i64 {
    let mut delta = 0;
    let mut in_string = false;
    let mut escaped = false;
    for c in line.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

fn prune_empty_blocks(lines: &mut Vec<&str>) {
    loop {
        let empty = lines.windows(2).position(|pair| {
            pair[0].trim_end().ends_with('{') && pair[1].trim() == "}"
        });
        match empty {
            Some(index) => {
                lines.drain(index..=index + 1);
            }
            None => break,
        }
    }
}
