//! Prompt recognition and output cleanup for interactive device shells.
//!
//! The shell transport streams raw text. A command is complete when the
//! last (unterminated) line of the buffer looks like a prompt. Paging
//! markers such as `--More--` must be answered with a space, and a trailing
//! `Password:` asks for the enable secret.

use std::borrow::Cow;

use log::trace;
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

use crate::error::ConnectError;
use crate::vendor::VendorProfile;

/// Carriage returns and backspaces some devices emit at the start of a line.
pub static IGNORE_START_LINE: Lazy<Regex> =
    Lazy::new(
        || match Regex::new(r"^(\r+(\s+\r+)*)|(\u{8}+(\s+\u{8}+)*)") {
            Ok(re) => re,
            Err(err) => panic!("invalid IGNORE_START_LINE regex: {err}"),
        },
    );

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| match Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]") {
    Ok(re) => re,
    Err(err) => panic!("invalid ANSI_ESCAPE regex: {err}"),
});

static MORE_MARKER: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(r"(?i)(-+\s*more\s*-+|<-+\s*more\s*-+>|press any key to continue)\s*$") {
        Ok(re) => re,
        Err(err) => panic!("invalid MORE_MARKER regex: {err}"),
    }
});

static PASSWORD_REQUEST: Lazy<Regex> = Lazy::new(|| match Regex::new(r"(?i)password:\s*$") {
    Ok(re) => re,
    Err(err) => panic!("invalid PASSWORD_REQUEST regex: {err}"),
});

/// Matches idle shell prompts for one vendor.
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    prompts: RegexSet,
}

impl PromptMatcher {
    pub fn new<I, S>(patterns: I) -> Result<Self, ConnectError>
    where
        S: AsRef<str>,
        I: IntoIterator<Item = S>,
    {
        Ok(Self {
            prompts: RegexSet::new(patterns)?,
        })
    }

    pub fn for_profile(profile: &VendorProfile) -> Result<Self, ConnectError> {
        Self::new(profile.prompt_patterns.iter().copied())
    }

    /// True when the last line of `buffer` is a prompt.
    pub fn is_prompt(&self, buffer: &str) -> bool {
        let tail = clean_line(last_line(buffer));
        let matched = !tail.trim().is_empty() && self.prompts.is_match(&tail);
        trace!("Prompt check on {:?}: {}", tail, matched);
        matched
    }
}

/// Returns the last line of `buffer`, which may be unterminated.
pub fn last_line(buffer: &str) -> &str {
    let trimmed = buffer.trim_end_matches(['\r', '\n']);
    match trimmed.rfind('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// True when the buffer ends in a pagination marker.
pub fn has_more_marker(buffer: &str) -> bool {
    MORE_MARKER.is_match(buffer)
}

/// Removes a trailing pagination marker from `buffer`.
pub fn strip_more_marker(buffer: &mut String) {
    if let Some(found) = MORE_MARKER.find(buffer) {
        buffer.truncate(found.start());
    }
}

/// True when the shell is waiting for a password.
pub fn wants_password(buffer: &str) -> bool {
    PASSWORD_REQUEST.is_match(buffer)
}

/// Drops leading carriage returns/backspaces and ANSI escapes from a line.
pub fn clean_line(line: &str) -> Cow<'_, str> {
    let line = IGNORE_START_LINE.replace(line, "");
    if ANSI_ESCAPE.is_match(&line) {
        Cow::Owned(ANSI_ESCAPE.replace_all(&line, "").into_owned())
    } else {
        line
    }
}

/// Extracts the command's own output from everything the shell echoed.
///
/// The echoed command line (possibly prefixed by the prompt) and the
/// trailing prompt line are removed.
pub fn extract_output(command: &str, raw: &str, matcher: &PromptMatcher) -> String {
    let mut lines = raw
        .split('\n')
        .map(|line| clean_line(line).trim_end_matches('\r').to_string())
        .collect::<Vec<_>>();

    if let Some(first) = lines.first()
        && !command.is_empty()
        && first.trim_end().ends_with(command.trim())
    {
        lines.remove(0);
    }

    while let Some(last) = lines.last() {
        if last.trim().is_empty() || matcher.is_prompt(last) {
            lines.pop();
        } else {
            break;
        }
    }

    lines.join("\n")
}
