use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// One maximal run of a natural sort key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Run<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Runs<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Runs<'a> {
    type Item = Run<'a>;

    fn next(&mut self) -> Option<Run<'a>> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (run, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits {
            Run::Digits(run)
        } else {
            Run::Text(run)
        })
    }
}

fn runs(s: &str) -> Runs<'_> {
    Runs { rest: s }
}

/// Compare two ASCII digit runs by numeric value without overflowing on long runs.
fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn cmp_text_runs(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

fn cmp_runs(a: Run<'_>, b: Run<'_>) -> Ordering {
    match (a, b) {
        (Run::Digits(x), Run::Digits(y)) => cmp_digit_runs(x, y),
        (Run::Text(x), Run::Text(y)) => cmp_text_runs(x, y),
        // Heterogeneous naming at the same position: numbers first.
        (Run::Digits(_), Run::Text(_)) => Ordering::Less,
        (Run::Text(_), Run::Digits(_)) => Ordering::Greater,
    }
}

/// Compare two strings in natural order.
///
/// Digit runs compare numerically, other runs compare case-insensitively, a digit run sorts
/// before a text run at the same position, and a key that runs out first sorts first. Keys that
/// are still equal (`"a01"` vs `"a1"`, `"A"` vs `"a"`) fall back to byte order, so only identical
/// strings compare equal.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ra = runs(a);
    let mut rb = runs(b);
    loop {
        match (ra.next(), rb.next()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match cmp_runs(x, y) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
    a.as_bytes().cmp(b.as_bytes())
}

/// Compare two paths in natural order over their full textual form.
pub fn natural_cmp_paths(a: &Path, b: &Path) -> Ordering {
    natural_cmp(&a.to_string_lossy(), &b.to_string_lossy())
        .then_with(|| a.as_os_str().cmp(b.as_os_str()))
}

/// Sort paths in place into natural order.
pub fn sort_natural(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| natural_cmp_paths(a, b));
}

#[cfg(test)]
#[path = "../../tests/unit/ordering/natural.rs"]
mod tests;
