//! Small shared helpers: quoted joins, version ordering, SQL cleanup.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

/// Join `arr` with `sep`, wrapping every element in `wrap`.
///
/// `join_wrap(&["a", "b"], "`", ", ")` yields `` `a`, `b` ``.
pub fn join_wrap(arr: &[String], wrap: &str, sep: &str) -> String {
    if arr.is_empty() {
        return String::new();
    }
    format!(
        "{}{}{}",
        wrap,
        arr.join(&format!("{}{}{}", wrap, sep, wrap)),
        wrap
    )
}

/// Join `arr` with `sep`, wrapping every element in `pre`/`suf`.
pub fn join_pre_suf(arr: &[String], pre: &str, suf: &str, sep: &str) -> String {
    if arr.is_empty() {
        return String::new();
    }
    format!(
        "{}{}{}",
        pre,
        arr.join(&format!("{}{}{}", suf, sep, pre)),
        suf
    )
}

fn transaction_patterns() -> &'static [Regex; 4] {
    static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)begin\s*;").expect("static regex"),
            Regex::new(r"(?i)commit\s*;").expect("static regex"),
            Regex::new(r"(?i)begin\s+transaction\s*;").expect("static regex"),
            Regex::new(r"(?i)commit\s+transaction\s*;").expect("static regex"),
        ]
    })
}

/// Strip `BEGIN;`/`COMMIT;`/`BEGIN TRANSACTION;`/`COMMIT TRANSACTION;`
/// statements from a script, case-insensitively and tolerant of inner
/// whitespace. Used before rehearsing scripts inside the dry-run transaction
/// to avoid nesting.
pub fn clean_transaction(sql: &str) -> String {
    let mut out = sql.to_string();
    for re in transaction_patterns() {
        out = re.replace_all(&out, "").into_owned();
    }
    out
}

/// Compare two dotted-numeric version strings.
///
/// Rules: the empty string is less than any non-empty string; a leading
/// `v`/`V` is stripped; components compare as integers with non-numeric
/// components counting as 0; missing trailing components count as 0, so
/// `1` equals `1.0.0`.
pub fn compare_version(a: &str, b: &str) -> Ordering {
    if a.is_empty() && b.is_empty() {
        return Ordering::Equal;
    }
    if a.is_empty() {
        return Ordering::Less;
    }
    if b.is_empty() {
        return Ordering::Greater;
    }

    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let a = a.strip_prefix('v').unwrap_or(&a);
    let b = b.strip_prefix('v').unwrap_or(&b);

    let a_parts: Vec<&str> = a.split('.').collect();
    let b_parts: Vec<&str> = b.split('.').collect();
    let max_len = a_parts.len().max(b_parts.len());

    for i in 0..max_len {
        let ai: i64 = a_parts.get(i).and_then(|p| p.parse().ok()).unwrap_or(0);
        let bi: i64 = b_parts.get(i).and_then(|p| p.parse().ok()).unwrap_or(0);
        match ai.cmp(&bi) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
