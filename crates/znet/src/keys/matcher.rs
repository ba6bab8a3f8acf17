// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Key expression matching.
//!
//! # Wildcard Syntax
//!
//! - `*` matches any run of characters inside one segment (never `/`)
//! - `**` as a whole segment matches zero or more segments
//!
//! # Examples
//!
//! ```text
//! "/a/*"       intersects "/a/b", not "/a/b/c"
//! "/a/**"      intersects "/a", "/a/b", "/a/b/c"
//! "/a/x*"      intersects "/a/*y"  (both match "/a/xy")
//! ```
//!
//! [`intersect`] answers "is there a concrete key matched by both sides" and is
//! symmetric. [`includes`] answers "is every key matched by the right side also
//! matched by the left side".
//!
//! # Cost
//!
//! When only one side holds wildcards (a subscription against a written key,
//! the common case) matching is a greedy glob walk over the `split`
//! iterators: no allocation, `O(n * m)` element comparisons. When both sides
//! hold wildcards a single DP row of `m + 1` flags is allocated.

const SEPARATOR: char = '/';
const WILD: u8 = b'*';
const DOUBLE_WILD: &str = "**";

/// True when the expression contains a wildcard.
#[inline]
pub fn has_wildcards(key: &str) -> bool {
    key.as_bytes().contains(&WILD)
}

/// Check whether two key expressions match at least one common key.
pub fn intersect(a: &str, b: &str) -> bool {
    // Fast path: identical expressions always intersect
    if a == b {
        return true;
    }
    match (has_wildcards(a), has_wildcards(b)) {
        (false, false) => false,
        (true, false) => key_matches(a, b),
        (false, true) => key_matches(b, a),
        (true, true) => star_rows(
            a.split(SEPARATOR),
            b.split(SEPARATOR),
            is_double_wild,
            Sides::Both,
            |x, y| chunks_intersect(x, y),
        ),
    }
}

/// Check whether `a` matches every key that `b` matches.
pub fn includes(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (has_wildcards(a), has_wildcards(b)) {
        (false, _) => false,
        (true, false) => key_matches(a, b),
        (true, true) => star_rows(
            a.split(SEPARATOR),
            b.split(SEPARATOR),
            is_double_wild,
            Sides::Left,
            |x, y| chunk_includes(x, y),
        ),
    }
}

#[inline]
fn is_double_wild(segment: &&str) -> bool {
    *segment == DOUBLE_WILD
}

#[inline]
fn is_wild(byte: &&u8) -> bool {
    **byte == WILD
}

/// `pattern` matches the wildcard-free `key`.
fn key_matches(pattern: &str, key: &str) -> bool {
    glob(
        pattern.split(SEPARATOR),
        key.split(SEPARATOR),
        is_double_wild,
        |p, k| chunk_matches(p, k),
    )
}

/// `pattern` chunk matches the wildcard-free `chunk`.
fn chunk_matches(pattern: &str, chunk: &str) -> bool {
    if pattern == chunk {
        return true;
    }
    glob(
        pattern.as_bytes().iter(),
        chunk.as_bytes().iter(),
        is_wild,
        |p, c| p == c,
    )
}

fn chunks_intersect(a: &str, b: &str) -> bool {
    match (has_wildcards(a), has_wildcards(b)) {
        (false, false) => a == b,
        (true, false) => chunk_matches(a, b),
        (false, true) => chunk_matches(b, a),
        (true, true) => star_rows(
            a.as_bytes().iter(),
            b.as_bytes().iter(),
            is_wild,
            Sides::Both,
            |x, y| x == y,
        ),
    }
}

fn chunk_includes(a: &str, b: &str) -> bool {
    match (has_wildcards(a), has_wildcards(b)) {
        (_, false) => chunk_matches(a, b),
        (false, true) => false,
        (true, true) => star_rows(
            a.as_bytes().iter(),
            b.as_bytes().iter(),
            is_wild,
            Sides::Left,
            |x, y| x == y,
        ),
    }
}

/// Greedy glob: `pattern` may hold stars, `text` holds none.
///
/// On a mismatch the most recent star swallows one more element and matching
/// resumes right after it; earlier stars never need revisiting.
fn glob<I>(
    pattern: I,
    text: I,
    is_star: impl Fn(&I::Item) -> bool,
    matches: impl Fn(&I::Item, &I::Item) -> bool,
) -> bool
where
    I: Iterator + Clone,
{
    let (mut p, mut t) = (pattern, text);
    // (pattern after the last star, text where that star's span ends)
    let mut resume: Option<(I, I)> = None;

    loop {
        let mut p_next = p.clone();
        let mut t_next = t.clone();
        match (p_next.next(), t_next.next()) {
            (Some(pc), _) if is_star(&pc) => {
                resume = Some((p_next.clone(), t.clone()));
                p = p_next;
            }
            (Some(pc), Some(tc)) if matches(&pc, &tc) => {
                p = p_next;
                t = t_next;
            }
            (None, None) => return true,
            _ => match resume.as_mut() {
                Some((rp, rt)) => {
                    if rt.next().is_none() {
                        return false;
                    }
                    p = rp.clone();
                    t = rt.clone();
                }
                None => return false,
            },
        }
    }
}

/// Which side's stars may absorb elements of the other side.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Sides {
    /// Either side (intersection).
    Both,
    /// Left side only (inclusion).
    Left,
}

/// Prefix DP over two sequences that may both hold stars, one row at a time.
///
/// `row[j]` holds whether the current prefix of `a` and the first `j`
/// elements of `b` are compatible.
fn star_rows<I>(
    a: I,
    b: I,
    is_star: impl Fn(&I::Item) -> bool,
    sides: Sides,
    matches: impl Fn(&I::Item, &I::Item) -> bool,
) -> bool
where
    I: Iterator + Clone,
{
    let columns = b.clone().count();
    let mut row = vec![false; columns + 1];
    row[0] = true;
    if sides == Sides::Both {
        for (j, bj) in b.clone().enumerate() {
            row[j + 1] = row[j] && is_star(&bj);
        }
    }

    for ai in a {
        let a_star = is_star(&ai);
        let mut diag = row[0];
        row[0] = row[0] && a_star;
        for (j, bj) in b.clone().enumerate() {
            let up = row[j + 1];
            let left = row[j];
            row[j + 1] = if a_star {
                up || left
            } else if is_star(&bj) {
                sides == Sides::Both && (up || left)
            } else {
                diag && matches(&ai, &bj)
            };
            diag = up;
        }
    }
    row[columns]
}
