//! Hard (name/path) and soft (size/time) filters.
//!
//! The hard filter is a list of glob-like patterns applied during the scan;
//! the soft filter is applied after, by the categorizer, per §4.2's
//! rationale that soft filters can match asymmetrically across sides.
//! There is no filtering code in artid to ground this against directly, so
//! the glob grammar is implemented straight from the specification's
//! "Filter syntax" paragraph in §6.

use std::path::Path;

/// One include/exclude pattern list, matched against slash-normalized
/// relative paths.
///
/// Wildcards: `*` matches any run of non-separator characters, `?` matches
/// one character, and a leading/trailing `/` anchors the pattern to the
/// start or end of the path. `/**/` is handled implicitly: `**` is treated
/// as matching across separators wherever it appears.
#[derive(Clone, Debug, Default)]
pub struct HardFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl HardFilter {
    /// A filter that excludes nothing and includes everything.
    pub fn pass_all() -> Self {
        Self::default()
    }

    /// Builds a filter from include and exclude pattern lists.
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// Whether `relative_path` passes this filter: included (or no include
    /// list given) and not excluded.
    pub fn matches(&self, relative_path: &Path) -> bool {
        let normalized = normalize(relative_path);
        let included = self.include.is_empty() || self.include.iter().any(|p| glob_match(p, &normalized));
        let excluded = self.exclude.iter().any(|p| glob_match(p, &normalized));
        included && !excluded
    }
}

/// The size/time filter applied by the categorizer after traversal.
#[derive(Copy, Clone, Debug, Default)]
pub struct SoftFilter {
    /// Items smaller than this are excluded, if set.
    pub min_size: Option<u64>,
    /// Items larger than this are excluded, if set.
    pub max_size: Option<u64>,
    /// Items older (smaller mod-time) than this are excluded, if set.
    pub min_mod_time: Option<i64>,
}

impl SoftFilter {
    /// A filter that excludes nothing.
    pub fn pass_all() -> Self {
        Self::default()
    }

    /// Whether a file with the given size and mod-time passes.
    pub fn matches(&self, size: u64, mod_time: i64) -> bool {
        if let Some(min) = self.min_size {
            if size < min {
                return false;
            }
        }
        if let Some(max) = self.max_size {
            if size > max {
                return false;
            }
        }
        if let Some(min_time) = self.min_mod_time {
            if mod_time < min_time {
                return false;
            }
        }
        true
    }
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let anchored_start = pattern.starts_with('/');
    // A trailing slash marks a directory pattern: it matches that directory
    // itself and anything below it, so the match may stop at any `/`
    // boundary in `text`, not just at the very end.
    let anchored_end = pattern.ends_with('/');
    let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
    let pattern = pattern.replace("/**/", "/*/");
    let pat_chars: Vec<char> = pattern.chars().collect();

    let mut boundaries: Vec<usize> = vec![0];
    boundaries.extend(text.char_indices().map(|(i, c)| i + c.len_utf8()));

    let starts: Vec<usize> = if anchored_start {
        vec![0]
    } else {
        boundaries.clone()
    };

    let is_dir_boundary = |pos: usize| pos == text.len() || text.as_bytes()[pos] == b'/';

    for &start in &starts {
        let ends: Vec<usize> = if anchored_end {
            boundaries.iter().copied().filter(|&e| e >= start && is_dir_boundary(e)).collect()
        } else {
            boundaries.iter().copied().filter(|&e| e >= start).collect()
        };
        for end in ends {
            if glob_match_exact(&pat_chars, &text[start..end]) {
                return true;
            }
        }
    }
    false
}

fn glob_match_exact(pattern: &[char], text: &str) -> bool {
    fn go(pattern: &[char], text: &[char]) -> bool {
        match pattern.first() {
            None => text.is_empty(),
            Some('*') => (0..=text.len()).any(|i| go(&pattern[1..], &text[i..])),
            Some('?') => !text.is_empty() && go(&pattern[1..], &text[1..]),
            Some(c) => !text.is_empty() && text[0] == *c && go(&pattern[1..], &text[1..]),
        }
    }
    let text_chars: Vec<char> = text.chars().collect();
    go(pattern, &text_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn star_matches_any_run_within_a_segment() {
        let filter = HardFilter::new(vec![], vec!["*.tmp".into()]);
        assert!(!filter.matches(&PathBuf::from("a/b.tmp")));
        assert!(filter.matches(&PathBuf::from("a/b.txt")));
    }

    #[test]
    fn anchored_prefix_only_matches_from_start() {
        let filter = HardFilter::new(vec![], vec!["/build/".into()]);
        assert!(!filter.matches(&PathBuf::from("build/out.o")));
        assert!(filter.matches(&PathBuf::from("src/build/out.o")));
    }

    #[test]
    fn soft_filter_excludes_by_size_and_time() {
        let filter = SoftFilter {
            min_size: Some(100),
            max_size: None,
            min_mod_time: Some(1_000),
        };
        assert!(!filter.matches(50, 2_000));
        assert!(!filter.matches(200, 500));
        assert!(filter.matches(200, 2_000));
    }
}
