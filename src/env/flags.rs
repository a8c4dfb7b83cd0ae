//! Order-preserving flag lists.

use crate::core::{Sanitizer, SanitizerSet};

/// A list of compiler or linker flags where each flag appears once.
///
/// Flags keep the position of their first insertion, so merging the same
/// inputs always renders the same string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagList {
    flags: Vec<String>,
}

impl FlagList {
    pub fn new() -> Self {
        FlagList::default()
    }

    pub fn push(&mut self, flag: impl Into<String>) {
        let flag = flag.into();
        if flag.is_empty() || self.flags.contains(&flag) {
            return;
        }
        self.flags.push(flag);
    }

    pub fn extend<I, S>(&mut self, flags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for flag in flags {
            self.push(flag);
        }
    }

    pub fn render(&self) -> String {
        self.flags.join(" ")
    }
}

/// User-supplied flags with `-fsanitize=` and `-fno-sanitize=` entries
/// lifted out, so they can be merged with the configured sanitizers instead
/// of repeating them under another spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFlags {
    pub sanitize: SanitizerSet,
    pub no_sanitize: SanitizerSet,
    pub rest: Vec<String>,
}

impl ExtraFlags {
    pub fn split(flags: &[String]) -> Self {
        let mut extra = ExtraFlags::default();
        for flag in flags {
            if let Some(names) = flag
                .strip_prefix("-fsanitize=")
                .and_then(parse_sanitizer_list)
            {
                for sanitizer in names {
                    extra.sanitize.insert(sanitizer);
                }
            } else if let Some(names) = flag
                .strip_prefix("-fno-sanitize=")
                .and_then(parse_sanitizer_list)
            {
                for sanitizer in names {
                    extra.no_sanitize.insert(sanitizer);
                }
            } else {
                extra.rest.push(flag.clone());
            }
        }
        extra
    }
}

/// `None` if any name is malformed; such flags are passed through verbatim.
fn parse_sanitizer_list(list: &str) -> Option<Vec<Sanitizer>> {
    list.split(',').map(|name| name.parse().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_keeps_first_position() {
        let mut flags = FlagList::new();
        flags.extend(["-g", "-O1", "-g", "", "-fno-omit-frame-pointer", "-O1"]);
        assert_eq!(flags.render(), "-g -O1 -fno-omit-frame-pointer");
    }

    #[test]
    fn test_split_lifts_sanitizer_lists() {
        let flags: Vec<String> = [
            "-fsanitize=address",
            "-O1",
            "-fsanitize=undefined,address",
            "-fno-sanitize=function",
            "-fsanitize-recover=address",
            "-fsanitize=,",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let extra = ExtraFlags::split(&flags);
        assert_eq!(extra.sanitize.join().as_deref(), Some("address,undefined"));
        assert_eq!(extra.no_sanitize.join().as_deref(), Some("function"));
        assert_eq!(
            extra.rest,
            vec!["-O1", "-fsanitize-recover=address", "-fsanitize=,"]
        );
    }
}
