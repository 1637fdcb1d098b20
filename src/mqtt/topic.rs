use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A validated MQTT topic filter.
///
/// Parsing enforces the wildcard rules of [MQTT-4.7.1]: every `#` must stand
/// alone as the final level and every `+` must stand alone in its level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    /// The unadulterated filter string. Must not be empty.
    string: Box<str>,
}

#[derive(thiserror::Error, Debug)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum FilterParseError {
    /// Filter must not be empty.
    #[error("filter must not be empty")]
    EmptyFilter,

    /// A level mixes a wildcard character with other characters.
    #[error("level {level:?} mixes a wildcard with other characters")]
    InvalidLevel { level: String },

    /// Found a `#` wildcard and it wasn't the end of the filter.
    #[error("filter contains a `#` wildcard that isn't trailing")]
    InvalidWildcard,
}

impl FromStr for Filter {
    type Err = FilterParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        if string.is_empty() {
            return Err(FilterParseError::EmptyFilter);
        }

        let mut levels = string.split('/').peekable();

        while let Some(level) = levels.next() {
            if level == "#" {
                // `#` cannot appear in the middle of a filter.
                if levels.peek().is_some() {
                    return Err(FilterParseError::InvalidWildcard);
                }
            } else if level.contains('#') || (level.contains('+') && level != "+") {
                return Err(FilterParseError::InvalidLevel {
                    level: level.into(),
                });
            }
        }

        Ok(Filter {
            string: string.into(),
        })
    }
}

impl Filter {
    pub fn as_str(&self) -> &str {
        &self.string
    }

    /// Returns `true` if this filter matches the given topic.
    ///
    /// Topics starting with `$` belong to the broker and are never matched,
    /// so a `#` subscriber cannot capture system traffic.
    ///
    /// Levels are compared one by one: `+` accepts any single level, and a
    /// trailing `#` accepts the parent level plus any number of child levels.
    /// Anything else requires the filter and topic to have the same number of
    /// levels.
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic.is_empty() || topic.starts_with('$') {
            return false;
        }

        let mut levels = self.string.split('/');
        let mut topic_levels = topic.split('/');

        loop {
            match (levels.next(), topic_levels.next()) {
                // `#` matches the remaining levels, including none at all.
                (Some("#"), _) => return true,
                (Some(level), Some(topic_level)) => {
                    if level != "+" && level != topic_level {
                        return false;
                    }
                }
                // Both exhausted at the same time: every level matched.
                (None, None) => return true,
                // One side has levels left over.
                (Some(_), None) | (None, Some(_)) => return false,
            }
        }
    }

    /// If this filter contains no wildcards, returns `Ok` with the whole
    /// filter; otherwise `Err` with its longest wildcard-free prefix.
    ///
    /// The prefix is chosen so that every topic the filter can match starts
    /// with it, which lets the retained-message store bound its range scan.
    pub fn exact_or_prefix(&self) -> Result<&str, &str> {
        if &*self.string == "#" {
            return Err("");
        }

        // A trailing `/#` also matches the parent level itself, so the prefix
        // must stop before the separator.
        let prefix = self.string.strip_suffix("/#").unwrap_or(&self.string);

        match prefix.find('+') {
            Some(position) => Err(&prefix[..position]),
            None if prefix.len() != self.string.len() => Err(prefix),
            None => Ok(prefix),
        }
    }
}

impl Borrow<str> for Filter {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string)
    }
}

#[cfg(test)]
mod tests {
    use super::{Filter, FilterParseError};

    use std::str::FromStr;

    #[track_caller]
    fn filter(filter: &str) -> Filter {
        filter
            .parse()
            .unwrap_or_else(|e| panic!("filter {filter:?} failed to parse: {e:?}"))
    }

    #[test]
    fn matches_topic() {
        /// Assert that `pattern` matches all of `matches` and none of `rejects`.
        #[track_caller]
        fn test_filter(pattern: &str, matches: &[&str], rejects: &[&str]) {
            let parsed = filter(pattern);

            for topic in matches {
                assert!(
                    parsed.matches_topic(topic),
                    "filter {pattern:?} should match topic {topic:?} but doesn't"
                );
            }

            for topic in rejects {
                assert!(
                    !parsed.matches_topic(topic),
                    "filter {pattern:?} shouldn't match topic {topic:?} but does"
                );
            }
        }

        // Exact filters only match themselves.
        test_filter("foo/bar", &["foo/bar"], &["foo", "foo/bar/baz", "foo/baz"]);

        // A level must match in full.
        test_filter("foo", &["foo"], &["foo/bar", "fo", "fooo"]);

        // Single-level wildcards accept exactly one level, empty included.
        test_filter(
            "sport/+",
            &["sport/tennis", "sport/"],
            &["sport", "sport/tennis/player1"],
        );
        test_filter("+/tennis", &["sport/tennis", "/tennis"], &["tennis"]);
        test_filter("+", &["sport"], &["sport/tennis", "/finance"]);

        // The multi-level wildcard matches the parent and any number of children.
        test_filter(
            "sport/#",
            &["sport", "sport/tennis", "sport/tennis/player1"],
            &["sports", "other"],
        );
        test_filter("#", &["sport", "sport/tennis", "/"], &[]);

        // Topics reserved for the broker never match, not even `#`.
        test_filter("#", &[], &["$SYS/broker/uptime"]);
        test_filter("+/broker/uptime", &[], &["$SYS/broker/uptime"]);
        test_filter("$SYS/broker/uptime", &[], &["$SYS/broker/uptime"]);

        // Empty levels are real levels.
        test_filter("foo//bar", &["foo//bar"], &["foo/bar"]);
        test_filter("/", &["/"], &["", "//"]);
    }

    #[test]
    fn exact_or_prefix() {
        assert_eq!(filter("foo/bar").exact_or_prefix(), Ok("foo/bar"));
        assert_eq!(filter("#").exact_or_prefix(), Err(""));
        assert_eq!(filter("+").exact_or_prefix(), Err(""));
        assert_eq!(filter("foo/#").exact_or_prefix(), Err("foo"));
        assert_eq!(filter("foo/+/baz").exact_or_prefix(), Err("foo/"));
        assert_eq!(filter("foo/bar/+").exact_or_prefix(), Err("foo/bar/"));

        // Every topic a filter matches must start with the reported prefix.
        for pattern in ["foo/#", "foo/+", "foo/+/baz", "+/bar", "#"] {
            let parsed = filter(pattern);
            let prefix = parsed.exact_or_prefix().unwrap_err();

            for topic in ["foo", "foo/", "foo/bar", "foo/bar/baz", "foo/x/baz"] {
                if parsed.matches_topic(topic) {
                    assert!(
                        topic.starts_with(prefix),
                        "{topic:?} matched by {pattern:?} but misses prefix {prefix:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn rejects_invalid_filters() {
        assert_eq!(
            Filter::from_str(""),
            Err(FilterParseError::EmptyFilter),
        );
        assert_eq!(
            Filter::from_str("#/bar"),
            Err(FilterParseError::InvalidWildcard),
        );
        assert_eq!(
            Filter::from_str("sport/ten#nis"),
            Err(FilterParseError::InvalidLevel {
                level: "ten#nis".into()
            }),
        );
        assert_eq!(
            Filter::from_str("sport/ten+nis/player1"),
            Err(FilterParseError::InvalidLevel {
                level: "ten+nis".into()
            }),
        );
    }
}
