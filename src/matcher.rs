//! Release matchers
//!
//! A matcher turns a binary posting's subject line into structured segment
//! coordinates (release name, file name, file x/y, part x/y). Patterns are
//! written as templates over a fixed macro table, compiled case-insensitive
//! and anchored at both ends, and scoped to newsgroups by a shell-style
//! glob. The registry is immutable after load; the first matching pattern
//! wins.

use regex::Regex;
use std::path::Path;

use crate::error::{IndexError, Result};

/// Macro table interpolated into templates before compilation.
///
/// `{release}` and `{file_name}` carry the names; the bracketed pairs carry
/// the file/part coordinates in their two common spellings.
const MACROS: &[(&str, &str)] = &[
    ("release", r"(?P<release_name>.+?)"),
    ("comment", r"(?P<comment>.+?)"),
    ("seperator", r"(?:-|\|\|)"),
    ("parts_p", r"\((?P<part_number>\d+)(?:/| of )(?P<part_total>\d+)\)"),
    ("parts_b", r"\[(?P<part_number>\d+)(?:/| of )(?P<part_total>\d+)\]"),
    ("files_b", r"\[(?P<file_number>\d+)(?:/| ?of ?)(?P<file_total>\d+)\]"),
    (
        "file_name_parts",
        r"(?P<file_name>.+\.part(?P<file_number>\d+)\.rar)",
    ),
    ("file_name", r#"(?P<file_name>[^"]+)"#),
    ("yenc", "yEnc"),
];

/// Default templates covering the common binaries subject shapes.
const BUILTIN_TEMPLATES: &[&str] = &[
    r#"{release} {files_b} - "{file_name}" {yenc} {parts_p}"#,
    r#"{release} {seperator} {files_b} - "{file_name}" {yenc} {parts_p}"#,
    r#"{release} - "{file_name_parts}" {yenc} {parts_p}"#,
    r#"{release} - "{file_name}" {yenc} {parts_p}"#,
    r#""{file_name}" {yenc} {parts_p}"#,
];

/// Expand `{macro}` references in a template into a full regex source.
///
/// Text outside braces passes through untouched (it is regex source, not a
/// literal), so templates can use their own character classes.
pub fn expand_template(template: &str) -> Result<String> {
    let mut out = String::with_capacity(template.len() * 2);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| IndexError::Matcher(format!("unclosed macro in: {}", template)))?;
        let name = &after[..close];
        let expansion = MACROS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, e)| *e)
            .ok_or_else(|| IndexError::Matcher(format!("unknown macro: {{{}}}", name)))?;
        out.push_str(expansion);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Translate a shell-style group glob (`*`, `?`) into an anchored regex.
fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut source = String::with_capacity(glob.len() + 8);
    source.push('^');
    for c in glob.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            c => source.push_str(&regex::escape(&c.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| IndexError::Matcher(format!("bad group glob {}: {}", glob, e)))
}

/// Segment coordinates captured from a subject line
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentFields {
    /// Release the article belongs to
    pub release_name: String,
    /// File within the release
    pub file_name: String,
    /// Total files in the release (0 = unknown)
    pub file_total: u32,
    /// This file's number (0 = unknown)
    pub file_number: u32,
    /// Total parts in this file (0 = unknown)
    pub part_total: u32,
    /// This part's number (0 = unknown)
    pub part_number: u32,
}

/// One compiled matcher: regex + group glob + description
pub struct Matcher {
    template: String,
    group_glob: String,
    description: String,
    regex: Regex,
    group_regex: Regex,
}

impl Matcher {
    /// Compile a template scoped by a group glob.
    ///
    /// The compiled regex is case-insensitive and anchored at both ends.
    pub fn new(template: &str, group_glob: &str, description: &str) -> Result<Self> {
        let expanded = expand_template(template)?;
        let source = format!("(?i)^{}$", expanded);
        let regex = Regex::new(&source)
            .map_err(|e| IndexError::Matcher(format!("{}: {}", description, e)))?;
        let group_regex = glob_to_regex(group_glob)?;

        Ok(Self {
            template: template.to_string(),
            group_glob: group_glob.to_string(),
            description: description.to_string(),
            regex,
            group_regex,
        })
    }

    /// The original template line, as loaded
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The newsgroup glob this matcher applies to
    pub fn group_glob(&self) -> &str {
        &self.group_glob
    }

    /// Matcher description (the template file line number)
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether this matcher applies to `group`
    pub fn applies_to(&self, group: &str) -> bool {
        self.group_regex.is_match(group)
    }

    /// Run this matcher against a subject line
    pub fn match_subject(&self, subject: &str) -> Option<SegmentFields> {
        let caps = self.regex.captures(subject)?;

        let text = |name: &str| {
            caps.name(name)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };
        let int = |name: &str| {
            caps.name(name)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0)
        };

        let file_name = text("file_name");
        let mut release_name = text("release_name");
        if release_name.is_empty() {
            release_name = file_name.clone();
        }

        // A match that names nothing identifies no segment
        if release_name.is_empty() && file_name.is_empty() {
            return None;
        }

        Some(SegmentFields {
            release_name,
            file_name,
            file_total: int("file_total"),
            file_number: int("file_number"),
            part_total: int("part_total"),
            part_number: int("part_number"),
        })
    }
}

/// Ordered, immutable set of matchers; first match wins
pub struct MatcherRegistry {
    matchers: Vec<Matcher>,
}

impl MatcherRegistry {
    /// Registry with the built-in templates
    pub fn builtin() -> Self {
        let matchers = BUILTIN_TEMPLATES
            .iter()
            .enumerate()
            .map(|(i, t)| Matcher::new(t, "*", &format!("builtin:{}", i + 1)))
            .collect::<Result<Vec<_>>>()
            .expect("builtin templates compile");
        Self { matchers }
    }

    /// Load a registry from template lines.
    ///
    /// Blank lines and `#` comments are skipped. A line may scope itself
    /// with a glob followed by a tab (`alt.binaries.*<TAB>template`); a line
    /// without a tab applies to all groups. The 1-based line number becomes
    /// the matcher description.
    pub fn from_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Self> {
        let mut matchers = Vec::new();
        for (idx, line) in lines.enumerate() {
            let line = line.trim_end();
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }

            let (glob, template) = match line.split_once('\t') {
                Some((glob, template)) => (glob.trim(), template.trim()),
                None => ("*", line.trim()),
            };

            matchers.push(Matcher::new(template, glob, &format!("line:{}", idx + 1))?);
        }
        Ok(Self { matchers })
    }

    /// Load a registry from a template file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| IndexError::Matcher(format!("{}: {}", path.display(), e)))?;
        Self::from_lines(contents.lines())
    }

    /// The matchers, in registration order
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Match a subject within a group: the first applicable matcher that
    /// fully matches decides the outcome.
    pub fn match_subject(&self, group: &str, subject: &str) -> Option<SegmentFields> {
        self.matchers
            .iter()
            .filter(|m| m.applies_to(group))
            .find_map(|m| m.match_subject(subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_template_round_trip() {
        let template = r#"{release} {files_b} - "{file_name}" {yenc} {parts_p}"#;
        let expanded = expand_template(template).unwrap();
        assert_eq!(
            expanded,
            r#"(?P<release_name>.+?) \[(?P<file_number>\d+)(?:/| ?of ?)(?P<file_total>\d+)\] - "(?P<file_name>[^"]+)" yEnc \((?P<part_number>\d+)(?:/| of )(?P<part_total>\d+)\)"#
        );
    }

    #[test]
    fn test_expand_template_unknown_macro() {
        assert!(matches!(
            expand_template("{nonsense}"),
            Err(IndexError::Matcher(_))
        ));
    }

    #[test]
    fn test_expand_template_unclosed_macro() {
        assert!(expand_template("{release oops").is_err());
    }

    #[test]
    fn test_canonical_subject_captures() {
        let matcher = Matcher::new(
            r#"{release} {files_b} - "{file_name}" {yenc} {parts_p}"#,
            "*",
            "test",
        )
        .unwrap();

        let fields = matcher
            .match_subject(r#"My.Release.Name [01/10] - "file01.rar" yEnc (1/42)"#)
            .unwrap();

        assert_eq!(fields.release_name, "My.Release.Name");
        assert_eq!(fields.file_name, "file01.rar");
        assert_eq!(fields.file_number, 1);
        assert_eq!(fields.file_total, 10);
        assert_eq!(fields.part_number, 1);
        assert_eq!(fields.part_total, 42);
    }

    #[test]
    fn test_match_is_case_insensitive_and_anchored() {
        let matcher = Matcher::new(r#""{file_name}" {yenc} {parts_p}"#, "*", "test").unwrap();

        assert!(matcher.match_subject(r#""file.rar" YENC (1/2)"#).is_some());
        // Anchored: trailing garbage breaks the match
        assert!(
            matcher
                .match_subject(r#""file.rar" yEnc (1/2) trailing"#)
                .is_none()
        );
        assert!(
            matcher
                .match_subject(r#"prefix "file.rar" yEnc (1/2)"#)
                .is_none()
        );
    }

    #[test]
    fn test_release_name_defaults_to_file_name() {
        let matcher = Matcher::new(r#""{file_name}" {yenc} {parts_p}"#, "*", "test").unwrap();
        let fields = matcher.match_subject(r#""file01.rar" yEnc (1/3)"#).unwrap();
        assert_eq!(fields.release_name, "file01.rar");
    }

    #[test]
    fn test_integer_captures_default_to_zero() {
        let matcher = Matcher::new(r#"{release} - "{file_name}" {yenc} {parts_p}"#, "*", "test")
            .unwrap();
        let fields = matcher
            .match_subject(r#"Some.Release - "a.bin" yEnc (2 of 9)"#)
            .unwrap();
        assert_eq!(fields.file_number, 0);
        assert_eq!(fields.file_total, 0);
        assert_eq!(fields.part_number, 2);
        assert_eq!(fields.part_total, 9);
    }

    #[test]
    fn test_file_name_parts_captures_file_number() {
        let matcher = Matcher::new(
            r#"{release} - "{file_name_parts}" {yenc} {parts_p}"#,
            "*",
            "test",
        )
        .unwrap();
        let fields = matcher
            .match_subject(r#"Rel - "archive.part07.rar" yEnc (1/5)"#)
            .unwrap();
        assert_eq!(fields.file_name, "archive.part07.rar");
        assert_eq!(fields.file_number, 7);
    }

    #[test]
    fn test_group_glob_scoping() {
        let matcher =
            Matcher::new(r#""{file_name}" {yenc} {parts_p}"#, "alt.binaries.*", "test").unwrap();
        assert!(matcher.applies_to("alt.binaries.tv"));
        assert!(matcher.applies_to("alt.binaries.hdtv"));
        assert!(!matcher.applies_to("comp.lang.rust"));
        // Glob dots are literal
        assert!(!matcher.applies_to("altXbinaries.tv"));
    }

    #[test]
    fn test_registry_first_match_wins() {
        let registry = MatcherRegistry::from_lines(
            vec![
                r#"{release} {files_b} - "{file_name}" {yenc} {parts_p}"#,
                r#""{file_name}" {yenc} {parts_p}"#,
            ]
            .into_iter(),
        )
        .unwrap();

        // Both could match a bare quoted subject; only the second does here
        let fields = registry
            .match_subject("alt.binaries.tv", r#""solo.rar" yEnc (1/1)"#)
            .unwrap();
        assert_eq!(fields.file_name, "solo.rar");

        // The first pattern claims the richer subject
        let fields = registry
            .match_subject(
                "alt.binaries.tv",
                r#"Rel [1/2] - "a.rar" yEnc (1/1)"#,
            )
            .unwrap();
        assert_eq!(fields.release_name, "Rel");
        assert_eq!(fields.file_total, 2);
    }

    #[test]
    fn test_registry_matching_is_deterministic() {
        let registry = MatcherRegistry::builtin();
        let subject = r#"My.Release.Name [01/10] - "file01.rar" yEnc (1/42)"#;
        let a = registry.match_subject("alt.binaries.tv", subject);
        let b = registry.match_subject("alt.binaries.tv", subject);
        assert_eq!(a, b);
    }

    #[test]
    fn test_from_lines_skips_comments_and_blanks() {
        let registry = MatcherRegistry::from_lines(
            vec![
                "# binaries matchers",
                "",
                r#""{file_name}" {yenc} {parts_p}"#,
            ]
            .into_iter(),
        )
        .unwrap();
        assert_eq!(registry.matchers().len(), 1);
        assert_eq!(registry.matchers()[0].description(), "line:3");
        assert_eq!(registry.matchers()[0].group_glob(), "*");
    }

    #[test]
    fn test_from_lines_tab_scoped_glob() {
        let line = format!("alt.binaries.*\t{}", r#""{file_name}" {yenc} {parts_p}"#);
        let registry = MatcherRegistry::from_lines(std::iter::once(line.as_str())).unwrap();
        let m = &registry.matchers()[0];
        assert_eq!(m.group_glob(), "alt.binaries.*");
        assert!(registry.match_subject("comp.misc", r#""f.rar" yEnc (1/1)"#).is_none());
        assert!(
            registry
                .match_subject("alt.binaries.tv", r#""f.rar" yEnc (1/1)"#)
                .is_some()
        );
    }

    #[test]
    fn test_template_round_trip_from_lines() {
        let template = r#"{release} {files_b} - "{file_name}" {yenc} {parts_p}"#;
        let registry = MatcherRegistry::from_lines(std::iter::once(template)).unwrap();
        assert_eq!(registry.matchers()[0].template(), template);
    }

    #[test]
    fn test_builtin_registry_compiles() {
        let registry = MatcherRegistry::builtin();
        assert!(!registry.matchers().is_empty());
    }

    #[test]
    fn test_no_match_for_plain_discussion_subject() {
        let registry = MatcherRegistry::builtin();
        assert!(
            registry
                .match_subject("alt.binaries.tv", "Re: does anyone have this?")
                .is_none()
        );
    }
}
