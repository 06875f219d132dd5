//! Maps raw log lines to section boundaries.
//!
//! An ordered list of rules; the first rule whose level set contains the
//! line's level and whose pattern matches the message wins. Classification is
//! pure: the classifier holds no mutable state.

use regex::Regex;

use crate::line::{LogLevel, LogLine};
use crate::section::{Section, SectionKind};

/// Levels a rule applies to.
///
/// The upstream configuration surface is loosely typed: a rule's "levels"
/// field is sometimes a single value and sometimes a collection. Resolve to a
/// set at construction time, never at match time.
#[derive(Debug, Clone)]
pub enum LevelSpec {
    Single(LogLevel),
    Set(Vec<LogLevel>),
}

impl LevelSpec {
    fn into_set(self) -> Vec<LogLevel> {
        match self {
            Self::Single(level) => vec![level],
            Self::Set(levels) => levels,
        }
    }
}

/// One boundary-detection rule.
#[derive(Debug)]
pub struct SectionRule {
    pattern: Regex,
    levels: Vec<LogLevel>,
    id_template: &'static str,
    header_template: &'static str,
    kind: SectionKind,
    collapsed: bool,
}

impl SectionRule {
    pub fn new(
        pattern: &str,
        levels: LevelSpec,
        id_template: &'static str,
        header_template: &'static str,
        kind: SectionKind,
        collapsed: bool,
    ) -> Result<Self, String> {
        let pattern = Regex::new(pattern)
            .map_err(|err| format!("compile section rule pattern {pattern:?}: {err}"))?;
        Ok(Self {
            pattern,
            levels: levels.into_set(),
            id_template,
            header_template,
            kind,
            collapsed,
        })
    }

    fn apply(&self, line: &LogLine) -> Option<Section> {
        if !self.levels.contains(&line.lvl) {
            return None;
        }
        let text = line.message_text()?;
        let caps = self.pattern.captures(text)?;
        let groups: Vec<&str> = caps
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str()).unwrap_or(""))
            .collect();
        Some(Section::new(
            &fill_template(self.id_template, &groups),
            &fill_template(self.header_template, &groups),
            self.kind,
            self.collapsed,
        ))
    }
}

/// Substitute successive `{}` placeholders with capture groups, in order.
fn fill_template(template: &str, groups: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut next = 0;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        out.push_str(groups.get(next).copied().unwrap_or(""));
        next += 1;
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

/// Ordered rule list; first match wins.
#[derive(Debug)]
pub struct SectionClassifier {
    rules: Vec<SectionRule>,
}

impl SectionClassifier {
    pub fn new(rules: Vec<SectionRule>) -> Self {
        Self { rules }
    }

    /// The boundary rules for the farm dispatcher's test-shell protocol.
    pub fn with_default_rules() -> Result<Self, String> {
        Ok(Self::new(vec![
            SectionRule::new(
                r"start: 0_dut_boot",
                LevelSpec::Single(LogLevel::Debug),
                "dut_boot",
                "Booting hardware device",
                SectionKind::Boot,
                true,
            )?,
            SectionRule::new(
                r"<?STARTRUN>? (\S+)",
                LevelSpec::Set(vec![LogLevel::Debug, LogLevel::Target]),
                "{}",
                "test_suite {}",
                SectionKind::DutSuite,
                false,
            )?,
            SectionRule::new(
                r"start: \d+_(\S+)",
                LevelSpec::Single(LogLevel::Debug),
                "{}",
                "container test_suite {}",
                SectionKind::NonDutSuite,
                false,
            )?,
            SectionRule::new(
                r"<?STARTTC>? ([^>]+)",
                LevelSpec::Set(vec![LogLevel::Debug, LogLevel::Target]),
                "{}",
                "test_case {}",
                SectionKind::TestCase,
                false,
            )?,
            SectionRule::new(
                r"<?ENDTC>? ([^>]+)",
                LevelSpec::Set(vec![LogLevel::Debug, LogLevel::Target]),
                "post-{}",
                "post-processing {}",
                SectionKind::PostProcessing,
                true,
            )?,
        ]))
    }

    /// First matching rule produces the new section, if any.
    pub fn classify(&self, line: &LogLine) -> Option<Section> {
        self.rules.iter().find_map(|rule| rule.apply(line))
    }
}

#[cfg(test)]
mod tests {
    use super::{fill_template, LevelSpec, SectionClassifier, SectionRule};
    use crate::line::{LogLevel, LogLine};
    use crate::section::SectionKind;

    fn classifier() -> SectionClassifier {
        match SectionClassifier::with_default_rules() {
            Ok(classifier) => classifier,
            Err(err) => panic!("default rules failed to compile: {err}"),
        }
    }

    #[test]
    fn fill_template_substitutes_in_order() {
        assert_eq!(fill_template("{}", &["a"]), "a");
        assert_eq!(fill_template("x {} y {}", &["a", "b"]), "x a y b");
        assert_eq!(fill_template("no holes", &["a"]), "no holes");
        assert_eq!(fill_template("{} {}", &["only"]), "only ");
    }

    #[test]
    fn boot_line_opens_collapsed_boot_section() {
        let section = classifier()
            .classify(&LogLine::text(LogLevel::Debug, "start: 0_dut_boot (timeout 9m)"));
        let section = match section {
            Some(section) => section,
            None => panic!("boot line did not classify"),
        };
        assert_eq!(section.id(), "dut_boot");
        assert_eq!(section.kind(), SectionKind::Boot);
    }

    #[test]
    fn startrun_opens_suite_section_from_capture() {
        let section = classifier().classify(&LogLine::text(LogLevel::Debug, "<STARTRUN> mesa-ci"));
        let section = match section {
            Some(section) => section,
            None => panic!("STARTRUN line did not classify"),
        };
        assert_eq!(section.id(), "mesa-ci");
        assert_eq!(section.header(), "test_suite mesa-ci");
        assert_eq!(section.kind(), SectionKind::DutSuite);
    }

    #[test]
    fn level_filter_excludes_non_matching_levels() {
        assert!(classifier()
            .classify(&LogLine::text(LogLevel::Results, "<STARTRUN> mesa-ci"))
            .is_none());
        assert!(classifier()
            .classify(&LogLine::text(LogLevel::Target, "STARTTC kms_flip"))
            .is_some());
    }

    #[test]
    fn first_matching_rule_wins_deterministically() {
        // `start: 0_dut_boot` also matches the non-DUT suite rule; the boot
        // rule is earlier and must win every time.
        let line = LogLine::text(LogLevel::Debug, "start: 0_dut_boot");
        let classifier = classifier();
        for _ in 0..10 {
            let section = match classifier.classify(&line) {
                Some(section) => section,
                None => panic!("boot line did not classify"),
            };
            assert_eq!(section.kind(), SectionKind::Boot);
        }
    }

    #[test]
    fn single_level_spec_behaves_like_one_element_set() {
        let single = match SectionRule::new(
            "marker",
            LevelSpec::Single(LogLevel::Target),
            "m",
            "m",
            SectionKind::TestCase,
            false,
        ) {
            Ok(rule) => rule,
            Err(err) => panic!("rule failed: {err}"),
        };
        let set = match SectionRule::new(
            "marker",
            LevelSpec::Set(vec![LogLevel::Target]),
            "m",
            "m",
            SectionKind::TestCase,
            false,
        ) {
            Ok(rule) => rule,
            Err(err) => panic!("rule failed: {err}"),
        };
        let line = LogLine::text(LogLevel::Target, "marker");
        let a = SectionClassifier::new(vec![single]).classify(&line);
        let b = SectionClassifier::new(vec![set]).classify(&line);
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn list_and_structured_messages_never_classify() {
        let dump: LogLine = match serde_yaml::from_str("{lvl: debug, msg: ['STARTRUN x']}") {
            Ok(line) => line,
            Err(err) => panic!("parse failed: {err}"),
        };
        assert!(classifier().classify(&dump).is_none());
    }

    #[test]
    fn endtc_opens_post_processing() {
        let section = classifier().classify(&LogLine::text(LogLevel::Target, "<ENDTC> kms_flip"));
        let section = match section {
            Some(section) => section,
            None => panic!("ENDTC line did not classify"),
        };
        assert_eq!(section.kind(), SectionKind::PostProcessing);
        assert_eq!(section.id(), "post-kms_flip");
    }
}
