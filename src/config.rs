//! Conversion configuration.
//!
//! A [`Configuration`] is immutable and always valid: it can only be
//! obtained from [`ConfigurationBuilder::build`] (or [`Default`]), which
//! checks every knob eagerly. The builder is also the on-disk YAML format:
//!
//! ```yaml
//! scheme: bilou
//! colspec: tagged-relations
//! lenient: true
//! filter: "^#"
//! labels:
//!   PER: Person
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::Deserialize;

use crate::colspec::{registry, ColumnSpecification};
use crate::error::{ConfigurationError, DataFormatError};
use crate::tagging::TaggingScheme;

/// Tracing target for recovered (lenient-mode) problems.
pub const TRACING_TARGET_RECOVERY: &str = "otplc::recovery";

const DEFAULT_OUTPUT_DELIMITER: &str = "\t";
const DEFAULT_TOKEN_GAP: &str = " ";
const DEFAULT_SENTENCE_GAP: &str = "\n";
const DEFAULT_EMPTY_MARKER: &str = "NULL";
const DEFAULT_SAMPLE_SENTENCES: usize = 6;

/// How malformed input is handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Policy {
    /// Any problem aborts the current document.
    #[default]
    Strict,
    /// Recoverable problems are repaired or skipped and kept as warnings.
    Lenient,
}

impl Policy {
    /// Decides what happens to a recoverable problem.
    ///
    /// Returns the error in strict mode or for always-fatal kinds; otherwise
    /// records it in `warnings` so the caller can repair or skip.
    pub fn recover(
        &self,
        err: DataFormatError,
        warnings: &mut Vec<DataFormatError>,
    ) -> Result<(), DataFormatError> {
        if *self == Policy::Strict || err.kind.is_always_fatal() {
            return Err(err);
        }
        tracing::warn!(
            target: TRACING_TARGET_RECOVERY,
            kind = %err.kind,
            location = %err.location,
            "{}",
            err.message
        );
        warnings.push(err);
        Ok(())
    }
}

/// How OTPL lines are split into columns.
#[derive(Clone, Debug, Default)]
pub enum Separator {
    /// Decide between [`Separator::Tab`] and [`Separator::Whitespace`] per file.
    #[default]
    Auto,
    /// Runs of whitespace.
    Whitespace,
    /// Single tab characters.
    Tab,
    /// A custom regular expression.
    Pattern(Regex),
}

/// How many non-blank lines separator detection looks at.
const DETECTION_SAMPLE: usize = 10;

impl Separator {
    /// Splits a line; [`Separator::Auto`] splits like [`Separator::Whitespace`].
    pub fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self {
            Separator::Auto | Separator::Whitespace => line.split_whitespace().collect(),
            Separator::Tab => line.split('\t').collect(),
            Separator::Pattern(re) => re.split(line).collect(),
        }
    }

    /// Picks the separator that yields the most stable column count over
    /// the first non-blank lines.
    ///
    /// A separator wins if it produces one column count on every sampled
    /// line while the other does not; if both are stable, tabs win unless
    /// whitespace yields more columns. Unstable or single-column samples
    /// fall back to whitespace.
    pub fn detect<'a>(lines: impl IntoIterator<Item = &'a str>) -> Separator {
        let mut spaces: BTreeMap<usize, usize> = BTreeMap::new();
        let mut tabs: BTreeMap<usize, usize> = BTreeMap::new();

        for line in lines
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .take(DETECTION_SAMPLE)
        {
            *spaces.entry(line.split_whitespace().count()).or_default() += 1;
            *tabs.entry(line.split('\t').count()).or_default() += 1;
            if spaces.len() > 1 && tabs.len() > 1 {
                break;
            }
        }

        let columns = |counts: &BTreeMap<usize, usize>| counts.keys().next_back().copied();
        match (spaces.len(), tabs.len()) {
            (1, 1) => {
                let (s, t) = (columns(&spaces).unwrap_or(1), columns(&tabs).unwrap_or(1));
                if t > 1 && t >= s {
                    Separator::Tab
                } else {
                    Separator::Whitespace
                }
            }
            (_, 1) if columns(&tabs).unwrap_or(1) > 1 => Separator::Tab,
            _ => Separator::Whitespace,
        }
    }

    /// Resolves [`Separator::Auto`] against a sample of lines.
    pub fn resolve<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Separator {
        match self {
            Separator::Auto => Separator::detect(lines),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Separator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Separator::Auto => f.write_str("auto"),
            Separator::Whitespace => f.write_str("whitespace"),
            Separator::Tab => f.write_str("tab"),
            Separator::Pattern(re) => f.write_str(re.as_str()),
        }
    }
}

impl FromStr for Separator {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Separator::Auto),
            "whitespace" | "spaces" => Ok(Separator::Whitespace),
            "tab" | "\t" => Ok(Separator::Tab),
            "" => Err(ConfigurationError::Empty("separator")),
            pattern => {
                let re = compile("separator", pattern)?;
                if re.is_match("") {
                    return Err(ConfigurationError::Forbidden {
                        what: "separator",
                        forbidden: "patterns that match the empty string",
                    });
                }
                Ok(Separator::Pattern(re))
            }
        }
    }
}

fn compile(what: &'static str, pattern: &str) -> Result<Regex, ConfigurationError> {
    Regex::new(pattern).map_err(|source| ConfigurationError::InvalidPattern {
        what,
        pattern: pattern.to_string(),
        source,
    })
}

/// A bijective renaming between OTPL labels and brat type names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelMap {
    to_brat: BTreeMap<String, String>,
    to_otpl: BTreeMap<String, String>,
}

impl LabelMap {
    fn new(pairs: BTreeMap<String, String>) -> Result<Self, ConfigurationError> {
        let mut to_otpl = BTreeMap::new();
        for (otpl, brat) in &pairs {
            if otpl.is_empty() || brat.is_empty() {
                return Err(ConfigurationError::Empty("labels"));
            }
            if to_otpl.insert(brat.clone(), otpl.clone()).is_some() {
                return Err(ConfigurationError::DuplicateLabel(brat.clone()));
            }
        }
        Ok(Self {
            to_brat: pairs,
            to_otpl,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.to_brat.is_empty()
    }

    /// The brat name of an OTPL label (the label itself when unmapped).
    pub fn to_brat<'a>(&'a self, label: &'a str) -> &'a str {
        self.to_brat.get(label).map_or(label, String::as_str)
    }

    /// The OTPL label of a brat name (the name itself when unmapped).
    pub fn to_otpl<'a>(&'a self, name: &'a str) -> &'a str {
        self.to_otpl.get(name).map_or(name, String::as_str)
    }
}

/// The validated, immutable set of conversion knobs.
#[derive(Clone, Debug)]
pub struct Configuration {
    scheme: TaggingScheme,
    output_scheme: TaggingScheme,
    colspec: Option<ColumnSpecification>,
    policy: Policy,
    separator: Separator,
    output_delimiter: String,
    token_gap: String,
    sentence_gap: String,
    empty_marker: String,
    filter: Option<Regex>,
    labels: LabelMap,
    sample_sentences: usize,
    write_header: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            scheme: TaggingScheme::default(),
            output_scheme: TaggingScheme::default(),
            colspec: None,
            policy: Policy::default(),
            separator: Separator::default(),
            output_delimiter: DEFAULT_OUTPUT_DELIMITER.to_string(),
            token_gap: DEFAULT_TOKEN_GAP.to_string(),
            sentence_gap: DEFAULT_SENTENCE_GAP.to_string(),
            empty_marker: DEFAULT_EMPTY_MARKER.to_string(),
            filter: None,
            labels: LabelMap::default(),
            sample_sentences: DEFAULT_SAMPLE_SENTENCES,
            write_header: false,
        }
    }
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Parses and validates a YAML configuration.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        ConfigurationBuilder::from_yaml_str(yaml)?.build()
    }

    /// Tagging scheme of OTPL input.
    pub fn scheme(&self) -> TaggingScheme {
        self.scheme
    }

    /// Tagging scheme of OTPL output.
    pub fn output_scheme(&self) -> TaggingScheme {
        self.output_scheme
    }

    /// The fixed colspec, if one was configured; `None` means guess.
    pub fn colspec(&self) -> Option<&ColumnSpecification> {
        self.colspec.as_ref()
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn separator(&self) -> &Separator {
        &self.separator
    }

    pub fn output_delimiter(&self) -> &str {
        &self.output_delimiter
    }

    pub fn token_gap(&self) -> &str {
        &self.token_gap
    }

    pub fn sentence_gap(&self) -> &str {
        &self.sentence_gap
    }

    /// Cell value meaning "no annotation" in association and feature columns.
    pub fn empty_marker(&self) -> &str {
        &self.empty_marker
    }

    /// True if an OTPL line must be ignored.
    pub fn is_filtered(&self, line: &str) -> bool {
        self.filter.as_ref().is_some_and(|re| re.is_match(line))
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Number of sentences `guess_colspec` samples.
    pub fn sample_sentences(&self) -> usize {
        self.sample_sentences
    }

    /// Whether the OTPL writer emits a colspec header line.
    pub fn write_header(&self) -> bool {
        self.write_header
    }
}

/// Unvalidated configuration values, as set programmatically or read from YAML.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigurationBuilder {
    scheme: Option<String>,
    output_scheme: Option<String>,
    allow_lossy: bool,
    colspec: Option<String>,
    strict: bool,
    lenient: bool,
    separator: Option<String>,
    output_delimiter: Option<String>,
    token_gap: Option<String>,
    sentence_gap: Option<String>,
    empty_marker: Option<String>,
    filter: Option<String>,
    labels: BTreeMap<String, String>,
    sample_sentences: Option<usize>,
    write_header: bool,
}

impl ConfigurationBuilder {
    /// Parses YAML without validating the values.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn output_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.output_scheme = Some(scheme.into());
        self
    }

    pub fn allow_lossy(mut self, allow: bool) -> Self {
        self.allow_lossy = allow;
        self
    }

    /// A registry variant name or a header line of role keywords.
    pub fn colspec(mut self, colspec: impl Into<String>) -> Self {
        self.colspec = Some(colspec.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// `auto`, `whitespace`, `tab`, or a regular expression.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn output_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.output_delimiter = Some(delimiter.into());
        self
    }

    pub fn token_gap(mut self, gap: impl Into<String>) -> Self {
        self.token_gap = Some(gap.into());
        self
    }

    pub fn sentence_gap(mut self, gap: impl Into<String>) -> Self {
        self.sentence_gap = Some(gap.into());
        self
    }

    pub fn empty_marker(mut self, marker: impl Into<String>) -> Self {
        self.empty_marker = Some(marker.into());
        self
    }

    /// OTPL lines matching this regular expression are ignored.
    pub fn filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    /// Renames OTPL label `otpl` to brat type `brat`.
    pub fn label(mut self, otpl: impl Into<String>, brat: impl Into<String>) -> Self {
        self.labels.insert(otpl.into(), brat.into());
        self
    }

    pub fn sample_sentences(mut self, count: usize) -> Self {
        self.sample_sentences = Some(count);
        self
    }

    pub fn write_header(mut self, write: bool) -> Self {
        self.write_header = write;
        self
    }

    /// Validates every value and produces the configuration.
    pub fn build(self) -> Result<Configuration, ConfigurationError> {
        let defaults = Configuration::default();

        let scheme = match &self.scheme {
            Some(name) => name.parse()?,
            None => defaults.scheme,
        };
        let output_scheme = match &self.output_scheme {
            Some(name) => name.parse()?,
            None => scheme,
        };
        if output_scheme.is_coarser_than(scheme) && !self.allow_lossy {
            return Err(ConfigurationError::LossyScheme {
                from: scheme.to_string(),
                to: output_scheme.to_string(),
            });
        }

        let colspec = self
            .colspec
            .as_deref()
            .map(registry::resolve)
            .transpose()?;

        let policy = match (self.strict, self.lenient) {
            (true, true) => return Err(ConfigurationError::ConflictingPolicy),
            (_, true) => Policy::Lenient,
            _ => Policy::Strict,
        };

        let separator = match &self.separator {
            Some(raw) => raw.parse()?,
            None => defaults.separator,
        };

        let output_delimiter = non_empty(
            "output_delimiter",
            self.output_delimiter,
            DEFAULT_OUTPUT_DELIMITER,
        )?;
        if output_delimiter.contains(['\n', '\r']) {
            return Err(ConfigurationError::Forbidden {
                what: "output_delimiter",
                forbidden: "line breaks",
            });
        }

        let token_gap = non_empty("token_gap", self.token_gap, DEFAULT_TOKEN_GAP)?;
        let sentence_gap = non_empty("sentence_gap", self.sentence_gap, DEFAULT_SENTENCE_GAP)?;

        let empty_marker = non_empty("empty_marker", self.empty_marker, DEFAULT_EMPTY_MARKER)?;
        if empty_marker.chars().any(char::is_whitespace) {
            return Err(ConfigurationError::Forbidden {
                what: "empty_marker",
                forbidden: "whitespace",
            });
        }

        let filter = self
            .filter
            .as_deref()
            .map(|pattern| compile("filter", pattern))
            .transpose()?;

        let labels = LabelMap::new(self.labels)?;

        let sample_sentences = self.sample_sentences.unwrap_or(DEFAULT_SAMPLE_SENTENCES);
        if sample_sentences == 0 {
            return Err(ConfigurationError::EmptySample);
        }

        Ok(Configuration {
            scheme,
            output_scheme,
            colspec,
            policy,
            separator,
            output_delimiter,
            token_gap,
            sentence_gap,
            empty_marker,
            filter,
            labels,
            sample_sentences,
            write_header: self.write_header,
        })
    }
}

fn non_empty(
    what: &'static str,
    value: Option<String>,
    default: &str,
) -> Result<String, ConfigurationError> {
    match value {
        Some(value) if value.is_empty() => Err(ConfigurationError::Empty(what)),
        Some(value) => Ok(value),
        None => Ok(default.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colspec::ColumnRole;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_is_valid_and_strict() {
        let config = Configuration::builder().build().unwrap();
        assert_eq!(config.scheme(), TaggingScheme::Bio);
        assert_eq!(config.output_scheme(), TaggingScheme::Bio);
        assert_eq!(config.policy(), Policy::Strict);
        assert_eq!(config.token_gap(), " ");
        assert_eq!(config.empty_marker(), "NULL");
        assert!(config.colspec().is_none());
    }

    #[test]
    fn test_unknown_scheme_fails() {
        let err = Configuration::builder().scheme("bieo").build().unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownScheme(_)));
    }

    #[test]
    fn test_conflicting_policy_fails() {
        let err = Configuration::builder()
            .strict(true)
            .lenient(true)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ConflictingPolicy));
    }

    #[test]
    fn test_unknown_colspec_fails() {
        let err = Configuration::builder()
            .colspec("no-such-layout")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownColspec { .. }));
    }

    #[test]
    fn test_colspec_by_name_and_header() {
        let config = Configuration::builder().colspec("entities").build().unwrap();
        assert_eq!(
            config.colspec().unwrap().roles(),
            &[ColumnRole::Text, ColumnRole::EntityTag]
        );

        let config = Configuration::builder()
            .colspec("TOKEN POS_TAG ENTITY")
            .build()
            .unwrap();
        assert_eq!(config.colspec().unwrap().arity(), 3);
    }

    #[test]
    fn test_lossy_output_scheme_requires_opt_in() {
        let err = Configuration::builder()
            .scheme("bilou")
            .output_scheme("io")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::LossyScheme { .. }));

        let config = Configuration::builder()
            .scheme("bilou")
            .output_scheme("io")
            .allow_lossy(true)
            .build()
            .unwrap();
        assert_eq!(config.output_scheme(), TaggingScheme::Io);

        assert!(Configuration::builder()
            .scheme("bio")
            .output_scheme("bilou")
            .build()
            .is_ok());
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(matches!(
            Configuration::builder().filter("(").build().unwrap_err(),
            ConfigurationError::InvalidPattern { what: "filter", .. }
        ));
        assert!(matches!(
            Configuration::builder().separator("x*").build().unwrap_err(),
            ConfigurationError::Forbidden { what: "separator", .. }
        ));
        assert!(matches!(
            Configuration::builder().token_gap("").build().unwrap_err(),
            ConfigurationError::Empty("token_gap")
        ));
        assert!(matches!(
            Configuration::builder().empty_marker("no value").build().unwrap_err(),
            ConfigurationError::Forbidden { what: "empty_marker", .. }
        ));
        assert!(matches!(
            Configuration::builder().sample_sentences(0).build().unwrap_err(),
            ConfigurationError::EmptySample
        ));
        assert!(matches!(
            Configuration::builder()
                .label("PER", "Person")
                .label("PERSON", "Person")
                .build()
                .unwrap_err(),
            ConfigurationError::DuplicateLabel(_)
        ));
    }

    #[test]
    fn test_from_yaml() {
        let config = Configuration::from_yaml_str(
            "scheme: bioes\nlenient: true\nfilter: '^#'\nlabels:\n  PER: Person\n",
        )
        .unwrap();
        assert_eq!(config.scheme(), TaggingScheme::Bioes);
        assert_eq!(config.policy(), Policy::Lenient);
        assert!(config.is_filtered("# comment"));
        assert!(!config.is_filtered("John B-PER"));
        assert_eq!(config.labels().to_brat("PER"), "Person");
        assert_eq!(config.labels().to_otpl("Person"), "PER");
        assert_eq!(config.labels().to_brat("ORG"), "ORG");

        assert!(Configuration::from_yaml_str("").is_ok());
        assert!(matches!(
            Configuration::from_yaml_str("schema: bio\n").unwrap_err(),
            ConfigurationError::Parse(_)
        ));
    }

    #[test]
    fn test_separator_detection() {
        let tabbed = ["John Smith\tB-PER", "arrived\tO"];
        assert!(matches!(Separator::detect(tabbed), Separator::Tab));

        let spaced = ["John   B-PER", "Smith I-PER", "arrived O"];
        assert!(matches!(Separator::detect(spaced), Separator::Whitespace));

        let both = ["John\tB-PER", "Smith\tI-PER"];
        assert!(matches!(Separator::detect(both), Separator::Tab));

        let single = ["John", "Smith"];
        assert!(matches!(Separator::detect(single), Separator::Whitespace));
    }

    #[test]
    fn test_separator_split() {
        assert_eq!(Separator::Whitespace.split(" a  b\tc "), vec!["a", "b", "c"]);
        assert_eq!(Separator::Tab.split("a b\tc"), vec!["a b", "c"]);
        let pattern: Separator = r"\s*\|\s*".parse().unwrap();
        assert_eq!(pattern.split("a | b|c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_policy_recover() {
        let err = DataFormatError::new(ErrorKind::MalformedTagSequence, "orphan I-PER");
        let mut warnings = Vec::new();
        assert!(Policy::Strict.recover(err.clone(), &mut warnings).is_err());
        assert!(warnings.is_empty());

        assert!(Policy::Lenient.recover(err, &mut warnings).is_ok());
        assert_eq!(warnings.len(), 1);

        let fatal = DataFormatError::new(ErrorKind::TextMismatch, "x");
        assert!(Policy::Lenient.recover(fatal, &mut warnings).is_err());
    }
}
