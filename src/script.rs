//! Writing scripts and the caller-facing script profile.
//!
//! A [`ScriptProfile`] is the closed set of language modes a request can ask
//! for. It is threaded explicitly through the engine adapters (which
//! Tesseract models to load, whether the neural recognizer runs) and the
//! hallucination filter (which script counts as foreign).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A writing system the pipeline can tell apart character by character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Bengali,
    Latin,
    Arabic,
}

impl Script {
    /// All scripts in reporting order.
    pub const ALL: [Script; 3] = [Script::Bengali, Script::Latin, Script::Arabic];

    /// ISO-639-1 style code reported in `DocumentResult::languages`.
    pub fn code(self) -> &'static str {
        match self {
            Script::Bengali => "bn",
            Script::Latin => "en",
            Script::Arabic => "ar",
        }
    }

    /// Tesseract traineddata name.
    pub fn tesseract_lang(self) -> &'static str {
        match self {
            Script::Bengali => "ben",
            Script::Latin => "eng",
            Script::Arabic => "ara",
        }
    }

    /// Tesseract "script/" model used by the last-resort pass.
    pub fn tesseract_script_model(self) -> &'static str {
        match self {
            Script::Bengali => "script/Bengali",
            Script::Latin => "script/Latin",
            Script::Arabic => "script/Arabic",
        }
    }

    /// Human label used for the `mode` field.
    pub fn label(self) -> &'static str {
        match self {
            Script::Bengali => "bangla",
            Script::Latin => "english",
            Script::Arabic => "arabic",
        }
    }

    /// Scripts whose shaping defeats classic segmentation.
    pub fn is_complex(self) -> bool {
        matches!(self, Script::Bengali | Script::Arabic)
    }
}

/// Coarse class of a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Letter(Script),
    Digit,
    Neutral,
}

/// Classify one character.
pub fn classify(c: char) -> CharClass {
    match c {
        '0'..='9' => CharClass::Digit,
        '\u{0980}'..='\u{09FF}' => CharClass::Letter(Script::Bengali),
        '\u{0600}'..='\u{06FF}' | '\u{0750}'..='\u{077F}' => CharClass::Letter(Script::Arabic),
        'A'..='Z' | 'a'..='z' | '\u{00C0}'..='\u{024F}' if c != '\u{00D7}' && c != '\u{00F7}' => {
            CharClass::Letter(Script::Latin)
        }
        _ => CharClass::Neutral,
    }
}

/// Script of a character, if it is a letter of a known script.
pub fn script_of(c: char) -> Option<Script> {
    match classify(c) {
        CharClass::Letter(s) => Some(s),
        _ => None,
    }
}

/// The caller-declared language mode of a request.
///
/// Advisory only: it selects engine models and the hallucination filter's
/// target script, but the reported languages come from the output text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptProfile {
    #[default]
    Bangla,
    English,
    Mixed,
}

impl ScriptProfile {
    /// Scripts the caller expects to see.
    pub fn scripts(self) -> &'static [Script] {
        match self {
            ScriptProfile::Bangla => &[Script::Bengali],
            ScriptProfile::English => &[Script::Latin],
            ScriptProfile::Mixed => &[Script::Bengali, Script::Latin],
        }
    }

    pub fn includes(self, script: Script) -> bool {
        self.scripts().contains(&script)
    }

    /// Nothing to suppress when Latin was requested.
    pub fn includes_latin(self) -> bool {
        self.includes(Script::Latin)
    }

    /// Whether the neural recognizer should back up the classic engine.
    pub fn is_complex(self) -> bool {
        self.scripts().iter().any(|s| s.is_complex())
    }

    /// Language codes, e.g. `["bn", "en"]`.
    pub fn languages(self) -> Vec<String> {
        self.scripts().iter().map(|s| s.code().to_string()).collect()
    }

    /// Tesseract `-l` argument, e.g. `ben+eng`.
    pub fn tesseract_langs(self) -> String {
        self.scripts()
            .iter()
            .map(|s| s.tesseract_lang())
            .collect::<Vec<_>>()
            .join("+")
    }

    pub fn label(self) -> &'static str {
        match self {
            ScriptProfile::Bangla => "bangla",
            ScriptProfile::English => "english",
            ScriptProfile::Mixed => "mixed",
        }
    }
}

impl fmt::Display for ScriptProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ScriptProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bangla" | "bengali" | "bn" | "ben" => Ok(ScriptProfile::Bangla),
            "english" | "en" | "eng" => Ok(ScriptProfile::English),
            "mixed" | "bn+en" | "ben+eng" => Ok(ScriptProfile::Mixed),
            other => Err(format!(
                "unknown language mode '{other}' (expected bangla, english or mixed)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_characters() {
        assert_eq!(classify('আ'), CharClass::Letter(Script::Bengali));
        assert_eq!(classify('া'), CharClass::Letter(Script::Bengali));
        assert_eq!(classify('৫'), CharClass::Letter(Script::Bengali));
        assert_eq!(classify('H'), CharClass::Letter(Script::Latin));
        assert_eq!(classify('é'), CharClass::Letter(Script::Latin));
        assert_eq!(classify('ب'), CharClass::Letter(Script::Arabic));
        assert_eq!(classify('7'), CharClass::Digit);
        assert_eq!(classify('%'), CharClass::Neutral);
        assert_eq!(classify('×'), CharClass::Neutral);
        assert_eq!(classify('\u{200D}'), CharClass::Neutral);
    }

    #[test]
    fn profile_languages() {
        assert_eq!(ScriptProfile::Bangla.languages(), vec!["bn"]);
        assert_eq!(ScriptProfile::English.languages(), vec!["en"]);
        assert_eq!(ScriptProfile::Mixed.languages(), vec!["bn", "en"]);
        assert_eq!(ScriptProfile::Mixed.tesseract_langs(), "ben+eng");
    }

    #[test]
    fn profile_flags() {
        assert!(!ScriptProfile::Bangla.includes_latin());
        assert!(ScriptProfile::Mixed.includes_latin());
        assert!(ScriptProfile::Bangla.is_complex());
        assert!(ScriptProfile::Mixed.is_complex());
        assert!(!ScriptProfile::English.is_complex());
    }

    #[test]
    fn parse_profile() {
        assert_eq!("Bangla".parse::<ScriptProfile>(), Ok(ScriptProfile::Bangla));
        assert_eq!("eng".parse::<ScriptProfile>(), Ok(ScriptProfile::English));
        assert_eq!("mixed".parse::<ScriptProfile>(), Ok(ScriptProfile::Mixed));
        assert!("klingon".parse::<ScriptProfile>().is_err());
    }
}
