use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The institution a statement file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    CommBank,
    Anz,
    StGeorge,
    Zip,
    Generic,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::CommBank,
        SourceKind::Anz,
        SourceKind::StGeorge,
        SourceKind::Zip,
        SourceKind::Generic,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SourceKind::CommBank => "commbank",
            SourceKind::Anz => "anz",
            SourceKind::StGeorge => "stgeorge",
            SourceKind::Zip => "zip",
            SourceKind::Generic => "generic",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceKind::CommBank => "CommBank",
            SourceKind::Anz => "ANZ",
            SourceKind::StGeorge => "St.George",
            SourceKind::Zip => "Zip Pay",
            SourceKind::Generic => "Generic CSV",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        SourceKind::ALL
            .into_iter()
            .find(|k| k.key() == wanted)
            .ok_or_else(|| format!("Unknown statement source: '{s}'"))
    }
}
